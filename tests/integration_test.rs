//! Integration tests for the stream mocker server
//!
//! These tests drive the full router in-process and verify:
//! - Chat completions, streamed and not
//! - Time-budget truncation over HTTP
//! - Runtime configuration endpoints
//! - Stats collection

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use stream_mocker::cli::{router, AppState, Config};
use stream_mocker::{new_shared_stats, MAX_FITTED_CHARS};
use tower::ServiceExt;

const CONFIG: &str = r#"
general:
  default_tokens_per_second: 0
  default_response_mode: short
models:
  instant:
    tokens_per_second: 0
    description: "Streams everything at once"
  paced:
    tokens_per_second: 10
    max_stream_time_seconds: 1
responses:
  short:
    content: "A short reply."
  medium:
    content: "First paragraph of the reply.\n\nSecond paragraph of the reply."
  long:
    content: "Para one is short.\n\nPara two has words that go on and on and on for a while.\n\nPara three never shows."
"#;

fn app_with(config: Config) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config, new_shared_stats()));
    (router(state.clone()), state)
}

fn app() -> (Router, Arc<AppState>) {
    app_with(Config::from_yaml(CONFIG).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn chat(model: &str, stream: bool, response_length: Option<&str>) -> Value {
    let mut body = json!({
        "model": model,
        "stream": stream,
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "Tell me a story about a robot."}
        ]
    });
    if let Some(length) = response_length {
        body["response_length"] = json!(length);
    }
    body
}

/// Split an SSE body into its JSON frames, checking the `[DONE]` sentinel
fn parse_sse(body: &[u8]) -> Vec<Value> {
    let text = std::str::from_utf8(body).unwrap();
    assert!(text.ends_with("data: [DONE]\n\n"), "missing sentinel: {text}");

    let events: Vec<&str> = text
        .split("\n\n")
        .filter(|event| !event.is_empty())
        .collect();
    assert_eq!(events.last(), Some(&"data: [DONE]"));

    events[..events.len() - 1]
        .iter()
        .map(|event| {
            let data = event.strip_prefix("data: ").unwrap();
            serde_json::from_str(data).unwrap()
        })
        .collect()
}

fn streamed_content(frames: &[Value]) -> String {
    frames
        .iter()
        .filter_map(|f| f["choices"][0]["delta"]["content"].as_str())
        .collect()
}

mod chat_tests {
    use super::*;

    #[tokio::test]
    async fn test_non_streaming_completion() {
        let (app, _) = app();
        let (status, body) =
            send_json(&app, post_json("/v1/chat/completions", chat("instant", false, None))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["object"], "chat.completion");
        assert_eq!(body["model"], "instant");
        assert_eq!(body["choices"][0]["message"]["role"], "assistant");
        assert_eq!(body["choices"][0]["message"]["content"], "A short reply.");
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
        // 59 prompt characters, 14 completion characters
        assert_eq!(body["usage"]["prompt_tokens"], 14);
        assert_eq!(body["usage"]["completion_tokens"], 3);
        assert_eq!(body["usage"]["total_tokens"], 17);
    }

    #[tokio::test]
    async fn test_streaming_completion() {
        let (app, _) = app();
        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/chat/completions",
                chat("instant", true, Some("medium")),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let frames = parse_sse(&body);

        let first = &frames[0];
        assert_eq!(first["choices"][0]["delta"]["role"], "assistant");
        assert!(first["choices"][0]["finish_reason"].is_null());

        let id = first["id"].as_str().unwrap();
        assert!(frames.iter().all(|f| f["id"] == id));
        assert!(frames.iter().all(|f| f["object"] == "chat.completion.chunk"));

        assert_eq!(
            streamed_content(&frames),
            "First paragraph of the reply.\n\nSecond paragraph of the reply."
        );

        let last = frames.last().unwrap();
        assert_eq!(last["choices"][0]["finish_reason"], "stop");
        // 29 + 30 paragraph characters; separators are not counted
        assert_eq!(last["usage"]["completion_tokens"], 14);
        assert_eq!(last["usage"]["total_tokens"], 28);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_truncates_at_budget() {
        let mut config = Config::from_yaml(CONFIG).unwrap();
        config.general.enforce_time_limit = true;
        config.general.truncation_message = "Out of time.".to_string();
        let (app, state) = app_with(config);

        let (status, body) = send(
            &app,
            post_json("/v1/chat/completions", chat("paced", true, Some("long"))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let frames = parse_sse(&body);
        let content = streamed_content(&frames);
        assert!(content.starts_with("Para one is short.\n\nPara two"));
        assert!(content.contains("for a while."));
        assert!(!content.contains("Para three"));
        assert!(content.ends_with("for a while.\n\nOut of time."));

        let last = frames.last().unwrap();
        assert_eq!(last["choices"][0]["finish_reason"], "length");

        let stats = state.stats.snapshot();
        assert_eq!(stats.truncated_streams, 1);
        assert_eq!(stats.active_requests, 0);
    }

    #[tokio::test]
    async fn test_unknown_model_uses_defaults() {
        let (app, _) = app();
        let (status, body) =
            send_json(&app, post_json("/v1/chat/completions", chat("gpt-7", false, None))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model"], "gpt-7");
    }

    #[tokio::test]
    async fn test_strict_models() {
        let mut config = Config::from_yaml(CONFIG).unwrap();
        config.general.strict_models = true;
        let (app, state) = app_with(config);

        let (status, body) =
            send_json(&app, post_json("/v1/chat/completions", chat("gpt-7", false, None))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "model_not_found");
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["message"], "Model 'gpt-7' does not exist");

        // tagged names are passed through
        let (status, _) = send_json(
            &app,
            post_json("/v1/chat/completions", chat("llama3:8b", false, None)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let stats = state.stats.snapshot();
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.active_requests, 0);
    }

    #[tokio::test]
    async fn test_duration_seconds_resizes_response() {
        let (app, _) = app();
        let mut body = chat("paced", false, Some("short"));
        body["duration_seconds"] = json!(3);

        let (status, body) = send_json(&app, post_json("/v1/chat/completions", body)).await;
        assert_eq!(status, StatusCode::OK);

        // 10 t/s for 3 s is about 120 characters of repeated paragraphs
        let content = body["choices"][0]["message"]["content"].as_str().unwrap();
        assert!(content.starts_with("A short reply.\n\nA short reply."));
        assert!(content.chars().count() <= 120);
    }

    #[tokio::test]
    async fn test_negative_duration_seconds_rejected() {
        let (app, state) = app();
        let mut body = chat("paced", true, Some("short"));
        body["duration_seconds"] = json!(-1.5);

        let (status, body) = send_json(&app, post_json("/v1/chat/completions", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("duration_seconds"));

        let stats = state.stats.snapshot();
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.active_requests, 0);
    }

    #[tokio::test]
    async fn test_huge_duration_seconds_is_bounded() {
        let (app, _) = app();
        let mut body = chat("paced", false, Some("short"));
        body["duration_seconds"] = json!(1e300);

        let (status, body) = send_json(&app, post_json("/v1/chat/completions", body)).await;
        assert_eq!(status, StatusCode::OK);

        let content = body["choices"][0]["message"]["content"].as_str().unwrap();
        assert!(content.starts_with("A short reply.\n\nA short reply."));
        assert!(content.chars().count() <= MAX_FITTED_CHARS);
    }

    #[tokio::test]
    async fn test_authorization_header_ignored() {
        let (app, _) = app();
        let mut request = post_json("/v1/chat/completions", chat("instant", false, None));
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer anything".parse().unwrap());

        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let (app, _) = app();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/v1/chat/completions")
            .header(header::ORIGIN, "http://example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}

mod config_tests {
    use super::*;

    #[tokio::test]
    async fn test_root_and_health() {
        let (app, _) = app();
        let (status, body) = send_json(&app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "OpenAI Stream Mocker");

        let (status, body) = send_json(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_list_models() {
        let (app, _) = app();
        let (status, body) = send_json(&app, get("/v1/models")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["object"], "list");

        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        let instant = data.iter().find(|m| m["id"] == "instant").unwrap();
        assert_eq!(instant["owned_by"], "openai-stream-mocker");
        assert_eq!(instant["description"], "Streams everything at once");
        assert_eq!(instant["permission"][0]["id"], "modelperm-instant");
    }

    #[tokio::test]
    async fn test_get_config() {
        let (app, _) = app();
        let (_, body) = send_json(&app, get("/config")).await;
        assert_eq!(body["default"]["tokens_per_second"], 0.0);
        assert_eq!(body["models"]["paced"]["tokens_per_second"], 10.0);

        let (status, body) = send_json(&app, get("/config/default")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["description"], "Default configuration");

        let (status, body) = send_json(&app, get("/config/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Model nope not found");
    }

    #[tokio::test]
    async fn test_update_model_rate() {
        let (app, state) = app();

        let (_, body) = send_json(
            &app,
            post_json("/config", json!({"model": "paced", "tokens_per_second": 25})),
        )
        .await;
        assert_eq!(body["message"], "Tokens per second for model paced updated to 25");

        let (_, body) = send_json(
            &app,
            post_json(
                "/config",
                json!({"model": "new-model", "tokens_per_second": 5, "description": "Fresh"}),
            ),
        )
        .await;
        assert_eq!(body["message"], "Added new model new-model with 5 tokens per second");

        let (_, body) = send_json(&app, get("/config/new-model")).await;
        assert_eq!(body["tokens_per_second"], 5.0);
        assert_eq!(body["description"], "Fresh");

        assert_eq!(state.store.session("paced").tokens_per_second, 25.0);
    }

    #[tokio::test]
    async fn test_update_model_parameters() {
        let (app, state) = app();
        let (_, body) = send_json(
            &app,
            post_json("/config", json!({"model": "llama-7b", "parameters": 7})),
        )
        .await;
        assert_eq!(
            body["message"],
            "Added model llama-7b with 7B parameters, estimated speed: 8.34 tokens/sec"
        );
        let rate = state.store.session("llama-7b").tokens_per_second;
        assert!((rate - 8.337).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_update_default_rate() {
        let (app, state) = app();
        let (_, body) =
            send_json(&app, post_json("/config", json!({"tokens_per_second": 42}))).await;
        assert_eq!(body["message"], "Default tokens per second updated to 42");
        assert_eq!(state.store.session("anything").tokens_per_second, 42.0);

        let (_, body) = send_json(&app, post_json("/config", json!({"model": "x"}))).await;
        assert_eq!(body["message"], "No changes made");
    }

    #[tokio::test]
    async fn test_reload_without_file_resets() {
        let (app, state) = app();
        state.store.set_default_rate(99.0);

        let (status, body) = send_json(&app, post_json("/config/reload", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Configuration reloaded successfully");
        assert_eq!(state.store.session("x").tokens_per_second, 10.0);
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_config() {
        let config = Config::from_yaml(CONFIG).unwrap();
        let state = Arc::new(
            AppState::new(config, new_shared_stats())
                .with_config_path("/definitely/not/here.yaml"),
        );
        let app = router(state.clone());

        let (status, body) = send_json(&app, post_json("/config/reload", json!({}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["type"], "internal_error");
        assert!(state.store.snapshot().is_known_model("paced"));
    }

    #[tokio::test]
    async fn test_list_responses() {
        let (app, _) = app();
        let (status, body) = send_json(&app, get("/responses")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["short"]["preview"], "A short reply.");
        assert_eq!(body["short"]["token_estimate"], 3);
        assert!(body["long"]["preview"].as_str().unwrap().ends_with("..."));
    }
}

mod stats_tests {
    use super::*;

    #[tokio::test]
    async fn test_stats_endpoint() {
        let (app, _) = app();
        send(&app, post_json("/v1/chat/completions", chat("instant", false, None))).await;
        send(&app, post_json("/v1/chat/completions", chat("instant", true, None))).await;

        let (status, body) = send_json(&app, get("/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_requests"], 2);
        assert_eq!(body["streaming_requests"], 1);
        assert_eq!(body["non_streaming_requests"], 1);
        assert_eq!(body["completed_streams"], 1);
        assert_eq!(body["active_requests"], 0);
        assert_eq!(body["model_requests"]["instant"], 2);
        assert_eq!(body["prompt_tokens"], 28);
    }

    #[tokio::test]
    async fn test_abandoned_stream_counts_as_aborted() {
        let (app, state) = app();
        let response = app
            .clone()
            .oneshot(post_json("/v1/chat/completions", chat("paced", true, None)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        drop(response);

        let stats = state.stats.snapshot();
        assert_eq!(stats.aborted_streams, 1);
        assert_eq!(stats.completed_streams, 0);
        assert_eq!(stats.active_requests, 0);
    }

    #[tokio::test]
    async fn test_session_keeps_settings_after_update() {
        let (app, state) = app();

        // start a stream, then change the model under it
        let response = app
            .clone()
            .oneshot(post_json("/v1/chat/completions", chat("instant", true, Some("medium"))))
            .await
            .unwrap();
        state.store.set_model_rate("instant", 1.0, None);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let frames = parse_sse(&body);
        assert_eq!(frames.last().unwrap()["choices"][0]["finish_reason"], "stop");
        assert_eq!(state.stats.snapshot().completed_streams, 1);
    }
}
