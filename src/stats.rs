//! Statistics module for tracking real-time metrics.
//!
//! Thread-safe atomic counters for requests, stream outcomes, token usage,
//! latency and how closely streams hit their target rate.

use crate::openai::FinishReason;
use crate::pacer::SessionSummary;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Relaxed ordering for stats - we don't need strict ordering guarantees
const ORDERING: Ordering = Ordering::Relaxed;

/// Fixed-point scale for accumulating rate ratios in an integer
const RATIO_SCALE: f64 = 1_000_000.0;

/// Global statistics tracker for the server.
#[derive(Debug)]
pub struct Stats {
    /// Server start time
    start_time: Instant,

    // Request counters
    /// Total number of requests received
    pub total_requests: AtomicU64,
    /// Currently active (in-flight) requests
    pub active_requests: AtomicU64,
    /// Total streaming requests
    pub streaming_requests: AtomicU64,
    /// Total non-streaming requests
    pub non_streaming_requests: AtomicU64,
    /// Requests answered with an error status
    pub total_errors: AtomicU64,

    // Stream outcomes
    /// Streams that delivered the whole response
    pub completed_streams: AtomicU64,
    /// Streams cut short by their time budget
    pub truncated_streams: AtomicU64,
    /// Streams dropped by the client before finishing
    pub aborted_streams: AtomicU64,

    // Token counters
    /// Total prompt tokens processed
    pub prompt_tokens: AtomicU64,
    /// Total completion tokens delivered
    pub completion_tokens: AtomicU64,

    // Per-model request counts
    model_requests: RwLock<HashMap<String, u64>>,

    // Latency tracking (in microseconds)
    /// Total latency for calculating average
    total_latency_us: AtomicU64,
    /// Count of finished requests (for average calculation)
    finished_requests: AtomicU64,
    /// Minimum latency seen
    min_latency_us: AtomicU64,
    /// Maximum latency seen
    max_latency_us: AtomicU64,

    // Achieved / target rate of throttled streams
    rate_ratio_total: AtomicU64,
    rate_samples: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    /// Create a new Stats instance
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            active_requests: AtomicU64::new(0),
            streaming_requests: AtomicU64::new(0),
            non_streaming_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            completed_streams: AtomicU64::new(0),
            truncated_streams: AtomicU64::new(0),
            aborted_streams: AtomicU64::new(0),
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            model_requests: RwLock::new(HashMap::new()),
            total_latency_us: AtomicU64::new(0),
            finished_requests: AtomicU64::new(0),
            min_latency_us: AtomicU64::new(u64::MAX),
            max_latency_us: AtomicU64::new(0),
            rate_ratio_total: AtomicU64::new(0),
            rate_samples: AtomicU64::new(0),
        }
    }

    /// Record the start of a new request
    pub fn record_request_start(&self, model: &str, is_streaming: bool) {
        self.total_requests.fetch_add(1, ORDERING);
        self.active_requests.fetch_add(1, ORDERING);

        if is_streaming {
            self.streaming_requests.fetch_add(1, ORDERING);
        } else {
            self.non_streaming_requests.fetch_add(1, ORDERING);
        }

        if let Ok(mut map) = self.model_requests.write() {
            *map.entry(model.to_string()).or_insert(0) += 1;
        }
    }

    /// Record the completion of a request
    pub fn record_request_end(&self, latency: Duration, prompt_tokens: u32, completion_tokens: u32) {
        self.active_requests.fetch_sub(1, ORDERING);
        self.finished_requests.fetch_add(1, ORDERING);

        self.prompt_tokens.fetch_add(prompt_tokens as u64, ORDERING);
        self.completion_tokens
            .fetch_add(completion_tokens as u64, ORDERING);

        let latency_us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_us.fetch_add(latency_us, ORDERING);
        self.min_latency_us.fetch_min(latency_us, ORDERING);
        self.max_latency_us.fetch_max(latency_us, ORDERING);
    }

    /// Record a stream that reached its terminal frame
    pub fn record_stream_finished(&self, summary: &SessionSummary, latency: Duration) {
        match summary.finish_reason {
            FinishReason::Stop => self.completed_streams.fetch_add(1, ORDERING),
            FinishReason::Length => self.truncated_streams.fetch_add(1, ORDERING),
        };

        if summary.target_rate.is_finite() && summary.target_rate > 0.0 {
            let ratio = summary.achieved_rate / summary.target_rate;
            if ratio.is_finite() && ratio >= 0.0 {
                self.rate_ratio_total
                    .fetch_add((ratio * RATIO_SCALE).round() as u64, ORDERING);
                self.rate_samples.fetch_add(1, ORDERING);
            }
        }

        self.record_request_end(
            latency,
            summary.usage.prompt_tokens,
            summary.usage.completion_tokens,
        );
    }

    /// Record a stream the client abandoned
    pub fn record_stream_aborted(&self) {
        self.aborted_streams.fetch_add(1, ORDERING);
        self.active_requests.fetch_sub(1, ORDERING);
    }

    /// Record an error response
    pub fn record_error(&self) {
        self.total_errors.fetch_add(1, ORDERING);
        self.active_requests.fetch_sub(1, ORDERING);
    }

    /// Get the uptime of the server
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get average latency in milliseconds
    pub fn avg_latency_ms(&self) -> f64 {
        let finished = self.finished_requests.load(ORDERING);
        if finished == 0 {
            return 0.0;
        }
        let total_us = self.total_latency_us.load(ORDERING);
        (total_us as f64 / finished as f64) / 1000.0
    }

    /// Get minimum latency in milliseconds
    pub fn min_latency_ms(&self) -> Option<f64> {
        let min = self.min_latency_us.load(ORDERING);
        if min == u64::MAX {
            None
        } else {
            Some(min as f64 / 1000.0)
        }
    }

    /// Get maximum latency in milliseconds
    pub fn max_latency_ms(&self) -> Option<f64> {
        if self.finished_requests.load(ORDERING) == 0 {
            None
        } else {
            Some(self.max_latency_us.load(ORDERING) as f64 / 1000.0)
        }
    }

    /// Mean of achieved / target rate over throttled streams
    pub fn avg_rate_ratio(&self) -> Option<f64> {
        let samples = self.rate_samples.load(ORDERING);
        if samples == 0 {
            return None;
        }
        let total = self.rate_ratio_total.load(ORDERING) as f64 / RATIO_SCALE;
        Some(total / samples as f64)
    }

    /// Get total tokens (prompt + completion)
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.load(ORDERING) + self.completion_tokens.load(ORDERING)
    }

    /// Get per-model request counts
    pub fn model_requests(&self) -> HashMap<String, u64> {
        self.model_requests
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Get a snapshot of all stats for serialization
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.uptime().as_secs(),
            total_requests: self.total_requests.load(ORDERING),
            active_requests: self.active_requests.load(ORDERING),
            streaming_requests: self.streaming_requests.load(ORDERING),
            non_streaming_requests: self.non_streaming_requests.load(ORDERING),
            total_errors: self.total_errors.load(ORDERING),
            completed_streams: self.completed_streams.load(ORDERING),
            truncated_streams: self.truncated_streams.load(ORDERING),
            aborted_streams: self.aborted_streams.load(ORDERING),
            prompt_tokens: self.prompt_tokens.load(ORDERING),
            completion_tokens: self.completion_tokens.load(ORDERING),
            total_tokens: self.total_tokens(),
            avg_latency_ms: self.avg_latency_ms(),
            min_latency_ms: self.min_latency_ms(),
            max_latency_ms: self.max_latency_ms(),
            avg_rate_ratio: self.avg_rate_ratio(),
            model_requests: self.model_requests(),
        }
    }
}

/// A serializable snapshot of statistics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub active_requests: u64,
    pub streaming_requests: u64,
    pub non_streaming_requests: u64,
    pub total_errors: u64,
    pub completed_streams: u64,
    pub truncated_streams: u64,
    pub aborted_streams: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub avg_rate_ratio: Option<f64>,
    pub model_requests: HashMap<String, u64>,
}

/// Shared stats handle for use across threads
pub type SharedStats = Arc<Stats>;

/// Create a new shared stats instance
pub fn new_shared_stats() -> SharedStats {
    Arc::new(Stats::new())
}
