use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bounds of the response-time buckets. A final overflow bucket
/// catches everything slower than the last bound.
pub const LATENCY_BUCKETS: [Duration; 11] = [
    Duration::from_millis(5),
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
    Duration::from_millis(100),
    Duration::from_millis(250),
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_millis(2_500),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

const BUCKET_COUNT: usize = LATENCY_BUCKETS.len() + 1;

/// Index of the bucket that records `latency`.
fn bucket_index(latency: Duration) -> usize {
    LATENCY_BUCKETS
        .iter()
        .position(|bound| latency <= *bound)
        .unwrap_or(LATENCY_BUCKETS.len())
}

#[derive(Debug, Default)]
struct Histogram {
    buckets: [AtomicU64; BUCKET_COUNT],
}

impl Histogram {
    fn observe(&self, latency: Duration) {
        self.buckets[bucket_index(latency)].fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LatencyHistogram {
        let bounds = LATENCY_BUCKETS.iter().map(|bound| {
            Some(u64::try_from(bound.as_millis()).unwrap_or(u64::MAX))
        });
        LatencyHistogram {
            buckets: bounds
                .chain(std::iter::once(None))
                .zip(&self.buckets)
                .map(|(le_ms, count)| LatencyBucket {
                    le_ms,
                    count: count.load(Ordering::Relaxed),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct MethodCounters {
    success: AtomicU64,
    error: AtomicU64,
    latency_micros: AtomicU64,
    histogram: Histogram,
}

/// Process-wide request counters, keyed by operation name.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests: AtomicU64,
    methods: DashMap<&'static str, MethodCounters>,
    success_latency: Histogram,
    error_latency: Histogram,
}

/// One response-time bucket. `le_ms` is `None` for the overflow bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyBucket {
    pub le_ms: Option<u64>,
    /// Calls slower than the previous bound and no slower than this one
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencyHistogram {
    pub buckets: Vec<LatencyBucket>,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Histogram::default().snapshot()
    }
}

impl LatencyHistogram {
    pub fn count(&self) -> u64 {
        self.buckets.iter().map(|bucket| bucket.count).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MethodStats {
    pub success: u64,
    pub error: u64,
    /// Cumulative handling time across all calls
    pub total_latency_micros: u64,
    pub latency: LatencyHistogram,
}

impl MethodStats {
    pub fn calls(&self) -> u64 {
        self.success + self.error
    }

    pub fn mean_latency(&self) -> Duration {
        match self.calls() {
            0 => Duration::ZERO,
            calls => Duration::from_micros(self.total_latency_micros / calls),
        }
    }
}

/// Response times across every method, split by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseTimes {
    pub success: LatencyHistogram,
    pub error: LatencyHistogram,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub methods: BTreeMap<String, MethodStats>,
    pub response_time: ResponseTimes,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(
        &self,
        method: &'static str,
        success: bool,
        latency: Duration,
    ) {
        let counters = self.methods.entry(method).or_default();
        if success {
            counters.success.fetch_add(1, Ordering::Relaxed);
            self.success_latency.observe(latency);
        } else {
            counters.error.fetch_add(1, Ordering::Relaxed);
            self.error_latency.observe(latency);
        }
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        counters.latency_micros.fetch_add(micros, Ordering::Relaxed);
        counters.histogram.observe(latency);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn method(&self, method: &str) -> MethodStats {
        self.methods
            .get(method)
            .map(|counters| stats(&counters))
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total(),
            methods: self
                .methods
                .iter()
                .map(|entry| (entry.key().to_string(), stats(entry.value())))
                .collect(),
            response_time: ResponseTimes {
                success: self.success_latency.snapshot(),
                error: self.error_latency.snapshot(),
            },
        }
    }
}

fn stats(counters: &MethodCounters) -> MethodStats {
    MethodStats {
        success: counters.success.load(Ordering::Relaxed),
        error: counters.error.load(Ordering::Relaxed),
        total_latency_micros: counters.latency_micros.load(Ordering::Relaxed),
        latency: counters.histogram.snapshot(),
    }
}
