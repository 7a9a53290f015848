//! Lock-free latency histogram with Prometheus output.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bucket upper bounds in microseconds: counter round trips land in the
/// low buckets, SMTP sessions in the high ones.
pub const HISTOGRAM_BUCKETS: [u64; 12] = [
    100,        // 100μs
    250,        // 250μs
    500,        // 500μs
    1_000,      // 1ms
    5_000,      // 5ms
    10_000,     // 10ms
    50_000,     // 50ms
    100_000,    // 100ms
    500_000,    // 500ms
    1_000_000,  // 1s
    5_000_000,  // 5s
    10_000_000, // 10s
];

/// Thread-safe cumulative histogram.
///
/// # Example
///
/// ```
/// use bordereau::metrics::Histogram;
///
/// let histogram = Histogram::new();
/// histogram.observe(150);
///
/// let (sum, count, buckets) = histogram.snapshot();
/// assert_eq!(count, 1);
/// assert_eq!(sum, 150);
/// assert_eq!(buckets[0], 0);
/// assert_eq!(buckets[1], 1);
/// ```
pub struct Histogram {
    sum: AtomicU64,
    count: AtomicU64,
    /// Cumulative: each bucket includes every smaller value
    buckets: [AtomicU64; 12],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    #[allow(clippy::declare_interior_mutable_const)]
    pub fn new() -> Self {
        const ZERO: AtomicU64 = AtomicU64::new(0);
        Self {
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            buckets: [ZERO; 12],
        }
    }

    /// Records one observation in microseconds.
    #[inline]
    pub fn observe(&self, value_us: u64) {
        self.sum.fetch_add(value_us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for (bucket, &bound) in self.buckets.iter().zip(HISTOGRAM_BUCKETS.iter()) {
            if value_us <= bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Returns `(sum, count, cumulative bucket counts)`.
    pub fn snapshot(&self) -> (u64, u64, [u64; 12]) {
        let mut buckets = [0u64; 12];
        for (out, bucket) in buckets.iter_mut().zip(self.buckets.iter()) {
            *out = bucket.load(Ordering::Relaxed);
        }
        (
            self.sum.load(Ordering::Relaxed),
            self.count.load(Ordering::Relaxed),
            buckets,
        )
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn format_prometheus(&self, name: &str, help: &str) -> String {
        let (sum, count, buckets) = self.snapshot();
        let mut output = String::with_capacity(1024);

        let _ = writeln!(output, "# HELP {} {}", name, help);
        let _ = writeln!(output, "# TYPE {} histogram", name);
        for (bound, value) in HISTOGRAM_BUCKETS.iter().zip(buckets.iter()) {
            let _ = writeln!(output, "{}_bucket{{le=\"{}\"}} {}", name, bound, value);
        }
        let _ = writeln!(output, "{}_bucket{{le=\"+Inf\"}} {}", name, count);
        let _ = writeln!(output, "{}_sum {}", name, sum);
        let _ = writeln!(output, "{}_count {}", name, count);

        output
    }
}
