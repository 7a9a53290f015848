//! Observability metrics.
//!
//! Counters and histograms are lock-free atomics; per-label counters live in
//! concurrent maps.

mod allocator;
pub mod histogram;
pub mod registry;

pub use allocator::MeteredAllocator;
pub use histogram::Histogram;
pub use registry::{AllocationMetrics, MailMetrics, MetricsRegistry, SlipMetrics};
