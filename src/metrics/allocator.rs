use std::sync::Arc;
use std::time::Instant;

use crate::contracts::{AllocationError, SlipKind, SlipNumber, SlipNumberAllocator, SlipNumberConfig};
use crate::metrics::MetricsRegistry;

/// Wraps an allocator and records allocation outcomes and latency.
pub struct MeteredAllocator<A> {
    inner: A,
    metrics: Arc<MetricsRegistry>,
}

impl<A: SlipNumberAllocator> MeteredAllocator<A> {
    pub fn new(inner: A, metrics: Arc<MetricsRegistry>) -> Self {
        Self { inner, metrics }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: SlipNumberAllocator> SlipNumberAllocator for MeteredAllocator<A> {
    fn allocate(&self, kind: SlipKind) -> Result<SlipNumber, AllocationError> {
        let start = Instant::now();
        let result = self.inner.allocate(kind);
        let latency_us = start.elapsed().as_micros() as u64;

        match &result {
            Ok(_) => self.metrics.allocation.record_success(kind, latency_us),
            Err(_) => self.metrics.allocation.record_failure(latency_us),
        }
        result
    }

    fn current(&self, kind: SlipKind) -> Result<Option<SlipNumberConfig>, AllocationError> {
        self.inner.current(kind)
    }

    fn reset(&self, config: SlipNumberConfig) -> Result<(), AllocationError> {
        self.inner.reset(config)
    }
}
