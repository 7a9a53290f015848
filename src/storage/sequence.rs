use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use backon::BlockingRetryable;

use crate::contracts::{
    AllocationError, Clock, RecordStore, SlipKind, SlipNumber, SlipNumberAllocator,
    SlipNumberConfig, SystemClock,
};
use crate::storage::AllocatorConfig;

/// Outcome of a single compare-and-swap attempt.
enum Attempt {
    Conflict,
    Failed(AllocationError),
}

impl From<AllocationError> for Attempt {
    fn from(e: AllocationError) -> Self {
        Attempt::Failed(e)
    }
}

/// Slip-number allocator over a [`RecordStore`] counter table.
///
/// Each allocation reads the counter row and advances it with a
/// compare-and-swap, retrying with backoff when another caller got there
/// first. Two callers can therefore never leave with the same number.
///
/// Retries sleep the calling thread. Async callers should run allocation on
/// a blocking pool (`tokio::task::spawn_blocking`).
pub struct CounterAllocator<S: RecordStore> {
    store: S,
    clock: Arc<dyn Clock>,
    config: AllocatorConfig,
    conflicts: AtomicU64,
}

impl<S: RecordStore> CounterAllocator<S> {
    /// Creates an allocator that stamps new counter rows with the wall-clock year.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            config: AllocatorConfig::default(),
            conflicts: AtomicU64::new(0),
        }
    }

    pub fn with_config(mut self, config: AllocatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of compare-and-swap attempts that lost a race so far.
    pub fn conflict_count(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Creates the counter row for `kind` if it does not exist yet.
    /// Idempotent: concurrent first callers converge on a single row.
    fn ensure_counter(&self, kind: SlipKind) -> Result<(), AllocationError> {
        let existing = self
            .store
            .get_counter(kind)
            .map_err(AllocationError::store(kind))?;
        if existing.is_some() {
            return Ok(());
        }

        let row = SlipNumberConfig::initial(kind, self.clock.current_year());
        let inserted = self
            .store
            .insert_counter_if_absent(&row)
            .map_err(AllocationError::store(kind))?;
        if inserted {
            tracing::info!(kind = %kind, prefix = %row.prefix, "Created slip number counter");
        }
        Ok(())
    }

    fn try_advance(&self, kind: SlipKind) -> Result<SlipNumber, Attempt> {
        let row = self
            .store
            .get_counter(kind)
            .map_err(AllocationError::store(kind))?
            .ok_or(AllocationError::MissingCounter(kind))?;

        let next = row
            .current_number
            .checked_add(1)
            .ok_or(AllocationError::Overflow(kind))?;
        let advanced = SlipNumberConfig {
            current_number: next,
            ..row.clone()
        };

        self.swap(&row, &advanced)?;
        Ok(SlipNumber::new(row.prefix, next))
    }

    fn try_reset(&self, config: &SlipNumberConfig) -> Result<(), Attempt> {
        let kind = config.kind;
        let Some(row) = self
            .store
            .get_counter(kind)
            .map_err(AllocationError::store(kind))?
        else {
            let inserted = self
                .store
                .insert_counter_if_absent(config)
                .map_err(AllocationError::store(kind))?;
            return if inserted {
                Ok(())
            } else {
                self.conflicts.fetch_add(1, Ordering::Relaxed);
                Err(Attempt::Conflict)
            };
        };

        // Same prefix, lower number: would hand out issued numbers again
        if row.prefix == config.prefix && config.current_number < row.current_number {
            return Err(Attempt::Failed(AllocationError::Rewind {
                kind,
                prefix: row.prefix,
                stored: row.current_number,
                requested: config.current_number,
            }));
        }

        self.swap(&row, config)
    }

    fn swap(&self, expected: &SlipNumberConfig, new: &SlipNumberConfig) -> Result<(), Attempt> {
        let swapped = self
            .store
            .compare_and_swap_counter(expected, new)
            .map_err(AllocationError::store(expected.kind))?;
        if !swapped {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            return Err(Attempt::Conflict);
        }
        Ok(())
    }

    /// Runs `attempt` until it stops conflicting or the retry budget is spent.
    fn with_retries<T>(
        &self,
        kind: SlipKind,
        attempt: impl FnMut() -> Result<T, Attempt>,
    ) -> Result<T, AllocationError> {
        let result = attempt
            .retry(self.config.backoff())
            .sleep(std::thread::sleep)
            .when(|e| matches!(e, Attempt::Conflict))
            .notify(|_, dur| {
                tracing::debug!(kind = %kind, retry_in = ?dur, "Slip counter contended, retrying");
            })
            .call();

        match result {
            Ok(value) => Ok(value),
            Err(Attempt::Failed(e)) => Err(e),
            Err(Attempt::Conflict) => Err(AllocationError::Contention {
                kind,
                attempts: self.config.max_attempts(),
            }),
        }
    }
}

impl<S: RecordStore> SlipNumberAllocator for CounterAllocator<S> {
    fn allocate(&self, kind: SlipKind) -> Result<SlipNumber, AllocationError> {
        self.ensure_counter(kind)?;

        match self.with_retries(kind, || self.try_advance(kind)) {
            Ok(number) => {
                tracing::debug!(kind = %kind, number = %number, "Allocated slip number");
                Ok(number)
            }
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "Slip number allocation failed");
                Err(e)
            }
        }
    }

    fn current(&self, kind: SlipKind) -> Result<Option<SlipNumberConfig>, AllocationError> {
        self.store
            .get_counter(kind)
            .map_err(AllocationError::store(kind))
    }

    fn reset(&self, config: SlipNumberConfig) -> Result<(), AllocationError> {
        let kind = config.kind;
        self.with_retries(kind, || self.try_reset(&config))
            .inspect_err(|e| tracing::warn!(kind = %kind, error = %e, "Counter reset refused"))?;
        tracing::info!(
            kind = %kind,
            prefix = %config.prefix,
            current_number = config.current_number,
            "Slip number counter reset"
        );
        Ok(())
    }
}
