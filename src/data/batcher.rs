//! Batched persistence with crash-tolerant flush semantics.
//!
//! Converted samples accumulate in memory and are flushed to the durable log
//! when either threshold fires: buffered record count, or elapsed time since
//! the last successful flush (with a non-empty buffer). A failed flush keeps
//! every buffered record and leaves the flush clock untouched, so the next
//! tick retries; only a successful write clears the buffer.

use crate::core::{ConvertedSample, DurableLog};
use crate::error::AppResult;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Result of a successful flush, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Number of records written.
    pub records: usize,
    /// File the records went to.
    pub path: PathBuf,
}

/// Accumulates converted samples between flushes.
#[derive(Debug)]
pub struct PersistenceBatcher {
    buffer: Vec<ConvertedSample>,
    record_threshold: usize,
    time_threshold: Duration,
    last_flush: Instant,
}

impl PersistenceBatcher {
    /// Creates an empty batcher with the given thresholds; `now` seeds the
    /// flush clock.
    pub fn new(record_threshold: usize, time_threshold: Duration, now: Instant) -> Self {
        Self {
            buffer: Vec::new(),
            record_threshold,
            time_threshold,
            last_flush: now,
        }
    }

    /// Queues a sample for the next flush.
    pub fn record(&mut self, sample: ConvertedSample) {
        self.buffer.push(sample);
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a flush is due at `now`.
    pub fn should_flush(&self, now: Instant) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        self.buffer.len() >= self.record_threshold
            || now.duration_since(self.last_flush) >= self.time_threshold
    }

    /// Flushes if a threshold fired. `Ok(None)` means nothing was due.
    ///
    /// # Errors
    ///
    /// Propagates the log's I/O error; the buffer and flush clock are left
    /// unchanged so the records are retried on the next trigger.
    pub fn maybe_flush(
        &mut self,
        log: &dyn DurableLog,
        now: Instant,
    ) -> AppResult<Option<FlushOutcome>> {
        if !self.should_flush(now) {
            return Ok(None);
        }
        self.flush(log, now)
    }

    /// Flushes unconditionally (used when a session stops). `Ok(None)` when
    /// the buffer is empty.
    pub fn flush(
        &mut self,
        log: &dyn DurableLog,
        now: Instant,
    ) -> AppResult<Option<FlushOutcome>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let path = log.append(&self.buffer)?;
        let records = self.buffer.len();
        self.buffer.clear();
        self.last_flush = now;
        Ok(Some(FlushOutcome { records, path }))
    }

    /// Drops buffered records and restarts the flush clock, as done at
    /// session start.
    pub fn reset(&mut self, now: Instant) {
        self.buffer.clear();
        self.last_flush = now;
    }
}
