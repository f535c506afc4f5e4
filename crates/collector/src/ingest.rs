//! Shared ingest state and the flush worker.
//!
//! Every request goes through [`Ingest::submit`], which appends to the buffer,
//! checks the threshold and, when it is reached, drains the buffer and queues
//! the batch, all under one lock. Queued batches are flushed one at a time,
//! in order, by the task started with [`spawn_flush_worker`]. A request never
//! waits for file I/O.
//!
//! The batch queue is unbounded and never sheds. While the disk stalls, memory
//! grows by one batch of `threshold` events per threshold crossing, and
//! [`Ingest::flushes_queued`] keeps counting. The backlog is written once the
//! worker catches up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use logship_core::metrics as m;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::buffer::IngestBuffer;
use crate::error::CollectorError;
use crate::event::InboundEvent;
use crate::flusher::{FlushReport, Flusher};

/// Batches waiting for the flush worker.
pub type BatchSender = mpsc::UnboundedSender<Vec<InboundEvent>>;
pub type BatchReceiver = mpsc::UnboundedReceiver<Vec<InboundEvent>>;

/// What happened to one submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// The event was appended.
    pub accepted: bool,
    /// The append crossed the threshold and a flush was queued.
    pub flush_queued: bool,
}

struct Shared {
    buffer: IngestBuffer,
    batches: Option<BatchSender>,
}

struct Inner {
    shared: Mutex<Shared>,
    threshold: usize,
    accepted: AtomicU64,
    duplicates: AtomicU64,
    flushes_queued: AtomicU64,
}

/// Cloneable handle to the ingest buffer.
#[derive(Clone)]
pub struct Ingest {
    inner: Arc<Inner>,
}

impl Ingest {
    pub fn new(buffer: IngestBuffer, threshold: usize, batches: BatchSender) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    buffer,
                    batches: Some(batches),
                }),
                threshold,
                accepted: AtomicU64::new(0),
                duplicates: AtomicU64::new(0),
                flushes_queued: AtomicU64::new(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        // the buffer stays consistent even if a holder panicked
        self.inner
            .shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Append `event`; queue a flush when the threshold is reached.
    pub fn submit(&self, event: InboundEvent) -> Result<Submission, CollectorError> {
        let mut guard = self.lock();
        let shared = &mut *guard;
        let Some(batches) = shared.batches.as_ref() else {
            return Err(CollectorError::ShuttingDown);
        };

        let accepted = shared.buffer.append(event);
        if accepted {
            self.inner.accepted.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::COLLECTOR_EVENTS_RECEIVED_TOTAL).increment(1);
        } else {
            self.inner.duplicates.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::COLLECTOR_EVENTS_DUPLICATE_TOTAL).increment(1);
        }

        let mut flush_queued = false;
        if accepted && shared.buffer.should_flush(self.inner.threshold) {
            let batch = shared.buffer.drain_all();
            debug!(events = batch.len(), "threshold reached, queueing flush");
            if batches.send(batch).is_err() {
                error!("flush worker is gone, batch dropped");
            } else {
                flush_queued = true;
                self.inner.flushes_queued.fetch_add(1, Ordering::Relaxed);
            }
        }

        metrics::gauge!(m::COLLECTOR_BUFFER_SIZE).set(shared.buffer.len() as f64);
        Ok(Submission {
            accepted,
            flush_queued,
        })
    }

    /// Stop accepting events and release the batch queue.
    ///
    /// With `flush_remaining`, whatever is still buffered is queued as a last
    /// batch; otherwise it is discarded. Returns the number of events left
    /// in the buffer at close time.
    pub fn close(&self, flush_remaining: bool) -> usize {
        let mut shared = self.lock();
        let Some(batches) = shared.batches.take() else {
            return 0;
        };

        let remaining = shared.buffer.drain_all();
        let count = remaining.len();
        if count > 0 {
            if flush_remaining {
                if batches.send(remaining).is_err() {
                    error!(events = count, "flush worker is gone, final batch dropped");
                }
            } else {
                warn!(events = count, "discarding buffered events on shutdown");
            }
        }
        metrics::gauge!(m::COLLECTOR_BUFFER_SIZE).set(0.0);
        count
    }

    /// Events currently buffered.
    pub fn buffered(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn threshold(&self) -> usize {
        self.inner.threshold
    }

    pub fn accepted_total(&self) -> u64 {
        self.inner.accepted.load(Ordering::Relaxed)
    }

    pub fn duplicates_total(&self) -> u64 {
        self.inner.duplicates.load(Ordering::Relaxed)
    }

    pub fn flushes_queued(&self) -> u64 {
        self.inner.flushes_queued.load(Ordering::Relaxed)
    }
}

/// Flush queued batches in order until the queue is closed.
///
/// Each flush runs on the blocking pool. The returned task ends once every
/// sender is dropped and the queue is empty, yielding the total of all flushes.
pub fn spawn_flush_worker(flusher: Flusher, mut batches: BatchReceiver) -> JoinHandle<FlushReport> {
    tokio::spawn(async move {
        let mut flusher = flusher;
        let mut total = FlushReport::default();

        while let Some(batch) = batches.recv().await {
            let result = tokio::task::spawn_blocking(move || {
                let report = flusher.flush(batch);
                (flusher, report)
            })
            .await;

            match result {
                Ok((returned, report)) => {
                    flusher = returned;
                    total.received += report.received;
                    total.unique += report.unique;
                    total.written += report.written;
                    total.failed += report.failed;
                }
                Err(e) => {
                    error!(error = %e, "flush task failed, flush worker stopping");
                    return total;
                }
            }
        }

        debug!("flush queue closed");
        total
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn ev(i: u64) -> InboundEvent {
        InboundEvent::new(format!("pod/{i}.log"), Bytes::from(i.to_string()), i)
    }

    #[test]
    fn batch_is_queued_exactly_at_threshold() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ingest = Ingest::new(IngestBuffer::default(), 3, tx);

        assert!(!ingest.submit(ev(1)).unwrap().flush_queued);
        assert!(!ingest.submit(ev(2)).unwrap().flush_queued);
        assert!(rx.try_recv().is_err());

        let third = ingest.submit(ev(3)).unwrap();
        assert!(third.accepted && third.flush_queued);
        assert_eq!(rx.try_recv().unwrap().len(), 3);
        assert_eq!(ingest.buffered(), 0);
    }

    #[test]
    fn duplicate_does_not_count_toward_threshold() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ingest = Ingest::new(IngestBuffer::default(), 2, tx);

        ingest.submit(ev(1)).unwrap();
        let dup = ingest.submit(ev(1)).unwrap();

        assert!(!dup.accepted && !dup.flush_queued);
        assert!(rx.try_recv().is_err());
        assert_eq!(ingest.duplicates_total(), 1);
    }

    #[test]
    fn close_queues_remaining_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ingest = Ingest::new(IngestBuffer::default(), 10, tx);
        ingest.submit(ev(1)).unwrap();

        assert_eq!(ingest.close(true), 1);
        assert_eq!(rx.try_recv().unwrap().len(), 1);
        // sender dropped
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(matches!(
            ingest.submit(ev(2)),
            Err(CollectorError::ShuttingDown)
        ));
    }

    #[test]
    fn close_without_flush_discards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ingest = Ingest::new(IngestBuffer::default(), 10, tx);
        ingest.submit(ev(1)).unwrap();

        assert_eq!(ingest.close(false), 1);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submits_lose_and_duplicate_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ingest = Ingest::new(IngestBuffer::default(), 215, tx);

        let mut tasks = Vec::new();
        for worker in 0..8u64 {
            let ingest = ingest.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..250u64 {
                    ingest.submit(ev(worker * 1_000 + i)).unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        ingest.close(true);

        let mut seen = std::collections::HashSet::new();
        let mut batches = 0;
        while let Some(batch) = rx.recv().await {
            batches += 1;
            for event in batch {
                assert!(seen.insert(event.timestamp), "event flushed twice");
            }
        }
        assert_eq!(seen.len(), 2_000);
        assert_eq!(batches, 2_000 / 215 + 1);
    }

    #[tokio::test]
    async fn stalled_worker_keeps_every_queued_batch() {
        let out = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let ingest = Ingest::new(IngestBuffer::default(), 2, tx);

        // no worker yet: batches pile up
        for i in 0..20u64 {
            ingest
                .submit(InboundEvent::new("pod/x.log", Bytes::from(format!("{i},")), i))
                .unwrap();
        }
        assert_eq!(ingest.flushes_queued(), 10);
        assert_eq!(ingest.buffered(), 0);

        let worker = spawn_flush_worker(Flusher::new(out.path(), "pods"), rx);
        ingest.close(true);
        let total = worker.await.unwrap();

        assert_eq!(total.written, 20);
        let expected: String = (0..20).map(|i| format!("{i},")).collect();
        assert_eq!(
            std::fs::read_to_string(out.path().join("pod/x.log")).unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn worker_flushes_batches_in_order_and_stops_when_closed() {
        let out = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = spawn_flush_worker(Flusher::new(out.path(), "pods"), rx);
        let ingest = Ingest::new(IngestBuffer::default(), 2, tx);

        for (ts, data) in [(1, "a"), (2, "b"), (3, "c")] {
            ingest
                .submit(InboundEvent::new("pod/x.log", Bytes::from_static(data.as_bytes()), ts))
                .unwrap();
        }
        ingest.close(true);

        let total = worker.await.unwrap();
        assert_eq!(total.written, 3);
        assert_eq!(
            std::fs::read_to_string(out.path().join("pod/x.log")).unwrap(),
            "abc"
        );
    }
}
