//! Writing a drained batch to disk.
//!
//! A flush orders the batch by timestamp with the origin file as tie-break,
//! drops exact duplicates, and appends each event's bytes to its destination
//! file. Failures are per event: a failed write is logged and that event is
//! dropped, the rest of the batch is still written.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use logship_core::metrics as m;
use tracing::{debug, error, info};

use crate::buffer::IngestBuffer;
use crate::error::CollectorError;
use crate::event::InboundEvent;
use crate::origin::OriginPath;

/// Mode of newly created destination files.
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Events handed to the flush.
    pub received: usize,
    /// Events left after exact deduplication.
    pub unique: usize,
    /// Events appended successfully.
    pub written: usize,
    /// Events dropped because their write failed.
    pub failed: usize,
}

/// Sort by origin file, then stably by timestamp, and drop exact duplicates.
///
/// The result is ordered by timestamp with the origin file as tie-break;
/// events equal in both keep their arrival order.
pub fn order_batch(mut events: Vec<InboundEvent>) -> Vec<InboundEvent> {
    events.sort_by(|a, b| a.origin_file.cmp(&b.origin_file));
    events.sort_by_key(|e| e.timestamp);

    let mut seen = HashSet::with_capacity(events.len());
    events.retain(|e| seen.insert(e.clone()));
    events
}

/// Appends batches under an output root. Remembers the directories it created.
#[derive(Debug)]
pub struct Flusher {
    output_root: PathBuf,
    marker: String,
    created_dirs: HashSet<PathBuf>,
}

impl Flusher {
    pub fn new(output_root: impl Into<PathBuf>, marker: impl Into<String>) -> Self {
        Self {
            output_root: output_root.into(),
            marker: marker.into(),
            created_dirs: HashSet::new(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Drain `buffer` and flush everything it held.
    pub fn flush_buffer(&mut self, buffer: &mut IngestBuffer) -> FlushReport {
        self.flush(buffer.drain_all())
    }

    /// Flush one batch. Blocking; the flush worker runs this on the blocking pool.
    pub fn flush(&mut self, batch: Vec<InboundEvent>) -> FlushReport {
        let started = Instant::now();
        let mut report = FlushReport {
            received: batch.len(),
            ..FlushReport::default()
        };

        let ordered = order_batch(batch);
        report.unique = ordered.len();

        let mut open_files: HashMap<PathBuf, File> = HashMap::new();
        for event in &ordered {
            match self.write_event(event, &mut open_files) {
                Ok(path) => {
                    report.written += 1;
                    debug!(origin = %event.origin_file, path = %path.display(), bytes = event.data.len(), "event written");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(origin = %event.origin_file, timestamp = event.timestamp, error = %e, "dropping event");
                }
            }
        }

        metrics::counter!(m::COLLECTOR_FLUSHES_TOTAL).increment(1);
        metrics::counter!(m::COLLECTOR_EVENTS_WRITTEN_TOTAL).increment(report.written as u64);
        metrics::counter!(m::COLLECTOR_WRITE_FAILURES_TOTAL).increment(report.failed as u64);
        metrics::histogram!(m::COLLECTOR_FLUSH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        info!(
            received = report.received,
            unique = report.unique,
            written = report.written,
            failed = report.failed,
            "flush finished"
        );
        report
    }

    fn write_event(
        &mut self,
        event: &InboundEvent,
        open_files: &mut HashMap<PathBuf, File>,
    ) -> Result<PathBuf, CollectorError> {
        let origin = OriginPath::derive(&event.origin_file, &self.marker)?;
        let directory = origin.directory(&self.output_root);
        let destination = origin.destination(&self.output_root);

        if !self.created_dirs.contains(&directory) {
            std::fs::create_dir_all(&directory).map_err(|source| CollectorError::Io {
                path: directory.display().to_string(),
                source,
            })?;
            self.created_dirs.insert(directory.clone());
        }

        if !open_files.contains_key(&destination) {
            let file = open_append(&destination).map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    // directory removed behind our back; recreate on next flush
                    self.created_dirs.remove(&directory);
                }
                CollectorError::Io {
                    path: destination.display().to_string(),
                    source,
                }
            })?;
            open_files.insert(destination.clone(), file);
        }

        if let Some(file) = open_files.get_mut(&destination) {
            file.write_all(&event.data)
                .map_err(|source| CollectorError::Io {
                    path: destination.display().to_string(),
                    source,
                })?;
        }
        Ok(destination)
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.append(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    options.open(path)
}
