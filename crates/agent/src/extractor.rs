//! Running the extraction tool and turning its output into payloads.
//!
//! The agent never parses log files itself. For every tracked file it runs
//! an external tool, `<program> [args..] [<cursor_flag> <cursor>] <path>`,
//! and treats whatever the tool prints on stdout as the payload. The cursor
//! argument is omitted until the file has been extracted once.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use logship_core::metrics as m;
use tokio::process::Command;

use crate::config::AgentSettings;
use crate::error::AgentError;
use crate::tracker::TrackedFile;

/// Stderr is cut to this many bytes in error messages.
const MAX_STDERR_IN_ERROR: usize = 512;

/// Something that can produce the new content of a file since a cursor.
pub trait ExtractionTool: Send + Sync + 'static {
    /// Return the file's content newer than `since` (everything when `None`).
    fn extract(
        &self,
        path: &Path,
        since: Option<u64>,
    ) -> impl Future<Output = Result<Bytes, AgentError>> + Send;

    /// Pick up reloaded settings. Called between ticks.
    fn apply_settings(&mut self, _settings: &AgentSettings) {}
}

/// Runs an external program per file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
    cursor_flag: String,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>, args: Vec<String>, cursor_flag: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cursor_flag: cursor_flag.into(),
        }
    }

    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self::new(
            settings.extract_program.clone(),
            settings.extract_args.clone(),
            settings.cursor_flag.clone(),
        )
    }

    /// Arguments passed to the program for one file.
    pub fn arguments(&self, path: &Path, since: Option<u64>) -> Vec<std::ffi::OsString> {
        let mut argv: Vec<std::ffi::OsString> = self.args.iter().map(Into::into).collect();
        if let Some(cursor) = since {
            argv.push(self.cursor_flag.clone().into());
            argv.push(cursor.to_string().into());
        }
        argv.push(path.as_os_str().to_owned());
        argv
    }
}

impl ExtractionTool for CommandExtractor {
    async fn extract(&self, path: &Path, since: Option<u64>) -> Result<Bytes, AgentError> {
        let output = Command::new(&self.program)
            .args(self.arguments(path, since))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AgentError::Extraction {
                path: path.display().to_string(),
                reason: format!("failed to run {}: {e}", self.program),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = truncate_on_char_boundary(stderr.trim(), MAX_STDERR_IN_ERROR);
            return Err(AgentError::Extraction {
                path: path.display().to_string(),
                reason: format!("{} exited with {}: {stderr}", self.program, output.status),
            });
        }

        Ok(Bytes::from(output.stdout))
    }

    fn apply_settings(&mut self, settings: &AgentSettings) {
        *self = Self::from_settings(settings);
    }
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Source of cursor values.
pub trait Clock: Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// One extracted payload, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// File the payload was extracted from.
    pub source_path: PathBuf,
    /// Tool output.
    pub data: Bytes,
    /// Cursor recorded for this extraction; sent as the `Timestamp` header.
    pub timestamp: u64,
}

/// Result of extracting one file.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub payload: Payload,
    /// The output is byte-identical to the file's previous output.
    pub duplicate: bool,
}

impl Extraction {
    /// Worth sending: changed since last time and not empty.
    pub fn is_deliverable(&self) -> bool {
        !self.duplicate && !self.payload.data.is_empty()
    }
}

/// Runs the extraction tool and maintains each file's cursor.
#[derive(Debug)]
pub struct PayloadGenerator<T, C = SystemClock> {
    tool: T,
    clock: C,
}

impl<T: ExtractionTool> PayloadGenerator<T, SystemClock> {
    pub fn new(tool: T) -> Self {
        Self::with_clock(tool, SystemClock)
    }
}

impl<T: ExtractionTool, C: Clock> PayloadGenerator<T, C> {
    pub fn with_clock(tool: T, clock: C) -> Self {
        Self { tool, clock }
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    pub fn tool_mut(&mut self) -> &mut T {
        &mut self.tool
    }

    /// Extract `file` and advance its state.
    ///
    /// The cursor passed to the tool is the file's previous cursor. On
    /// success the file's cursor becomes `max(now, previous + 1)` and its
    /// remembered payload becomes the new output, whether or not the output
    /// changed. On failure the file's state is left untouched.
    pub async fn extract(&self, file: &mut TrackedFile) -> Result<Extraction, AgentError> {
        let since = (!file.is_new()).then_some(file.last_cursor);

        let data = match self.tool.extract(&file.path, since).await {
            Ok(data) => data,
            Err(e) => {
                metrics::counter!(m::AGENT_EXTRACTION_FAILURES_TOTAL).increment(1);
                return Err(e);
            }
        };
        metrics::counter!(m::AGENT_EXTRACTIONS_TOTAL).increment(1);

        let now = self.clock.now_millis();
        let timestamp = now.max(file.last_cursor.saturating_add(1));
        let duplicate = data == file.last_payload;

        file.last_cursor = timestamp;
        file.last_payload = data.clone();

        tracing::debug!(
            path = %file.path.display(),
            since = ?since,
            cursor = timestamp,
            bytes = data.len(),
            duplicate,
            "extracted"
        );

        Ok(Extraction {
            payload: Payload {
                source_path: file.path.clone(),
                data,
                timestamp,
            },
            duplicate,
        })
    }
}
