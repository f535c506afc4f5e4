//! Inbound events.

use bytes::Bytes;

/// One payload as received from an agent.
///
/// Equality and hashing cover all three fields; this is the exact identity
/// used by the flusher's second deduplication pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InboundEvent {
    /// `Filename` header: the file's path relative to the agent's watch directory.
    pub origin_file: String,
    /// Request body.
    pub data: Bytes,
    /// `Timestamp` header: the agent's extraction cursor.
    pub timestamp: u64,
}

impl InboundEvent {
    pub fn new(origin_file: impl Into<String>, data: impl Into<Bytes>, timestamp: u64) -> Self {
        Self {
            origin_file: origin_file.into(),
            data: data.into(),
            timestamp,
        }
    }

    /// `(origin_file, timestamp)`
    pub fn key(&self) -> (&str, u64) {
        (&self.origin_file, self.timestamp)
    }
}
