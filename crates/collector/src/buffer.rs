//! The ingest buffer.
//!
//! Events are appended in arrival order. An append is refused when the
//! configured [`DedupStrategy`] finds a matching event already buffered; the
//! dedup state only covers what is currently buffered and is reset by
//! [`IngestBuffer::drain_all`].

use std::collections::HashSet;
use std::fmt;

use bytes::Bytes;

use crate::event::InboundEvent;

/// Rule deciding when an incoming event duplicates a buffered one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DedupStrategy {
    /// Same `(origin_file, timestamp)` OR same content bytes.
    ///
    /// This also drops a legitimately new event whose bytes happen to equal
    /// a buffered event from another file; prefer `Key` for new deployments.
    #[default]
    KeyOrContent,
    /// Same `(origin_file, timestamp)`.
    Key,
    /// Same `(origin_file, timestamp, content)`.
    Exact,
}

impl DedupStrategy {
    /// Parse the config spelling (`key_or_content`, `key`, `exact`), case-insensitively.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "key_or_content" => Some(Self::KeyOrContent),
            "key" => Some(Self::Key),
            "exact" => Some(Self::Exact),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyOrContent => "key_or_content",
            Self::Key => "key",
            Self::Exact => "exact",
        }
    }
}

impl fmt::Display for DedupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buffered events awaiting a flush.
#[derive(Debug, Default)]
pub struct IngestBuffer {
    strategy: DedupStrategy,
    events: Vec<InboundEvent>,
    keys: HashSet<(String, u64)>,
    contents: HashSet<Bytes>,
    exact: HashSet<InboundEvent>,
}

impl IngestBuffer {
    pub fn new(strategy: DedupStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn strategy(&self) -> DedupStrategy {
        self.strategy
    }

    /// Append `event` unless it duplicates a buffered event. Returns whether it was appended.
    pub fn append(&mut self, event: InboundEvent) -> bool {
        match self.strategy {
            DedupStrategy::KeyOrContent => {
                let key = (event.origin_file.clone(), event.timestamp);
                if self.keys.contains(&key) || self.contents.contains(&event.data) {
                    return false;
                }
                self.keys.insert(key);
                self.contents.insert(event.data.clone());
            }
            DedupStrategy::Key => {
                if !self.keys.insert((event.origin_file.clone(), event.timestamp)) {
                    return false;
                }
            }
            DedupStrategy::Exact => {
                if !self.exact.insert(event.clone()) {
                    return false;
                }
            }
        }
        self.events.push(event);
        true
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// `true` once the buffer holds at least `threshold` events.
    pub fn should_flush(&self, threshold: usize) -> bool {
        self.events.len() >= threshold
    }

    /// Buffered events in arrival order.
    pub fn events(&self) -> &[InboundEvent] {
        &self.events
    }

    /// Take every buffered event and reset the dedup state.
    pub fn drain_all(&mut self) -> Vec<InboundEvent> {
        self.keys.clear();
        self.contents.clear();
        self.exact.clear();
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logship_core::config::DEFAULT_FLUSH_THRESHOLD;

    fn ev(file: &str, data: &'static str, ts: u64) -> InboundEvent {
        InboundEvent::new(file, Bytes::from_static(data.as_bytes()), ts)
    }

    #[test]
    fn same_key_is_rejected() {
        let mut buf = IngestBuffer::default();
        assert!(buf.append(ev("a.log", "one", 1)));
        assert!(!buf.append(ev("a.log", "two", 1)));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn same_content_under_other_key_is_rejected_by_default() {
        let mut buf = IngestBuffer::default();
        assert!(buf.append(ev("a.log", "same", 1)));
        assert!(!buf.append(ev("b.log", "same", 2)));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn key_strategy_ignores_content() {
        let mut buf = IngestBuffer::new(DedupStrategy::Key);
        assert!(buf.append(ev("a.log", "same", 1)));
        assert!(buf.append(ev("b.log", "same", 2)));
        assert!(!buf.append(ev("a.log", "other", 1)));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn exact_strategy_needs_all_three_fields() {
        let mut buf = IngestBuffer::new(DedupStrategy::Exact);
        assert!(buf.append(ev("a.log", "one", 1)));
        assert!(buf.append(ev("a.log", "two", 1)));
        assert!(buf.append(ev("b.log", "one", 1)));
        assert!(!buf.append(ev("a.log", "one", 1)));
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn rejected_append_leaves_buffer_unchanged() {
        let mut buf = IngestBuffer::default();
        buf.append(ev("a.log", "one", 1));
        let before = buf.events().to_vec();
        buf.append(ev("a.log", "one", 1));
        assert_eq!(buf.events(), before.as_slice());
    }

    #[test]
    fn threshold_is_reached_at_exactly_215() {
        let mut buf = IngestBuffer::default();
        for i in 0..214u64 {
            assert!(buf.append(InboundEvent::new("a.log", i.to_string(), i)));
        }
        assert!(!buf.should_flush(DEFAULT_FLUSH_THRESHOLD));

        buf.append(InboundEvent::new("a.log", "214", 214));
        assert!(buf.should_flush(DEFAULT_FLUSH_THRESHOLD));
    }

    #[test]
    fn drain_resets_dedup_state() {
        let mut buf = IngestBuffer::default();
        buf.append(ev("a.log", "one", 1));

        let drained = buf.drain_all();
        assert_eq!(drained.len(), 1);
        assert!(buf.is_empty());

        assert!(buf.append(ev("a.log", "one", 1)));
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!(DedupStrategy::from_str_loose("KEY"), Some(DedupStrategy::Key));
        assert_eq!(
            DedupStrategy::from_str_loose(" key_or_content "),
            Some(DedupStrategy::KeyOrContent)
        );
        assert_eq!(DedupStrategy::from_str_loose("exact"), Some(DedupStrategy::Exact));
        assert_eq!(DedupStrategy::from_str_loose("fuzzy"), None);
        assert_eq!(DedupStrategy::Exact.to_string(), "exact");
    }
}
