//! Cue + Caption Store (§4.2): a bounded, per-language ordered collection of
//! finalized caption cues.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

/// A finalized caption cue, already expressed relative to the reference
/// timeline origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub language: String,
    pub start_rel: f64,
    pub end_rel: f64,
    pub text: String,
}

impl Cue {
    pub fn new(language: impl Into<String>, start_rel: f64, end_rel: f64, text: impl Into<String>) -> Self {
        let end_rel = if end_rel <= start_rel {
            start_rel + 1.0
        } else {
            end_rel
        };
        Self {
            language: language.into(),
            start_rel,
            end_rel,
            text: text.into(),
        }
    }
}

/// A change notification emitted on `append`.
#[derive(Debug, Clone, PartialEq)]
pub struct CueAppended {
    pub language: String,
    pub start_rel: f64,
    pub end_rel: f64,
}

/// Bounded, per-language ordered collection of finalized cues.
///
/// A single writer (the provider message handler) and multiple readers
/// (segment builder, HTTP server) are expected; `parking_lot::RwLock`
/// guards per-language buffers so reads never block each other.
#[derive(Debug)]
pub struct CaptionStore {
    capacity: usize,
    buffers: RwLock<HashMap<String, VecDeque<Cue>>>,
}

impl CaptionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Append a cue, evicting the oldest entry for that language if the
    /// buffer is at capacity. Returns a change notification.
    pub fn append(&self, cue: Cue) -> CueAppended {
        let notification = CueAppended {
            language: cue.language.clone(),
            start_rel: cue.start_rel,
            end_rel: cue.end_rel,
        };

        let mut buffers = self.buffers.write();
        let buffer = buffers.entry(cue.language.clone()).or_default();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(cue);

        notification
    }

    /// All cues for `language` whose `[start_rel, end_rel)` intersects
    /// `[window_start, window_end)`, in insertion order (not time order).
    pub fn overlapping(&self, language: &str, window_start: f64, window_end: f64) -> Vec<Cue> {
        let buffers = self.buffers.read();
        match buffers.get(language) {
            Some(buffer) => buffer
                .iter()
                .filter(|cue| cue.end_rel > window_start && cue.start_rel < window_end)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of cues currently stored for `language`.
    pub fn len(&self, language: &str) -> usize {
        self.buffers
            .read()
            .get(language)
            .map(|b| b.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, language: &str) -> bool {
        self.len(language) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cue_with_inverted_times_gets_clamped() {
        let cue = Cue::new("ru", 10.0, 10.0, "hello");
        assert_eq!(cue.end_rel, 11.0);

        let cue = Cue::new("ru", 10.0, 9.0, "hello");
        assert_eq!(cue.end_rel, 11.0);
    }

    #[test]
    fn append_and_overlapping() {
        let store = CaptionStore::new(100);
        store.append(Cue::new("ru", 0.0, 2.0, "one"));
        store.append(Cue::new("ru", 5.0, 7.0, "two"));
        store.append(Cue::new("ru", 20.0, 22.0, "three"));

        let hits = store.overlapping("ru", 0.0, 10.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "one");
        assert_eq!(hits[1].text, "two");
    }

    #[test]
    fn overlapping_is_insertion_order_not_time_order() {
        let store = CaptionStore::new(100);
        store.append(Cue::new("ru", 20.0, 22.0, "later"));
        store.append(Cue::new("ru", 0.0, 2.0, "earlier"));

        let hits = store.overlapping("ru", 0.0, 30.0);
        assert_eq!(hits[0].text, "later");
        assert_eq!(hits[1].text, "earlier");
    }

    #[test]
    fn eviction_drops_oldest_when_over_capacity() {
        let store = CaptionStore::new(2);
        store.append(Cue::new("ru", 0.0, 1.0, "a"));
        store.append(Cue::new("ru", 1.0, 2.0, "b"));
        store.append(Cue::new("ru", 2.0, 3.0, "c"));

        assert_eq!(store.len("ru"), 2);
        let hits = store.overlapping("ru", 0.0, 100.0);
        assert_eq!(hits[0].text, "b");
        assert_eq!(hits[1].text, "c");
    }

    #[test]
    fn languages_are_independent() {
        let store = CaptionStore::new(100);
        store.append(Cue::new("ru", 0.0, 1.0, "привет"));
        store.append(Cue::new("en", 0.0, 1.0, "hello"));

        assert_eq!(store.len("ru"), 1);
        assert_eq!(store.len("en"), 1);
        assert!(store.is_empty("nl"));
    }

    #[test]
    fn non_overlapping_window_returns_empty() {
        let store = CaptionStore::new(100);
        store.append(Cue::new("ru", 0.0, 2.0, "one"));
        assert!(store.overlapping("ru", 10.0, 20.0).is_empty());
    }
}
