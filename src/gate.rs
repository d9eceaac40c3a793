//! Buffer Admission Gate (§4.5): a one-shot latch that delays public serving
//! until enough media and captions have accumulated to guarantee captioned
//! playback from the first served segment.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

pub struct BufferAdmissionGate {
    required_buffer_segments: usize,
    transcription_buffer_min: usize,
    opened: AtomicBool,
    first_serving_segment: AtomicU64,
    notify: Notify,
}

impl BufferAdmissionGate {
    pub fn new(required_buffer_segments: usize, transcription_buffer_min: usize) -> Self {
        Self {
            required_buffer_segments,
            transcription_buffer_min,
            opened: AtomicBool::new(false),
            first_serving_segment: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    /// `first_serving_segment` once the gate has opened, `None` before.
    pub fn first_serving_segment(&self) -> Option<u64> {
        if self.is_open() {
            Some(self.first_serving_segment.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// Evaluate the §4.5 preconditions and latch the gate open if they all
    /// hold. A no-op once the gate is already open: it never closes and
    /// `first_serving_segment` is never re-latched. Returns `true` exactly
    /// once, on the call that opens the gate.
    pub fn evaluate(
        &self,
        observed_segments: &[u64],
        source_language_cues: usize,
        last_write_ok: bool,
    ) -> bool {
        if self.is_open() {
            return false;
        }
        if observed_segments.len() < self.required_buffer_segments {
            return false;
        }
        if source_language_cues < self.transcription_buffer_min {
            return false;
        }
        if !last_write_ok {
            return false;
        }

        let first = *observed_segments
            .iter()
            .min()
            .expect("observed_segments.len() checked above");
        self.first_serving_segment.store(first, Ordering::Release);
        self.opened.store(true, Ordering::Release);
        self.notify.notify_waiters();
        true
    }

    /// Suspends the caller (the drip-feed cadence task) until the gate
    /// opens, then returns `first_serving_segment`.
    pub async fn opened(&self) -> u64 {
        loop {
            if let Some(seg) = self.first_serving_segment() {
                return seg;
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn does_not_open_below_segment_threshold() {
        let gate = BufferAdmissionGate::new(6, 3);
        assert!(!gate.evaluate(&[0, 1, 2, 3, 4], 5, true));
        assert!(!gate.is_open());
    }

    #[test]
    fn does_not_open_below_cue_threshold() {
        let gate = BufferAdmissionGate::new(6, 3);
        assert!(!gate.evaluate(&[0, 1, 2, 3, 4, 5], 2, true));
        assert!(!gate.is_open());
    }

    #[test]
    fn does_not_open_on_last_write_failure() {
        let gate = BufferAdmissionGate::new(6, 3);
        assert!(!gate.evaluate(&[0, 1, 2, 3, 4, 5], 3, false));
        assert!(!gate.is_open());
    }

    #[test]
    fn opens_and_latches_first_serving_segment() {
        let gate = BufferAdmissionGate::new(6, 3);
        assert!(gate.evaluate(&[5, 1, 3, 2, 4, 0], 3, true));
        assert!(gate.is_open());
        assert_eq!(gate.first_serving_segment(), Some(0));
    }

    #[test]
    fn is_one_shot_and_never_recloses_or_relatches() {
        let gate = BufferAdmissionGate::new(6, 3);
        assert!(gate.evaluate(&[10, 11, 12, 13, 14, 15], 3, true));
        assert_eq!(gate.first_serving_segment(), Some(10));

        // A subsequent call, even with different (and technically
        // qualifying) data, must not re-latch.
        assert!(!gate.evaluate(&[100, 101, 102, 103, 104, 105], 10, true));
        assert_eq!(gate.first_serving_segment(), Some(10));
    }

    #[tokio::test]
    async fn opened_resolves_once_the_gate_latches() {
        let gate = std::sync::Arc::new(BufferAdmissionGate::new(6, 3));
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.opened().await })
        };

        tokio::task::yield_now().await;
        assert!(gate.evaluate(&[0, 1, 2, 3, 4, 5], 3, true));

        let first = waiter.await.unwrap();
        assert_eq!(first, 0);
    }
}
