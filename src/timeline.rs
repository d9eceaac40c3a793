//! Reference Timeline (§4.1): reconciles the transcoder's segment-sequence
//! clock and the speech provider's utterance-timestamp clock onto one shared
//! origin, measured in seconds.

use parking_lot::RwLock;

/// Reconciles segment sequence numbers and provider utterance timestamps
/// onto a single origin.
///
/// `set_origin` and the first call to `to_relative_utterance_time` each latch
/// their own zero point exactly once; neither waits for the other, so an
/// utterance that arrives before the first segment is observed is stored
/// relative to `U0` alone, and readers re-derive segment overlap against the
/// current `T0` once it exists.
#[derive(Debug)]
pub struct ReferenceTimeline {
    segment_duration: f64,
    t0: RwLock<Option<f64>>,
    u0: RwLock<Option<f64>>,
    /// Drift-compensation seam: an additive offset applied to utterance
    /// timestamps. Initialized to 0.0 and never otherwise mutated in this
    /// build; present so a future EMA-based estimator can populate it
    /// without changing this type's public contract.
    utterance_offset: RwLock<f64>,
}

impl ReferenceTimeline {
    pub fn new(segment_duration: f64) -> Self {
        Self {
            segment_duration,
            t0: RwLock::new(None),
            u0: RwLock::new(None),
            utterance_offset: RwLock::new(0.0),
        }
    }

    /// Fix `T0` from the first observed segment sequence number. A no-op on
    /// any subsequent call.
    pub fn set_origin(&self, first_segment_sequence: u64) {
        let mut t0 = self.t0.write();
        if t0.is_none() {
            *t0 = Some(first_segment_sequence as f64 * self.segment_duration);
        }
    }

    pub fn origin(&self) -> Option<f64> {
        *self.t0.read()
    }

    /// Seconds from `T0` for a segment sequence number. Returns `None` until
    /// `set_origin` has been called.
    pub fn to_relative_segment_time(&self, seq: u64) -> Option<f64> {
        self.t0.read().map(|t0| seq as f64 * self.segment_duration - t0)
    }

    /// Seconds from `U0` (plus the drift-compensation offset) for a provider
    /// timestamp. Latches `U0` on first call.
    pub fn to_relative_utterance_time(&self, provider_ts: f64) -> f64 {
        let mut u0 = self.u0.write();
        let origin = *u0.get_or_insert(provider_ts);
        drop(u0);
        provider_ts - origin + *self.utterance_offset.read()
    }
}
