//! Composition root: owns every long-lived core component and the shared
//! primitives that tie them together. Mirrors the teacher's `AppState`
//! convention of one struct holding every `Arc`-shared piece of server
//! state, generalized from a VOD stream registry to the captioning core.

use crate::captions::CaptionStore;
use crate::config::Config;
use crate::gate::BufferAdmissionGate;
use crate::limits::{ConnectionLimiter, RateLimiter};
use crate::metrics::Metrics;
use crate::timeline::ReferenceTimeline;
use crate::tracker::{MediaKind, MediaSegmentTracker};
use crate::vtt::VttSegmentBuilder;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// All shared, long-lived state for the captioning pipeline.
pub struct AppState {
    pub config: Config,
    pub output_dir: PathBuf,

    pub timeline: Arc<ReferenceTimeline>,
    pub captions: Arc<CaptionStore>,
    pub video_tracker: Arc<MediaSegmentTracker>,
    pub audio_tracker: Arc<MediaSegmentTracker>,
    pub gate: Arc<BufferAdmissionGate>,
    pub builder: Arc<VttSegmentBuilder>,
    pub metrics: Arc<Metrics>,

    pub rate_limiter: Arc<RateLimiter>,
    pub connection_limiter: Arc<ConnectionLimiter>,

    /// Whether the most recently attempted VTT/playlist write succeeded,
    /// consulted by the Buffer Admission Gate (§4.5).
    last_write_ok: AtomicBool,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let output_dir = PathBuf::from(&config.output_dir);

        let timeline = Arc::new(ReferenceTimeline::new(config.segment_duration));
        let captions = Arc::new(CaptionStore::new(config.max_cues_per_language));

        let video_tracker = Arc::new(MediaSegmentTracker::new(
            MediaKind::Video,
            output_dir.join("video").join("playlist.m3u8"),
            output_dir.join("video"),
            config.segment_duration,
        ));
        let audio_tracker = Arc::new(MediaSegmentTracker::new(
            MediaKind::Audio,
            output_dir.join("audio").join("playlist.m3u8"),
            output_dir.join("audio"),
            config.segment_duration,
        ));

        let gate = Arc::new(BufferAdmissionGate::new(
            config.required_buffer_segments,
            config.transcription_buffer_min,
        ));

        let builder = Arc::new(VttSegmentBuilder::new(output_dir.clone(), config.segment_duration));

        let metrics = Arc::new(Metrics::new());
        let rate_limiter = crate::limits::create_rate_limiter(&config);
        let connection_limiter = crate::limits::create_connection_limiter(&config);

        Self {
            output_dir,
            timeline,
            captions,
            video_tracker,
            audio_tracker,
            gate,
            builder,
            metrics,
            rate_limiter,
            connection_limiter,
            config,
            last_write_ok: AtomicBool::new(true),
        }
    }

    pub fn set_last_write_ok(&self, ok: bool) {
        self.last_write_ok.store(ok, Ordering::Relaxed);
    }

    pub fn last_write_ok(&self) -> bool {
        self.last_write_ok.load(Ordering::Relaxed)
    }

    /// Path under the staging tree (`video/`, `audio/`, `subtitles/<lang>/`)
    /// for a relative path like `video/segment5.ts`.
    pub fn staging_path(&self, rel_path: &str) -> PathBuf {
        self.output_dir.join(rel_path)
    }

    /// Path under the parallel `serving/` tree the drip-feed publishes into.
    pub fn serving_path(&self, rel_path: &str) -> PathBuf {
        self.output_dir.join("serving").join(rel_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_has_closed_gate_and_empty_captions() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        };

        let state = AppState::new(config);
        assert!(!state.gate.is_open());
        assert!(state.captions.is_empty("ru"));
        assert_eq!(state.video_tracker.observed_sequences(), Vec::<u64>::new());
    }

    #[test]
    fn serving_and_staging_paths_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        };
        let state = AppState::new(config);

        assert_ne!(
            state.staging_path("video/segment0.ts"),
            state.serving_path("video/segment0.ts")
        );
    }
}
