//! VTT Segment Builder (§4.4): produces exactly one WebVTT file per
//! `(seq, language)` pair, clipped and clock-aligned to that segment's
//! reference-timeline window.

use crate::captions::CaptionStore;
use crate::error::Result;
use crate::fsutil::write_atomic;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Format seconds as `HH:MM:SS.mmm`, hours clamped to two digits modulo 100
/// (§4.4).
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = (total_secs / 3600) % 100;
    format!("{hours:02}:{mins:02}:{secs:02}.{ms:03}")
}

/// A cue clipped and re-expressed in segment-local time.
#[derive(Debug, Clone, PartialEq)]
pub struct ClippedCue {
    pub local_start: f64,
    pub local_end: f64,
    pub text: String,
}

/// Intersect the caption store with `[window_start, window_end)` and clip
/// each hit to the window, in the store's insertion order (§4.4 step 2).
pub fn clip_cues_for_window(
    store: &CaptionStore,
    language: &str,
    window_start: f64,
    window_end: f64,
    segment_duration: f64,
) -> Vec<ClippedCue> {
    store
        .overlapping(language, window_start, window_end)
        .into_iter()
        .map(|cue| ClippedCue {
            local_start: (cue.start_rel - window_start).max(0.0),
            local_end: (cue.end_rel - window_start).min(segment_duration),
            text: cue.text,
        })
        .collect()
}

/// Render a WebVTT file body from already-clipped cues, with a fresh
/// 1-based index per file.
pub fn render_vtt(cues: &[ClippedCue]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&(i + 1).to_string());
        out.push('\n');
        out.push_str(&format_timestamp(cue.local_start));
        out.push_str(" --> ");
        out.push_str(&format_timestamp(cue.local_end));
        out.push('\n');
        out.push_str(&cue.text);
        out.push_str("\n\n");
    }
    out
}

pub fn vtt_path(output_dir: &Path, language: &str, seq: u64) -> PathBuf {
    output_dir
        .join("subtitles")
        .join(language)
        .join(format!("segment{seq}.vtt"))
}

pub fn subtitle_playlist_path(output_dir: &Path, language: &str) -> PathBuf {
    output_dir.join("subtitles").join(language).join("playlist.m3u8")
}

/// Builds per-`(seq, language)` WebVTT files from the Caption Store and
/// keeps each language's staging subtitle playlist (`subtitles/<lang>/playlist.m3u8`)
/// in sync with the set of segments it has written.
pub struct VttSegmentBuilder {
    output_dir: PathBuf,
    segment_duration: f64,
    written: DashMap<String, BTreeSet<u64>>,
}

impl VttSegmentBuilder {
    pub fn new(output_dir: impl Into<PathBuf>, segment_duration: f64) -> Self {
        Self {
            output_dir: output_dir.into(),
            segment_duration,
            written: DashMap::new(),
        }
    }

    /// Resolve the segment window and write `<seq>.vtt` for `language`,
    /// then regenerate that language's staging subtitle playlist (§4.4
    /// steps 1, 3, 4).
    pub fn build(
        &self,
        store: &CaptionStore,
        first_segment_sequence: u64,
        seq: u64,
        language: &str,
    ) -> Result<PathBuf> {
        let window_start = seq.saturating_sub(first_segment_sequence) as f64 * self.segment_duration;
        let window_end = window_start + self.segment_duration;

        let cues = clip_cues_for_window(store, language, window_start, window_end, self.segment_duration);
        let content = render_vtt(&cues);

        let path = vtt_path(&self.output_dir, language, seq);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_atomic(&path, &content)?;

        self.written.entry(language.to_string()).or_default().insert(seq);
        self.write_subtitle_playlist(language)?;

        Ok(path)
    }

    fn write_subtitle_playlist(&self, language: &str) -> Result<()> {
        let seqs: Vec<u64> = self
            .written
            .get(language)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        crate::playlist::media::write_media_playlist(
            &subtitle_playlist_path(&self.output_dir, language),
            seqs.first().copied().unwrap_or(0),
            self.segment_duration,
            &seqs,
            |seq| format!("segment{seq}.vtt"),
        )
    }

    /// Segment sequence numbers this builder has written a VTT file for, in
    /// this language, ascending.
    pub fn known_segments(&self, language: &str) -> Vec<u64> {
        self.written
            .get(language)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The most recently built segment across all languages, if any.
    pub fn latest_known_segment(&self) -> Option<u64> {
        self.written
            .iter()
            .filter_map(|entry| entry.value().iter().next_back().copied())
            .max()
    }
}

/// A request to (re)build one or more VTT files, sent over the builder's
/// bounded mpsc channel (§5, §9: one channel, one consumer).
#[derive(Debug, Clone)]
pub enum RebuildRequest {
    /// A new segment was observed; build every configured language for it.
    NewSegment(u64),
    /// A cue was finalized for `language`; rebuild the segments its window
    /// (plus slack) overlaps.
    CueUpdated { language: String, start: f64, end: f64 },
    /// Periodic refresh (§4.4): rebuild every known segment, every language.
    Periodic,
}

/// §4.4 trigger policy for a newly finalized cue: segments whose window
/// overlaps `[cue_start − 5, cue_end + 5]`. Falls back to the single latest
/// known segment when no window overlaps under the strict test, so at least
/// one cue surfaces during steady-state lag.
pub fn segments_to_rebuild_for_cue(
    segment_windows: &[(u64, f64, f64)],
    cue_start: f64,
    cue_end: f64,
    fallback_latest: Option<u64>,
) -> Vec<u64> {
    const SLACK: f64 = 5.0;
    let slack_start = cue_start - SLACK;
    let slack_end = cue_end + SLACK;

    let hits: Vec<u64> = segment_windows
        .iter()
        .filter(|(_, start, end)| *end > slack_start && *start < slack_end)
        .map(|(seq, _, _)| *seq)
        .collect();

    if !hits.is_empty() {
        return hits;
    }

    fallback_latest.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::Cue;

    #[test]
    fn timestamp_formats_milliseconds_and_rolls_minutes() {
        assert_eq!(format_timestamp(0.0), "00:00:00.000");
        assert_eq!(format_timestamp(2.0), "00:00:02.000");
        assert_eq!(format_timestamp(62.5), "00:01:02.500");
        assert_eq!(format_timestamp(3661.25), "01:01:01.250");
    }

    #[test]
    fn timestamp_hours_clamp_modulo_100() {
        let seconds = 101.0 * 3600.0;
        assert!(format_timestamp(seconds).starts_with("01:"));
    }

    #[test]
    fn cue_boundary_start_equal_window_end_is_excluded() {
        let store = CaptionStore::new(10);
        store.append(Cue::new("ru", 20.0, 25.0, "x"));
        let clipped = clip_cues_for_window(&store, "ru", 10.0, 20.0, 10.0);
        assert!(clipped.is_empty());
    }

    #[test]
    fn cue_boundary_end_equal_window_start_is_excluded() {
        let store = CaptionStore::new(10);
        store.append(Cue::new("ru", 5.0, 10.0, "x"));
        let clipped = clip_cues_for_window(&store, "ru", 10.0, 20.0, 10.0);
        assert!(clipped.is_empty());
    }

    #[test]
    fn cue_spanning_segment_boundary_clips_into_each() {
        let store = CaptionStore::new(10);
        store.append(Cue::new("ru", 12.0, 22.0, "X"));

        let seg0 = clip_cues_for_window(&store, "ru", 10.0, 20.0, 10.0);
        assert_eq!(seg0.len(), 1);
        assert_eq!(seg0[0].local_start, 2.0);
        assert_eq!(seg0[0].local_end, 10.0);

        let seg1 = clip_cues_for_window(&store, "ru", 20.0, 30.0, 10.0);
        assert_eq!(seg1.len(), 1);
        assert_eq!(seg1[0].local_start, 0.0);
        assert_eq!(seg1[0].local_end, 2.0);
    }

    #[test]
    fn render_vtt_assigns_fresh_one_based_index() {
        let cues = vec![
            ClippedCue { local_start: 0.0, local_end: 1.0, text: "a".into() },
            ClippedCue { local_start: 1.0, local_end: 2.0, text: "b".into() },
        ];
        let body = render_vtt(&cues);
        assert!(body.starts_with("WEBVTT\n\n1\n"));
        assert!(body.contains("\n2\n"));
    }

    #[test]
    fn rebuild_trigger_uses_slack_window() {
        let windows = vec![(0, 0.0, 10.0), (1, 10.0, 20.0), (2, 20.0, 30.0)];
        // cue at 18-19 overlaps segment 1 directly and segment 2 within slack.
        let hits = segments_to_rebuild_for_cue(&windows, 18.0, 19.0, Some(2));
        assert!(hits.contains(&1));
    }

    #[test]
    fn rebuild_trigger_falls_back_to_latest_when_nothing_overlaps() {
        let windows = vec![(5, 50.0, 60.0)];
        let hits = segments_to_rebuild_for_cue(&windows, 0.0, 1.0, Some(5));
        assert_eq!(hits, vec![5]);
    }

    #[test]
    fn rebuild_trigger_no_fallback_when_nothing_known() {
        let hits = segments_to_rebuild_for_cue(&[], 0.0, 1.0, None);
        assert!(hits.is_empty());
    }

    #[test]
    fn build_writes_file_and_tracks_known_segments() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptionStore::new(10);
        store.append(Cue::new("ru", 12.0, 22.0, "hello"));

        let builder = VttSegmentBuilder::new(dir.path(), 10.0);
        let path = builder.build(&store, 0, 1, "ru").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("WEBVTT\n\n"));
        assert!(content.contains("00:00:00.000 --> 00:00:02.000"));
        assert_eq!(builder.known_segments("ru"), vec![1]);

        let playlist_path = subtitle_playlist_path(dir.path(), "ru");
        assert!(playlist_path.exists());
    }

    #[test]
    fn rebuilding_unchanged_store_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptionStore::new(10);
        store.append(Cue::new("ru", 1.0, 3.0, "hi"));

        let builder = VttSegmentBuilder::new(dir.path(), 10.0);
        let path1 = builder.build(&store, 0, 0, "ru").unwrap();
        let first = std::fs::read_to_string(&path1).unwrap();
        let path2 = builder.build(&store, 0, 0, "ru").unwrap();
        let second = std::fs::read_to_string(&path2).unwrap();

        assert_eq!(first, second);
    }
}
