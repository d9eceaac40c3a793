//! Media Segment Tracker (§4.3): converts the transcoder's externally
//! managed directory + playlist into a canonical in-memory sequence of
//! segments, and notifies the builder when the set changes.

use dashmap::DashMap;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::OnceLock;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::timeline::ReferenceTimeline;

/// `media_kind` for a tracked segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// A segment observed on disk, with its reference-timeline window.
#[derive(Debug, Clone)]
pub struct Segment {
    pub seq: u64,
    pub start_rel: f64,
    pub end_rel: f64,
    pub media_kind: MediaKind,
    pub path: PathBuf,
}

fn segment_filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^segment(\d+)\.ts$").expect("valid regex"))
}

/// Parse a `segmentNNNN.ts` filename into its sequence number.
pub fn parse_segment_filename(filename: &str) -> Option<u64> {
    segment_filename_regex()
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Tracks observed segment sequence numbers for one media kind (video or
/// audio), polling a playlist + directory at 1 Hz.
pub struct MediaSegmentTracker {
    media_kind: MediaKind,
    playlist_path: PathBuf,
    directory: PathBuf,
    segment_duration: f64,
    segments: DashMap<u64, Segment>,
    first_segment_sequence: AtomicU64,
    origin_set: std::sync::atomic::AtomicBool,
    missing_playlist_retries: AtomicU32,
}

const MISSING_PLAYLIST_RETRY_LIMIT: u32 = 10;

impl MediaSegmentTracker {
    pub fn new(
        media_kind: MediaKind,
        playlist_path: impl Into<PathBuf>,
        directory: impl Into<PathBuf>,
        segment_duration: f64,
    ) -> Self {
        Self {
            media_kind,
            playlist_path: playlist_path.into(),
            directory: directory.into(),
            segment_duration,
            segments: DashMap::new(),
            first_segment_sequence: AtomicU64::new(0),
            origin_set: std::sync::atomic::AtomicBool::new(false),
            missing_playlist_retries: AtomicU32::new(0),
        }
    }

    /// `first_segment_sequence` once set by the first non-empty observation,
    /// `None` before.
    pub fn first_segment_sequence(&self) -> Option<u64> {
        if self.origin_set.load(Ordering::Relaxed) {
            Some(self.first_segment_sequence.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    /// `(seq, start_rel, end_rel)` windows for every currently observed
    /// segment, used by the builder's cue-updated trigger policy.
    pub fn segment_windows(&self) -> Vec<(u64, f64, f64)> {
        self.segments
            .iter()
            .map(|e| (e.seq, e.start_rel, e.end_rel))
            .collect()
    }

    pub fn observed_sequences(&self) -> Vec<u64> {
        let mut seqs: Vec<u64> = self.segments.iter().map(|e| *e.key()).collect();
        seqs.sort_unstable();
        seqs
    }

    pub fn segment(&self, seq: u64) -> Option<Segment> {
        self.segments.get(&seq).map(|s| s.clone())
    }

    pub fn segment_path(&self, seq: u64) -> Option<PathBuf> {
        self.segments.get(&seq).map(|s| s.path.clone())
    }

    /// Read the playlist, list the directory, and reconcile the observed
    /// segment set. Returns `true` if the set changed since the previous
    /// poll.
    pub fn poll(&self, timeline: &ReferenceTimeline) -> bool {
        let filenames = match self.read_playlist_filenames() {
            Some(names) => {
                self.missing_playlist_retries.store(0, Ordering::Relaxed);
                names
            }
            None => {
                let retries = self.missing_playlist_retries.fetch_add(1, Ordering::Relaxed) + 1;
                if retries == MISSING_PLAYLIST_RETRY_LIMIT {
                    tracing::warn!(
                        playlist = %self.playlist_path.display(),
                        "media playlist still missing after {} polls; continuing to poll",
                        retries
                    );
                }
                return false;
            }
        };

        let mut observed_any = false;
        let mut changed = false;
        let mut min_seq = u64::MAX;

        for filename in filenames {
            let seq = match parse_segment_filename(&filename) {
                Some(seq) => seq,
                None => {
                    tracing::warn!(line = %filename, "skipping unparseable playlist entry");
                    continue;
                }
            };

            let path = self.directory.join(&filename);
            if !path.exists() {
                continue;
            }

            observed_any = true;
            min_seq = min_seq.min(seq);

            if !self.segments.contains_key(&seq) {
                changed = true;
            }

            let first = if self.origin_set.load(Ordering::Relaxed) {
                self.first_segment_sequence.load(Ordering::Relaxed)
            } else {
                seq
            };
            let start_rel = (seq.saturating_sub(first)) as f64 * self.segment_duration;
            self.segments.insert(
                seq,
                Segment {
                    seq,
                    start_rel,
                    end_rel: start_rel + self.segment_duration,
                    media_kind: self.media_kind,
                    path,
                },
            );
        }

        if observed_any && !self.origin_set.swap(true, Ordering::Relaxed) {
            self.first_segment_sequence.store(min_seq, Ordering::Relaxed);
            timeline.set_origin(min_seq);
        }

        if observed_any {
            self.retain_from(min_seq);
        }

        changed
    }

    /// Drop internally tracked entries below `min_seq`; the tracker never
    /// deletes files, only its own bookkeeping.
    fn retain_from(&self, min_seq: u64) {
        self.segments.retain(|&seq, _| seq >= min_seq);
    }

    fn read_playlist_filenames(&self) -> Option<Vec<String>> {
        let content = std::fs::read_to_string(&self.playlist_path).ok()?;
        Some(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect(),
        )
    }
}

/// Run the 1 Hz polling loop for one tracker until the process ends. Calls
/// `on_change` whenever `poll` reports a changed segment set.
pub async fn run_polling_loop(
    tracker: std::sync::Arc<MediaSegmentTracker>,
    timeline: std::sync::Arc<ReferenceTimeline>,
    on_change: impl Fn(&MediaSegmentTracker),
) {
    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if tracker.poll(&timeline) {
            on_change(&tracker);
        }
    }
}

pub fn is_segment_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| parse_segment_filename(n).is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_valid_filenames() {
        assert_eq!(parse_segment_filename("segment0001.ts"), Some(1));
        assert_eq!(parse_segment_filename("segment042.ts"), Some(42));
    }

    #[test]
    fn rejects_malformed_filenames() {
        assert_eq!(parse_segment_filename("segmentX.ts"), None);
        assert_eq!(parse_segment_filename("segment1.mp4"), None);
        assert_eq!(parse_segment_filename("seg1.ts"), None);
    }

    #[test]
    fn poll_sets_origin_on_first_nonempty_observation() {
        let dir = tempfile::tempdir().unwrap();
        let playlist_path = dir.path().join("video.m3u8");

        std::fs::File::create(dir.path().join("segment0005.ts")).unwrap();
        std::fs::File::create(dir.path().join("segment0006.ts")).unwrap();

        let mut playlist = std::fs::File::create(&playlist_path).unwrap();
        writeln!(playlist, "#EXTM3U").unwrap();
        writeln!(playlist, "segment0005.ts").unwrap();
        writeln!(playlist, "segment0006.ts").unwrap();

        let tracker = MediaSegmentTracker::new(MediaKind::Video, &playlist_path, dir.path(), 10.0);
        let timeline = ReferenceTimeline::new(10.0);

        let changed = tracker.poll(&timeline);
        assert!(changed);
        assert_eq!(timeline.origin(), Some(50.0));
        assert_eq!(tracker.observed_sequences(), vec![5, 6]);
    }

    #[test]
    fn first_segment_sequence_is_none_until_origin_set() {
        let dir = tempfile::tempdir().unwrap();
        let playlist_path = dir.path().join("video.m3u8");
        let tracker = MediaSegmentTracker::new(MediaKind::Video, &playlist_path, dir.path(), 10.0);
        assert_eq!(tracker.first_segment_sequence(), None);

        std::fs::File::create(dir.path().join("segment0003.ts")).unwrap();
        std::fs::write(&playlist_path, "segment0003.ts\n").unwrap();
        let timeline = ReferenceTimeline::new(10.0);
        tracker.poll(&timeline);
        assert_eq!(tracker.first_segment_sequence(), Some(3));
    }

    #[test]
    fn poll_returns_false_when_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let playlist_path = dir.path().join("video.m3u8");
        std::fs::File::create(dir.path().join("segment0001.ts")).unwrap();
        let mut playlist = std::fs::File::create(&playlist_path).unwrap();
        writeln!(playlist, "segment0001.ts").unwrap();

        let tracker = MediaSegmentTracker::new(MediaKind::Video, &playlist_path, dir.path(), 10.0);
        let timeline = ReferenceTimeline::new(10.0);

        assert!(tracker.poll(&timeline));
        assert!(!tracker.poll(&timeline));
    }

    #[test]
    fn missing_playlist_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let playlist_path = dir.path().join("missing.m3u8");
        let tracker = MediaSegmentTracker::new(MediaKind::Video, &playlist_path, dir.path(), 10.0);
        let timeline = ReferenceTimeline::new(10.0);

        for _ in 0..15 {
            assert!(!tracker.poll(&timeline));
        }
        assert_eq!(timeline.origin(), None);
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let playlist_path = dir.path().join("video.m3u8");
        std::fs::File::create(dir.path().join("segment0002.ts")).unwrap();
        let mut playlist = std::fs::File::create(&playlist_path).unwrap();
        writeln!(playlist, "not-a-segment.ts").unwrap();
        writeln!(playlist, "segment0002.ts").unwrap();

        let tracker = MediaSegmentTracker::new(MediaKind::Video, &playlist_path, dir.path(), 10.0);
        let timeline = ReferenceTimeline::new(10.0);
        tracker.poll(&timeline);
        assert_eq!(tracker.observed_sequences(), vec![2]);
    }
}
