//! Drip-Feed Server (§4.6): presents a stable, constant-latency HLS
//! presentation by advancing exactly one segment every `SEGMENT_DURATION`
//! seconds from the instant the Buffer Admission Gate opens.

use crate::error::Result;
use crate::gate::BufferAdmissionGate;
use crate::metrics::Metrics;
use crate::playlist;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{Duration, Instant};

const STALL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One track's published sliding window of segment sequence numbers.
#[derive(Debug, Default)]
pub struct PublishedWindow {
    seqs: VecDeque<u64>,
}

impl PublishedWindow {
    pub fn new() -> Self {
        Self { seqs: VecDeque::new() }
    }

    pub fn seqs(&self) -> Vec<u64> {
        self.seqs.iter().copied().collect()
    }

    /// Push `seq`, then pop from the head while over `capacity`. Returns the
    /// number of pops (0 or 1 in steady-state, more only if capacity shrank).
    pub fn push_and_trim(&mut self, seq: u64, capacity: usize) -> usize {
        self.seqs.push_back(seq);
        let mut pops = 0;
        while self.seqs.len() > capacity {
            self.seqs.pop_front();
            pops += 1;
        }
        pops
    }
}

/// Static, per-run configuration for the cadence loop.
pub struct DripFeedConfig {
    pub output_dir: PathBuf,
    pub segment_duration: f64,
    pub serving_window_size: usize,
    pub languages: Vec<String>,
}

/// Hard-link `src` into `dest` (creating parent directories), falling back to
/// a copy if the link fails — e.g. `src`/`dest` cross a filesystem boundary,
/// or `dest` already exists from a previous attempt (§4.6 step: materialize).
pub fn materialize_segment(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if dest.exists() {
        std::fs::remove_file(dest)?;
    }
    if std::fs::hard_link(src, dest).is_err() {
        std::fs::copy(src, dest)?;
    }
    Ok(())
}

fn track_dir(output_dir: &Path, track: &str) -> PathBuf {
    if track == "video" || track == "audio" {
        output_dir.join(track)
    } else {
        output_dir.join("subtitles").join(track)
    }
}

fn segment_filename(track: &str, seq: u64) -> String {
    if track == "video" || track == "audio" {
        format!("segment{seq}.ts")
    } else {
        format!("segment{seq}.vtt")
    }
}

/// The full set of tracks published by the drip-feed: "video", "audio", and
/// one subtitle track per configured language.
fn track_names(languages: &[String]) -> Vec<String> {
    let mut names = vec!["video".to_string(), "audio".to_string()];
    names.extend(languages.iter().cloned());
    names
}

/// Materialize `seq` into the serving tree for every track, from each
/// track's own staging directory.
fn materialize_all(config: &DripFeedConfig, seq: u64) -> Result<()> {
    for track in track_names(&config.languages) {
        let filename = segment_filename(&track, seq);
        let staging_dir = track_dir(&config.output_dir, &track);
        let serving_dir = track_dir(&config.output_dir.join("serving"), &track);
        materialize_segment(&staging_dir.join(&filename), &serving_dir.join(&filename))?;
    }
    Ok(())
}

/// Rewrite the four (or more) serving media playlists plus the serving
/// master playlist so they agree on `media_sequence` and the `seq` list.
fn publish_all(config: &DripFeedConfig, seqs: &[u64], media_sequence: u64) -> Result<()> {
    let serving_root = config.output_dir.join("serving");

    playlist::write_media_playlist(
        &track_dir(&serving_root, "video").join("playlist.m3u8"),
        media_sequence,
        config.segment_duration,
        seqs,
        |seq| format!("segment{seq}.ts"),
    )?;
    playlist::write_media_playlist(
        &track_dir(&serving_root, "audio").join("playlist.m3u8"),
        media_sequence,
        config.segment_duration,
        seqs,
        |seq| format!("segment{seq}.ts"),
    )?;
    for lang in &config.languages {
        playlist::write_media_playlist(
            &track_dir(&serving_root, lang).join("playlist.m3u8"),
            media_sequence,
            config.segment_duration,
            seqs,
            |seq| format!("segment{seq}.vtt"),
        )?;
    }
    playlist::write_master_playlist(&serving_root.join("master.m3u8"), &config.languages)?;

    Ok(())
}

/// Does the staged file for `(track, seq)` exist yet?
fn segment_present(config: &DripFeedConfig, track: &str, seq: u64) -> bool {
    track_dir(&config.output_dir, track)
        .join(segment_filename(track, seq))
        .exists()
}

fn all_segments_present(config: &DripFeedConfig, seq: u64) -> bool {
    track_names(&config.languages)
        .iter()
        .all(|track| segment_present(config, track, seq))
}

/// The cadence loop: waits for the gate, then releases one segment every
/// `segment_duration` seconds, materializing and republishing on each tick.
/// Runs until the process ends.
pub async fn run(config: DripFeedConfig, gate: Arc<BufferAdmissionGate>, metrics: Arc<Metrics>) {
    let first_serving_segment = gate.opened().await;

    let mut windows: Vec<PublishedWindow> = track_names(&config.languages)
        .iter()
        .map(|_| PublishedWindow::new())
        .collect();
    for window in &mut windows {
        window.push_and_trim(first_serving_segment, config.serving_window_size);
    }

    if let Err(e) = materialize_all(&config, first_serving_segment) {
        tracing::error!("failed to materialize first serving segment: {}", e);
    }
    let mut media_sequence: u64 = 0;
    if let Err(e) = publish_all(&config, &windows[0].seqs(), media_sequence) {
        tracing::error!("failed to publish initial serving playlists: {}", e);
    }
    metrics.set_serving_media_sequence(media_sequence);

    let segment_duration = Duration::from_secs_f64(config.segment_duration);
    let mut next_release_time = Instant::now() + segment_duration;
    let mut next_index: u64 = 1;

    loop {
        let now = Instant::now();
        if now < next_release_time {
            tokio::time::sleep(next_release_time - now).await;
        }

        let next_seq = first_serving_segment + next_index;

        let mut stalled = false;
        while !all_segments_present(&config, next_seq) {
            stalled = true;
            metrics.record_cadence_stall();
            tokio::time::sleep(STALL_POLL_INTERVAL).await;
        }

        if let Err(e) = materialize_all(&config, next_seq) {
            tracing::error!(seq = next_seq, "failed to materialize segment: {}", e);
        }

        // Only the video/audio pop count drives the shared sequence counter
        // (§4.6); subtitle windows are kept in lockstep but never counted
        // twice, since every track window is always the same length.
        for (i, window) in windows.iter_mut().enumerate() {
            let pops = window.push_and_trim(next_seq, config.serving_window_size);
            if i == 0 {
                media_sequence += pops as u64;
            }
        }

        if let Err(e) = publish_all(&config, &windows[0].seqs(), media_sequence) {
            tracing::error!("failed to publish serving playlists: {}", e);
        }
        metrics.set_serving_media_sequence(media_sequence);

        // On recovery from a stall, resume cadence from now rather than
        // catching up to the stale schedule (§4.6, Testable Properties #2).
        next_release_time = if stalled {
            Instant::now() + segment_duration
        } else {
            next_release_time + segment_duration
        };
        next_index += 1;
    }
}
