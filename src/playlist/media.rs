//! Media playlist writer, shared by the VTT builder (subtitle staging
//! playlists) and the drip-feed server (serving playlists for all four
//! tracks: video, audio, and one per subtitle language).

use crate::error::Result;
use crate::fsutil::write_atomic;
use std::path::Path;

/// Render a live media playlist. `media_sequence` is `#EXT-X-MEDIA-SEQUENCE`;
/// `uri_for` maps a sequence number to the segment URI relative to the
/// playlist's own directory. No `#EXT-X-ENDLIST` (§4.6: this is a live
/// playlist).
pub fn render_media_playlist(
    media_sequence: u64,
    segment_duration: f64,
    seqs: &[u64],
    uri_for: impl Fn(u64) -> String,
) -> String {
    let target_duration = segment_duration.ceil().max(1.0) as u64;

    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    out.push_str("#EXT-X-VERSION:3\n");
    out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", target_duration));
    out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", media_sequence));
    out.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");

    for &seq in seqs {
        out.push_str(&format!("#EXTINF:{:.1},\n", segment_duration));
        out.push_str(&uri_for(seq));
        out.push('\n');
    }

    out
}

/// Render and atomically write a media playlist to `path`.
pub fn write_media_playlist(
    path: &Path,
    media_sequence: u64,
    segment_duration: f64,
    seqs: &[u64],
    uri_for: impl Fn(u64) -> String,
) -> Result<()> {
    let content = render_media_playlist(media_sequence, segment_duration, seqs, uri_for);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_atomic(path, &content)
}
