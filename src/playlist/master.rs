//! Master playlist writer (§4.6): one `#EXT-X-MEDIA` line for the audio
//! track, one per subtitle language (exactly one `DEFAULT=YES`, the source
//! language), and one `#EXT-X-STREAM-INF` referencing the video track.

use crate::error::Result;
use crate::fsutil::write_atomic;
use std::path::Path;

const CODECS: &str = "avc1.64001f,mp4a.40.2,wvtt";

/// Render the master playlist for the given set of configured languages
/// (first entry is the source language, per §6).
pub fn render_master_playlist(languages: &[String]) -> String {
    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    out.push_str("#EXT-X-VERSION:3\n");
    out.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");
    out.push_str(
        "#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"audio\",NAME=\"audio\",DEFAULT=YES,AUTOSELECT=YES,URI=\"audio/playlist.m3u8\"\n",
    );

    for (i, lang) in languages.iter().enumerate() {
        let default = if i == 0 { "YES" } else { "NO" };
        out.push_str(&format!(
            "#EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",NAME=\"{lang}\",LANGUAGE=\"{lang}\",DEFAULT={default},AUTOSELECT=YES,URI=\"subtitles/{lang}/playlist.m3u8\"\n",
        ));
    }

    out.push_str(&format!(
        "#EXT-X-STREAM-INF:BANDWIDTH=1280000,CODECS=\"{CODECS}\",AUDIO=\"audio\",SUBTITLES=\"subs\"\n"
    ));
    out.push_str("video/playlist.m3u8\n");

    out
}

/// Render and atomically write the master playlist to `path`.
pub fn write_master_playlist(path: &Path, languages: &[String]) -> Result<()> {
    let content = render_master_playlist(languages);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_atomic(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_skeleton_for_three_languages() {
        let languages = vec!["ru".to_string(), "en".to_string(), "nl".to_string()];
        let playlist = render_master_playlist(&languages);

        assert_eq!(
            playlist.matches("TYPE=SUBTITLES").count(),
            3,
            "exactly three subtitle media lines"
        );
        assert_eq!(playlist.matches("DEFAULT=YES").count(), 2, "audio + ru default");
        assert!(playlist.contains("NAME=\"ru\",LANGUAGE=\"ru\",DEFAULT=YES"));
        assert!(playlist.contains("NAME=\"en\",LANGUAGE=\"en\",DEFAULT=NO"));
        assert!(playlist.contains("NAME=\"nl\",LANGUAGE=\"nl\",DEFAULT=NO"));
        assert_eq!(playlist.matches("#EXT-X-STREAM-INF").count(), 1);
        assert!(playlist.contains("video/playlist.m3u8"));
        assert!(playlist.contains(CODECS));
    }
}
