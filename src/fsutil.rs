//! Shared file-IO primitives: atomic temp-and-rename writes used by the VTT
//! builder and the playlist writers (spec §4.4 step 3, §5).

use crate::error::{CoreError, Result};
use std::path::Path;
use std::time::Duration;

const WRITE_RETRIES: u32 = 3;
const WRITE_BACKOFF: Duration = Duration::from_millis(500);

/// Write `content` to `path` atomically: write to `<path>.tmp`, then rename
/// over `path`. Retries transient failures up to 3 times with a 500 ms
/// back-off before surfacing the error (§7, Transient I/O).
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp);

    let mut last_err = None;
    for attempt in 0..=WRITE_RETRIES {
        match try_write(&tmp_path, path, content) {
            Ok(()) => return Ok(()),
            Err(e) => {
                if attempt < WRITE_RETRIES {
                    tracing::warn!(
                        path = %path.display(),
                        attempt,
                        "transient write failure, retrying: {}",
                        e
                    );
                    std::thread::sleep(WRITE_BACKOFF);
                }
                last_err = Some(e);
            }
        }
    }

    let source = last_err.expect("loop always sets last_err before exhausting retries");
    tracing::error!(path = %path.display(), "write failed after {} retries: {}", WRITE_RETRIES, source);
    Err(CoreError::TransientWrite {
        path: path.display().to_string(),
        source,
    })
}

fn try_write(tmp_path: &Path, dest: &Path, content: &str) -> std::result::Result<(), std::io::Error> {
    std::fs::write(tmp_path, content)?;
    std::fs::rename(tmp_path, dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_file_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playlist.m3u8");
        write_atomic(&path, "#EXTM3U\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "#EXTM3U\n");
        assert!(!path.with_extension("m3u8.tmp").exists() || !dir.path().join("playlist.m3u8.tmp").exists());
    }

    #[test]
    fn write_atomic_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segment5.vtt");
        write_atomic(&path, "WEBVTT\n").unwrap();
        write_atomic(&path, "WEBVTT\n\n1\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "WEBVTT\n\n1\n");
    }

    #[test]
    fn write_atomic_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playlist.m3u8");
        write_atomic(&path, "data").unwrap();

        let tmp_path = dir.path().join("playlist.m3u8.tmp");
        assert!(!tmp_path.exists());
    }
}
