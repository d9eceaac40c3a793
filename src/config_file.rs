//! Optional TOML configuration file, overlaid on top of environment defaults.
//!
//! Every field is optional: a config file only needs to name the settings it
//! wants to override. Keys mirror `Config` field names.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::Config;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub segment_duration: Option<f64>,
    pub window_size: Option<u32>,
    pub serving_window_size: Option<usize>,
    pub required_buffer_segments: Option<usize>,
    pub transcription_buffer_min: Option<usize>,
    pub max_cues_per_language: Option<usize>,
    pub languages: Option<Vec<String>>,
    pub http_port: Option<u16>,
    pub output_dir: Option<String>,

    pub provider_api_url: Option<String>,
    pub provider_api_key: Option<String>,
    pub audio_sample_rate: Option<u32>,
    pub audio_bit_depth: Option<u32>,
    pub audio_channels: Option<u32>,
    pub audio_source_path: Option<String>,

    pub log_format: Option<String>,
    pub log_level: Option<String>,

    pub max_concurrent_connections: Option<u32>,
    pub rate_limit_rps: Option<u32>,
}

impl ConfigFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply any fields set in this overlay on top of a base `Config`.
    pub fn apply_to(self, base: Config) -> Config {
        Config {
            segment_duration: self.segment_duration.unwrap_or(base.segment_duration),
            window_size: self.window_size.unwrap_or(base.window_size),
            serving_window_size: self.serving_window_size.unwrap_or(base.serving_window_size),
            required_buffer_segments: self
                .required_buffer_segments
                .unwrap_or(base.required_buffer_segments),
            transcription_buffer_min: self
                .transcription_buffer_min
                .unwrap_or(base.transcription_buffer_min),
            max_cues_per_language: self
                .max_cues_per_language
                .unwrap_or(base.max_cues_per_language),
            languages: self.languages.unwrap_or(base.languages),
            http_port: self.http_port.unwrap_or(base.http_port),
            output_dir: self.output_dir.unwrap_or(base.output_dir),

            provider_api_url: self.provider_api_url.unwrap_or(base.provider_api_url),
            provider_api_key: self.provider_api_key.unwrap_or(base.provider_api_key),
            audio_sample_rate: self.audio_sample_rate.unwrap_or(base.audio_sample_rate),
            audio_bit_depth: self.audio_bit_depth.unwrap_or(base.audio_bit_depth),
            audio_channels: self.audio_channels.unwrap_or(base.audio_channels),
            audio_source_path: self.audio_source_path.unwrap_or(base.audio_source_path),

            log_format: self.log_format.unwrap_or(base.log_format),
            log_level: self.log_level.unwrap_or(base.log_level),

            max_concurrent_connections: self
                .max_concurrent_connections
                .or(base.max_concurrent_connections),
            rate_limit_rps: self.rate_limit_rps.or(base.rate_limit_rps),
        }
    }
}

/// Load `Config` from the environment, then apply a TOML overlay at `path` if
/// it exists.
pub fn load(path: Option<&str>) -> Config {
    let base = Config::from_env();
    match path {
        Some(path) if Path::new(path).exists() => match ConfigFile::from_file(path) {
            Ok(overlay) => overlay.apply_to(base),
            Err(e) => {
                tracing::warn!("failed to load config file {}: {}. Using env/defaults.", path, e);
                base
            }
        },
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_overlay_overrides_only_set_fields() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "http_port = 9100").unwrap();
        writeln!(temp_file, "segment_duration = 6.0").unwrap();

        let overlay = ConfigFile::from_file(temp_file.path()).unwrap();
        let merged = overlay.apply_to(Config::default());

        assert_eq!(merged.http_port, 9100);
        assert_eq!(merged.segment_duration, 6.0);
        assert_eq!(merged.required_buffer_segments, 6); // untouched default
    }

    #[test]
    fn test_load_falls_back_to_env_defaults_when_file_missing() {
        let config = load(Some("/nonexistent/path/config.toml"));
        assert_eq!(config.http_port, Config::default().http_port);
    }
}
