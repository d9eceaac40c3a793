//! Runtime configuration, loaded primarily from the environment (spec §6).

use serde::{Deserialize, Serialize};

/// Flat runtime configuration for the whole service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds per media segment.
    pub segment_duration: f64,
    /// Transcoder retention window, in segments.
    pub window_size: u32,
    /// Drip-feed serving window length, in segments.
    pub serving_window_size: usize,
    /// Segments observed before the gate is eligible to open.
    pub required_buffer_segments: usize,
    /// Finalized source-language cues before the gate is eligible to open.
    pub transcription_buffer_min: usize,
    /// Per-language bound on the Caption Store.
    pub max_cues_per_language: usize,
    /// Configured languages; the first is the source language.
    pub languages: Vec<String>,
    /// HTTP listen port.
    pub http_port: u16,
    /// Root directory under which `video/`, `audio/`, `subtitles/`, `serving/` live.
    pub output_dir: String,

    /// Speech-provider session-init base URL.
    pub provider_api_url: String,
    /// Speech-provider API key.
    pub provider_api_key: String,
    /// PCM sample rate, Hz.
    pub audio_sample_rate: u32,
    /// PCM bit depth.
    pub audio_bit_depth: u32,
    /// PCM channel count.
    pub audio_channels: u32,
    /// Path to the local PCM source (e.g. a named pipe).
    pub audio_source_path: String,

    /// `text` or `json`.
    pub log_format: String,
    /// `tracing`-compatible filter directive default.
    pub log_level: String,

    /// Maximum concurrent connections, used by the connection limiter.
    pub max_concurrent_connections: Option<u32>,
    /// Requests-per-second, used by the rate limiter.
    pub rate_limit_rps: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segment_duration: 10.0,
            window_size: 12,
            serving_window_size: 2,
            required_buffer_segments: 6,
            transcription_buffer_min: 3,
            max_cues_per_language: 1000,
            languages: vec!["ru".to_string()],
            http_port: 8080,
            output_dir: "./output".to_string(),

            provider_api_url: "https://api.gladia.io".to_string(),
            provider_api_key: String::new(),
            audio_sample_rate: 16_000,
            audio_bit_depth: 16,
            audio_channels: 1,
            audio_source_path: "/shared-data/audio_stream".to_string(),

            log_format: "text".to_string(),
            log_level: "info".to_string(),

            max_concurrent_connections: Some(200),
            rate_limit_rps: Some(100),
        }
    }
}

impl Config {
    /// Socket address string for the HTTP listener.
    pub fn socket_addr(&self) -> String {
        format!("0.0.0.0:{}", self.http_port)
    }

    /// Source language (always the first configured language).
    pub fn source_language(&self) -> &str {
        self.languages.first().map(|s| s.as_str()).unwrap_or("und")
    }

    /// Build configuration from environment variables, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let env_f64 = |key: &str, default: f64| -> f64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_u32 = |key: &str, default: u32| -> u32 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_usize = |key: &str, default: usize| -> usize {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_u16 = |key: &str, default: u16| -> u16 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_string = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let languages = std::env::var("LANGUAGES")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.languages.clone());

        Self {
            segment_duration: env_f64("SEGMENT_DURATION", defaults.segment_duration),
            window_size: env_u32("WINDOW_SIZE", defaults.window_size),
            serving_window_size: env_usize("SERVING_WINDOW_SIZE", defaults.serving_window_size),
            required_buffer_segments: env_usize(
                "REQUIRED_BUFFER_SEGMENTS",
                defaults.required_buffer_segments,
            ),
            transcription_buffer_min: env_usize(
                "TRANSCRIPTION_BUFFER_MIN",
                defaults.transcription_buffer_min,
            ),
            max_cues_per_language: env_usize(
                "MAX_CUES_PER_LANGUAGE",
                defaults.max_cues_per_language,
            ),
            languages,
            http_port: env_u16("HTTP_PORT", defaults.http_port),
            output_dir: env_string("OUTPUT_DIR", &defaults.output_dir),

            provider_api_url: env_string("PROVIDER_API_URL", &defaults.provider_api_url),
            provider_api_key: env_string("PROVIDER_API_KEY", &defaults.provider_api_key),
            audio_sample_rate: env_u32("AUDIO_SAMPLE_RATE", defaults.audio_sample_rate),
            audio_bit_depth: env_u32("AUDIO_BIT_DEPTH", defaults.audio_bit_depth),
            audio_channels: env_u32("AUDIO_CHANNELS", defaults.audio_channels),
            audio_source_path: env_string("AUDIO_SOURCE_PATH", &defaults.audio_source_path),

            log_format: env_string("LOG_FORMAT", &defaults.log_format),
            log_level: env_string("LOG_LEVEL", &defaults.log_level),

            max_concurrent_connections: Some(env_u32(
                "MAX_CONCURRENT_CONNECTIONS",
                defaults.max_concurrent_connections.unwrap_or(200),
            )),
            rate_limit_rps: Some(env_u32(
                "RATE_LIMIT_RPS",
                defaults.rate_limit_rps.unwrap_or(100),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.segment_duration, 10.0);
        assert_eq!(config.required_buffer_segments, 6);
        assert_eq!(config.transcription_buffer_min, 3);
        assert_eq!(config.source_language(), "ru");
    }

    #[test]
    fn test_socket_addr() {
        let config = Config {
            http_port: 9000,
            ..Default::default()
        };
        assert_eq!(config.socket_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn test_source_language_is_first_entry() {
        let config = Config {
            languages: vec!["ru".to_string(), "en".to_string(), "nl".to_string()],
            ..Default::default()
        };
        assert_eq!(config.source_language(), "ru");
    }
}
