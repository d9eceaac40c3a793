//! Provider Ingest Client (§4.7): owns the lifetime of the speech-provider
//! session so components 4.1–4.6 never see a raw socket.
//!
//! Grounded in the teacher's `jellyfin-hls-proxy/src/handler/websocket.rs`
//! connect/split/forward idiom, generalized from a proxy to an outbound
//! client that also decodes the provider's JSON into typed messages.

use crate::captions::{CaptionStore, Cue};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::provider::{parse_message, ProviderMessage};
use crate::timeline::ReferenceTimeline;
use crate::vtt::RebuildRequest;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::tungstenite::Message;

const SESSION_INIT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_BASE: Duration = Duration::from_secs(5);
const RECONNECT_JITTER_FACTOR: f64 = 0.5;
const RECONNECT_MAX_ATTEMPTS: u32 = 10;
const SHUTDOWN_ACK_TIMEOUT: Duration = Duration::from_millis(500);
const PCM_CHUNK_BYTES: usize = 4096;

#[derive(Debug, Serialize)]
struct LanguageConfig<'a> {
    languages: &'a [String],
    code_switching: bool,
}

#[derive(Debug, Serialize)]
struct CustomVocabularyConfig {
    vocabulary: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RealtimeProcessing {
    custom_vocabulary: bool,
    custom_vocabulary_config: CustomVocabularyConfig,
}

#[derive(Debug, Serialize)]
struct SessionInitRequest<'a> {
    encoding: &'a str,
    sample_rate: u32,
    bit_depth: u32,
    channels: u32,
    language_config: LanguageConfig<'a>,
    realtime_processing: RealtimeProcessing,
}

#[derive(Debug, serde::Deserialize)]
struct SessionInitResponse {
    #[allow(dead_code)]
    id: String,
    url: String,
}

/// Drives the provider session: init, connect, forward PCM out / decode
/// messages in, reconnect on transport error, until the process shuts down.
pub struct ProviderClient {
    config: Config,
    captions: Arc<CaptionStore>,
    timeline: Arc<ReferenceTimeline>,
    rebuild_tx: Sender<RebuildRequest>,
    metrics: Arc<Metrics>,
    http: reqwest::Client,
}

impl ProviderClient {
    pub fn new(
        config: Config,
        captions: Arc<CaptionStore>,
        timeline: Arc<ReferenceTimeline>,
        rebuild_tx: Sender<RebuildRequest>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            captions,
            timeline,
            rebuild_tx,
            metrics,
            http: reqwest::Client::new(),
        }
    }

    /// Run forever: reconnect with jittered exponential back-off on any
    /// transport error, up to `RECONNECT_MAX_ATTEMPTS`. After the cap is
    /// exhausted, ingest stops and the process continues serving whatever
    /// is already published (§5, §7).
    pub async fn run(&self) {
        let mut attempt: u32 = 0;
        loop {
            match self.session_once().await {
                Ok(()) => {
                    tracing::info!("provider session ended cleanly");
                    attempt = 0;
                }
                Err(e) => {
                    attempt += 1;
                    tracing::warn!("provider session error (attempt {}): {}", attempt, e);
                    if attempt >= RECONNECT_MAX_ATTEMPTS {
                        tracing::error!(
                            "provider ingest giving up after {} attempts; continuing to serve existing content",
                            attempt
                        );
                        return;
                    }
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    continue;
                }
            }
        }
    }

    async fn session_once(&self) -> crate::error::Result<()> {
        let ws_url = self.init_session().await?;
        self.connect_and_forward(&ws_url).await
    }

    /// `POST {PROVIDER_API_URL}/v2/live` with `X-Provider-Key` and the
    /// streaming-configuration body (§6, grounded in
    /// `original_source/transcription-service/main.py`'s `init_live_session`).
    async fn init_session(&self) -> crate::error::Result<String> {
        let body = SessionInitRequest {
            encoding: "wav/pcm",
            sample_rate: self.config.audio_sample_rate,
            bit_depth: self.config.audio_bit_depth,
            channels: self.config.audio_channels,
            language_config: LanguageConfig {
                languages: &self.config.languages,
                code_switching: false,
            },
            realtime_processing: RealtimeProcessing {
                custom_vocabulary: false,
                custom_vocabulary_config: CustomVocabularyConfig { vocabulary: Vec::new() },
            },
        };

        let response = self
            .http
            .post(format!("{}/v2/live", self.config.provider_api_url))
            .header("X-Provider-Key", &self.config.provider_api_key)
            .timeout(SESSION_INIT_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| crate::error::CoreError::ProviderTransport(e.to_string()))?;

        let session: SessionInitResponse = response
            .json()
            .await
            .map_err(|e| crate::error::CoreError::ProviderTransport(e.to_string()))?;

        Ok(session.url)
    }

    async fn connect_and_forward(&self, ws_url: &str) -> crate::error::Result<()> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| crate::error::CoreError::ProviderTransport(e.to_string()))?;
        tracing::info!("provider websocket connected");

        let (mut sink, mut stream) = ws_stream.split();

        let audio_source_path = self.config.audio_source_path.clone();
        let outbound = async move {
            let file = tokio::fs::File::open(&audio_source_path).await?;
            let mut reader = tokio::io::BufReader::new(file);
            let mut buf = vec![0u8; PCM_CHUNK_BYTES];
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                if sink.send(Message::Binary(buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
            let _ = sink
                .send(Message::Text(r#"{"type":"stop_recording"}"#.to_string()))
                .await;
            tokio::time::timeout(SHUTDOWN_ACK_TIMEOUT, sink.close()).await.ok();
            Ok::<(), std::io::Error>(())
        };

        let inbound = async {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if self.dispatch(parse_message(&text)) {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => return,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("provider websocket read error: {}", e);
                        return;
                    }
                }
            }
        };

        tokio::select! {
            res = outbound => {
                if let Err(e) = res {
                    return Err(crate::error::CoreError::ProviderTransport(e.to_string()));
                }
            }
            _ = inbound => {}
        }

        Ok(())
    }

    /// Handle one decoded message. Returns `true` if the session should end
    /// (on `SessionEnd`).
    fn dispatch(&self, message: ProviderMessage) -> bool {
        match message {
            ProviderMessage::TranscriptFinal { start, end, text } => {
                self.store_cue(self.config.source_language().to_string(), start, end, text);
                false
            }
            ProviderMessage::Translation { start, end, text, target_language } => {
                self.store_cue(target_language, start, end, text);
                false
            }
            ProviderMessage::SessionEnd => true,
            ProviderMessage::Unknown { raw } => {
                tracing::warn!(raw = %raw, "discarding unrecognized provider message");
                false
            }
        }
    }

    fn store_cue(&self, language: String, start: f64, end: f64, text: String) {
        let start_rel = self.timeline.to_relative_utterance_time(start);
        let end_rel = self.timeline.to_relative_utterance_time(end);
        let cue = Cue::new(language.clone(), start_rel, end_rel, text);
        self.captions.append(cue);
        self.metrics.record_cue_stored(&language);

        let _ = self.rebuild_tx.try_send(RebuildRequest::CueUpdated {
            language,
            start: start_rel,
            end: end_rel,
        });
    }
}

/// Jittered exponential back-off: `base * 2^(attempt-1)`, jittered by
/// ±`RECONNECT_JITTER_FACTOR` (grounded in
/// `original_source/stream-mirroring/main.py`'s `run_ffmpeg` retry loop).
fn backoff_delay(attempt: u32) -> Duration {
    let exp = RECONNECT_BASE.as_secs_f64() * 2f64.powi((attempt.saturating_sub(1)) as i32);
    let jitter_span = exp * RECONNECT_JITTER_FACTOR;
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    Duration::from_secs_f64((exp + jitter).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_within_jitter_bounds() {
        for attempt in 1..=5 {
            let delay = backoff_delay(attempt).as_secs_f64();
            let exp = 5.0 * 2f64.powi((attempt - 1) as i32);
            assert!(delay >= (exp * 0.5).max(0.0) - 0.001);
            assert!(delay <= exp * 1.5 + 0.001);
        }
    }
}
