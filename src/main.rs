//! Live captioning relay
//!
//! Ingests a single upstream broadcast's transcoded segments and a
//! speech-to-text provider's finalized utterances, and republishes a
//! delayed, constant-latency HLS presentation whose segments carry
//! perfectly aligned per-language WebVTT subtitle tracks.

#![allow(dead_code)]

mod captions;
mod config;
mod config_file;
mod dripfeed;
mod error;
mod fsutil;
mod gate;
mod http;
mod limits;
mod metrics;
mod playlist;
mod provider;
mod state;
mod timeline;
mod tracker;
mod vtt;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::Result;
use crate::http::create_router;
use crate::provider::client::ProviderClient;
use crate::state::AppState;
use crate::vtt::{RebuildRequest, VttSegmentBuilder};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_NAME: &str = "caption-relay";

/// Periodic full-rebuild cadence, in segment-polling ticks (§4.4).
const PERIODIC_REFRESH_TICKS: u64 = 10;
const REBUILD_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    let config_path = std::env::args().nth(1);
    let config = crate::config_file::load(config_path.as_deref());
    tracing::info!(?config, "configuration loaded");

    std::fs::create_dir_all(&config.output_dir).map_err(|e| {
        crate::error::CoreError::Fatal(format!("cannot create output root: {e}"))
    })?;

    let state = Arc::new(AppState::new(config.clone()));

    let (rebuild_tx, rebuild_rx) = mpsc::channel::<RebuildRequest>(REBUILD_CHANNEL_CAPACITY);

    // Activity 1: provider ingest.
    {
        let client = ProviderClient::new(
            state.config.clone(),
            state.captions.clone(),
            state.timeline.clone(),
            rebuild_tx.clone(),
            state.metrics.clone(),
        );
        tokio::spawn(async move {
            client.run().await;
        });
    }

    // Activity 2 (+3, folded in): segment polling at 1 Hz, gate evaluation,
    // and periodic-refresh triggering.
    {
        let state = state.clone();
        let rebuild_tx = rebuild_tx.clone();
        tokio::spawn(run_segment_polling(state, rebuild_tx));
    }

    // Builder consumer: the single consumer of the rebuild-request channel.
    {
        let state = state.clone();
        tokio::spawn(run_builder_consumer(state, rebuild_rx));
    }

    // Activity 4: drip-feed cadence.
    {
        let dripfeed_config = crate::dripfeed::DripFeedConfig {
            output_dir: state.output_dir.clone(),
            segment_duration: config.segment_duration,
            serving_window_size: config.serving_window_size,
            languages: config.languages.clone(),
        };
        let gate = state.gate.clone();
        let metrics = state.metrics.clone();
        tokio::spawn(crate::dripfeed::run(dripfeed_config, gate, metrics));
    }

    // Activity 5: HTTP serving.
    let app = create_router(state.clone());
    let addr: SocketAddr = state
        .config
        .socket_addr()
        .parse()
        .map_err(|e| crate::error::CoreError::Fatal(format!("invalid HTTP_PORT: {e}")))?;
    tracing::info!("starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| crate::error::CoreError::Fatal(format!("HTTP bind failure: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::CoreError::Fatal(e.to_string()))?;

    Ok(())
}

/// Poll both media trackers at 1 Hz, trigger per-segment builds on change,
/// evaluate the gate, and fold in the periodic full-refresh every
/// `PERIODIC_REFRESH_TICKS` ticks (§4.3, §4.4, §4.5, §5).
async fn run_segment_polling(state: Arc<AppState>, rebuild_tx: mpsc::Sender<RebuildRequest>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut tick: u64 = 0;
    let mut known_video_seqs: std::collections::HashSet<u64> = std::collections::HashSet::new();

    loop {
        ticker.tick().await;
        tick += 1;

        let video_changed = state.video_tracker.poll(&state.timeline);
        let audio_changed = state.audio_tracker.poll(&state.timeline);

        if video_changed {
            let observed: std::collections::HashSet<u64> =
                state.video_tracker.observed_sequences().into_iter().collect();
            for &seq in observed.difference(&known_video_seqs) {
                let _ = rebuild_tx.try_send(RebuildRequest::NewSegment(seq));
            }
            known_video_seqs = observed;
        }

        if video_changed || audio_changed {
            state
                .metrics
                .set_segments_observed(state.video_tracker.observed_sequences().len() as u64);
        }

        if tick % PERIODIC_REFRESH_TICKS == 0 {
            let _ = rebuild_tx.try_send(RebuildRequest::Periodic);
        }

        let opened = state.gate.evaluate(
            &state.video_tracker.observed_sequences(),
            state.captions.len(state.config.source_language()),
            state.last_write_ok(),
        );
        if opened {
            state.metrics.set_gate_open();
            tracing::info!(
                first_serving_segment = state.gate.first_serving_segment(),
                "buffer admission gate opened"
            );
        }
    }
}

/// The rebuild-request channel's single consumer: dispatches each request to
/// the VTT Segment Builder.
async fn run_builder_consumer(state: Arc<AppState>, mut rebuild_rx: mpsc::Receiver<RebuildRequest>) {
    while let Some(request) = rebuild_rx.recv().await {
        match request {
            RebuildRequest::NewSegment(seq) => {
                build_for_languages(&state, std::slice::from_ref(&seq), None).await;
            }
            RebuildRequest::CueUpdated { language, start, end } => {
                let windows = state.video_tracker.segment_windows();
                let fallback = state.builder.latest_known_segment();
                let seqs = crate::vtt::segments_to_rebuild_for_cue(&windows, start, end, fallback);
                build_for_languages(&state, &seqs, Some(&language)).await;
            }
            RebuildRequest::Periodic => {
                for language in &state.config.languages {
                    let seqs = state.builder.known_segments(language);
                    build_for_languages(&state, &seqs, Some(language)).await;
                }
            }
        }
    }
}

async fn build_for_languages(state: &Arc<AppState>, seqs: &[u64], only_language: Option<&str>) {
    let Some(first_segment_sequence) = state.video_tracker.first_segment_sequence() else {
        return;
    };

    let languages: Vec<&str> = match only_language {
        Some(lang) => vec![lang],
        None => state.config.languages.iter().map(|s| s.as_str()).collect(),
    };

    for &seq in seqs {
        for &language in &languages {
            let result = build_one(
                state.builder.clone(),
                state.captions.clone(),
                first_segment_sequence,
                seq,
                language.to_string(),
            )
            .await;
            match result {
                Ok(()) => {
                    state.set_last_write_ok(true);
                    state.metrics.record_vtt_build();
                }
                Err(e) => {
                    tracing::error!(seq, language, "VTT build failed: {}", e);
                    state.set_last_write_ok(false);
                    state.metrics.record_error("vtt_build");
                }
            }
        }
    }
}

/// Run one VTT build off the async critical path (§5: blocking file writes,
/// including the atomic-write retry back-off, are dispatched to a blocking
/// thread via `spawn_blocking` so they never stall the builder's tokio task).
async fn build_one(
    builder: Arc<VttSegmentBuilder>,
    captions: Arc<crate::captions::CaptionStore>,
    first_segment_sequence: u64,
    seq: u64,
    language: String,
) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        builder.build(&captions, first_segment_sequence, seq, &language).map(|_| ())
    })
    .await
    .unwrap_or_else(|e| Err(crate::error::CoreError::Fatal(format!("builder task panicked: {e}"))))
}

fn init_logging() {
    let config = crate::config::Config::from_env();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("caption_relay={}", config.log_level).into());

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
