//! Prometheus-compatible metrics endpoint.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Metrics collector for the captioning pipeline.
#[derive(Debug)]
pub struct Metrics {
    start_time: Instant,
    request_count: RwLock<u64>,
    requests_by_endpoint: RwLock<HashMap<String, u64>>,
    gate_open: RwLock<bool>,
    segments_observed: RwLock<u64>,
    cues_stored_by_language: RwLock<HashMap<String, u64>>,
    vtt_builds: RwLock<u64>,
    cadence_stalls: RwLock<u64>,
    serving_media_sequence: RwLock<u64>,
    errors_by_type: RwLock<HashMap<String, u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            request_count: RwLock::new(0),
            requests_by_endpoint: RwLock::new(HashMap::new()),
            gate_open: RwLock::new(false),
            segments_observed: RwLock::new(0),
            cues_stored_by_language: RwLock::new(HashMap::new()),
            vtt_builds: RwLock::new(0),
            cadence_stalls: RwLock::new(0),
            serving_media_sequence: RwLock::new(0),
            errors_by_type: RwLock::new(HashMap::new()),
        }
    }

    pub fn record_request(&self, endpoint: &str) {
        *self.request_count.write() += 1;
        *self
            .requests_by_endpoint
            .write()
            .entry(endpoint.to_string())
            .or_insert(0) += 1;
    }

    pub fn set_gate_open(&self) {
        *self.gate_open.write() = true;
    }

    pub fn set_segments_observed(&self, count: u64) {
        *self.segments_observed.write() = count;
    }

    pub fn record_cue_stored(&self, language: &str) {
        *self
            .cues_stored_by_language
            .write()
            .entry(language.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_vtt_build(&self) {
        *self.vtt_builds.write() += 1;
    }

    pub fn record_cadence_stall(&self) {
        *self.cadence_stalls.write() += 1;
    }

    pub fn set_serving_media_sequence(&self, seq: u64) {
        *self.serving_media_sequence.write() = seq;
    }

    pub fn record_error(&self, error_type: &str) {
        *self
            .errors_by_type
            .write()
            .entry(error_type.to_string())
            .or_insert(0) += 1;
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text-exposition format.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP caption_relay_uptime_seconds Server uptime in seconds\n");
        output.push_str("# TYPE caption_relay_uptime_seconds counter\n");
        output.push_str(&format!(
            "caption_relay_uptime_seconds {}\n",
            self.uptime_secs()
        ));

        output.push_str(
            "\n# HELP caption_relay_start_time_seconds Server start time as Unix timestamp\n",
        );
        output.push_str("# TYPE caption_relay_start_time_seconds gauge\n");
        output.push_str(&format!(
            "caption_relay_start_time_seconds {}\n",
            std::time::SystemTime::UNIX_EPOCH
                .elapsed()
                .unwrap_or(Duration::ZERO)
                .as_secs()
                .saturating_sub(self.uptime_secs())
        ));

        output.push_str("\n# HELP caption_relay_requests_total Total number of HTTP requests\n");
        output.push_str("# TYPE caption_relay_requests_total counter\n");
        output.push_str(&format!(
            "caption_relay_requests_total {}\n",
            *self.request_count.read()
        ));

        output.push_str("\n# HELP caption_relay_requests_by_endpoint Requests by endpoint\n");
        output.push_str("# TYPE caption_relay_requests_by_endpoint counter\n");
        for (endpoint, count) in self.requests_by_endpoint.read().iter() {
            output.push_str(&format!(
                "caption_relay_requests_by_endpoint{{endpoint=\"{}\"}} {}\n",
                endpoint, count
            ));
        }

        output.push_str("\n# HELP caption_relay_gate_open Whether the buffer admission gate has opened\n");
        output.push_str("# TYPE caption_relay_gate_open gauge\n");
        output.push_str(&format!(
            "caption_relay_gate_open {}\n",
            if *self.gate_open.read() { 1 } else { 0 }
        ));

        output.push_str("\n# HELP caption_relay_segments_observed Distinct media segments observed by the tracker\n");
        output.push_str("# TYPE caption_relay_segments_observed gauge\n");
        output.push_str(&format!(
            "caption_relay_segments_observed {}\n",
            *self.segments_observed.read()
        ));

        output.push_str("\n# HELP caption_relay_cues_stored_total Finalized cues stored, by language\n");
        output.push_str("# TYPE caption_relay_cues_stored_total counter\n");
        for (lang, count) in self.cues_stored_by_language.read().iter() {
            output.push_str(&format!(
                "caption_relay_cues_stored_total{{language=\"{}\"}} {}\n",
                lang, count
            ));
        }

        output.push_str("\n# HELP caption_relay_vtt_builds_total Total VTT segment builds\n");
        output.push_str("# TYPE caption_relay_vtt_builds_total counter\n");
        output.push_str(&format!(
            "caption_relay_vtt_builds_total {}\n",
            *self.vtt_builds.read()
        ));

        output.push_str("\n# HELP caption_relay_cadence_stalls_total Drip-feed cadence stalls\n");
        output.push_str("# TYPE caption_relay_cadence_stalls_total counter\n");
        output.push_str(&format!(
            "caption_relay_cadence_stalls_total {}\n",
            *self.cadence_stalls.read()
        ));

        output.push_str("\n# HELP caption_relay_serving_media_sequence Current published media sequence\n");
        output.push_str("# TYPE caption_relay_serving_media_sequence gauge\n");
        output.push_str(&format!(
            "caption_relay_serving_media_sequence {}\n",
            *self.serving_media_sequence.read()
        ));

        output.push_str("\n# HELP caption_relay_errors_total Total errors by type\n");
        output.push_str("# TYPE caption_relay_errors_total counter\n");
        for (error_type, count) in self.errors_by_type.read().iter() {
            output.push_str(&format!(
                "caption_relay_errors_total{{type=\"{}\"}} {}\n",
                error_type, count
            ));
        }

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
