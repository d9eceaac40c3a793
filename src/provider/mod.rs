//! Provider Message decoding (§3, §9): a tagged-variant decode of the
//! speech-provider's JSON, parsed once at the ingest boundary so the rest of
//! the system works in typed values.

pub mod client;

use serde::Deserialize;

/// A decoded speech-provider message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderMessage {
    TranscriptFinal { start: f64, end: f64, text: String },
    Translation { start: f64, end: f64, text: String, target_language: String },
    SessionEnd,
    Unknown { raw: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Utterance {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptData {
    #[serde(default)]
    is_final: bool,
    utterance: Utterance,
}

#[derive(Debug, Deserialize)]
struct TranslatedUtterance {
    text: String,
}

/// Shape 1: `{data: {utterance, translated_utterance: {text}, target_language}}`.
#[derive(Debug, Deserialize)]
struct TranslationV1Data {
    utterance: Utterance,
    translated_utterance: TranslatedUtterance,
    target_language: String,
}

/// Shape 2: `{data: {translation: {start, end, text, target_language}}}`.
#[derive(Debug, Deserialize)]
struct TranslationV2Inner {
    start: f64,
    end: f64,
    text: String,
    target_language: String,
}

#[derive(Debug, Deserialize)]
struct TranslationV2Data {
    translation: TranslationV2Inner,
}

/// Parse one raw JSON text frame from the provider into a `ProviderMessage`.
/// Malformed JSON, a missing `type`, or a `type` that doesn't match any
/// known shape all collapse to `Unknown` rather than an error (§7, Provider
/// protocol error: log and discard, never crash the ingest task).
pub fn parse_message(raw: &str) -> ProviderMessage {
    let envelope: Envelope = match serde_json::from_str(raw) {
        Ok(e) => e,
        Err(_) => return ProviderMessage::Unknown { raw: raw.to_string() },
    };

    let Some(data) = envelope.data.clone() else {
        return match envelope.kind.as_str() {
            "post_final_transcript" => ProviderMessage::SessionEnd,
            _ => ProviderMessage::Unknown { raw: raw.to_string() },
        };
    };

    match envelope.kind.as_str() {
        "transcript" => match serde_json::from_value::<TranscriptData>(data) {
            Ok(t) if t.is_final => ProviderMessage::TranscriptFinal {
                start: t.utterance.start,
                end: t.utterance.end,
                text: t.utterance.text,
            },
            Ok(_) => ProviderMessage::Unknown { raw: raw.to_string() },
            Err(_) => ProviderMessage::Unknown { raw: raw.to_string() },
        },
        "translation" => {
            if let Ok(v1) = serde_json::from_value::<TranslationV1Data>(data.clone()) {
                ProviderMessage::Translation {
                    start: v1.utterance.start,
                    end: v1.utterance.end,
                    text: v1.translated_utterance.text,
                    target_language: v1.target_language,
                }
            } else if let Ok(v2) = serde_json::from_value::<TranslationV2Data>(data) {
                ProviderMessage::Translation {
                    start: v2.translation.start,
                    end: v2.translation.end,
                    text: v2.translation.text,
                    target_language: v2.translation.target_language,
                }
            } else {
                ProviderMessage::Unknown { raw: raw.to_string() }
            }
        }
        "post_final_transcript" => ProviderMessage::SessionEnd,
        _ => ProviderMessage::Unknown { raw: raw.to_string() },
    }
}
