use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SUMMARY_WORD_LIMIT: usize = 250;
pub const SUMMARY_CONTINUATION_MARKER: &str = "...";

pub const STRUCTURED_PREFIX: &str = "WS:";
pub const PROGRESS_PREFIX: &str = "progress:";
pub const SUMMARY_PREFIX: &str = "summary:";

// Markers used by the pre-migration server protocol. Both grammars must be
// accepted until every deployment forwards structured `WS:` events.
pub const LEGACY_RECEIVED_MARKER: &str = "📁 Received";
pub const LEGACY_CONFIRMED_MARKER: &str = "✅";
pub const LEGACY_SUMMARY_MARKER: &str = "📝";
pub const LEGACY_WARNING_MARKER: &str = "⚠️";

/// Document content types the server accepts for upload.
pub const ALLOWED_UPLOAD_TYPES: [&str; 8] = [
    "application/pdf",
    "text/plain",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

/// One inbound text frame, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Progress { percent: String },
    Summary { text: String },
    Generic { text: String },
    LegacyStatus { text: String },
    Warning { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundPayload {
    UserMessage {
        message: String,
    },
    FileUpload {
        filename: String,
        content_type: String,
        data: String,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Classify a raw inbound frame. Total: every input maps to exactly one
/// event, with unmatched text falling through to `Generic`.
pub fn classify(raw_frame: &str) -> InboundEvent {
    if let Some(content) = raw_frame.strip_prefix(STRUCTURED_PREFIX) {
        if let Some(percent) = content.strip_prefix(PROGRESS_PREFIX) {
            return InboundEvent::Progress {
                percent: percent.to_owned(),
            };
        }
        if let Some(summary) = content.strip_prefix(SUMMARY_PREFIX) {
            return InboundEvent::Summary {
                text: truncate_summary(summary),
            };
        }
        return InboundEvent::Generic {
            text: content.to_owned(),
        };
    }

    if raw_frame.starts_with(LEGACY_RECEIVED_MARKER)
        || raw_frame.starts_with(LEGACY_CONFIRMED_MARKER)
    {
        return InboundEvent::LegacyStatus {
            text: raw_frame.to_owned(),
        };
    }
    if let Some(rest) = raw_frame.strip_prefix(LEGACY_SUMMARY_MARKER) {
        return InboundEvent::Summary {
            text: truncate_summary(rest.trim_start()),
        };
    }
    if raw_frame.starts_with(LEGACY_WARNING_MARKER) {
        return InboundEvent::Warning {
            text: raw_frame.to_owned(),
        };
    }

    InboundEvent::Generic {
        text: raw_frame.to_owned(),
    }
}

/// Cap a summary at [`SUMMARY_WORD_LIMIT`] tokens.
///
/// Tokens are single-space-delimited; consecutive spaces produce empty tokens
/// that count toward the limit and survive the rejoin, so text within the
/// limit round-trips byte for byte.
pub fn truncate_summary(text: &str) -> String {
    let words: Vec<&str> = text.split(' ').collect();
    if words.len() <= SUMMARY_WORD_LIMIT {
        return words.join(" ");
    }

    let mut truncated = words[..SUMMARY_WORD_LIMIT].join(" ");
    truncated.push_str(SUMMARY_CONTINUATION_MARKER);
    truncated
}

pub fn user_message(text: &str) -> OutboundPayload {
    OutboundPayload::UserMessage {
        message: text.to_owned(),
    }
}

pub fn file_upload(filename: &str, content_type: &str, bytes: &[u8]) -> OutboundPayload {
    let data = base64::engine::general_purpose::STANDARD.encode(bytes);
    OutboundPayload::FileUpload {
        filename: filename.to_owned(),
        content_type: content_type.to_owned(),
        data,
    }
}

pub fn encode_payload(payload: &OutboundPayload) -> Result<String, ProtocolError> {
    serde_json::to_string(payload).map_err(|err| ProtocolError::Serialization(err.to_string()))
}

pub fn is_allowed_upload_type(content_type: &str) -> bool {
    ALLOWED_UPLOAD_TYPES.contains(&content_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(count: usize) -> String {
        (0..count)
            .map(|index| format!("w{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn progress_frame_keeps_exact_suffix() {
        let event = classify("WS:progress:42");
        assert_eq!(
            event,
            InboundEvent::Progress {
                percent: "42".to_owned()
            }
        );

        let event = classify("WS:progress:almost done");
        assert_eq!(
            event,
            InboundEvent::Progress {
                percent: "almost done".to_owned()
            }
        );
    }

    #[test]
    fn structured_summary_is_truncated() {
        let frame = format!("WS:summary:{}", words(251));
        let event = classify(&frame);
        match event {
            InboundEvent::Summary { text } => {
                assert!(text.ends_with(SUMMARY_CONTINUATION_MARKER));
                let trimmed = text.trim_end_matches(SUMMARY_CONTINUATION_MARKER);
                assert_eq!(trimmed.split(' ').count(), SUMMARY_WORD_LIMIT);
                assert_eq!(trimmed, words(250));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn structured_summary_within_limit_is_untouched() {
        let frame = format!("WS:summary:{}", words(250));
        let event = classify(&frame);
        assert_eq!(
            event,
            InboundEvent::Summary {
                text: words(250)
            }
        );
    }

    #[test]
    fn structured_frame_without_known_kind_is_generic() {
        let event = classify("WS:status:indexing");
        assert_eq!(
            event,
            InboundEvent::Generic {
                text: "status:indexing".to_owned()
            }
        );
    }

    #[test]
    fn legacy_status_markers_keep_full_frame() {
        for frame in ["📁 Received report.pdf", "✅ indexed 3 chunks"] {
            let event = classify(frame);
            assert_eq!(
                event,
                InboundEvent::LegacyStatus {
                    text: frame.to_owned()
                }
            );
        }
    }

    #[test]
    fn legacy_summary_marker_is_stripped_and_truncated() {
        let event = classify(&format!("📝 {}", words(3)));
        assert_eq!(event, InboundEvent::Summary { text: words(3) });

        let event = classify(&format!("📝 {}", words(300)));
        match event {
            InboundEvent::Summary { text } => {
                assert!(text.ends_with(SUMMARY_CONTINUATION_MARKER));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn legacy_warning_marker_keeps_full_frame() {
        let event = classify("⚠️ index unavailable");
        assert_eq!(
            event,
            InboundEvent::Warning {
                text: "⚠️ index unavailable".to_owned()
            }
        );
    }

    #[test]
    fn unmarked_frame_is_generic() {
        let event = classify("hello there");
        assert_eq!(
            event,
            InboundEvent::Generic {
                text: "hello there".to_owned()
            }
        );
    }

    #[test]
    fn truncation_preserves_consecutive_spaces_within_limit() {
        let text = "a  b   c";
        assert_eq!(truncate_summary(text), text);
    }

    #[test]
    fn truncation_boundary_at_exactly_251_tokens() {
        let input = words(251);
        let output = truncate_summary(&input);
        let expected = format!("{}{}", words(250), SUMMARY_CONTINUATION_MARKER);
        assert_eq!(output, expected);
    }

    #[test]
    fn user_message_payload_shape() {
        let payload = user_message("hi bot");
        let json = encode_payload(&payload).expect("encode user message");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse json");
        assert_eq!(value["type"], "user_message");
        assert_eq!(value["message"], "hi bot");
    }

    #[test]
    fn file_upload_payload_shape() {
        let payload = file_upload("notes.txt", "text/plain", b"hello");
        let json = encode_payload(&payload).expect("encode file upload");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse json");
        assert_eq!(value["type"], "file_upload");
        assert_eq!(value["filename"], "notes.txt");
        assert_eq!(value["content_type"], "text/plain");
        assert_eq!(value["data"], "aGVsbG8=");
    }

    #[test]
    fn file_upload_round_trips_bytes() {
        let engine = base64::engine::general_purpose::STANDARD;
        for size in [0_usize, 1, 96 * 1024] {
            let bytes: Vec<u8> = (0..size).map(|index| (index % 251) as u8).collect();
            let payload = file_upload("blob.bin", "application/pdf", &bytes);
            match payload {
                OutboundPayload::FileUpload { data, .. } => {
                    let decoded = engine.decode(data.as_bytes()).expect("decode base64");
                    assert_eq!(decoded, bytes, "round trip failed for size {size}");
                }
                other => panic!("unexpected payload: {other:?}"),
            }
        }
    }

    #[test]
    fn upload_allow_list_accepts_documents_only() {
        for allowed in ALLOWED_UPLOAD_TYPES {
            assert!(is_allowed_upload_type(allowed), "{allowed} should be allowed");
        }
        assert!(!is_allowed_upload_type("application/zip"));
        assert!(!is_allowed_upload_type("image/png"));
        assert!(!is_allowed_upload_type(""));
    }
}
