//! Socket frame encode/decode.
//!
//! Frames are JSON arrays: `["event", channel, payload]` for native topic
//! delivery, `["message", envelope]` for the generic fallback the transport
//! emits when topic filtering is unavailable. Both are normalized into the
//! same typed dispatch path, so consumers never see the delivery mechanism.

use crate::error::{ChannelError, Result};
use hrdesk_protocol::hitl::{parse_fallback_envelope, parse_hitl_event};
use hrdesk_protocol::{FallbackEnvelope, HitlEventPayload};
use serde_json::{Value, json};

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketFrame {
    /// Native topic delivery on a named channel.
    Event {
        channel: String,
        payload: HitlEventPayload,
    },
    /// Generic `"message"` fallback carrying an explicit channel field.
    Fallback(FallbackEnvelope),
}

impl SocketFrame {
    /// Channel name the frame targets, regardless of delivery mechanism.
    pub fn channel(&self) -> &str {
        match self {
            Self::Event { channel, .. } => channel,
            Self::Fallback(envelope) => &envelope.channel,
        }
    }

    /// Event payload, regardless of delivery mechanism.
    pub fn payload(&self) -> &HitlEventPayload {
        match self {
            Self::Event { payload, .. } => payload,
            Self::Fallback(envelope) => &envelope.event_data,
        }
    }
}

/// Parse inbound JSON text into a typed frame. Unknown frame kinds decode to
/// `None` and are skipped.
pub fn parse_socket_frame(text: &str) -> Result<Option<SocketFrame>> {
    let value: Value = serde_json::from_str(text)?;
    let array = value
        .as_array()
        .ok_or_else(|| ChannelError::Frame("expected JSON array frame".to_string()))?;
    if array.is_empty() {
        return Ok(None);
    }

    let kind = array[0]
        .as_str()
        .ok_or_else(|| ChannelError::Frame("missing frame kind".to_string()))?;

    match kind {
        "event" => {
            if array.len() < 3 {
                return Err(ChannelError::Frame("invalid event frame".to_string()));
            }
            let channel = array[1]
                .as_str()
                .ok_or_else(|| ChannelError::Frame("invalid event channel".to_string()))?
                .to_string();
            let payload = parse_hitl_event(&array[2])?;
            Ok(Some(SocketFrame::Event { channel, payload }))
        }
        "message" => {
            if array.len() < 2 {
                return Err(ChannelError::Frame("invalid message frame".to_string()));
            }
            let envelope = parse_fallback_envelope(&array[1])?;
            Ok(Some(SocketFrame::Fallback(envelope)))
        }
        _ => Ok(None),
    }
}

/// Encode the transport-level join for a channel name.
pub fn encode_join(channel: &str) -> Value {
    json!(["join_room", channel])
}

/// Encode the transport-level leave for a channel name.
pub fn encode_leave(channel: &str) -> Value {
    json!(["leave_room", channel])
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrdesk_protocol::HitlTask;

    #[test]
    fn native_event_frame_decodes() -> Result<()> {
        let text = r#"["event","HITL_Intervention_Channel:u:c:Clerk",{"hitl_task":{"action":"ticket_creation","details":{"ticket_type":"general"}}}]"#;
        let frame = parse_socket_frame(text)?
            .ok_or_else(|| ChannelError::Frame("expected frame".to_string()))?;
        assert_eq!(frame.channel(), "HITL_Intervention_Channel:u:c:Clerk");
        assert!(matches!(
            frame.payload().task,
            HitlTask::TicketCreation { .. }
        ));
        Ok(())
    }

    #[test]
    fn fallback_frame_decodes_to_same_payload_shape() -> Result<()> {
        let text = r#"["message",{"channel":"HITL_Intervention_Channel:u:c:Clerk","event_data":{"hitl_task":{"action":"ticket_creation","details":{}}}}]"#;
        let frame = parse_socket_frame(text)?
            .ok_or_else(|| ChannelError::Frame("expected frame".to_string()))?;
        assert_eq!(frame.channel(), "HITL_Intervention_Channel:u:c:Clerk");
        assert_eq!(frame.payload().task.action(), "ticket_creation");
        Ok(())
    }

    #[test]
    fn unknown_frame_kinds_are_skipped() -> Result<()> {
        assert!(parse_socket_frame(r#"["ping"]"#)?.is_none());
        assert!(parse_socket_frame("[]")?.is_none());
        Ok(())
    }

    #[test]
    fn malformed_frames_are_rejected() {
        struct Case {
            name: &'static str,
            input: &'static str,
            expected_error_fragment: &'static str,
        }

        let cases = vec![
            Case {
                name: "non-array frame",
                input: r#"{"kind":"event"}"#,
                expected_error_fragment: "expected JSON array frame",
            },
            Case {
                name: "kind is not string",
                input: "[7]",
                expected_error_fragment: "missing frame kind",
            },
            Case {
                name: "event too short",
                input: r#"["event","chan"]"#,
                expected_error_fragment: "invalid event frame",
            },
            Case {
                name: "event channel type",
                input: r#"["event",7,{}]"#,
                expected_error_fragment: "invalid event channel",
            },
            Case {
                name: "message too short",
                input: r#"["message"]"#,
                expected_error_fragment: "invalid message frame",
            },
            Case {
                name: "message envelope shape",
                input: r#"["message",{"event_data":{}}]"#,
                expected_error_fragment: "missing envelope channel",
            },
        ];

        for case in cases {
            let result = parse_socket_frame(case.input);
            assert!(result.is_err(), "{}: expected an error", case.name);
            if let Err(error) = result {
                let rendered = error.to_string();
                assert!(
                    rendered.contains(case.expected_error_fragment),
                    "{}: expected error fragment '{}' in '{}'",
                    case.name,
                    case.expected_error_fragment,
                    rendered
                );
            }
        }
    }

    #[test]
    fn join_and_leave_encode_as_arrays() {
        assert_eq!(
            encode_join("CH").to_string(),
            r#"["join_room","CH"]"#
        );
        assert_eq!(
            encode_leave("CH").to_string(),
            r#"["leave_room","CH"]"#
        );
    }
}
