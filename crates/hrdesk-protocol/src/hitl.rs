//! Typed decode of inbound HITL task payloads.
//!
//! Payloads are validated here, at the channel boundary, so the session
//! state machine only ever sees exhaustively-matchable variants instead of
//! probing loosely-typed records.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ticket classification carried by a `ticket_creation` task.
///
/// Unknown types round-trip unchanged; the form only gives `Leave` and
/// `Complaint` special treatment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TicketType {
    Leave,
    Complaint,
    General,
    Other(String),
}

impl From<String> for TicketType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "leave" => Self::Leave,
            "complaint" => Self::Complaint,
            "general" => Self::General,
            _ => Self::Other(raw),
        }
    }
}

impl From<TicketType> for String {
    fn from(ticket_type: TicketType) -> Self {
        match ticket_type {
            TicketType::Leave => "leave".to_string(),
            TicketType::Complaint => "complaint".to_string(),
            TicketType::General => "general".to_string(),
            TicketType::Other(raw) => raw,
        }
    }
}

impl TicketType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Leave => "leave",
            Self::Complaint => "complaint",
            Self::General => "general",
            Self::Other(raw) => raw,
        }
    }

    /// Leave and complaint tickets require an explicit confirmation step.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::Leave | Self::Complaint)
    }
}

/// Fields of a `ticket_creation` task. All optional at decode time; the
/// session layer enforces what submission actually requires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<TicketType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leave_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A HITL task, tagged by its `action` field.
#[derive(Debug, Clone, PartialEq)]
pub enum HitlTask {
    /// The one action the intervention form can interpret.
    TicketCreation { details: TicketDetails },
    /// Any other action is carried opaquely and never reaches the form.
    Other { action: String, payload: Value },
}

impl HitlTask {
    pub fn action(&self) -> &str {
        match self {
            Self::TicketCreation { .. } => "ticket_creation",
            Self::Other { action, .. } => action,
        }
    }
}

/// Payload carried on an intervention channel.
#[derive(Debug, Clone, PartialEq)]
pub struct HitlEventPayload {
    pub task: HitlTask,
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
}

/// Body of the generic `"message"` fallback event. The explicit `channel`
/// field lets consumers match it against their own subscription when the
/// transport does not support native topic filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackEnvelope {
    pub channel: String,
    pub event_data: HitlEventPayload,
}

/// Decode an intervention-channel payload into a typed event.
pub fn parse_hitl_event(value: &Value) -> Result<HitlEventPayload> {
    let object = value
        .as_object()
        .ok_or_else(|| ProtocolError::Protocol("expected JSON object event payload".to_string()))?;

    let task_value = object
        .get("hitl_task")
        .ok_or_else(|| ProtocolError::Protocol("missing hitl_task field".to_string()))?;

    let task = parse_hitl_task(task_value)?;
    let conversation_id = optional_string_field(object, "conversation_id")?;
    let user_id = optional_string_field(object, "user_id")?;

    Ok(HitlEventPayload {
        task,
        conversation_id,
        user_id,
    })
}

/// Decode a tagged HITL task.
pub fn parse_hitl_task(value: &Value) -> Result<HitlTask> {
    let object = value
        .as_object()
        .ok_or_else(|| ProtocolError::Protocol("expected JSON object hitl_task".to_string()))?;

    let action = object
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Protocol("missing hitl_task action".to_string()))?;

    match action {
        "ticket_creation" => {
            let details_value = object
                .get("details")
                .cloned()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
            let details: TicketDetails = serde_json::from_value(details_value).map_err(|error| {
                ProtocolError::Protocol(format!("invalid ticket_creation details: {}", error))
            })?;
            Ok(HitlTask::TicketCreation { details })
        }
        _ => Ok(HitlTask::Other {
            action: action.to_string(),
            payload: value.clone(),
        }),
    }
}

/// Decode a generic `"message"` fallback envelope.
pub fn parse_fallback_envelope(value: &Value) -> Result<FallbackEnvelope> {
    let object = value
        .as_object()
        .ok_or_else(|| ProtocolError::Protocol("expected JSON object envelope".to_string()))?;

    let channel = object
        .get("channel")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Protocol("missing envelope channel".to_string()))?
        .to_string();

    let event_data = object
        .get("event_data")
        .ok_or_else(|| ProtocolError::Protocol("missing envelope event_data".to_string()))?;

    Ok(FallbackEnvelope {
        channel,
        event_data: parse_hitl_event(event_data)?,
    })
}

fn optional_string_field(
    object: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<String>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(ProtocolError::Protocol(format!(
            "invalid {} field type",
            key
        ))),
    }
}
