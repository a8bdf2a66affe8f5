//! Wire and domain types shared by the HRDesk client crates.
//!
//! This crate intentionally exposes a small surface:
//! - channel name derivation/parsing for HITL event topics
//! - typed decode of inbound HITL task payloads
//! - chat message and summary records

pub mod channel;
pub mod error;
pub mod hitl;
pub mod message;

pub use channel::{ChannelName, ChannelScope};
pub use error::{ProtocolError, Result};
pub use hitl::{
    FallbackEnvelope, HitlEventPayload, HitlTask, TicketDetails, TicketType,
    parse_fallback_envelope, parse_hitl_event, parse_hitl_task,
};
pub use message::{ChatMessage, ChatSummary, MessageRole, derive_chat_title};
