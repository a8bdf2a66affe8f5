//! Channel name derivation for HITL event topics.
//!
//! Channel names are plain strings shared with the agent backend; the format
//! must match byte-for-byte on both producer and consumer:
//! `HITL_Intervention_Channel:{userId}:{conversationId}:Clerk`.

use crate::error::{ProtocolError, Result};
use std::fmt;

const INTERVENTION_PREFIX: &str = "HITL_Intervention_Channel";
const RESPONSE_PREFIX: &str = "HITL_Response_Channel";

/// Agent role suffix carried by every HITL channel.
pub const CLERK_ROLE: &str = "Clerk";

/// A derived channel name, scoped to one (user, conversation) pair.
///
/// Identical `(user_id, conversation_id)` pairs always derive the identical
/// name, so two subscriptions for the same pair refer to the same logical
/// stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

/// The (user, conversation) pair a channel name is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelScope {
    pub user_id: String,
    pub conversation_id: String,
}

impl ChannelName {
    /// Channel the agent backend broadcasts HITL intervention tasks on.
    pub fn hitl_intervention(user_id: &str, conversation_id: &str) -> Self {
        Self(format!(
            "{INTERVENTION_PREFIX}:{user_id}:{conversation_id}:{CLERK_ROLE}"
        ))
    }

    /// Channel a submitted HITL response is published back on.
    pub fn hitl_response(user_id: &str, conversation_id: &str) -> Self {
        Self(format!(
            "{RESPONSE_PREFIX}:{user_id}:{conversation_id}:{CLERK_ROLE}"
        ))
    }

    /// Wrap an already-rendered channel name without interpreting it.
    pub fn raw(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the (user, conversation) scope from an intervention channel
    /// name. The backend splits on `:`; ids therefore must not contain it.
    pub fn parse_intervention(raw: &str) -> Result<ChannelScope> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 4 || parts[0] != INTERVENTION_PREFIX || parts[3] != CLERK_ROLE {
            return Err(ProtocolError::InvalidChannel(raw.to_string()));
        }
        if parts[1].is_empty() || parts[2].is_empty() {
            return Err(ProtocolError::InvalidChannel(raw.to_string()));
        }
        Ok(ChannelScope {
            user_id: parts[1].to_string(),
            conversation_id: parts[2].to_string(),
        })
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
