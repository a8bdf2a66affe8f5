//! Trait seam for the ticket submission transport.

use crate::draft::TicketDraft;
use crate::error::SubmitError;
use async_trait::async_trait;

/// Performs the one-shot authenticated request that finalizes a HITL
/// response. Implementations must not retry on failure; retry is a
/// user-initiated re-invocation.
#[async_trait]
pub trait SubmitTicket: Send + Sync {
    async fn submit(
        &self,
        draft: &TicketDraft,
        conversation_id: &str,
        user_id: &str,
        access_token: &str,
    ) -> Result<(), SubmitError>;
}
