//! HTTP-backed implementation of the ticket submission seam.

use async_trait::async_trait;
use hrdesk_api_client::{ApiClient, HitlResponseRequest};
use hrdesk_hitl::{SubmitError, SubmitTicket, TicketDraft};

/// Submits HITL responses over the authenticated HTTP client. One request
/// per invocation; retry stays with the user.
pub struct ApiSubmitter {
    client: ApiClient,
}

impl ApiSubmitter {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

/// The request body is the draft's fields merged with the session's
/// conversation and user ids.
pub fn submission_request(
    draft: &TicketDraft,
    conversation_id: &str,
    user_id: &str,
) -> HitlResponseRequest {
    HitlResponseRequest {
        ticket_type: draft.ticket_type().map(|kind| kind.as_str().to_string()),
        subject: draft.subject().map(str::to_string),
        description: draft.description().map(str::to_string),
        leave_days: draft.leave_days(),
        conversation_id: conversation_id.to_string(),
        user_id: user_id.to_string(),
    }
}

#[async_trait]
impl SubmitTicket for ApiSubmitter {
    async fn submit(
        &self,
        draft: &TicketDraft,
        conversation_id: &str,
        user_id: &str,
        access_token: &str,
    ) -> Result<(), SubmitError> {
        let request = submission_request(draft, conversation_id, user_id);
        self.client
            .submit_hitl_response(&request, access_token)
            .await
            .map_err(|error| SubmitError(error.to_string()))
    }
}
