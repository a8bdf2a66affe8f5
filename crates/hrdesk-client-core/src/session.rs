//! Wires the transport, session, and timeline layers together for one
//! client process.
//!
//! [`ClientCore`] owns the shared pieces (socket manager, HTTP client,
//! submission seam, HITL session table); a [`ConversationSession`] is the
//! per-conversation view over them, created when the user opens a
//! conversation and released when they navigate away. Releasing it tears
//! down the HITL session for the pair, so an in-flight submission that
//! completes afterwards lands as stale and mutates nothing.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};
use hrdesk_api_client::{
    ApiClient, ApiClientConfig, CreateChatRequest, DEFAULT_CHAT_PAGE_SIZE, SendMessageRequest,
};
use hrdesk_channel::{EventHandler, ManagerConfig, SubscriptionHandle, SubscriptionManager};
use hrdesk_hitl::{
    CompletionOutcome, SessionKey, SessionManager, SessionState, SubmitDecision, SubmitTicket,
    TaskOutcome, TicketDraft, ValidationError,
};
use hrdesk_protocol::{ChannelName, ChatMessage, ChatSummary, HitlEventPayload, HitlTask, MessageRole};
use hrdesk_timeline::{LocalId, TimelineEntry, TimelineStore};
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::error::Result;
use crate::submit::ApiSubmitter;

/// Pending optimistic entries older than this are dropped on
/// [`ConversationSession::expire_stale`].
pub const PENDING_ENTRY_TTL_SECS: i64 = 120;

/// Process-wide client state shared by every open conversation.
pub struct ClientCore {
    socket: Arc<SubscriptionManager>,
    api: ApiClient,
    submitter: Arc<dyn SubmitTicket>,
    sessions: Arc<Mutex<SessionManager>>,
}

impl ClientCore {
    pub fn new(config: &CoreConfig) -> Result<Self> {
        let api = ApiClient::new(ApiClientConfig::new(&config.api_base_url))?;
        let submitter = Arc::new(ApiSubmitter::new(api.clone()));
        Self::with_submitter(config, api, submitter)
    }

    /// Build a core with a custom submission seam.
    pub fn with_submitter(
        config: &CoreConfig,
        api: ApiClient,
        submitter: Arc<dyn SubmitTicket>,
    ) -> Result<Self> {
        let socket = Arc::new(SubscriptionManager::new(ManagerConfig::new(
            &config.socket_url,
        ))?);
        Ok(Self {
            socket,
            api,
            submitter,
            sessions: Arc::new(Mutex::new(SessionManager::new())),
        })
    }

    /// One page of the user's chats, most recent first.
    pub async fn list_chats(&self, page: usize, access_token: &str) -> Result<Vec<ChatSummary>> {
        let summaries = self
            .api
            .fetch_chats(page * DEFAULT_CHAT_PAGE_SIZE, DEFAULT_CHAT_PAGE_SIZE, access_token)
            .await?;
        Ok(summaries)
    }

    pub async fn leave_balance(&self, access_token: &str) -> Result<u32> {
        Ok(self.api.fetch_leave_balance(access_token).await?)
    }

    /// Create a chat from its first message and open a session on it. The
    /// first message is persisted by the creation call, so the opening
    /// refresh already shows it confirmed.
    pub async fn start_chat(
        &self,
        user_id: &str,
        content: &str,
        access_token: &str,
    ) -> Result<ConversationSession> {
        let request = CreateChatRequest::from_first_message(SendMessageRequest {
            content: content.to_string(),
            role: MessageRole::User,
            attachment_url: None,
            attachment_name: None,
            client_ref: None,
        });
        let created = self.api.create_chat(&request, access_token).await?;
        let session = self.open_conversation(user_id, &created.chat_id).await?;
        session.refresh(access_token).await?;
        Ok(session)
    }

    /// Open a conversation: subscribe its HITL intervention channel and set
    /// up an empty timeline for it. The caller refreshes to load history.
    pub async fn open_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<ConversationSession> {
        let key = SessionKey::new(user_id, conversation_id);
        let channel = ChannelName::hitl_intervention(user_id, conversation_id);

        let sessions = Arc::clone(&self.sessions);
        let handler_key = key.clone();
        let handler: EventHandler =
            Arc::new(move |payload| handle_incoming(&sessions, &handler_key, &payload));

        let subscription = self.socket.subscribe(channel, handler).await?;
        Ok(ConversationSession {
            key,
            subscription: Some(subscription),
            socket: Arc::clone(&self.socket),
            api: self.api.clone(),
            submitter: Arc::clone(&self.submitter),
            sessions: Arc::clone(&self.sessions),
            timeline: Mutex::new(TimelineStore::new(conversation_id)),
        })
    }
}

/// Outcome of a submit request, flattened for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitFlow {
    /// No HITL session is open for this conversation.
    NoSession,
    /// Validation failed; the form stays editable.
    Rejected(ValidationError),
    /// The ticket needs the read-only confirmation step.
    AwaitingConfirmation,
    /// A submission is already in flight.
    InFlight,
    /// A submission ran; see the completion outcome.
    Completed(CompletionOutcome),
}

/// One open conversation: its timeline, its channel subscription, and a
/// handle on the shared HITL session table.
pub struct ConversationSession {
    key: SessionKey,
    subscription: Option<SubscriptionHandle>,
    socket: Arc<SubscriptionManager>,
    api: ApiClient,
    submitter: Arc<dyn SubmitTicket>,
    sessions: Arc<Mutex<SessionManager>>,
    timeline: Mutex<TimelineStore>,
}

/// A file attached to an outgoing message.
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ConversationSession {
    pub fn conversation_id(&self) -> &str {
        &self.key.conversation_id
    }

    pub fn hitl_state(&self) -> Option<SessionState> {
        lock(&self.sessions)
            .session(&self.key)
            .map(hrdesk_hitl::HitlSession::state)
    }

    /// Apply `edit` to the open session's draft. Returns false when no
    /// session is open or the draft is not editable in the current state.
    pub fn edit_draft(&self, edit: impl FnOnce(&mut TicketDraft)) -> bool {
        let mut sessions = lock(&self.sessions);
        let Some(session) = sessions.session_mut(&self.key) else {
            return false;
        };
        match session.draft_mut() {
            Some(draft) => {
                edit(draft);
                true
            }
            None => false,
        }
    }

    /// The user pressed submit on the HITL form.
    pub async fn submit_hitl(&self, access_token: &str) -> SubmitFlow {
        let step = lock(&self.sessions).request_submit(&self.key);
        match step {
            None => SubmitFlow::NoSession,
            Some((SubmitDecision::Rejected(error), _)) => SubmitFlow::Rejected(error),
            Some((SubmitDecision::Confirm, _)) => SubmitFlow::AwaitingConfirmation,
            Some((SubmitDecision::InvalidState, _)) => SubmitFlow::InFlight,
            Some((SubmitDecision::Submit, Some(pending))) => SubmitFlow::Completed(
                drive_submission(&self.sessions, self.submitter.as_ref(), pending, access_token)
                    .await,
            ),
            Some((SubmitDecision::Submit, None)) => SubmitFlow::InFlight,
        }
    }

    /// The user confirmed the read-only summary. `None` when the session is
    /// missing or not confirming.
    pub async fn confirm_hitl(&self, access_token: &str) -> Option<CompletionOutcome> {
        let pending = lock(&self.sessions).confirm(&self.key)?;
        Some(drive_submission(&self.sessions, self.submitter.as_ref(), pending, access_token).await)
    }

    /// `Back` from the confirmation summary to the editable form.
    pub fn cancel_confirmation(&self) -> bool {
        lock(&self.sessions).confirm_back(&self.key)
    }

    /// Explicit dismissal. Refused while a submission is in flight.
    pub fn dismiss_hitl(&self) -> bool {
        lock(&self.sessions).dismiss(&self.key)
    }

    /// Send a user message: optimistic append, optional upload, persist
    /// with the correlation token, then reconcile against the server list.
    /// On failure the optimistic entry is marked failed and kept visible.
    pub async fn send_message(
        &self,
        content: &str,
        attachment: Option<Attachment>,
        access_token: &str,
    ) -> Result<LocalId> {
        let attachment_name = attachment.as_ref().map(|file| file.file_name.clone());
        let local_id = lock(&self.timeline).append_optimistic(
            content,
            MessageRole::User,
            attachment_name.clone(),
            Utc::now(),
        );

        match self
            .deliver(content, attachment, attachment_name, &local_id, access_token)
            .await
        {
            Ok(messages) => {
                lock(&self.timeline).reconcile(&messages);
                Ok(local_id)
            }
            Err(error) => {
                warn!("send failed for {}: {}", local_id.as_str(), error);
                lock(&self.timeline).fail_pending(&local_id);
                Err(error)
            }
        }
    }

    async fn deliver(
        &self,
        content: &str,
        attachment: Option<Attachment>,
        attachment_name: Option<String>,
        local_id: &LocalId,
        access_token: &str,
    ) -> Result<Vec<ChatMessage>> {
        let attachment_url = match attachment {
            Some(file) => {
                let upload = self
                    .api
                    .upload_document(&file.file_name, file.bytes, Utc::now(), access_token)
                    .await?;
                Some(upload.public_url)
            }
            None => None,
        };

        let request = SendMessageRequest {
            content: content.to_string(),
            role: MessageRole::User,
            attachment_url,
            attachment_name,
            client_ref: Some(local_id.as_str().to_string()),
        };
        self.api
            .send_message(&self.key.conversation_id, &request, access_token)
            .await?;

        let messages = self
            .api
            .fetch_messages(&self.key.conversation_id, access_token)
            .await?;
        Ok(messages)
    }

    /// Re-fetch the authoritative message list and reconcile the view.
    pub async fn refresh(&self, access_token: &str) -> Result<()> {
        let messages = self
            .api
            .fetch_messages(&self.key.conversation_id, access_token)
            .await?;
        lock(&self.timeline).reconcile(&messages);
        Ok(())
    }

    /// The ordered timeline view.
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        lock(&self.timeline).entries().to_vec()
    }

    /// Drop pending entries older than [`PENDING_ENTRY_TTL_SECS`].
    pub fn expire_stale(&self) -> usize {
        lock(&self.timeline).expire_pending(Duration::seconds(PENDING_ENTRY_TTL_SECS), Utc::now())
    }

    /// Release the conversation: tear down its HITL session and drop the
    /// channel subscription. Any in-flight submission completes as stale.
    pub async fn close(mut self) -> Result<()> {
        lock(&self.sessions).teardown(&self.key);
        if let Some(subscription) = self.subscription.take() {
            self.socket.unsubscribe(&subscription).await?;
        }
        Ok(())
    }
}

/// Feed a decoded channel event into the session table. Events scoped to a
/// different pair than the subscribed channel are rejected.
fn handle_incoming(
    sessions: &Mutex<SessionManager>,
    key: &SessionKey,
    payload: &HitlEventPayload,
) -> std::result::Result<(), String> {
    if let Some(user_id) = payload.user_id.as_deref() {
        if user_id != key.user_id {
            return Err(format!(
                "event user {} does not match subscription user {}",
                user_id, key.user_id
            ));
        }
    }
    if let Some(conversation_id) = payload.conversation_id.as_deref() {
        if conversation_id != key.conversation_id {
            return Err(format!(
                "event conversation {} does not match subscription conversation {}",
                conversation_id, key.conversation_id
            ));
        }
    }

    match &payload.task {
        HitlTask::TicketCreation { details } => {
            let outcome = lock(sessions).handle_task(key, details);
            match outcome {
                TaskOutcome::Opened => debug!("HITL session opened"),
                TaskOutcome::DraftReplaced => debug!("HITL draft replaced by new task"),
                TaskOutcome::Ignored => debug!("HITL task ignored, draft has user edits"),
            }
            Ok(())
        }
        HitlTask::Other { action, .. } => {
            debug!("ignoring unhandled HITL action {}", action);
            Ok(())
        }
    }
}

/// Run one submission snapshot through the seam and feed the result back.
async fn drive_submission(
    sessions: &Mutex<SessionManager>,
    submitter: &dyn SubmitTicket,
    pending: hrdesk_hitl::PendingSubmission,
    access_token: &str,
) -> CompletionOutcome {
    let result = submitter
        .submit(
            &pending.draft,
            &pending.key.conversation_id,
            &pending.key.user_id,
            access_token,
        )
        .await;
    lock(sessions).complete_submission(&pending, result)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
