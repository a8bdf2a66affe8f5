//! Session manager: one open session per (user, conversation) pair.
//!
//! `Closed` is represented by the absence of a session; success or dismissal
//! removes the entry. Sessions are epoch-stamped so a submission that
//! completes after its session was torn down is detected and discarded.

use crate::draft::TicketDraft;
use crate::error::SubmitError;
use crate::machine::{HitlSession, SubmitDecision, TaskDecision};
use hrdesk_protocol::TicketDetails;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Identifies the (user, conversation) pair a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub conversation_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

/// Outcome of an inbound task event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// No session was open for the pair; one has been created.
    Opened,
    /// A session was open with an untouched draft; the draft was replaced.
    DraftReplaced,
    /// A session was open with user edits; the event was ignored.
    Ignored,
}

/// Snapshot handed to the submission path when a session enters
/// `Submitting`. Carries everything the network call needs so no session
/// borrow is held across the suspension point.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSubmission {
    pub key: SessionKey,
    pub epoch: u64,
    pub draft: TicketDraft,
}

/// Outcome of feeding a submission result back into the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Success applied; the session is closed and discarded.
    Closed,
    /// Failure applied; the session returned to its pre-submit state.
    ReturnedForRetry,
    /// The session was torn down (or replaced) while the submission was in
    /// flight; the completion was discarded without mutating anything.
    Stale,
}

struct OpenSession {
    session: HitlSession,
    epoch: u64,
}

/// Tracks every open HITL session for the client session.
#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<SessionKey, OpenSession>,
    next_epoch: u64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a decoded task event for a pair.
    pub fn handle_task(&mut self, key: &SessionKey, details: &TicketDetails) -> TaskOutcome {
        if let Some(open) = self.sessions.get_mut(key) {
            return match open.session.task_received(details) {
                TaskDecision::DraftReplaced => TaskOutcome::DraftReplaced,
                TaskDecision::IgnoredDirtyDraft => TaskOutcome::Ignored,
            };
        }

        self.next_epoch += 1;
        self.sessions.insert(
            key.clone(),
            OpenSession {
                session: HitlSession::open(details),
                epoch: self.next_epoch,
            },
        );
        debug!(
            "opened HITL session for {}:{}",
            key.user_id, key.conversation_id
        );
        TaskOutcome::Opened
    }

    pub fn session(&self, key: &SessionKey) -> Option<&HitlSession> {
        self.sessions.get(key).map(|open| &open.session)
    }

    pub fn session_mut(&mut self, key: &SessionKey) -> Option<&mut HitlSession> {
        self.sessions.get_mut(key).map(|open| &mut open.session)
    }

    /// The user submitted the form. When the decision is `Submit`, the
    /// returned snapshot must be driven through the submission client
    /// exactly once and its result fed to [`complete_submission`].
    ///
    /// [`complete_submission`]: SessionManager::complete_submission
    pub fn request_submit(
        &mut self,
        key: &SessionKey,
    ) -> Option<(SubmitDecision, Option<PendingSubmission>)> {
        let open = self.sessions.get_mut(key)?;
        let decision = open.session.request_submit();
        let pending = match decision {
            SubmitDecision::Submit => Some(PendingSubmission {
                key: key.clone(),
                epoch: open.epoch,
                draft: open.session.draft().clone(),
            }),
            _ => None,
        };
        Some((decision, pending))
    }

    /// The user confirmed the read-only summary. Returns the snapshot to
    /// submit, or `None` if the session was not confirming.
    pub fn confirm(&mut self, key: &SessionKey) -> Option<PendingSubmission> {
        let open = self.sessions.get_mut(key)?;
        if !open.session.confirm() {
            return None;
        }
        Some(PendingSubmission {
            key: key.clone(),
            epoch: open.epoch,
            draft: open.session.draft().clone(),
        })
    }

    /// `Back` from the confirmation summary.
    pub fn confirm_back(&mut self, key: &SessionKey) -> bool {
        self.sessions
            .get_mut(key)
            .is_some_and(|open| open.session.confirm_back())
    }

    /// Apply the result of an in-flight submission. Stale completions
    /// (session gone, or reopened under a newer epoch) are discarded.
    pub fn complete_submission(
        &mut self,
        pending: &PendingSubmission,
        result: Result<(), SubmitError>,
    ) -> CompletionOutcome {
        let Some(open) = self.sessions.get_mut(&pending.key) else {
            warn!(
                "discarding stale submission completion for {}:{}",
                pending.key.user_id, pending.key.conversation_id
            );
            return CompletionOutcome::Stale;
        };
        if open.epoch != pending.epoch {
            warn!(
                "discarding submission completion from epoch {} (current {})",
                pending.epoch, open.epoch
            );
            return CompletionOutcome::Stale;
        }

        match result {
            Ok(()) => {
                self.sessions.remove(&pending.key);
                CompletionOutcome::Closed
            }
            Err(error) => {
                debug!("submission failed, returning for retry: {}", error);
                open.session.submit_failed();
                CompletionOutcome::ReturnedForRetry
            }
        }
    }

    /// Explicit dismissal by the user. Refused while a submission is in
    /// flight.
    pub fn dismiss(&mut self, key: &SessionKey) -> bool {
        let Some(open) = self.sessions.get(key) else {
            return false;
        };
        if !open.session.can_dismiss() {
            return false;
        }
        self.sessions.remove(key);
        true
    }

    /// Tear down the session for a pair (view navigated away). Any in-flight
    /// submission for it will complete as stale.
    pub fn teardown(&mut self, key: &SessionKey) {
        if self.sessions.remove(key).is_some() {
            debug!(
                "tore down HITL session for {}:{}",
                key.user_id, key.conversation_id
            );
        }
    }

    pub fn is_open(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{SessionState, SubmitOrigin};
    use hrdesk_protocol::{TicketDetails, TicketType};

    fn key() -> SessionKey {
        SessionKey::new("user-1", "conv-1")
    }

    fn general_details() -> TicketDetails {
        TicketDetails {
            ticket_type: Some(TicketType::General),
            subject: Some("badge".to_string()),
            description: Some("replacement".to_string()),
            ..TicketDetails::default()
        }
    }

    fn leave_details() -> TicketDetails {
        TicketDetails {
            ticket_type: Some(TicketType::Leave),
            subject: Some("PTO".to_string()),
            description: Some("need 3 days".to_string()),
            ..TicketDetails::default()
        }
    }

    #[test]
    fn at_most_one_session_per_pair() {
        let mut manager = SessionManager::new();
        assert_eq!(
            manager.handle_task(&key(), &general_details()),
            TaskOutcome::Opened
        );
        assert_eq!(
            manager.handle_task(&key(), &leave_details()),
            TaskOutcome::DraftReplaced
        );

        let other = SessionKey::new("user-1", "conv-2");
        assert_eq!(
            manager.handle_task(&other, &general_details()),
            TaskOutcome::Opened
        );
        assert!(manager.is_open(&key()));
        assert!(manager.is_open(&other));
    }

    #[test]
    fn touched_draft_ignores_new_task_events() {
        let mut manager = SessionManager::new();
        manager.handle_task(&key(), &general_details());
        if let Some(session) = manager.session_mut(&key()) {
            if let Some(draft) = session.draft_mut() {
                draft.set_subject("my words");
            }
        }
        assert_eq!(
            manager.handle_task(&key(), &leave_details()),
            TaskOutcome::Ignored
        );
        let session = manager.session(&key()).expect("session");
        assert_eq!(session.draft().subject(), Some("my words"));
    }

    #[test]
    fn successful_submission_closes_and_discards_the_session() {
        let mut manager = SessionManager::new();
        manager.handle_task(&key(), &general_details());

        let (decision, pending) = manager.request_submit(&key()).expect("open session");
        assert_eq!(decision, SubmitDecision::Submit);
        let pending = pending.expect("pending snapshot");

        assert_eq!(
            manager.complete_submission(&pending, Ok(())),
            CompletionOutcome::Closed
        );
        assert!(!manager.is_open(&key()));
    }

    #[test]
    fn failed_submission_returns_for_retry_with_draft_intact() {
        let mut manager = SessionManager::new();
        manager.handle_task(&key(), &leave_details());
        if let Some(session) = manager.session_mut(&key()) {
            if let Some(draft) = session.draft_mut() {
                draft.set_leave_days(3);
            }
        }

        let (decision, _) = manager.request_submit(&key()).expect("open session");
        assert_eq!(decision, SubmitDecision::Confirm);
        let pending = manager.confirm(&key()).expect("confirmed");

        assert_eq!(
            manager.complete_submission(&pending, Err(SubmitError("503".to_string()))),
            CompletionOutcome::ReturnedForRetry
        );
        let session = manager.session(&key()).expect("session");
        assert_eq!(session.state(), SessionState::Confirming);
        assert_eq!(session.draft().leave_days(), Some(3));
    }

    #[test]
    fn completion_after_teardown_is_stale_and_mutates_nothing() {
        let mut manager = SessionManager::new();
        manager.handle_task(&key(), &general_details());
        let (_, pending) = manager.request_submit(&key()).expect("open session");
        let pending = pending.expect("pending snapshot");

        manager.teardown(&key());
        assert_eq!(
            manager.complete_submission(&pending, Ok(())),
            CompletionOutcome::Stale
        );
        assert!(!manager.is_open(&key()));
    }

    #[test]
    fn completion_against_a_reopened_session_is_stale() {
        let mut manager = SessionManager::new();
        manager.handle_task(&key(), &general_details());
        let (_, pending) = manager.request_submit(&key()).expect("open session");
        let pending = pending.expect("pending snapshot");

        // Teardown then a fresh task for the same pair: new epoch.
        manager.teardown(&key());
        manager.handle_task(&key(), &leave_details());

        assert_eq!(
            manager.complete_submission(&pending, Ok(())),
            CompletionOutcome::Stale
        );
        assert!(manager.is_open(&key()), "fresh session is untouched");
    }

    #[test]
    fn dismiss_is_refused_mid_submission() {
        let mut manager = SessionManager::new();
        manager.handle_task(&key(), &general_details());
        let (_, pending) = manager.request_submit(&key()).expect("open session");
        assert!(pending.is_some());

        assert!(!manager.dismiss(&key()));
        assert!(manager.is_open(&key()));

        let session = manager.session(&key()).expect("session");
        assert_eq!(
            session.state(),
            SessionState::Submitting {
                from: SubmitOrigin::AwaitingInput
            }
        );
    }

    #[test]
    fn validation_rejection_produces_no_pending_submission() {
        let mut manager = SessionManager::new();
        manager.handle_task(&key(), &leave_details());

        let (decision, pending) = manager.request_submit(&key()).expect("open session");
        assert!(matches!(decision, SubmitDecision::Rejected(_)));
        assert!(pending.is_none());
        let session = manager.session(&key()).expect("session");
        assert_eq!(session.state(), SessionState::AwaitingInput);
    }
}
