//! The per-session state machine.
//!
//! `Closed → AwaitingInput → (Confirming)? → Submitting → Closed`, with a
//! failure edge from `Submitting` back to whichever state initiated the
//! submission. All methods are synchronous and side-effect free; the caller
//! performs the actual network submission when a decision says so.

use crate::draft::TicketDraft;
use crate::error::ValidationError;
use hrdesk_protocol::TicketDetails;
use tracing::warn;

/// Which state initiated an in-flight submission; the failure edge returns
/// there with the draft intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOrigin {
    AwaitingInput,
    Confirming,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    Confirming,
    Submitting { from: SubmitOrigin },
}

/// Outcome of a submit request from `AwaitingInput`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitDecision {
    /// Validation failed; state unchanged, no network call.
    Rejected(ValidationError),
    /// Moved to `Confirming`; the caller shows the read-only summary.
    Confirm,
    /// Moved to `Submitting`; the caller performs exactly one submission.
    Submit,
    /// The session was not accepting a submit in its current state.
    InvalidState,
}

/// Outcome of a task event arriving while the session is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDecision {
    /// The draft was untouched and has been replaced by the new details.
    DraftReplaced,
    /// The user had edited the draft; the event is ignored.
    IgnoredDirtyDraft,
}

/// One open HITL session: the current state plus the form draft.
#[derive(Debug, Clone, PartialEq)]
pub struct HitlSession {
    state: SessionState,
    draft: TicketDraft,
}

impl HitlSession {
    /// Open a session for a freshly-decoded task.
    pub fn open(details: &TicketDetails) -> Self {
        Self {
            state: SessionState::AwaitingInput,
            draft: TicketDraft::from_details(details),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn draft(&self) -> &TicketDraft {
        &self.draft
    }

    /// Mutable access for field edits while awaiting input. Editing in any
    /// other state is refused so a confirmation summary or an in-flight
    /// submission always reflects what the user saw.
    pub fn draft_mut(&mut self) -> Option<&mut TicketDraft> {
        match self.state {
            SessionState::AwaitingInput => Some(&mut self.draft),
            _ => None,
        }
    }

    /// A new task event arrived while this session is open. The draft is
    /// replaced only when untouched; in-progress edits are never discarded.
    pub fn task_received(&mut self, details: &TicketDetails) -> TaskDecision {
        if self.state == SessionState::AwaitingInput && !self.draft.is_touched() {
            self.draft = TicketDraft::from_details(details);
            return TaskDecision::DraftReplaced;
        }
        warn!(
            "ignoring task event: session busy (state {:?}, touched {})",
            self.state,
            self.draft.is_touched()
        );
        TaskDecision::IgnoredDirtyDraft
    }

    /// The user submitted the form.
    pub fn request_submit(&mut self) -> SubmitDecision {
        if self.state != SessionState::AwaitingInput {
            return SubmitDecision::InvalidState;
        }
        if let Err(error) = self.draft.validate() {
            return SubmitDecision::Rejected(error);
        }
        if self.draft.requires_confirmation() {
            self.state = SessionState::Confirming;
            SubmitDecision::Confirm
        } else {
            self.state = SessionState::Submitting {
                from: SubmitOrigin::AwaitingInput,
            };
            SubmitDecision::Submit
        }
    }

    /// `Back` from the confirmation summary; edits are kept.
    pub fn confirm_back(&mut self) -> bool {
        if self.state == SessionState::Confirming {
            self.state = SessionState::AwaitingInput;
            return true;
        }
        false
    }

    /// `Confirm` from the summary; the caller performs exactly one
    /// submission.
    pub fn confirm(&mut self) -> bool {
        if self.state == SessionState::Confirming {
            self.state = SessionState::Submitting {
                from: SubmitOrigin::Confirming,
            };
            return true;
        }
        false
    }

    /// The in-flight submission failed; return to the initiating state with
    /// the draft intact so the user can retry.
    pub fn submit_failed(&mut self) -> bool {
        if let SessionState::Submitting { from } = self.state {
            self.state = match from {
                SubmitOrigin::AwaitingInput => SessionState::AwaitingInput,
                SubmitOrigin::Confirming => SessionState::Confirming,
            };
            return true;
        }
        false
    }

    /// Whether the session may be dismissed right now. Submission is not
    /// interruptible from the UI; teardown goes through the session manager.
    pub fn can_dismiss(&self) -> bool {
        !matches!(self.state, SessionState::Submitting { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrdesk_protocol::TicketType;

    fn leave_details() -> TicketDetails {
        TicketDetails {
            ticket_type: Some(TicketType::Leave),
            subject: Some("PTO".to_string()),
            description: Some("need 3 days".to_string()),
            ..TicketDetails::default()
        }
    }

    fn general_details() -> TicketDetails {
        TicketDetails {
            ticket_type: Some(TicketType::General),
            subject: Some("badge".to_string()),
            description: Some("replacement badge".to_string()),
            ..TicketDetails::default()
        }
    }

    #[test]
    fn leave_without_days_is_rejected_before_any_network_step() {
        let mut session = HitlSession::open(&leave_details());
        assert_eq!(
            session.request_submit(),
            SubmitDecision::Rejected(ValidationError::LeaveDaysRequired)
        );
        assert_eq!(session.state(), SessionState::AwaitingInput);
    }

    #[test]
    fn leave_ticket_walks_confirm_then_submit() {
        let mut session = HitlSession::open(&leave_details());
        if let Some(draft) = session.draft_mut() {
            draft.set_leave_days(3);
        }

        assert_eq!(session.request_submit(), SubmitDecision::Confirm);
        assert_eq!(session.state(), SessionState::Confirming);
        assert_eq!(session.draft().leave_days(), Some(3));

        assert!(session.confirm());
        assert_eq!(
            session.state(),
            SessionState::Submitting {
                from: SubmitOrigin::Confirming
            }
        );
    }

    #[test]
    fn complaint_ticket_requires_confirmation() {
        let details = TicketDetails {
            ticket_type: Some(TicketType::Complaint),
            ..TicketDetails::default()
        };
        let mut session = HitlSession::open(&details);
        assert_eq!(session.request_submit(), SubmitDecision::Confirm);
    }

    #[test]
    fn general_ticket_submits_without_confirmation() {
        let mut session = HitlSession::open(&general_details());
        assert_eq!(session.request_submit(), SubmitDecision::Submit);
        assert_eq!(
            session.state(),
            SessionState::Submitting {
                from: SubmitOrigin::AwaitingInput
            }
        );
    }

    #[test]
    fn back_returns_to_input_with_edits_kept() {
        let mut session = HitlSession::open(&leave_details());
        if let Some(draft) = session.draft_mut() {
            draft.set_leave_days(5);
            draft.set_subject("PTO in May");
        }
        assert_eq!(session.request_submit(), SubmitDecision::Confirm);

        assert!(session.confirm_back());
        assert_eq!(session.state(), SessionState::AwaitingInput);
        assert_eq!(session.draft().leave_days(), Some(5));
        assert_eq!(session.draft().subject(), Some("PTO in May"));
    }

    #[test]
    fn failed_submission_returns_to_initiating_state() {
        let mut session = HitlSession::open(&general_details());
        assert_eq!(session.request_submit(), SubmitDecision::Submit);
        assert!(session.submit_failed());
        assert_eq!(session.state(), SessionState::AwaitingInput);
        assert_eq!(session.draft().subject(), Some("badge"));

        let mut confirmed = HitlSession::open(&leave_details());
        if let Some(draft) = confirmed.draft_mut() {
            draft.set_leave_days(2);
        }
        assert_eq!(confirmed.request_submit(), SubmitDecision::Confirm);
        assert!(confirmed.confirm());
        assert!(confirmed.submit_failed());
        assert_eq!(confirmed.state(), SessionState::Confirming);
    }

    #[test]
    fn new_task_replaces_untouched_draft_only() {
        let mut session = HitlSession::open(&leave_details());
        assert_eq!(
            session.task_received(&general_details()),
            TaskDecision::DraftReplaced
        );
        assert_eq!(
            session.draft().ticket_type(),
            Some(&TicketType::General)
        );

        if let Some(draft) = session.draft_mut() {
            draft.set_subject("edited by user");
        }
        assert_eq!(
            session.task_received(&leave_details()),
            TaskDecision::IgnoredDirtyDraft
        );
        assert_eq!(session.draft().subject(), Some("edited by user"));
    }

    #[test]
    fn edits_are_refused_outside_awaiting_input() {
        let mut session = HitlSession::open(&leave_details());
        if let Some(draft) = session.draft_mut() {
            draft.set_leave_days(1);
        }
        assert_eq!(session.request_submit(), SubmitDecision::Confirm);
        assert!(session.draft_mut().is_none());
        assert_eq!(session.request_submit(), SubmitDecision::InvalidState);
    }
}
