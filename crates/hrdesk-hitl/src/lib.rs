//! HITL session state machine and session manager.
//!
//! A session is opened when a decoded task event arrives for a
//! (user, conversation) pair with no session already open, drives the
//! form-fill → validate → (optional) confirm → submit lifecycle, and is
//! discarded on submission success or dismissal. The state core is pure;
//! network submission happens behind the [`SubmitTicket`] seam, driven by
//! snapshots so no session borrow crosses a suspension point.

pub mod draft;
pub mod error;
pub mod machine;
pub mod manager;
pub mod submit;

pub use draft::TicketDraft;
pub use error::{SubmitError, ValidationError};
pub use machine::{HitlSession, SessionState, SubmitDecision, SubmitOrigin, TaskDecision};
pub use manager::{
    CompletionOutcome, PendingSubmission, SessionKey, SessionManager, TaskOutcome,
};
pub use submit::SubmitTicket;
