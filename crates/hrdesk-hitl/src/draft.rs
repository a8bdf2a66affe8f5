//! Mutable form draft for a HITL ticket response.

use crate::error::ValidationError;
use hrdesk_protocol::{TicketDetails, TicketType};

/// The in-progress form state, seeded from a task's details and mutated
/// field-by-field by user input.
///
/// The `touched` flag records whether the user has edited anything; it
/// decides whether a later task event may replace the draft.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketDraft {
    ticket_type: Option<TicketType>,
    subject: Option<String>,
    description: Option<String>,
    leave_days: Option<u32>,
    touched: bool,
}

impl TicketDraft {
    /// Seed a fresh, untouched draft from task details.
    pub fn from_details(details: &TicketDetails) -> Self {
        Self {
            ticket_type: details.ticket_type.clone(),
            subject: details.subject.clone(),
            description: details.description.clone(),
            leave_days: details.leave_days,
            touched: false,
        }
    }

    pub fn ticket_type(&self) -> Option<&TicketType> {
        self.ticket_type.as_ref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn leave_days(&self) -> Option<u32> {
        self.leave_days
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn set_ticket_type(&mut self, ticket_type: TicketType) {
        self.ticket_type = Some(ticket_type);
        self.touched = true;
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = Some(subject.into());
        self.touched = true;
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
        self.touched = true;
    }

    pub fn set_leave_days(&mut self, leave_days: u32) {
        self.leave_days = Some(leave_days);
        self.touched = true;
    }

    /// The one rule this layer enforces: a leave ticket must carry a
    /// non-zero number of leave days before submission. Downstream storage
    /// may impose its own constraints on other fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ticket_type == Some(TicketType::Leave)
            && self.leave_days.unwrap_or(0) == 0
        {
            return Err(ValidationError::LeaveDaysRequired);
        }
        Ok(())
    }

    /// Leave and complaint tickets go through a read-only confirmation step.
    pub fn requires_confirmation(&self) -> bool {
        self.ticket_type
            .as_ref()
            .is_some_and(TicketType::requires_confirmation)
    }
}
