//! Append-only, order-preserving chat timeline for one conversation.
//!
//! Locally-composed messages are inserted immediately with a provisional
//! `local:` id so the UI reflects the send with zero latency; the same id is
//! carried through the send path as the `client_ref` correlation token and
//! echoed by the server, which is the sole reconciliation match key —
//! content/time heuristics are never used, so repeated "yes" messages stay
//! distinct.
//!
//! Append and reconcile are plain `&mut self` methods: the single-threaded
//! cooperative model serializes them, and neither spans a suspension point.

use chrono::{DateTime, Duration, Utc};
use hrdesk_protocol::{ChatMessage, MessageRole};
use uuid::Uuid;

const LOCAL_ID_PREFIX: &str = "local:";

/// Provisional id of an optimistic entry, doubling as its `client_ref`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalId(String);

impl LocalId {
    fn generate() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Delivery state of a timeline entry, so rendering code can distinguish
/// optimistic entries from confirmed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Locally inserted, not yet reflected in the server list.
    Pending { appended_at: DateTime<Utc> },
    /// Present in the authoritative server list.
    Confirmed,
    /// The send path reported failure; kept visible for retry affordances.
    Failed,
}

impl DeliveryState {
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

/// One visible row of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub id: String,
    pub content: String,
    pub role: MessageRole,
    pub attachment_url: Option<String>,
    pub attachment_name: Option<String>,
    pub delivery: DeliveryState,
    pub created_at: DateTime<Utc>,
    seq: u64,
}

/// The per-conversation store.
///
/// The view is always ordered by `created_at` ascending, ties broken by
/// insertion order, and never contains two entries for the same real
/// message after reconciliation.
pub struct TimelineStore {
    chat_id: String,
    entries: Vec<TimelineEntry>,
    next_seq: u64,
}

impl TimelineStore {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    /// Build a store pre-loaded with the server's message list.
    pub fn with_messages(chat_id: impl Into<String>, messages: &[ChatMessage]) -> Self {
        let mut store = Self::new(chat_id);
        store.reconcile(messages);
        store
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Insert a locally-composed message immediately, before any network
    /// confirmation. Returns the provisional id to carry through the send
    /// path as `client_ref`.
    pub fn append_optimistic(
        &mut self,
        content: impl Into<String>,
        role: MessageRole,
        attachment_name: Option<String>,
        now: DateTime<Utc>,
    ) -> LocalId {
        let local_id = LocalId::generate();
        let seq = self.bump_seq();
        self.entries.push(TimelineEntry {
            id: local_id.0.clone(),
            content: content.into(),
            role,
            attachment_url: None,
            attachment_name,
            delivery: DeliveryState::Pending { appended_at: now },
            created_at: now,
            seq,
        });
        self.sort_view();
        local_id
    }

    /// Merge the authoritative ordered message list into the view.
    ///
    /// Every server message appears exactly once; a message whose
    /// `client_ref` matches a pending or failed entry supersedes it (the
    /// confirmed `created_at` wins); local entries with no confirmed
    /// counterpart stay visible.
    pub fn reconcile(&mut self, server_messages: &[ChatMessage]) {
        let mut merged: Vec<TimelineEntry> = Vec::with_capacity(server_messages.len());
        for message in server_messages {
            let seq = self.bump_seq();
            merged.push(TimelineEntry {
                id: message.id.clone(),
                content: message.content.clone(),
                role: message.role,
                attachment_url: message.attachment_url.clone(),
                attachment_name: message.attachment_name.clone(),
                delivery: DeliveryState::Confirmed,
                created_at: message.created_at,
                seq,
            });
        }

        // Local entries survive unless a confirmed message superseded them.
        for entry in self.entries.drain(..) {
            if matches!(entry.delivery, DeliveryState::Confirmed) {
                continue;
            }
            let superseded = server_messages
                .iter()
                .any(|message| message.client_ref.as_deref() == Some(entry.id.as_str()));
            if !superseded {
                merged.push(entry);
            }
        }

        self.entries = merged;
        self.sort_view();
    }

    /// Mark a pending entry as failed after the send path errored. The
    /// entry stays visible; removal is the caller's choice.
    pub fn fail_pending(&mut self, local_id: &LocalId) -> bool {
        for entry in &mut self.entries {
            if entry.id == local_id.0 && entry.delivery.is_pending() {
                entry.delivery = DeliveryState::Failed;
                return true;
            }
        }
        false
    }

    /// Drop pending entries older than `timeout`. Returns how many were
    /// removed.
    pub fn expire_pending(&mut self, timeout: Duration, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| match entry.delivery {
            DeliveryState::Pending { appended_at } => now - appended_at < timeout,
            _ => true,
        });
        before - self.entries.len()
    }

    /// The ordered view.
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn sort_view(&mut self) {
        self.entries
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)));
    }
}
