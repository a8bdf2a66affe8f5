//! Composition root for the HRDesk client crates.
//!
//! Resolves endpoints from the environment, owns the shared socket and
//! HTTP clients, and exposes the per-conversation session that ties HITL
//! intervention handling to the optimistic chat timeline.

pub mod capabilities;
pub mod config;
pub mod error;
pub mod session;
pub mod submit;

pub use capabilities::{UserCapabilities, UserProfile};
pub use config::{ConfigError, CoreConfig, resolve_api_base_url, resolve_socket_url};
pub use error::{CoreError, Result};
pub use session::{Attachment, ClientCore, ConversationSession, SubmitFlow};
pub use submit::ApiSubmitter;
