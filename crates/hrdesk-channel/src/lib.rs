//! Real-time channel transport for HITL intervention events.
//!
//! This crate intentionally exposes a small surface:
//! - one websocket connection per client session
//! - reference-counted channel subscriptions with typed event callbacks
//! - normalization of native topic delivery and the generic `"message"`
//!   fallback into a single dispatch path

pub mod connection;
pub mod error;
pub mod frame;
pub mod manager;
pub mod registry;

pub use connection::{ConnectionState, SocketConfig, SocketConnection};
pub use error::{ChannelError, Result};
pub use frame::SocketFrame;
pub use manager::{ManagerConfig, SubscriptionManager, reconnect_backoff};
pub use registry::{EventHandler, SubscriptionHandle, SubscriptionRegistry};
