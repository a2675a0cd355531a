//! Conversation control for DocChat.
//!
//! [`ConversationController`] is the single authority over which session is
//! active, what each session's transcript holds, and which answerer serves
//! each session.

pub mod controller;
pub mod lock;

pub use controller::{ConversationController, SessionStatus};
pub use lock::SessionLockMap;
