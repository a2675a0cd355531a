//! Session management for DocChat.
//!
//! Named conversation sessions with stable storage ids, an insertion-ordered
//! registry persisted as `sessions.json`, and append-only per-session
//! history logs.

pub mod history;
pub mod registry;

pub use history::{HistoryStore, JsonlHistoryStore, MemoryHistoryStore};
pub use registry::{SessionEntry, SessionRegistry};
