//! Shared types for the DocChat crates: conversation turns, the answering
//! engine seams, the error taxonomy, configuration and trace events.

pub mod answer;
pub mod config;
pub mod error;
pub mod trace;
pub mod turn;
