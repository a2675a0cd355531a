//! Local document answerer.
//!
//! Stages uploaded plain-text documents, splits them into passages, and
//! answers questions by quoting the passages that best match the question
//! terms.  Stands in for a full retrieval/generation engine behind the
//! [`dc_domain::answer::AnswererFactory`] seam.

pub mod index;
pub mod local;
pub mod staging;

pub use index::{Passage, PassageIndex};
pub use local::{LocalAnswerer, LocalAnswererFactory, NO_MATCH_ANSWER};
