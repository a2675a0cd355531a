use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Answering engine seams
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A question-answering engine built over one session's documents.
///
/// Implementations hold their own index and must not share it with
/// engines built for other sessions.
#[async_trait::async_trait]
pub trait Answerer: Send + Sync {
    /// Answer a question from the indexed documents.
    ///
    /// Downstream failures surface as [`crate::error::Error::Generation`].
    async fn ask(&self, question: &str) -> Result<String>;

    /// Number of documents this engine was built from.
    fn document_count(&self) -> usize;
}

/// Builds a fresh [`Answerer`] from a document set.
#[async_trait::async_trait]
pub trait AnswererFactory: Send + Sync {
    /// `scope` is the stable storage id of the owning session.
    ///
    /// Unreadable or unindexable documents surface as
    /// [`crate::error::Error::Ingestion`].
    async fn from_documents(
        &self,
        scope: &str,
        documents: &[PathBuf],
    ) -> Result<Arc<dyn Answerer>>;

    /// Rebuild the answerer for `scope` from documents kept by an earlier
    /// run.  `None` when nothing was kept.
    async fn restore(&self, _scope: &str) -> Result<Option<Arc<dyn Answerer>>> {
        Ok(None)
    }
}
