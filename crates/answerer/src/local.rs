use std::path::{Path, PathBuf};
use std::sync::Arc;

use dc_domain::answer::{Answerer, AnswererFactory};
use dc_domain::config::AnswererConfig;
use dc_domain::error::{Error, Result};

use crate::index::{split_passages, Passage, PassageIndex};
use crate::staging::{kept_documents, stage_documents};

/// Returned when no passage shares a word with the question.
pub const NO_MATCH_ANSWER: &str =
    "I could not find anything about that in the uploaded documents.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Answerer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Extractive answerer over one session's passages.
pub struct LocalAnswerer {
    index: PassageIndex,
    top_k: usize,
    documents: usize,
}

impl LocalAnswerer {
    pub fn new(passages: Vec<Passage>, documents: usize, top_k: usize) -> Self {
        Self {
            index: PassageIndex::build(passages),
            top_k: top_k.max(1),
            documents,
        }
    }
}

#[async_trait::async_trait]
impl Answerer for LocalAnswerer {
    async fn ask(&self, question: &str) -> Result<String> {
        if question.trim().is_empty() {
            return Err(Error::Generation("question is blank".into()));
        }

        let hits = self.index.search(question, self.top_k);
        if hits.is_empty() {
            return Ok(NO_MATCH_ANSWER.to_owned());
        }

        let answer = hits
            .iter()
            .map(|h| format!("[{}] {}", h.passage.source, h.passage.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(answer)
    }

    fn document_count(&self) -> usize {
        self.documents
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Factory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stages documents under `data_dir` and builds a [`LocalAnswerer`].
pub struct LocalAnswererFactory {
    config: AnswererConfig,
    data_dir: PathBuf,
}

impl LocalAnswererFactory {
    pub fn new(config: AnswererConfig, data_dir: PathBuf) -> Self {
        Self { config, data_dir }
    }
}

#[async_trait::async_trait]
impl AnswererFactory for LocalAnswererFactory {
    async fn from_documents(
        &self,
        scope: &str,
        documents: &[PathBuf],
    ) -> Result<Arc<dyn Answerer>> {
        let data_dir = self.data_dir.clone();
        let scope_owned = scope.to_owned();
        let docs = documents.to_vec();
        let allowed = self.config.allowed_extensions.clone();
        let max_chars = self.config.max_passage_chars;

        // Index the scratch copies; publish them only once indexing worked.
        let passages = tokio::task::spawn_blocking(move || {
            let staged = stage_documents(&data_dir, &scope_owned, &docs, &allowed)?;
            let passages = read_passages(staged.paths(), max_chars)?;
            staged.commit()?;
            Ok::<_, Error>(passages)
        })
        .await
        .map_err(|e| Error::Ingestion(format!("spawn_blocking join: {e}")))??;

        tracing::info!(
            scope = scope,
            documents = documents.len(),
            passages = passages.len(),
            "document index built"
        );

        Ok(Arc::new(LocalAnswerer::new(
            passages,
            documents.len(),
            self.config.top_k,
        )))
    }

    async fn restore(&self, scope: &str) -> Result<Option<Arc<dyn Answerer>>> {
        let data_dir = self.data_dir.clone();
        let scope_owned = scope.to_owned();
        let allowed = self.config.allowed_extensions.clone();
        let max_chars = self.config.max_passage_chars;

        let restored = tokio::task::spawn_blocking(move || {
            let kept = kept_documents(&data_dir, &scope_owned, &allowed)?;
            if kept.is_empty() {
                return Ok(None);
            }
            let passages = read_passages(&kept, max_chars)?;
            Ok::<_, Error>(Some((passages, kept.len())))
        })
        .await
        .map_err(|e| Error::Ingestion(format!("spawn_blocking join: {e}")))??;

        let Some((passages, documents)) = restored else {
            return Ok(None);
        };
        tracing::info!(
            scope = scope,
            documents,
            passages = passages.len(),
            "document index restored"
        );
        Ok(Some(Arc::new(LocalAnswerer::new(
            passages,
            documents,
            self.config.top_k,
        ))))
    }
}

/// Extract each staged file's text and split it into passages.
fn read_passages(staged: &[PathBuf], max_chars: usize) -> Result<Vec<Passage>> {
    let mut passages = Vec::new();
    for path in staged {
        let source = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_owned();
        let text = extract_text(path).map_err(|e| Error::Ingestion(format!("{source}: {e}")))?;

        let parts = split_passages(&text, max_chars);
        if parts.is_empty() {
            return Err(Error::Ingestion(format!("{source} contains no text")));
        }
        passages.extend(parts.into_iter().map(|text| Passage {
            source: source.clone(),
            text,
        }));
    }
    Ok(passages)
}

/// PDFs go through `pdf-extract`; everything else must be UTF-8 text.
fn extract_text(path: &Path) -> std::result::Result<String, String> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| format!("PDF extraction failed: {e}"))
    } else {
        std::fs::read_to_string(path).map_err(|e| e.to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
