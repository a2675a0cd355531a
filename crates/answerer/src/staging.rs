//! Copy uploaded documents into the per-session data directory.
//!
//! Uploads land in a hidden scratch directory under `data_dir` first.  Only
//! after the caller has indexed them is the scratch directory swapped in
//! as `data_dir/<scope>/`, so a failed upload never disturbs the documents
//! behind the current answerer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use dc_domain::error::{Error, Result};

/// Documents copied to a scratch directory, not yet visible under
/// `data_dir/<scope>/`.  Dropping it discards the copies.
pub struct StagedSet {
    scratch: tempfile::TempDir,
    target: PathBuf,
    paths: Vec<PathBuf>,
}

impl StagedSet {
    /// Staged copies in input order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Replace `data_dir/<scope>/` with the staged copies.
    pub fn commit(self) -> Result<PathBuf> {
        let StagedSet {
            scratch, target, ..
        } = self;

        if target.exists() {
            std::fs::remove_dir_all(&target)
                .map_err(|e| Error::Ingestion(format!("clearing {}: {e}", target.display())))?;
        }
        std::fs::rename(scratch.path(), &target)
            .map_err(|e| Error::Ingestion(format!("publishing {}: {e}", target.display())))?;

        tracing::debug!(dir = %target.display(), "staged documents committed");
        Ok(target)
    }
}

/// Validate `documents` and copy them to a scratch directory under
/// `data_dir`.
///
/// All documents are checked before anything on disk is touched.
pub fn stage_documents(
    data_dir: &Path,
    scope: &str,
    documents: &[PathBuf],
    allowed_extensions: &[String],
) -> Result<StagedSet> {
    if documents.is_empty() {
        return Err(Error::EmptyDocumentSet);
    }

    let mut names = HashSet::new();
    let mut planned = Vec::with_capacity(documents.len());
    for doc in documents {
        if !doc.is_file() {
            return Err(Error::Ingestion(format!(
                "{} is not a readable file",
                doc.display()
            )));
        }
        if !is_allowed(doc, allowed_extensions) {
            return Err(Error::Ingestion(format!(
                "{}: unsupported document type (allowed: {})",
                doc.display(),
                allowed_extensions.join(", ")
            )));
        }

        let name = doc
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Ingestion(format!("{}: invalid file name", doc.display())))?
            .to_owned();
        if !names.insert(name.clone()) {
            return Err(Error::Ingestion(format!("duplicate document name {name}")));
        }
        planned.push((doc, name));
    }

    std::fs::create_dir_all(data_dir)
        .map_err(|e| Error::Ingestion(format!("creating {}: {e}", data_dir.display())))?;
    let scratch = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(data_dir)
        .map_err(|e| Error::Ingestion(format!("creating scratch dir: {e}")))?;

    let mut paths = Vec::with_capacity(planned.len());
    for (doc, name) in planned {
        let dest = scratch.path().join(&name);
        std::fs::copy(doc, &dest)
            .map_err(|e| Error::Ingestion(format!("copying {}: {e}", doc.display())))?;
        paths.push(dest);
    }

    tracing::debug!(scope = scope, documents = paths.len(), "documents staged");

    Ok(StagedSet {
        scratch,
        target: data_dir.join(scope),
        paths,
    })
}

/// Documents committed for `scope` by an earlier upload, sorted by file
/// name.  Empty when nothing was kept.
pub fn kept_documents(
    data_dir: &Path,
    scope: &str,
    allowed_extensions: &[String],
) -> Result<Vec<PathBuf>> {
    let dir = data_dir.join(scope);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut kept = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(Error::Io)? {
        let path = entry.map_err(Error::Io)?.path();
        if path.is_file() && is_allowed(&path, allowed_extensions) {
            kept.push(path);
        }
    }
    kept.sort();
    Ok(kept)
}

fn is_allowed(path: &Path, allowed_extensions: &[String]) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(ext))
}
