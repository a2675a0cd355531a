//! Durable per-session history.
//!
//! [`JsonlHistoryStore`] keeps one `<transcript_id>.jsonl` file per session
//! under the sessions directory and appends every turn as a single JSON
//! line.  Reads go through an in-memory write-through cache that is only
//! updated after the disk write succeeds.  A per-transcript file lock spans
//! each disk access together with its cache update, so a cold read can never
//! cache turns older than a save that finished before it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use dc_domain::error::{Error, Result};
use dc_domain::trace::TraceEvent;
use dc_domain::turn::Turn;

/// Append-only log of turns keyed by transcript id.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// All stored turns in append order.  Empty for an unknown id.
    async fn load_history(&self, transcript_id: &str) -> Result<Vec<Turn>>;

    /// Durably append one turn.  Failures surface as [`Error::Persistence`].
    async fn save_turn(&self, transcript_id: &str, turn: &Turn) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSONL store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct JsonlHistoryStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<Turn>>>,
    file_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl JsonlHistoryStore {
    /// Store files under `state_path/sessions/`, creating it if needed.
    pub fn new(state_path: &Path) -> Result<Self> {
        let base_dir = state_path.join("sessions");
        std::fs::create_dir_all(&base_dir).map_err(Error::Io)?;
        Ok(Self {
            base_dir,
            cache: RwLock::new(HashMap::new()),
            file_locks: Mutex::new(HashMap::new()),
        })
    }

    fn file_lock(&self, transcript_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.file_locks
            .lock()
            .entry(transcript_id.to_owned())
            .or_default()
            .clone()
    }

    fn path_for(&self, transcript_id: &str) -> PathBuf {
        self.base_dir.join(format!("{transcript_id}.jsonl"))
    }
}

#[async_trait::async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn load_history(&self, transcript_id: &str) -> Result<Vec<Turn>> {
        let file_lock = self.file_lock(transcript_id);
        let _guard = file_lock.lock().await;

        // Fast path: return from cache.
        let cached = self.cache.read().get(transcript_id).cloned();
        if let Some(turns) = cached {
            return Ok(turns);
        }

        // Slow path: load from disk on a blocking thread.
        let path = self.path_for(transcript_id);
        let tid = transcript_id.to_owned();
        let turns = tokio::task::spawn_blocking(move || read_jsonl_file(&path, &tid))
            .await
            .map_err(|e| Error::Persistence(format!("spawn_blocking join: {e}")))??;

        self.cache
            .write()
            .insert(transcript_id.to_owned(), turns.clone());
        Ok(turns)
    }

    async fn save_turn(&self, transcript_id: &str, turn: &Turn) -> Result<()> {
        let mut line = serde_json::to_string(turn)
            .map_err(|e| Error::Persistence(format!("serializing turn: {e}")))?;
        line.push('\n');
        let path = self.path_for(transcript_id);

        let file_lock = self.file_lock(transcript_id);
        let _guard = file_lock.lock().await;

        // Write to disk first; only update the cache if I/O succeeds.
        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| Error::Persistence(format!("opening {}: {e}", path.display())))?;
            file.write_all(line.as_bytes())
                .map_err(|e| Error::Persistence(format!("writing {}: {e}", path.display())))?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Persistence(format!("spawn_blocking join: {e}")))??;

        // Only extend an already-loaded entry; a cold cache reloads from disk.
        if let Some(turns) = self.cache.write().get_mut(transcript_id) {
            turns.push(turn.clone());
        }

        TraceEvent::HistoryAppend {
            transcript_id: transcript_id.to_owned(),
            turns: 1,
        }
        .emit();

        Ok(())
    }
}

/// Read and parse a JSONL history file.  Missing file → empty history.
fn read_jsonl_file(path: &Path, transcript_id: &str) -> Result<Vec<Turn>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Persistence(format!("reading {}: {e}", path.display())))?;
    let mut turns = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Turn>(line) {
            Ok(turn) => turns.push(turn),
            Err(e) => {
                tracing::warn!(
                    transcript_id = transcript_id,
                    error = %e,
                    "skipping malformed history line"
                );
            }
        }
    }
    Ok(turns)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-local history, used for ephemeral runs and tests.
#[derive(Default)]
pub struct MemoryHistoryStore {
    logs: RwLock<HashMap<String, Vec<Turn>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load_history(&self, transcript_id: &str) -> Result<Vec<Turn>> {
        Ok(self
            .logs
            .read()
            .get(transcript_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_turn(&self, transcript_id: &str, turn: &Turn) -> Result<()> {
        self.logs
            .write()
            .entry(transcript_id.to_owned())
            .or_default()
            .push(turn.clone());
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
