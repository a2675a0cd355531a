//! Session registry.
//!
//! Maps unique, human-readable session names to a stable transcript id and
//! the in-memory transcript.  Entry order is insertion order so selectors
//! render consistently.  When backed by a state path, the entries (without
//! transcripts) persist in `sessions/sessions.json`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use dc_domain::error::{Error, Result};
use dc_domain::trace::TraceEvent;
use dc_domain::turn::Turn;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single named session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    /// Unique display name; changes on rename.
    pub name: String,
    /// Storage key for history, answerer bindings and locks.  Never changes.
    pub transcript_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// In-memory transcript.  Durable history lives in the history store.
    #[serde(skip)]
    pub transcript: Vec<Turn>,
}

struct RegistryState {
    entries: Vec<SessionEntry>,
    next_seq: u64,
}

impl RegistryState {
    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    fn by_transcript_id(&mut self, transcript_id: &str) -> Option<&mut SessionEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.transcript_id == transcript_id)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Owns the name → session mapping.
pub struct SessionRegistry {
    sessions_path: Option<PathBuf>,
    prefix: String,
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    /// A memory-only registry.  [`flush`](Self::flush) is a no-op.
    pub fn new(prefix: &str) -> Self {
        Self {
            sessions_path: None,
            prefix: prefix.to_owned(),
            state: RwLock::new(RegistryState {
                entries: Vec::new(),
                next_seq: 1,
            }),
        }
    }

    /// Load or create the registry at `state_path/sessions/sessions.json`.
    ///
    /// A corrupt file is renamed to `sessions.json.corrupt-<timestamp>` and
    /// the registry starts empty.
    pub fn load(state_path: &Path, prefix: &str) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let sessions_path = dir.join("sessions.json");
        let entries: Vec<SessionEntry> = if sessions_path.exists() {
            let raw = std::fs::read_to_string(&sessions_path).map_err(Error::Io)?;
            match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    let aside = dir.join(format!(
                        "sessions.json.corrupt-{}",
                        Utc::now().format("%Y%m%dT%H%M%S%.3f")
                    ));
                    std::fs::rename(&sessions_path, &aside).map_err(Error::Io)?;
                    tracing::warn!(
                        error = %e,
                        moved_to = %aside.display(),
                        "unreadable session registry moved aside; starting empty"
                    );
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let next_seq = entries
            .iter()
            .filter_map(|e| sequence_of(&e.name, prefix))
            .max()
            .map_or(1, |n| n + 1);

        tracing::info!(
            sessions = entries.len(),
            path = %sessions_path.display(),
            "session registry loaded"
        );

        Ok(Self {
            sessions_path: Some(sessions_path),
            prefix: prefix.to_owned(),
            state: RwLock::new(RegistryState { entries, next_seq }),
        })
    }

    /// Create a session with a fresh generated name and an empty transcript.
    pub fn create_session(&self) -> String {
        let mut state = self.state.write();

        let mut name = format!("{}-{}", self.prefix, state.next_seq);
        state.next_seq += 1;
        while state.position(&name).is_some() {
            name = format!("{}-{}", self.prefix, state.next_seq);
            state.next_seq += 1;
        }

        let now = Utc::now();
        let transcript_id = uuid::Uuid::new_v4().to_string();
        state.entries.push(SessionEntry {
            name: name.clone(),
            transcript_id: transcript_id.clone(),
            created_at: now,
            updated_at: now,
            transcript: Vec::new(),
        });

        TraceEvent::SessionCreated {
            name: name.clone(),
            transcript_id,
        }
        .emit();

        name
    }

    /// Rename `old` to `new_name` (trimmed).  Returns the new name.
    ///
    /// Rejects unknown sessions, blank names and names held by another
    /// session.  Renaming a session to its current name is a no-op.
    pub fn rename_session(&self, old: &str, new_name: &str) -> Result<String> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(Error::InvalidRename("new name is blank".into()));
        }

        let mut state = self.state.write();
        let idx = state
            .position(old)
            .ok_or_else(|| Error::InvalidRename(format!("no session named {old:?}")))?;

        if old == new_name {
            return Ok(new_name.to_owned());
        }
        if state.position(new_name).is_some() {
            return Err(Error::InvalidRename(format!(
                "{new_name:?} is already in use"
            )));
        }

        let entry = &mut state.entries[idx];
        entry.name = new_name.to_owned();
        entry.updated_at = Utc::now();

        TraceEvent::SessionRenamed {
            from: old.to_owned(),
            to: new_name.to_owned(),
            transcript_id: entry.transcript_id.clone(),
        }
        .emit();

        Ok(new_name.to_owned())
    }

    /// Session names in insertion order.
    pub fn list_sessions(&self) -> Vec<String> {
        self.state
            .read()
            .entries
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    /// Look up a session by name.
    pub fn get(&self, name: &str) -> Option<SessionEntry> {
        let state = self.state.read();
        state.position(name).map(|i| state.entries[i].clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.read().position(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Stable storage id for a session name.
    pub fn transcript_id(&self, name: &str) -> Option<String> {
        let state = self.state.read();
        state
            .position(name)
            .map(|i| state.entries[i].transcript_id.clone())
    }

    /// Current name of the session owning `transcript_id`.
    pub fn name_of(&self, transcript_id: &str) -> Option<String> {
        self.state
            .read()
            .entries
            .iter()
            .find(|e| e.transcript_id == transcript_id)
            .map(|e| e.name.clone())
    }

    /// Snapshot of a session's in-memory transcript.
    pub fn transcript(&self, name: &str) -> Option<Vec<Turn>> {
        let state = self.state.read();
        state
            .position(name)
            .map(|i| state.entries[i].transcript.clone())
    }

    /// Replace a transcript wholesale (used when replaying durable history).
    pub fn replace_transcript(&self, transcript_id: &str, turns: Vec<Turn>) -> Result<()> {
        let mut state = self.state.write();
        let entry = state
            .by_transcript_id(transcript_id)
            .ok_or_else(|| Error::UnknownSession(transcript_id.to_owned()))?;
        entry.transcript = turns;
        Ok(())
    }

    /// Append turns under a single write lock so readers observe all of
    /// them or none.
    pub fn append_turns(&self, transcript_id: &str, turns: &[Turn]) -> Result<()> {
        let mut state = self.state.write();
        let entry = state
            .by_transcript_id(transcript_id)
            .ok_or_else(|| Error::UnknownSession(transcript_id.to_owned()))?;
        entry.transcript.extend(turns.iter().cloned());
        entry.updated_at = Utc::now();
        Ok(())
    }

    /// Persist the registry to disk.  Memory-only registries do nothing.
    ///
    /// Writes a sibling temp file and renames it over `sessions.json`, so
    /// readers see either the old or the new registry in full.
    pub fn flush(&self) -> Result<()> {
        use std::io::Write;

        let Some(path) = &self.sessions_path else {
            return Ok(());
        };
        let json = {
            let state = self.state.read();
            serde_json::to_string_pretty(&state.entries)
                .map_err(|e| Error::Other(format!("serializing sessions: {e}")))?
        };

        let persist_err =
            |e: std::io::Error| Error::Persistence(format!("writing {}: {e}", path.display()));
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
        tmp.write_all(json.as_bytes()).map_err(persist_err)?;
        tmp.as_file().sync_all().map_err(persist_err)?;
        tmp.persist(path).map_err(|e| persist_err(e.error))?;
        Ok(())
    }
}

/// Parse `n` out of a generated `<prefix>-<n>` name.
fn sequence_of(name: &str, prefix: &str) -> Option<u64> {
    name.strip_prefix(prefix)?.strip_prefix('-')?.parse().ok()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
