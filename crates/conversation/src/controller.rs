//! The conversation state machine.
//!
//! Sessions move `NoDocuments → DocumentsAttached` when documents are
//! attached (re-attaching replaces the answerer), and independently between
//! inactive and active through the single active binding.  Questions are
//! valid for any session with an attached answerer.
//!
//! Every binding is keyed by the session's stable transcript id, so a rename
//! carries the active marker, the answerer and the lock along with it.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use dc_domain::answer::{Answerer, AnswererFactory};
use dc_domain::error::{Error, Result};
use dc_domain::trace::TraceEvent;
use dc_domain::turn::Turn;
use dc_sessions::{HistoryStore, SessionRegistry};

use crate::lock::SessionLockMap;

/// Read-only summary of one session, for selectors and status lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub name: String,
    pub active: bool,
    /// Documents behind the attached answerer, if any.
    pub documents: Option<usize>,
    /// In-memory transcript holds turns that failed to persist.
    pub degraded: bool,
    pub turns: usize,
}

pub struct ConversationController {
    registry: SessionRegistry,
    history: Arc<dyn HistoryStore>,
    factory: Arc<dyn AnswererFactory>,
    /// transcript id -> answerer built from that session's documents
    answerers: RwLock<HashMap<String, Arc<dyn Answerer>>>,
    /// transcript id of the active session
    active: RwLock<Option<String>>,
    degraded: RwLock<HashSet<String>>,
    locks: SessionLockMap,
    ask_timeout: Option<Duration>,
}

impl ConversationController {
    pub fn new(
        registry: SessionRegistry,
        history: Arc<dyn HistoryStore>,
        factory: Arc<dyn AnswererFactory>,
    ) -> Self {
        Self {
            registry,
            history,
            factory,
            answerers: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
            degraded: RwLock::new(HashSet::new()),
            locks: SessionLockMap::new(),
            ask_timeout: None,
        }
    }

    /// Bound every `ask` by `timeout`.  A timeout fails the call as a
    /// generation error.
    pub fn with_ask_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ask_timeout = timeout;
        self
    }

    // ── Sessions ──────────────────────────────────────────────────────

    /// Register a new empty session.  Does not change the active binding.
    pub fn create_session(&self) -> String {
        let name = self.registry.create_session();
        self.persist_registry();
        name
    }

    /// Create a session and make it active.
    pub async fn new_chat(&self) -> Result<String> {
        let name = self.create_session();
        self.activate(&name).await?;
        Ok(name)
    }

    /// Rename a session.  Active marker and answerer follow the session.
    pub async fn rename_session(&self, old: &str, new_name: &str) -> Result<String> {
        let tid = self
            .registry
            .transcript_id(old)
            .ok_or_else(|| Error::InvalidRename(format!("no session named {old:?}")))?;
        let _permit = self.locks.acquire(&tid).await?;

        let renamed = self.registry.rename_session(old, new_name)?;
        self.persist_registry();
        Ok(renamed)
    }

    pub fn list_sessions(&self) -> Vec<String> {
        self.registry.list_sessions()
    }

    /// Make sure some session is active, creating the first one if the
    /// registry is empty.  The most recently created session wins.
    pub async fn resume(&self) -> Result<String> {
        if let Some(name) = self.active_session() {
            return Ok(name);
        }
        let name = match self.registry.list_sessions().pop() {
            Some(name) => name,
            None => self.create_session(),
        };
        self.activate(&name).await?;
        Ok(name)
    }

    // ── Activation ────────────────────────────────────────────────────

    /// Make `name` the active session and replay its durable history into
    /// the in-memory transcript.
    ///
    /// If history cannot be loaded nothing changes.  Answerer bindings are
    /// never touched.
    pub async fn activate(&self, name: &str) -> Result<()> {
        let tid = self.resolve(name)?;
        let _permit = self.locks.acquire(&tid).await?;

        let turns = self
            .history
            .load_history(&tid)
            .await
            .map_err(as_persistence)?;
        let replayed = turns.len();

        self.registry.replace_transcript(&tid, turns)?;
        *self.active.write() = Some(tid.clone());
        // The transcript is exactly storage again.
        self.degraded.write().remove(&tid);

        TraceEvent::SessionActivated {
            name: name.to_owned(),
            replayed_turns: replayed,
        }
        .emit();

        Ok(())
    }

    /// Name of the active session, if any.
    pub fn active_session(&self) -> Option<String> {
        let tid = self.active.read().clone()?;
        self.registry.name_of(&tid)
    }

    // ── Documents ─────────────────────────────────────────────────────

    /// Build a fresh answerer from `documents` and bind it to `name`,
    /// discarding any previous one.  On failure the old binding stays.
    pub async fn attach_documents(&self, name: &str, documents: &[PathBuf]) -> Result<()> {
        let tid = self.resolve(name)?;
        if documents.is_empty() {
            return Err(Error::EmptyDocumentSet);
        }
        let _permit = self.locks.acquire(&tid).await?;

        let answerer = self
            .factory
            .from_documents(&tid, documents)
            .await
            .map_err(as_ingestion)?;
        let documents = answerer.document_count();
        let replaced = self
            .answerers
            .write()
            .insert(tid.clone(), answerer)
            .is_some();

        TraceEvent::AnswererAttached {
            name: self.registry.name_of(&tid).unwrap_or_else(|| name.to_owned()),
            documents,
            replaced,
        }
        .emit();

        Ok(())
    }

    /// Rebind answerers for sessions whose documents were kept by an
    /// earlier run.  Sessions that already have an answerer are skipped;
    /// restore failures are logged and leave the session inert.  Returns
    /// the number of sessions rebound.
    pub async fn restore_answerers(&self) -> usize {
        let mut restored = 0;
        for name in self.registry.list_sessions() {
            let Some(tid) = self.registry.transcript_id(&name) else {
                continue;
            };
            let Ok(_permit) = self.locks.acquire(&tid).await else {
                continue;
            };
            if self.answerers.read().contains_key(&tid) {
                continue;
            }

            match self.factory.restore(&tid).await {
                Ok(Some(answerer)) => {
                    let documents = answerer.document_count();
                    self.answerers.write().insert(tid, answerer);
                    TraceEvent::AnswererAttached {
                        name,
                        documents,
                        replaced: false,
                    }
                    .emit();
                    restored += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(session = %name, error = %e, "could not restore documents");
                }
            }
        }
        restored
    }

    pub fn has_answerer(&self, name: &str) -> Result<bool> {
        let tid = self.resolve(name)?;
        Ok(self.answerers.read().contains_key(&tid))
    }

    // ── Questions ─────────────────────────────────────────────────────

    /// Answer `question` in session `name` and record the exchange.
    ///
    /// The user and assistant turns enter the in-memory transcript together,
    /// then go to durable history in order.  If persisting fails the turns
    /// stay visible, the session is flagged degraded, and the call returns
    /// [`Error::Persistence`].
    pub async fn ask(&self, name: &str, question: &str) -> Result<String> {
        let tid = self.resolve(name)?;
        let _permit = self.locks.acquire(&tid).await?;

        let answerer = self
            .answerers
            .read()
            .get(&tid)
            .cloned()
            .ok_or_else(|| Error::NoAnswererBound(name.to_owned()))?;

        let started = Instant::now();
        let answer = match self.ask_timeout {
            Some(limit) => tokio::time::timeout(limit, answerer.ask(question))
                .await
                .map_err(|_| {
                    Error::Generation(format!("no answer within {}ms", limit.as_millis()))
                })?,
            None => answerer.ask(question).await,
        }
        .map_err(as_generation)?;

        if answer.trim().is_empty() {
            return Err(Error::Generation("answerer returned empty text".into()));
        }

        let turns = [Turn::user(question), Turn::assistant(answer.as_str())];
        self.registry.append_turns(&tid, &turns)?;

        if let Err(e) = self.persist_turns(&tid, &turns).await {
            self.degraded.write().insert(tid.clone());
            TraceEvent::TranscriptDiverged {
                name: name.to_owned(),
                transcript_id: tid,
                error: e.to_string(),
            }
            .emit();
            return Err(as_persistence(e));
        }

        TraceEvent::TurnRecorded {
            name: name.to_owned(),
            question_chars: question.len(),
            answer_chars: answer.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        Ok(answer)
    }

    /// Append in order, stopping at the first failure so an answer is never
    /// stored without its question.
    async fn persist_turns(&self, tid: &str, turns: &[Turn]) -> Result<()> {
        for turn in turns {
            self.history.save_turn(tid, turn).await?;
        }
        Ok(())
    }

    // ── Views ─────────────────────────────────────────────────────────

    /// Snapshot of a session's in-memory transcript.
    pub fn transcript(&self, name: &str) -> Result<Vec<Turn>> {
        self.registry
            .transcript(name)
            .ok_or_else(|| Error::UnknownSession(name.to_owned()))
    }

    /// Transcript of the active session; empty when nothing is active.
    pub fn active_transcript(&self) -> Vec<Turn> {
        self.active_session()
            .and_then(|name| self.registry.transcript(&name))
            .unwrap_or_default()
    }

    pub fn is_degraded(&self, name: &str) -> Result<bool> {
        let tid = self.resolve(name)?;
        Ok(self.degraded.read().contains(&tid))
    }

    /// Number of turns in durable history, regardless of activation.
    pub async fn stored_turns(&self, name: &str) -> Result<usize> {
        let tid = self.resolve(name)?;
        let _permit = self.locks.acquire(&tid).await?;
        let turns = self.history.load_history(&tid).await.map_err(as_persistence)?;
        Ok(turns.len())
    }

    pub fn status(&self, name: &str) -> Result<SessionStatus> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| Error::UnknownSession(name.to_owned()))?;
        let tid = entry.transcript_id;

        Ok(SessionStatus {
            name: entry.name,
            active: self.active.read().as_deref() == Some(tid.as_str()),
            documents: self.answerers.read().get(&tid).map(|a| a.document_count()),
            degraded: self.degraded.read().contains(&tid),
            turns: entry.transcript.len(),
        })
    }

    // ── Helpers ───────────────────────────────────────────────────────

    fn resolve(&self, name: &str) -> Result<String> {
        self.registry
            .transcript_id(name)
            .ok_or_else(|| Error::UnknownSession(name.to_owned()))
    }

    fn persist_registry(&self) {
        if let Err(e) = self.registry.flush() {
            tracing::warn!(error = %e, "failed to persist session registry");
        }
    }
}

// Collaborators may report any error; the controller surfaces each stage
// under its own kind.

fn as_ingestion(e: Error) -> Error {
    match e {
        Error::Ingestion(_) | Error::EmptyDocumentSet => e,
        other => Error::Ingestion(other.to_string()),
    }
}

fn as_generation(e: Error) -> Error {
    match e {
        Error::Generation(_) => e,
        other => Error::Generation(other.to_string()),
    }
}

fn as_persistence(e: Error) -> Error {
    match e {
        Error::Persistence(_) => e,
        other => Error::Persistence(other.to_string()),
    }
}
