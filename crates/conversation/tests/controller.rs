use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dc_conversation::ConversationController;
use dc_domain::answer::{Answerer, AnswererFactory};
use dc_domain::error::{Error, Result};
use dc_domain::turn::{Role, Turn};
use dc_sessions::{HistoryStore, JsonlHistoryStore, MemoryHistoryStore, SessionRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Test doubles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Answers by naming the documents it was built from.
struct EchoAnswerer {
    documents: Vec<String>,
    delay: Duration,
    reply: Option<String>,
}

#[async_trait::async_trait]
impl Answerer for EchoAnswerer {
    async fn ask(&self, question: &str) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if question.contains("explode") {
            return Err(Error::Generation("model unavailable".into()));
        }
        if let Some(reply) = &self.reply {
            return Ok(reply.clone());
        }
        Ok(format!("from [{}]: {question}", self.documents.join(", ")))
    }

    fn document_count(&self) -> usize {
        self.documents.len()
    }
}

/// Documents remembered per scope, standing in for a staging directory
/// that outlives the controller.
type KeptDocuments = Arc<parking_lot::Mutex<HashMap<String, Vec<String>>>>;

#[derive(Default)]
struct EchoFactory {
    delay: Duration,
    reply: Option<String>,
    kept: Option<KeptDocuments>,
}

impl EchoFactory {
    fn answerer(&self, documents: Vec<String>) -> Arc<dyn Answerer> {
        Arc::new(EchoAnswerer {
            documents,
            delay: self.delay,
            reply: self.reply.clone(),
        })
    }
}

#[async_trait::async_trait]
impl AnswererFactory for EchoFactory {
    async fn from_documents(
        &self,
        scope: &str,
        documents: &[PathBuf],
    ) -> Result<Arc<dyn Answerer>> {
        let names: Vec<String> = documents
            .iter()
            .map(|d| d.display().to_string())
            .collect();
        if names.iter().any(|n| n.contains("broken")) {
            return Err(Error::Ingestion("cannot parse broken document".into()));
        }
        if let Some(kept) = &self.kept {
            kept.lock().insert(scope.to_owned(), names.clone());
        }
        Ok(self.answerer(names))
    }

    async fn restore(&self, scope: &str) -> Result<Option<Arc<dyn Answerer>>> {
        let Some(kept) = &self.kept else {
            return Ok(None);
        };
        let names = kept.lock().get(scope).cloned();
        Ok(names.map(|names| self.answerer(names)))
    }
}

/// Memory store that can be told to fail saves after `ok_saves` writes,
/// or to fail every load.
struct FlakyHistory {
    inner: MemoryHistoryStore,
    saves: AtomicUsize,
    ok_saves: usize,
    fail_loads: bool,
}

impl FlakyHistory {
    fn failing_saves_after(ok_saves: usize) -> Self {
        Self {
            inner: MemoryHistoryStore::new(),
            saves: AtomicUsize::new(0),
            ok_saves,
            fail_loads: false,
        }
    }

    fn failing_loads() -> Self {
        Self {
            inner: MemoryHistoryStore::new(),
            saves: AtomicUsize::new(0),
            ok_saves: usize::MAX,
            fail_loads: true,
        }
    }
}

#[async_trait::async_trait]
impl HistoryStore for FlakyHistory {
    async fn load_history(&self, transcript_id: &str) -> Result<Vec<Turn>> {
        if self.fail_loads {
            return Err(Error::Persistence("store offline".into()));
        }
        self.inner.load_history(transcript_id).await
    }

    async fn save_turn(&self, transcript_id: &str, turn: &Turn) -> Result<()> {
        if self.saves.fetch_add(1, Ordering::SeqCst) >= self.ok_saves {
            return Err(Error::Persistence("disk full".into()));
        }
        self.inner.save_turn(transcript_id, turn).await
    }
}

fn controller_with(
    history: Arc<dyn HistoryStore>,
    factory: Arc<dyn AnswererFactory>,
) -> ConversationController {
    ConversationController::new(SessionRegistry::new("session"), history, factory)
}

fn memory_controller() -> ConversationController {
    controller_with(
        Arc::new(MemoryHistoryStore::new()),
        Arc::new(EchoFactory::default()),
    )
}

fn docs(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

fn roles(turns: &[Turn]) -> Vec<Role> {
    turns.iter().map(|t| t.role).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn fresh_session_cannot_answer() {
    let ctl = memory_controller();
    let name = ctl.create_session();
    assert_eq!(name, "session-1");

    let err = ctl.ask(&name, "hi").await.unwrap_err();
    assert!(matches!(err, Error::NoAnswererBound(ref s) if s == "session-1"));
    assert!(ctl.transcript(&name).unwrap().is_empty());
}

#[tokio::test]
async fn attach_then_ask_records_a_turn_pair() {
    let ctl = memory_controller();
    let name = ctl.create_session();

    ctl.attach_documents(&name, &docs(&["doc.pdf"])).await.unwrap();
    let answer = ctl.ask(&name, "What is the title?").await.unwrap();
    assert!(!answer.is_empty());

    let transcript = ctl.transcript(&name).unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(roles(&transcript), vec![Role::User, Role::Assistant]);
    assert_eq!(transcript[0].content, "What is the title?");
    assert_eq!(transcript[1].content, answer);
    assert_eq!(ctl.stored_turns(&name).await.unwrap(), 2);
}

#[tokio::test]
async fn rename_keeps_transcript_and_storage() {
    let ctl = memory_controller();
    let name = ctl.create_session();
    ctl.attach_documents(&name, &docs(&["doc.pdf"])).await.unwrap();
    ctl.ask(&name, "What is the title?").await.unwrap();

    let renamed = ctl.rename_session(&name, "research").await.unwrap();
    assert_eq!(renamed, "research");
    assert_eq!(ctl.transcript("research").unwrap().len(), 2);
    assert!(matches!(
        ctl.transcript(&name),
        Err(Error::UnknownSession(_))
    ));

    ctl.activate("research").await.unwrap();
    let replayed = ctl.transcript("research").unwrap();
    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0].content, "What is the title?");
    // The answerer followed the rename.
    assert!(ctl.has_answerer("research").unwrap());
}

#[tokio::test]
async fn sessions_never_share_answerers() {
    let ctl = memory_controller();
    let a = ctl.create_session();
    let b = ctl.create_session();
    let a = ctl.rename_session(&a, "a").await.unwrap();
    let b = ctl.rename_session(&b, "b").await.unwrap();

    ctl.attach_documents(&a, &docs(&["alpha.txt"])).await.unwrap();
    ctl.attach_documents(&b, &docs(&["beta.txt"])).await.unwrap();

    let answer = ctl.ask(&a, "q").await.unwrap();
    assert!(answer.contains("alpha.txt"));
    assert!(!answer.contains("beta.txt"));
    assert!(ctl.transcript(&b).unwrap().is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Invariants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn created_names_are_distinct() {
    let ctl = memory_controller();
    let mut names: Vec<String> = (0..20).map(|_| ctl.create_session()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 20);
}

#[tokio::test]
async fn activation_replays_durable_history_exactly() {
    let history = Arc::new(MemoryHistoryStore::new());
    let registry = SessionRegistry::new("session");
    let name = registry.create_session();
    let tid = registry.transcript_id(&name).unwrap();

    let seeded = vec![
        Turn::user("first question"),
        Turn::assistant("first answer"),
        Turn::user("second question"),
        Turn::assistant("second answer"),
    ];
    for turn in &seeded {
        history.save_turn(&tid, turn).await.unwrap();
    }

    let ctl = ConversationController::new(
        registry,
        history.clone(),
        Arc::new(EchoFactory::default()),
    );
    assert!(ctl.transcript(&name).unwrap().is_empty());

    ctl.activate(&name).await.unwrap();
    assert_eq!(ctl.transcript(&name).unwrap(), seeded);
    assert_eq!(ctl.active_transcript(), seeded);
}

#[tokio::test]
async fn every_ask_appends_user_then_assistant_durably() {
    let ctl = memory_controller();
    let name = ctl.new_chat().await.unwrap();
    ctl.attach_documents(&name, &docs(&["doc.txt"])).await.unwrap();

    for q in ["one", "two", "three"] {
        ctl.ask(&name, q).await.unwrap();
    }

    let in_memory = ctl.transcript(&name).unwrap();
    assert_eq!(
        roles(&in_memory),
        vec![
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant
        ]
    );

    // Re-activation shows exactly what was stored.
    ctl.activate(&name).await.unwrap();
    assert_eq!(ctl.transcript(&name).unwrap(), in_memory);
}

#[tokio::test]
async fn only_one_session_is_active() {
    let ctl = memory_controller();
    let a = ctl.create_session();
    let b = ctl.create_session();
    assert_eq!(ctl.active_session(), None);

    ctl.activate(&a).await.unwrap();
    ctl.activate(&b).await.unwrap();

    assert_eq!(ctl.active_session().as_deref(), Some(b.as_str()));
    let active: Vec<_> = ctl
        .list_sessions()
        .iter()
        .filter(|n| ctl.status(n).unwrap().active)
        .cloned()
        .collect();
    assert_eq!(active, vec![b]);
}

#[tokio::test]
async fn reupload_replaces_the_answerer() {
    let ctl = memory_controller();
    let name = ctl.create_session();

    ctl.attach_documents(&name, &docs(&["d1.txt"])).await.unwrap();
    ctl.attach_documents(&name, &docs(&["d2.txt", "d3.txt"]))
        .await
        .unwrap();

    let answer = ctl.ask(&name, "q").await.unwrap();
    assert!(answer.contains("d2.txt"));
    assert!(!answer.contains("d1.txt"));
    assert_eq!(ctl.status(&name).unwrap().documents, Some(2));
}

#[tokio::test]
async fn failed_reupload_keeps_previous_answerer() {
    let ctl = memory_controller();
    let name = ctl.create_session();
    ctl.attach_documents(&name, &docs(&["good.txt"])).await.unwrap();

    let err = ctl
        .attach_documents(&name, &docs(&["broken.txt"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Ingestion(_)));

    let answer = ctl.ask(&name, "q").await.unwrap();
    assert!(answer.contains("good.txt"));
}

#[tokio::test]
async fn activation_does_not_touch_answerers() {
    let ctl = memory_controller();
    let a = ctl.create_session();
    let b = ctl.create_session();
    ctl.attach_documents(&a, &docs(&["a.txt"])).await.unwrap();

    ctl.activate(&b).await.unwrap();
    assert!(ctl.has_answerer(&a).unwrap());
    assert!(!ctl.has_answerer(&b).unwrap());

    // A background session can still be asked.
    assert!(ctl.ask(&a, "still there?").await.is_ok());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn unknown_sessions_are_rejected() {
    let ctl = memory_controller();
    assert!(matches!(
        ctl.activate("ghost").await,
        Err(Error::UnknownSession(_))
    ));
    assert!(matches!(
        ctl.attach_documents("ghost", &docs(&["x.txt"])).await,
        Err(Error::UnknownSession(_))
    ));
    assert!(matches!(
        ctl.ask("ghost", "q").await,
        Err(Error::UnknownSession(_))
    ));
    assert!(matches!(
        ctl.rename_session("ghost", "x").await,
        Err(Error::InvalidRename(_))
    ));
}

#[tokio::test]
async fn rename_to_taken_name_is_rejected() {
    let ctl = memory_controller();
    let a = ctl.create_session();
    let b = ctl.create_session();
    ctl.attach_documents(&a, &docs(&["a.txt"])).await.unwrap();
    ctl.ask(&a, "q").await.unwrap();

    let err = ctl.rename_session(&b, &a).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRename(_)));
    assert_eq!(ctl.transcript(&a).unwrap().len(), 2);
    assert!(ctl.transcript(&b).unwrap().is_empty());
}

#[tokio::test]
async fn empty_document_set_is_rejected() {
    let ctl = memory_controller();
    let name = ctl.create_session();
    assert!(matches!(
        ctl.attach_documents(&name, &[]).await,
        Err(Error::EmptyDocumentSet)
    ));
    assert!(!ctl.has_answerer(&name).unwrap());
}

#[tokio::test]
async fn generation_failure_leaves_transcript_untouched() {
    let ctl = memory_controller();
    let name = ctl.create_session();
    ctl.attach_documents(&name, &docs(&["doc.txt"])).await.unwrap();

    let err = ctl.ask(&name, "please explode").await.unwrap_err();
    assert!(matches!(err, Error::Generation(_)));
    assert!(ctl.transcript(&name).unwrap().is_empty());
    assert_eq!(ctl.stored_turns(&name).await.unwrap(), 0);
}

#[tokio::test]
async fn blank_answer_is_a_generation_failure() {
    let factory = EchoFactory {
        reply: Some("   ".into()),
        ..Default::default()
    };
    let ctl = controller_with(Arc::new(MemoryHistoryStore::new()), Arc::new(factory));
    let name = ctl.create_session();
    ctl.attach_documents(&name, &docs(&["doc.txt"])).await.unwrap();

    let err = ctl.ask(&name, "q").await.unwrap_err();
    assert!(matches!(err, Error::Generation(_)));
    assert!(ctl.transcript(&name).unwrap().is_empty());
}

#[tokio::test]
async fn slow_answer_times_out() {
    let factory = EchoFactory {
        delay: Duration::from_millis(500),
        ..Default::default()
    };
    let ctl = controller_with(Arc::new(MemoryHistoryStore::new()), Arc::new(factory))
        .with_ask_timeout(Some(Duration::from_millis(20)));
    let name = ctl.create_session();
    ctl.attach_documents(&name, &docs(&["doc.txt"])).await.unwrap();

    let err = ctl.ask(&name, "q").await.unwrap_err();
    assert!(matches!(err, Error::Generation(_)));
    assert!(ctl.transcript(&name).unwrap().is_empty());
}

#[tokio::test]
async fn persistence_failure_keeps_turns_visible_and_flags_session() {
    let history = Arc::new(FlakyHistory::failing_saves_after(0));
    let ctl = controller_with(history.clone(), Arc::new(EchoFactory::default()));
    let name = ctl.create_session();
    ctl.attach_documents(&name, &docs(&["doc.txt"])).await.unwrap();

    let err = ctl.ask(&name, "q").await.unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));

    // The user still sees the exchange in memory.
    assert_eq!(ctl.transcript(&name).unwrap().len(), 2);
    assert!(ctl.is_degraded(&name).unwrap());
    // The assistant turn was not attempted after the user turn failed.
    assert_eq!(ctl.stored_turns(&name).await.unwrap(), 0);
    assert_eq!(history.saves.load(Ordering::SeqCst), 1);

    // Re-activation restores exact replay and clears the flag.
    ctl.activate(&name).await.unwrap();
    assert!(ctl.transcript(&name).unwrap().is_empty());
    assert!(!ctl.is_degraded(&name).unwrap());
}

#[tokio::test]
async fn failed_history_load_changes_nothing() {
    let ctl = controller_with(
        Arc::new(FlakyHistory::failing_loads()),
        Arc::new(EchoFactory::default()),
    );
    let name = ctl.create_session();

    let err = ctl.activate(&name).await.unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));
    assert_eq!(ctl.active_session(), None);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Concurrency
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn concurrent_asks_on_one_session_do_not_interleave() {
    let factory = EchoFactory {
        delay: Duration::from_millis(30),
        ..Default::default()
    };
    let ctl = Arc::new(controller_with(
        Arc::new(MemoryHistoryStore::new()),
        Arc::new(factory),
    ));
    let name = ctl.create_session();
    ctl.attach_documents(&name, &docs(&["doc.txt"])).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let ctl = ctl.clone();
        let name = name.clone();
        handles.push(tokio::spawn(async move {
            ctl.ask(&name, &format!("question {i}")).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let transcript = ctl.transcript(&name).unwrap();
    assert_eq!(transcript.len(), 8);
    for pair in transcript.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        // Each answer belongs to the question right before it.
        assert!(pair[1].content.ends_with(&pair[0].content));
    }
}

#[tokio::test]
async fn different_sessions_proceed_independently() {
    let factory = EchoFactory {
        delay: Duration::from_millis(200),
        ..Default::default()
    };
    let ctl = Arc::new(controller_with(
        Arc::new(MemoryHistoryStore::new()),
        Arc::new(factory),
    ));
    let slow = ctl.create_session();
    let other = ctl.create_session();
    ctl.attach_documents(&slow, &docs(&["doc.txt"])).await.unwrap();

    let ctl2 = ctl.clone();
    let slow2 = slow.clone();
    let handle = tokio::spawn(async move { ctl2.ask(&slow2, "long one").await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    // Renaming another session is not blocked by the in-flight ask.
    let renamed = tokio::time::timeout(
        Duration::from_millis(100),
        ctl.rename_session(&other, "quick"),
    )
    .await
    .expect("rename blocked by unrelated session")
    .unwrap();
    assert_eq!(renamed, "quick");

    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn rename_waits_for_in_flight_ask() {
    let factory = EchoFactory {
        delay: Duration::from_millis(150),
        ..Default::default()
    };
    let ctl = Arc::new(controller_with(
        Arc::new(MemoryHistoryStore::new()),
        Arc::new(factory),
    ));
    let name = ctl.create_session();
    ctl.attach_documents(&name, &docs(&["doc.txt"])).await.unwrap();

    let ctl2 = ctl.clone();
    let name2 = name.clone();
    let handle = tokio::spawn(async move { ctl2.ask(&name2, "slow one").await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let blocked = tokio::time::timeout(
        Duration::from_millis(30),
        ctl.rename_session(&name, "renamed"),
    )
    .await;
    assert!(blocked.is_err(), "rename ran during an ask on the same session");

    handle.await.unwrap().unwrap();
    assert_eq!(ctl.rename_session(&name, "renamed").await.unwrap(), "renamed");
    assert_eq!(ctl.transcript("renamed").unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stored_turn_counts_never_race_an_ask() {
    for _ in 0..20 {
        let dir = tempfile::tempdir().unwrap();
        let factory = EchoFactory {
            delay: Duration::from_millis(2),
            ..Default::default()
        };
        let ctl = Arc::new(ConversationController::new(
            SessionRegistry::load(dir.path(), "session").unwrap(),
            Arc::new(JsonlHistoryStore::new(dir.path()).unwrap()),
            Arc::new(factory),
        ));
        let name = ctl.create_session();
        ctl.attach_documents(&name, &docs(&["doc.txt"])).await.unwrap();

        let asking = {
            let (ctl, name) = (ctl.clone(), name.clone());
            tokio::spawn(async move { ctl.ask(&name, "q").await })
        };
        let counting = {
            let (ctl, name) = (ctl.clone(), name.clone());
            tokio::spawn(async move { ctl.stored_turns(&name).await })
        };
        asking.await.unwrap().unwrap();
        let counted = counting.await.unwrap().unwrap();
        assert!(counted == 0 || counted == 2, "saw a half-written pair");

        ctl.activate(&name).await.unwrap();
        assert_eq!(ctl.transcript(&name).unwrap().len(), 2);
        assert_eq!(ctl.stored_turns(&name).await.unwrap(), 2);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Durable end-to-end
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn disk_controller(dir: &std::path::Path, kept: &KeptDocuments) -> ConversationController {
    let registry = SessionRegistry::load(dir, "session").unwrap();
    let history = Arc::new(JsonlHistoryStore::new(dir).unwrap());
    let factory = EchoFactory {
        kept: Some(kept.clone()),
        ..Default::default()
    };
    ConversationController::new(registry, history, Arc::new(factory))
}

#[tokio::test]
async fn history_survives_restart_under_new_name() {
    let dir = tempfile::tempdir().unwrap();
    let kept = KeptDocuments::default();
    {
        let ctl = disk_controller(dir.path(), &kept);
        let name = ctl.resume().await.unwrap();
        assert_eq!(name, "session-1");
        ctl.attach_documents(&name, &docs(&["doc.txt"])).await.unwrap();
        ctl.ask(&name, "What is the title?").await.unwrap();
        ctl.rename_session(&name, "research").await.unwrap();
        assert_eq!(ctl.active_session().as_deref(), Some("research"));
        ctl.create_session();
    }

    let ctl = disk_controller(dir.path(), &kept);
    assert_eq!(
        ctl.list_sessions(),
        vec!["research".to_string(), "session-2".to_string()]
    );
    ctl.activate("research").await.unwrap();

    let transcript = ctl.active_transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].content, "What is the title?");

    // Kept documents come back; sessions without any stay inert.
    assert!(!ctl.has_answerer("research").unwrap());
    assert_eq!(ctl.restore_answerers().await, 1);
    assert!(ctl.has_answerer("research").unwrap());
    assert!(!ctl.has_answerer("session-2").unwrap());
    let answer = ctl.ask("research", "again?").await.unwrap();
    assert!(answer.contains("doc.txt"));

    // Already-bound sessions are left alone.
    assert_eq!(ctl.restore_answerers().await, 0);
}
