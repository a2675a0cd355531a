use serde::Serialize;

/// Structured trace events emitted across all DocChat crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        name: String,
        transcript_id: String,
    },
    SessionRenamed {
        from: String,
        to: String,
        transcript_id: String,
    },
    SessionActivated {
        name: String,
        replayed_turns: usize,
    },
    AnswererAttached {
        name: String,
        documents: usize,
        replaced: bool,
    },
    TurnRecorded {
        name: String,
        question_chars: usize,
        answer_chars: usize,
        duration_ms: u64,
    },
    TranscriptDiverged {
        name: String,
        transcript_id: String,
        error: String,
    },
    HistoryAppend {
        transcript_id: String,
        turns: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        match self {
            Self::TranscriptDiverged { .. } => tracing::warn!(trace_event = %json, "dc_event"),
            _ => tracing::info!(trace_event = %json, "dc_event"),
        }
    }
}
