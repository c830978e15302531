//! Per-session directories: event log, summary, diagnostics
//!
//! ```text
//! <sessions_dir>/<name>/
//!     summary.txt          latest knowledge base, replaced wholesale
//!     event_log.jsonl      one Event per line, append only
//!     history.json         see history.rs
//!     instructions.json    see history.rs
//!     errors.jsonl         summarizer failures
//!     llm_summary.jsonl    every model round trip
//! ```

use crate::event::{Event, unix_now};
use crate::storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SUMMARY_FILE: &str = "summary.txt";
const EVENT_LOG_FILE: &str = "event_log.jsonl";
const ERRORS_FILE: &str = "errors.jsonl";
const LLM_LOG_FILE: &str = "llm_summary.jsonl";
const MAX_NAME_LEN: usize = 100;
const SUMMARY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session '{0}' does not exist")]
    NotFound(String),

    #[error("Session '{0}' already exists")]
    AlreadyExists(String),

    #[error("No active session. Create or open a session first.")]
    NoActiveSession,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Public view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub summary: String,
    pub events_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

/// One model round trip, as written to `llm_summary.jsonl`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmInteraction {
    pub timestamp: f64,
    pub prompt: String,
    pub response: String,
    pub duration: f64,
    pub error: Option<String>,
    pub prompt_length: usize,
    pub response_length: usize,
    pub model: String,
    pub token_limit: usize,
}

#[derive(Serialize)]
struct ErrorRecord<'a> {
    timestamp: f64,
    function: &'a str,
    error: &'a str,
    extra_data: Value,
}

/// Convert a session name into a safe directory name
pub fn sanitize_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.starts_with('.') {
        sanitized.replace_range(..1, "_");
    }
    sanitized.chars().take(MAX_NAME_LEN).collect()
}

/// Filesystem store for sessions. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, name: &str) -> PathBuf {
        self.root.join(sanitize_name(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.session_dir(name).is_dir()
    }

    fn require(&self, name: &str) -> SessionResult<PathBuf> {
        let dir = self.session_dir(name);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(SessionError::NotFound(name.to_string()))
        }
    }

    /// Create a session started from the process working directory
    pub fn create(&self, name: &str, description: &str) -> SessionResult<SessionInfo> {
        let cwd = std::env::current_dir().unwrap_or_default();
        self.create_at(name, description, &cwd)
    }

    /// Create a session directory with its initial summary
    pub fn create_at(
        &self,
        name: &str,
        description: &str,
        started_at: &Path,
    ) -> SessionResult<SessionInfo> {
        storage::ensure_dir(&self.root)?;
        let dir = self.session_dir(name);
        if dir.exists() {
            return Err(SessionError::AlreadyExists(name.to_string()));
        }
        std::fs::create_dir_all(&dir)?;

        let initial = format!(
            "Session Purpose: {description}\n\nStarted at: {}\n\nSession Log:\n",
            started_at.display()
        );
        self.save_summary(name, &initial)?;

        self.metadata(name)
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> SessionResult<SessionInfo> {
        let old_dir = self.require(old_name)?;
        let new_dir = self.session_dir(new_name);
        if new_dir.exists() {
            return Err(SessionError::AlreadyExists(new_name.to_string()));
        }
        std::fs::rename(old_dir, new_dir)?;
        self.metadata(new_name)
    }

    /// Move a session into `deleted_sessions` next to the sessions root
    pub fn delete(&self, name: &str) -> SessionResult<PathBuf> {
        let dir = self.require(name)?;
        let graveyard = self
            .root
            .parent()
            .map(|p| p.join("deleted_sessions"))
            .unwrap_or_else(|| self.root.join("..").join("deleted_sessions"));
        storage::ensure_dir(&graveyard)?;

        let target = graveyard.join(format!(
            "{}_{}",
            sanitize_name(name),
            Utc::now().timestamp()
        ));
        std::fs::rename(dir, &target)?;
        Ok(target)
    }

    /// All sessions, sorted by directory name
    pub fn list(&self) -> SessionResult<Vec<SessionInfo>> {
        storage::ensure_dir(&self.root)?;
        let mut names: Vec<String> = std::fs::read_dir(&self.root)?
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            match self.metadata(&name) {
                Ok(info) => out.push(info),
                Err(e) => crate::logging::warn(&format!("skipping session dir {}: {}", name, e)),
            }
        }
        Ok(out)
    }

    pub fn metadata(&self, name: &str) -> SessionResult<SessionInfo> {
        let dir = self.require(name)?;
        let meta = std::fs::metadata(&dir)?;
        let updated_at: DateTime<Utc> = meta
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        let created_at: DateTime<Utc> = meta.created().map(DateTime::from).unwrap_or(updated_at);

        let summary = self.load_summary(name);
        let preview = if summary.chars().count() > SUMMARY_PREVIEW_CHARS {
            let head: String = summary.chars().take(SUMMARY_PREVIEW_CHARS).collect();
            format!("{head}...")
        } else {
            summary
        };

        Ok(SessionInfo {
            id: sanitize_name(name),
            name: name.to_string(),
            summary: preview,
            events_count: self.event_count(name),
            created_at,
            updated_at,
            is_active: false,
        })
    }

    /// Durable ordered append; errors reach the caller
    pub fn append_event(&self, name: &str, event: &Event) -> SessionResult<()> {
        let dir = self.require(name)?;
        storage::append_jsonl(&dir.join(EVENT_LOG_FILE), event)?;
        Ok(())
    }

    pub fn event_count(&self, name: &str) -> usize {
        std::fs::read_to_string(self.session_dir(name).join(EVENT_LOG_FILE))
            .map(|data| data.lines().filter(|l| !l.trim().is_empty()).count())
            .unwrap_or(0)
    }

    pub fn load_events(&self, name: &str) -> SessionResult<Vec<Event>> {
        let path = self.require(name)?.join(EVENT_LOG_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(path)?;
        let mut events = Vec::new();
        for line in data.lines().filter(|l| !l.trim().is_empty()) {
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }

    /// Latest summary, trimmed; empty when none has been written
    pub fn load_summary(&self, name: &str) -> String {
        std::fs::read_to_string(self.session_dir(name).join(SUMMARY_FILE))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    pub fn save_summary(&self, name: &str, summary: &str) -> SessionResult<()> {
        storage::write_text(&self.session_dir(name).join(SUMMARY_FILE), summary)?;
        Ok(())
    }

    /// Record a failure to `errors.jsonl`. Never fails the caller.
    pub fn log_error(&self, name: &str, function: &str, message: &str, extra: Option<Value>) {
        let record = ErrorRecord {
            timestamp: unix_now(),
            function,
            error: message,
            extra_data: extra.unwrap_or_else(|| Value::Object(Default::default())),
        };
        let path = self.session_dir(name).join(ERRORS_FILE);
        if let Err(e) = storage::append_jsonl(&path, &record) {
            crate::logging::error(&format!(
                "failed to log error to {}/{}: {} (original {}: {})",
                name, ERRORS_FILE, e, function, message
            ));
        }
    }

    /// Record a model round trip to `llm_summary.jsonl`. Never fails the caller.
    pub fn log_llm_interaction(&self, name: &str, interaction: &LlmInteraction) {
        let path = self.session_dir(name).join(LLM_LOG_FILE);
        if let Err(e) = storage::append_jsonl(&path, interaction) {
            self.log_error(
                name,
                "log_llm_interaction",
                &format!("failed to log LLM interaction: {e}"),
                None,
            );
        }
    }
}
