//! Shared server state: stores, the summary service, active session, cwd

use crate::event::Event;
use crate::history::HistoryStore;
use crate::logging;
use crate::session::{SessionError, SessionInfo, SessionResult, SessionStore};
use crate::summary::SummaryService;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Result of asking to close the active session
#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    Closed {
        session: String,
        waited: bool,
    },
    /// Summaries were still being written when the wait ran out. The session
    /// stays active; the caller should try again.
    StillDraining {
        session: String,
        queue_before: usize,
        queue_after: usize,
        waited: Duration,
    },
}

pub struct AppState {
    sessions: SessionStore,
    history: HistoryStore,
    summaries: SummaryService,
    active: Mutex<Option<String>>,
    cwd: Mutex<PathBuf>,
    drain_timeout: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AppState {
    pub fn new(
        sessions: SessionStore,
        history: HistoryStore,
        summaries: SummaryService,
        drain_timeout: Duration,
    ) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self {
            sessions,
            history,
            summaries,
            active: Mutex::new(None),
            cwd: Mutex::new(cwd),
            drain_timeout,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn summaries(&self) -> &SummaryService {
        &self.summaries
    }

    pub fn active_session(&self) -> Option<String> {
        lock(&self.active).clone()
    }

    pub fn require_active(&self) -> SessionResult<String> {
        self.active_session().ok_or(SessionError::NoActiveSession)
    }

    pub fn set_active(&self, name: Option<String>) {
        if let Some(ref name) = name {
            logging::set_session(name);
        }
        *lock(&self.active) = name;
    }

    pub fn cwd(&self) -> PathBuf {
        lock(&self.cwd).clone()
    }

    pub fn set_cwd(&self, dir: PathBuf) {
        *lock(&self.cwd) = dir;
    }

    /// Relative paths are taken from the session working directory
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd().join(path)
        }
    }

    /// Metadata with `is_active` filled in
    pub fn session_info(&self, name: &str) -> SessionResult<SessionInfo> {
        let mut info = self.sessions.metadata(name)?;
        info.is_active = self.active_session().as_deref() == Some(name);
        Ok(info)
    }

    pub fn list_sessions(&self) -> SessionResult<Vec<SessionInfo>> {
        let active = self.active_session();
        let mut sessions = self.sessions.list()?;
        for info in &mut sessions {
            info.is_active = active.as_deref() == Some(info.name.as_str());
        }
        Ok(sessions)
    }

    /// Create a session rooted at the current working directory and make it active
    pub fn create_session(&self, name: &str, description: &str) -> SessionResult<SessionInfo> {
        self.sessions.create_at(name, description, &self.cwd())?;
        self.set_active(Some(name.to_string()));
        logging::info(&format!("Created session {name}"));
        self.session_info(name)
    }

    pub fn open_session(&self, name: &str) -> SessionResult<SessionInfo> {
        if !self.sessions.exists(name) {
            return Err(SessionError::NotFound(name.to_string()));
        }
        self.set_active(Some(name.to_string()));
        self.session_info(name)
    }

    /// The active session follows a rename
    pub fn rename_session(&self, old_name: &str, new_name: &str) -> SessionResult<SessionInfo> {
        self.sessions.rename(old_name, new_name)?;
        let mut active = lock(&self.active);
        if active.as_deref() == Some(old_name) {
            *active = Some(new_name.to_string());
        }
        drop(active);
        self.session_info(new_name)
    }

    /// Returns where the session was moved and whether it was the active one
    pub fn delete_session(&self, name: &str) -> SessionResult<(PathBuf, bool)> {
        let moved_to = self.sessions.delete(name)?;
        let mut active = lock(&self.active);
        let was_active = active.as_deref() == Some(name);
        if was_active {
            *active = None;
        }
        Ok((moved_to, was_active))
    }

    /// Log the event, note it in history, queue it for summarization.
    ///
    /// The summary snapshot is taken before the append so the worker folds
    /// the event into the summary as it stood when the event happened. Only
    /// the event log write can fail the caller.
    pub fn append_event(&self, session: &str, event: Event) -> SessionResult<()> {
        let old_summary = self.sessions.load_summary(session);
        self.sessions.append_event(session, &event)?;

        if let Err(e) = self.history.add_event(session, &event) {
            logging::warn(&format!("Failed to update history for {session}: {e}"));
            self.sessions
                .log_error(session, "add_history_entry", &e.to_string(), None);
        }

        self.summaries.enqueue(session, &old_summary, event);
        Ok(())
    }

    /// Append to the active session; returns its name
    pub fn record(&self, event: Event) -> SessionResult<String> {
        let session = self.require_active()?;
        self.append_event(&session, event)?;
        Ok(session)
    }

    /// Wait for pending summaries, then deactivate the session
    pub async fn close_active(&self) -> SessionResult<CloseOutcome> {
        let session = self.require_active()?;
        let summaries = &self.summaries;

        if summaries.is_queue_empty() {
            self.set_active(None);
            return Ok(CloseOutcome::Closed {
                session,
                waited: false,
            });
        }

        let queue_before = summaries.queue_size();
        if summaries.wait_until_empty(self.drain_timeout).await {
            self.set_active(None);
            return Ok(CloseOutcome::Closed {
                session,
                waited: true,
            });
        }

        Ok(CloseOutcome::StillDraining {
            session,
            queue_before,
            queue_after: summaries.queue_size(),
            waited: self.drain_timeout,
        })
    }
}
