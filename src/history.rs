//! Short per-session activity history and standing instructions
//!
//! Both are plain JSON files rewritten on every change. History is capped by
//! serialized size; the oldest entries go first.

use crate::event::{Event, EventKind};
use crate::session::{SessionResult, SessionStore};
use crate::storage;
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const HISTORY_FILE: &str = "history.json";
const INSTRUCTIONS_FILE: &str = "instructions.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: f64,
    #[serde(default)]
    pub current_task: String,
    #[serde(default)]
    pub summary_of_what_we_just_did: String,
    #[serde(default)]
    pub summary_of_what_we_about_to_do: String,
    pub event_type: EventKind,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_request: Option<String>,
}

impl HistoryEntry {
    pub fn from_event(event: &Event) -> Self {
        let user_request = match event.kind {
            EventKind::UserRequest => event
                .inputs
                .get("user_request")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            _ => None,
        };
        Self {
            timestamp: event.timestamp,
            current_task: event.current_task.clone(),
            summary_of_what_we_just_did: event.summary_of_what_we_just_did.clone(),
            summary_of_what_we_about_to_do: event.summary_of_what_we_about_to_do.clone(),
            event_type: event.kind,
            success: event.succeeded(),
            duration: Some(event.duration),
            user_request,
        }
    }
}

/// History and instructions files, located through the session store
#[derive(Debug, Clone)]
pub struct HistoryStore {
    sessions: SessionStore,
    max_chars: usize,
}

impl HistoryStore {
    pub fn new(sessions: SessionStore, max_chars: usize) -> Self {
        Self {
            sessions,
            max_chars,
        }
    }

    fn history_path(&self, name: &str) -> PathBuf {
        self.sessions.session_dir(name).join(HISTORY_FILE)
    }

    fn instructions_path(&self, name: &str) -> PathBuf {
        self.sessions.session_dir(name).join(INSTRUCTIONS_FILE)
    }

    /// Missing or unreadable history reads as empty
    pub fn load(&self, name: &str) -> Vec<HistoryEntry> {
        let path = self.history_path(name);
        if !path.exists() {
            return Vec::new();
        }
        storage::read_json(&path).unwrap_or_default()
    }

    pub fn add_event(&self, name: &str, event: &Event) -> SessionResult<()> {
        let mut history = self.load(name);
        history.push(HistoryEntry::from_event(event));
        let history = trim_to_size(history, self.max_chars);
        storage::write_json(&self.history_path(name), &history)?;
        Ok(())
    }

    pub fn format(&self, name: &str, limit: Option<usize>) -> String {
        let history = self.load(name);
        if history.is_empty() {
            return "No history available.".to_string();
        }

        let start = limit.map_or(0, |n| history.len().saturating_sub(n));
        history[start..]
            .iter()
            .enumerate()
            .map(|(i, entry)| format_entry(i + 1, entry))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn load_instructions(&self, name: &str) -> Vec<String> {
        let path = self.instructions_path(name);
        if !path.exists() {
            return Vec::new();
        }
        storage::read_json(&path).unwrap_or_default()
    }

    pub fn add_instruction(&self, name: &str, instruction: &str) -> SessionResult<usize> {
        let mut instructions = self.load_instructions(name);
        instructions.push(instruction.to_string());
        storage::write_json(&self.instructions_path(name), &instructions)?;
        Ok(instructions.len())
    }

    pub fn replace_instructions(&self, name: &str, instructions: &[String]) -> SessionResult<()> {
        storage::write_json(&self.instructions_path(name), instructions)?;
        Ok(())
    }

    pub fn format_instructions(&self, name: &str) -> String {
        let instructions = self.load_instructions(name);
        if instructions.is_empty() {
            return "No instructions available.".to_string();
        }
        instructions
            .iter()
            .map(|i| format!("• {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn serialized_len(history: &[HistoryEntry]) -> usize {
    serde_json::to_string(history).map(|s| s.len()).unwrap_or(0)
}

/// Drop oldest entries until the JSON fits, keeping at least one
fn trim_to_size(mut history: Vec<HistoryEntry>, max_chars: usize) -> Vec<HistoryEntry> {
    if serialized_len(&history) <= max_chars {
        return history;
    }
    let mut drop_count = 0;
    while history.len() - drop_count > 1 {
        drop_count += 1;
        if serialized_len(&history[drop_count..]) <= max_chars {
            break;
        }
    }
    history.drain(..drop_count);
    history
}

fn format_entry(index: usize, entry: &HistoryEntry) -> String {
    let when = Local
        .timestamp_opt(entry.timestamp as i64, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    let status = if entry.success { "✓" } else { "✗" };

    let mut text = match (&entry.event_type, &entry.user_request) {
        (EventKind::UserRequest, Some(request)) => format!(
            "Entry {index} [{when}] {status}\n  User Request: {request}\n  Type: {}",
            entry.event_type
        ),
        _ => format!(
            "Entry {index} [{when}] {status}\n  Task: {}\n  Just did: {}\n  About to do: {}\n  Type: {}",
            entry.current_task,
            entry.summary_of_what_we_just_did,
            entry.summary_of_what_we_about_to_do,
            entry.event_type
        ),
    };
    if let Some(duration) = entry.duration.filter(|d| *d > 0.0) {
        text.push_str(&format!("\n  Duration: {duration:.2}s"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionStore::new(dir.path().join("sessions"));
        sessions.create("proj", "testing").unwrap();
        (dir, HistoryStore::new(sessions, 32 * 1024))
    }

    fn entry(task: &str) -> HistoryEntry {
        HistoryEntry::from_event(&Event::new(EventKind::Run).with_context(task, "", ""))
    }

    #[test]
    fn test_add_event_records_success_flag() {
        let (_dir, history) = stores();
        let event = Event::new(EventKind::Run)
            .with_context("build", "configured", "compile")
            .output("success", true);
        history.add_event("proj", &event).unwrap();

        let loaded = history.load("proj");
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].success);
        assert_eq!(loaded[0].current_task, "build");
    }

    #[test]
    fn test_trim_drops_oldest_first() {
        let entries: Vec<HistoryEntry> = (0..50).map(|i| entry(&format!("task {i}"))).collect();
        let one = serialized_len(&entries[..1]);
        let trimmed = trim_to_size(entries, one * 10);

        assert!(trimmed.len() < 50);
        assert!(serialized_len(&trimmed) <= one * 10);
        assert_eq!(trimmed.last().unwrap().current_task, "task 49");
    }

    #[test]
    fn test_trim_keeps_at_least_one() {
        let trimmed = trim_to_size(vec![entry("a"), entry("b")], 1);
        assert_eq!(trimmed.len(), 1);
        assert_eq!(trimmed[0].current_task, "b");
    }

    #[test]
    fn test_user_request_formatting() {
        let (_dir, history) = stores();
        let event = Event::new(EventKind::UserRequest).input("user_request", "add a login page");
        history.add_event("proj", &event).unwrap();

        let text = history.format("proj", Some(10));
        assert!(text.contains("User Request: add a login page"));
        assert!(text.contains("Type: user_request"));
    }

    #[test]
    fn test_instructions() {
        let (_dir, history) = stores();
        assert_eq!(history.format_instructions("proj"), "No instructions available.");

        history.add_instruction("proj", "use cargo nextest").unwrap();
        assert_eq!(history.add_instruction("proj", "never push").unwrap(), 2);
        assert_eq!(
            history.format_instructions("proj"),
            "• use cargo nextest\n• never push"
        );

        history
            .replace_instructions("proj", &["only this".to_string()])
            .unwrap();
        assert_eq!(history.load_instructions("proj"), vec!["only this"]);
    }
}
