//! Rendering events and prior summary into the summarization prompt

use super::queue::SummaryTask;
use super::tokens::truncate_with_indication;
use crate::event::Event;
use serde_json::{Map, Value};

/// Default character cap for input/output detail blocks
pub const DETAIL_CHAR_CAP: usize = 256;

const PROMPT_PREAMBLE: &str = r#"You maintain the ARCHITECTURE NOTES for one software repository. The notes are a reference for whoever works in this codebase next. They describe what the repository IS, not what anybody did in it.

## Rules
1. Describe structure, never activity. No commands run, steps taken or things tried.
2. Keep only facts that stay true about the project.
3. Every fact must be confirmed by the events below: file contents, directory listings, configuration, command output.
4. If a new event contradicts something in the current notes, delete the wrong statement.
5. No timestamps, no error messages, no plans or next steps, no "we found" phrasing.

## Worth recording
- Absolute location of the repository and its important directories
- Layout of source, tests, configuration and scripts
- Entry points and how to run them
- Languages, frameworks and dependencies, and how they are installed
- Build, test and deployment procedures that actually exist
- Constraints or requirements a newcomer needs to know

## Style
Good: "Source lives in /srv/app/src; entry point is main.py (python main.py)."
Bad: "We opened /srv/app/src and ran main.py, which worked."
"#;

const PROMPT_CLOSING: &str = "Check the new events against the current notes, drop anything they prove wrong, add only what they confirm, and reply with the complete updated notes and nothing else.\n\nUpdated Architecture Notes:";

/// "Task: .. | Just did: .. | About to do: ..", skipping empty parts
fn purpose(event: &Event) -> String {
    let parts: Vec<String> = [
        ("Task", &event.current_task),
        ("Just did", &event.summary_of_what_we_just_did),
        ("About to do", &event.summary_of_what_we_about_to_do),
    ]
    .into_iter()
    .filter(|(_, text)| !text.trim().is_empty())
    .map(|(label, text)| format!("{label}: {text}"))
    .collect();

    if parts.is_empty() {
        "No context provided".to_string()
    } else {
        parts.join(" | ")
    }
}

/// One "key: value" line per entry; strings are written bare, anything else as JSON
fn details(fields: &Map<String, Value>) -> String {
    fields
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}: {s}"),
            other => format!("{key}: {other}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a single event. Inputs keep their head, outputs keep their tail.
pub fn format_event(event: &Event, detail_cap: usize) -> String {
    let inputs = truncate_with_indication(&details(&event.inputs), detail_cap, false);
    let outputs = truncate_with_indication(&details(&event.outputs), detail_cap, true);

    format!(
        "  Type: {}\n  Purpose: {}\n  Timestamp: {}\n  Duration: {}s\n  Input Details: {}\n  Output Details: {}\n",
        event.kind,
        purpose(event),
        event.timestamp,
        event.duration,
        inputs,
        outputs,
    )
}

/// Number events from 1 in batch order
pub fn format_events(tasks: &[SummaryTask], detail_cap: usize) -> String {
    tasks
        .iter()
        .enumerate()
        .map(|(i, task)| format!("EVENT {}:\n{}", i + 1, format_event(&task.event, detail_cap)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full instruction prompt for one batch
pub fn build_prompt(old_summary: &str, events_text: &str) -> String {
    format!(
        "{PROMPT_PREAMBLE}\n## Current Architecture Notes\n{old_summary}\n\n## New Repository Information\n{events_text}\n\n{PROMPT_CLOSING}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn test_purpose_joins_present_fields() {
        let event = Event::new(EventKind::Read).with_context("audit", "", "read Cargo.toml");
        assert_eq!(purpose(&event), "Task: audit | About to do: read Cargo.toml");
    }

    #[test]
    fn test_purpose_fallback() {
        assert_eq!(purpose(&Event::new(EventKind::Run)), "No context provided");
    }

    #[test]
    fn test_details_render_strings_bare() {
        let event = Event::new(EventKind::Run)
            .input("command", "ls -la")
            .input("timeout", 60);
        assert_eq!(details(&event.inputs), "command: ls -la\ntimeout: 60");
    }

    #[test]
    fn test_outputs_keep_tail() {
        let stdout = format!("{}END", "x".repeat(1000));
        let event = Event::new(EventKind::Run).output("stdout", stdout);
        let text = format_event(&event, DETAIL_CHAR_CAP);
        let line = text
            .lines()
            .find(|l| l.starts_with("  Output Details:"))
            .unwrap();
        assert!(line.contains("abridged from"));
        assert!(line.ends_with("END"));
    }

    #[test]
    fn test_inputs_keep_head() {
        let event = Event::new(EventKind::Write).input("content", "y".repeat(1000));
        let text = format_event(&event, DETAIL_CHAR_CAP);
        assert!(text.contains("Input Details: content: yyy"));
        assert!(text.contains("...(abridged from 1009 chars)..."));
    }

    #[test]
    fn test_events_numbered_in_order() {
        let tasks: Vec<SummaryTask> = ["first", "second"]
            .iter()
            .map(|t| SummaryTask::new("s", "", Event::new(EventKind::Run).with_context(*t, "", "")))
            .collect();
        let text = format_events(&tasks, DETAIL_CHAR_CAP);

        let one = text.find("EVENT 1:").unwrap();
        let two = text.find("EVENT 2:").unwrap();
        assert!(one < two);
        assert!(text[one..two].contains("Task: first"));
        assert!(text[two..].contains("Task: second"));
    }

    #[test]
    fn test_prompt_carries_summary_and_events() {
        let prompt = build_prompt("Repository at /srv/app", "EVENT 1:\n  Type: read\n");
        assert!(prompt.contains("## Current Architecture Notes\nRepository at /srv/app"));
        assert!(prompt.contains("EVENT 1:"));
        assert!(prompt.ends_with("Updated Architecture Notes:"));
    }
}
