//! Recorded tool actions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// What kind of action an event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Navigate,
    Read,
    Write,
    Run,
    Learning,
    UserRequest,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Navigate => "navigate",
            EventKind::Read => "read",
            EventKind::Write => "write",
            EventKind::Run => "run",
            EventKind::Learning => "learning",
            EventKind::UserRequest => "user_request",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded action. Immutable once appended to a session's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub current_task: String,
    #[serde(default)]
    pub summary_of_what_we_just_did: String,
    #[serde(default)]
    pub summary_of_what_we_about_to_do: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    /// Seconds, never negative
    #[serde(default)]
    pub duration: f64,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: unix_now(),
            kind,
            current_task: String::new(),
            summary_of_what_we_just_did: String::new(),
            summary_of_what_we_about_to_do: String::new(),
            inputs: Map::new(),
            outputs: Map::new(),
            duration: 0.0,
        }
    }

    pub fn with_context(
        mut self,
        current_task: impl Into<String>,
        just_did: impl Into<String>,
        about_to_do: impl Into<String>,
    ) -> Self {
        self.current_task = current_task.into();
        self.summary_of_what_we_just_did = just_did.into();
        self.summary_of_what_we_about_to_do = about_to_do.into();
        self
    }

    pub fn input(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.to_string(), value.into());
        self
    }

    pub fn output(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.to_string(), value.into());
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds.max(0.0);
        self
    }

    /// `outputs.success`, false when absent
    pub fn succeeded(&self) -> bool {
        self.outputs
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_type_tag() {
        let event = Event::new(EventKind::UserRequest).input("user_request", "ship it");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_request");
        assert_eq!(json["inputs"]["user_request"], "ship it");
    }

    #[test]
    fn test_inputs_keep_insertion_order() {
        let event = Event::new(EventKind::Run)
            .input("zeta", 1)
            .input("alpha", 2)
            .input("mid", 3);
        let keys: Vec<&str> = event.inputs.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_negative_duration_is_clamped() {
        let event = Event::new(EventKind::Read).with_duration(-1.5);
        assert_eq!(event.duration, 0.0);
    }

    #[test]
    fn test_succeeded_reads_outputs() {
        assert!(Event::new(EventKind::Write).output("success", true).succeeded());
        assert!(!Event::new(EventKind::Write).succeeded());
    }
}
