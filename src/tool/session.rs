//! Session management tools

use super::{Tool, ToolOutput};
use crate::state::{AppState, CloseOutcome};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

/// History entries shown when a session is opened
const HISTORY_PREVIEW: usize = 10;

fn no_params() -> Value {
    json!({"type": "object", "properties": {}})
}

/// Summary, recent history and instructions for one session
fn session_context(state: &AppState, name: &str) -> (String, String, String) {
    (
        state.sessions().load_summary(name),
        state.history().format(name, Some(HISTORY_PREVIEW)),
        state.history().format_instructions(name),
    )
}

pub struct ListSessionsTool;

impl ListSessionsTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for ListSessionsTool {
    fn name(&self) -> &str {
        "daz_sessions_list"
    }

    fn description(&self) -> &str {
        "List all sessions and which one is active."
    }

    fn parameters_schema(&self) -> Value {
        no_params()
    }

    async fn execute(&self, _input: Value, state: &AppState) -> Result<ToolOutput> {
        let sessions = state.list_sessions()?;
        Ok(ToolOutput::new(json!({ "sessions": sessions })))
    }
}

pub struct CreateSessionTool;

impl CreateSessionTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct CreateInput {
    name: String,
    description: String,
}

#[async_trait]
impl Tool for CreateSessionTool {
    fn name(&self) -> &str {
        "daz_session_create"
    }

    fn description(&self) -> &str {
        "Create a new session. Provide a name and a detailed description of the task. Activates the new session."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["name", "description"],
            "properties": {
                "name": {"type": "string", "description": "Session name"},
                "description": {"type": "string", "description": "Detailed description of the task"}
            }
        })
    }

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput> {
        let params: CreateInput = serde_json::from_value(input)?;
        let session = state.create_session(&params.name, &params.description)?;
        Ok(ToolOutput::new(json!({ "success": true, "session": session })))
    }
}

pub struct OpenSessionTool;

impl OpenSessionTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct OpenInput {
    session_id: String,
}

#[async_trait]
impl Tool for OpenSessionTool {
    fn name(&self) -> &str {
        "daz_session_open"
    }

    fn description(&self) -> &str {
        "Open an existing session by id and make it active. Returns its summary, recent history, and instructions."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["session_id"],
            "properties": {
                "session_id": {"type": "string", "description": "Name of the session to open"}
            }
        })
    }

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput> {
        let params: OpenInput = serde_json::from_value(input)?;
        let session = state.open_session(&params.session_id)?;
        let (summary, history, instructions) = session_context(state, &params.session_id);
        Ok(ToolOutput::new(json!({
            "success": true,
            "session": session,
            "summary": summary,
            "history": history,
            "instructions": instructions,
        })))
    }
}

pub struct CurrentSessionTool;

impl CurrentSessionTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for CurrentSessionTool {
    fn name(&self) -> &str {
        "daz_session_current"
    }

    fn description(&self) -> &str {
        "Return the currently active session summary, history, and instructions."
    }

    fn parameters_schema(&self) -> Value {
        no_params()
    }

    async fn execute(&self, _input: Value, state: &AppState) -> Result<ToolOutput> {
        let name = state.require_active()?;
        let session = state.session_info(&name)?;
        let (summary, history, instructions) = session_context(state, &name);
        Ok(ToolOutput::new(json!({
            "active_session": session,
            "summary": summary,
            "history": history,
            "instructions": instructions,
        })))
    }
}

pub struct CloseSessionTool;

impl CloseSessionTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for CloseSessionTool {
    fn name(&self) -> &str {
        "daz_session_close"
    }

    fn description(&self) -> &str {
        "Close the current session. Waits for pending summary processing to finish first; \
         if it is still running after the wait, asks you to call close again."
    }

    fn parameters_schema(&self) -> Value {
        no_params()
    }

    async fn execute(&self, _input: Value, state: &AppState) -> Result<ToolOutput> {
        let output = match state.close_active().await? {
            CloseOutcome::Closed {
                session,
                waited: false,
            } => json!({
                "success": true,
                "message": format!("Session '{session}' closed successfully"),
                "session_name": session,
            }),
            CloseOutcome::Closed {
                session,
                waited: true,
            } => json!({
                "success": true,
                "message": format!("Session '{session}' closed successfully after waiting for summary processing"),
                "session_name": session,
                "waited_for_summary": true,
            }),
            CloseOutcome::StillDraining {
                session,
                queue_before,
                queue_after,
                waited,
            } => json!({
                "success": false,
                "message": "We are waiting for the summary queue to finish - please try calling close session again immediately",
                "session_name": session,
                "queue_size_before": queue_before,
                "queue_size_after": queue_after,
                "waited_seconds": waited.as_secs_f64(),
            }),
        };
        Ok(ToolOutput::new(output))
    }
}

pub struct RenameSessionTool;

impl RenameSessionTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct RenameInput {
    old_name: String,
    new_name: String,
}

#[async_trait]
impl Tool for RenameSessionTool {
    fn name(&self) -> &str {
        "daz_session_rename"
    }

    fn description(&self) -> &str {
        "Rename an existing session. An active session stays active under the new name."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["old_name", "new_name"],
            "properties": {
                "old_name": {"type": "string", "description": "Current session name"},
                "new_name": {"type": "string", "description": "New session name"}
            }
        })
    }

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput> {
        let params: RenameInput = serde_json::from_value(input)?;
        let session = state.rename_session(&params.old_name, &params.new_name)?;
        Ok(ToolOutput::new(json!({
            "success": true,
            "message": format!("Session '{}' renamed to '{}'", params.old_name, params.new_name),
            "session": session,
        })))
    }
}

pub struct DeleteSessionTool;

impl DeleteSessionTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct DeleteInput {
    session_name: String,
}

#[async_trait]
impl Tool for DeleteSessionTool {
    fn name(&self) -> &str {
        "daz_session_delete"
    }

    fn description(&self) -> &str {
        "Delete a session by moving it to the deleted_sessions directory. \
         Deleting the active session leaves no session active."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["session_name"],
            "properties": {
                "session_name": {"type": "string", "description": "Session to delete"}
            }
        })
    }

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput> {
        let params: DeleteInput = serde_json::from_value(input)?;
        let (moved_to, was_active) = state.delete_session(&params.session_name)?;
        Ok(ToolOutput::new(json!({
            "success": true,
            "message": format!("Session '{}' deleted", params.session_name),
            "moved_to": moved_to.display().to_string(),
            "was_active": was_active,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_create_then_list() {
        let (_dir, state) = state_with_session();
        CreateSessionTool::new()
            .execute(json!({"name": "second", "description": "more work"}), &state)
            .await
            .unwrap();

        let out = ListSessionsTool::new().execute(json!({}), &state).await.unwrap();
        let sessions = out.output["sessions"].as_array().unwrap();
        assert_eq!(sessions.len(), 2);
        let active: Vec<&Value> = sessions.iter().filter(|s| s["is_active"] == true).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0]["name"], "second");
    }

    #[tokio::test]
    async fn test_open_returns_context() {
        let (_dir, state) = state_with_session();
        state.history().add_instruction("proj", "keep it small").unwrap();
        state.set_active(None);

        let out = OpenSessionTool::new()
            .execute(json!({"session_id": "proj"}), &state)
            .await
            .unwrap();
        assert!(out.output["summary"].as_str().unwrap().starts_with("Session Purpose: testing"));
        assert_eq!(out.output["history"], "No history available.");
        assert_eq!(out.output["instructions"], "• keep it small");
        assert_eq!(state.active_session().as_deref(), Some("proj"));
    }

    #[tokio::test]
    async fn test_open_missing_session_fails() {
        let (_dir, state) = state_with_session();
        let err = OpenSessionTool::new()
            .execute(json!({"session_id": "ghost"}), &state)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_close_idle_session() {
        let (_dir, state) = state_with_session();
        let out = CloseSessionTool::new().execute(json!({}), &state).await.unwrap();
        assert_eq!(out.output["success"], true);
        assert_eq!(state.active_session(), None);

        let err = CurrentSessionTool::new().execute(json!({}), &state).await.unwrap_err();
        assert!(err.to_string().contains("No active session"));
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let (_dir, state) = state_with_session();
        RenameSessionTool::new()
            .execute(json!({"old_name": "proj", "new_name": "renamed"}), &state)
            .await
            .unwrap();
        assert_eq!(state.active_session().as_deref(), Some("renamed"));

        let out = DeleteSessionTool::new()
            .execute(json!({"session_name": "renamed"}), &state)
            .await
            .unwrap();
        assert_eq!(out.output["was_active"], true);
        assert!(!state.sessions().exists("renamed"));
    }
}
