//! Tools that add context to a session without touching the file system

use super::{Tool, ToolOutput};
use crate::event::{Event, EventKind};
use crate::state::AppState;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

pub struct AddLearningsTool;

impl AddLearningsTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct LearningsInput {
    learning_info: String,
}

#[async_trait]
impl Tool for AddLearningsTool {
    fn name(&self) -> &str {
        "daz_add_learnings"
    }

    fn description(&self) -> &str {
        "Add learnings or useful information to the session for future reference: full paths \
         discovered while navigating, important file locations, project structure, configuration \
         or environment notes, recurring error patterns. Runs nothing; the information is folded \
         into the session summary."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["learning_info"],
            "properties": {
                "learning_info": {"type": "string", "description": "The information to remember"}
            }
        })
    }

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput> {
        let params: LearningsInput = serde_json::from_value(input)?;
        let info_length = params.learning_info.chars().count();

        let event = Event::new(EventKind::Learning)
            .with_context(
                "Capturing useful session context",
                "Identified important information to preserve",
                "Store this information for future session reference",
            )
            .input("learning_info", params.learning_info)
            .output("success", true)
            .output("captured", true)
            .output("info_length", info_length);
        state.record(event)?;

        Ok(ToolOutput::new(json!({
            "success": true,
            "message": "Learning information added to session context",
            "info_length": info_length,
        })))
    }
}

pub struct RecordUserRequestTool;

impl RecordUserRequestTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct UserRequestInput {
    user_request: String,
}

#[async_trait]
impl Tool for RecordUserRequestTool {
    fn name(&self) -> &str {
        "daz_record_user_request"
    }

    fn description(&self) -> &str {
        "Record a user request in the session history. Call this at the start of any multi-step \
         task so the history shows what the user asked for."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["user_request"],
            "properties": {
                "user_request": {"type": "string", "description": "The user's request, verbatim"}
            }
        })
    }

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput> {
        let params: UserRequestInput = serde_json::from_value(input)?;

        let event = Event::new(EventKind::UserRequest)
            .with_context(
                params.user_request.clone(),
                "User provided new request",
                "Processing user request",
            )
            .input("user_request", params.user_request.clone())
            .output("success", true);
        let session = state.record(event)?;

        Ok(ToolOutput::new(json!({
            "success": true,
            "message": "User request recorded successfully",
            "session_name": session,
            "user_request": params.user_request,
        })))
    }
}
