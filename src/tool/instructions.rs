use super::{Tool, ToolOutput};
use crate::state::AppState;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

pub struct ReadInstructionsTool;

impl ReadInstructionsTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for ReadInstructionsTool {
    fn name(&self) -> &str {
        "daz_instructions_read"
    }

    fn description(&self) -> &str {
        "Read the current instructions for the active session."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: Value, state: &AppState) -> Result<ToolOutput> {
        let session = state.require_active()?;
        let instructions = state.history().load_instructions(&session);
        Ok(ToolOutput::new(json!({
            "success": true,
            "session_name": session,
            "instructions": state.history().format_instructions(&session),
            "instruction_count": instructions.len(),
        })))
    }
}

pub struct AddInstructionTool;

impl AddInstructionTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct AddInput {
    instruction: String,
}

#[async_trait]
impl Tool for AddInstructionTool {
    fn name(&self) -> &str {
        "daz_instructions_add"
    }

    fn description(&self) -> &str {
        "Add a new instruction to the active session. The instruction should be a single dot point of guidance."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["instruction"],
            "properties": {
                "instruction": {"type": "string", "description": "One point of guidance"}
            }
        })
    }

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput> {
        let params: AddInput = serde_json::from_value(input)?;
        let session = state.require_active()?;
        let count = state.history().add_instruction(&session, &params.instruction)?;
        Ok(ToolOutput::new(json!({
            "success": true,
            "message": "Instruction added successfully",
            "session_name": session,
            "instruction": params.instruction,
            "total_instructions": count,
        })))
    }
}

pub struct ReplaceInstructionsTool;

impl ReplaceInstructionsTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct ReplaceInput {
    instructions: Vec<String>,
}

#[async_trait]
impl Tool for ReplaceInstructionsTool {
    fn name(&self) -> &str {
        "daz_instructions_replace"
    }

    fn description(&self) -> &str {
        "Replace ALL instructions for the active session with a new list. Existing instructions are discarded."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["instructions"],
            "properties": {
                "instructions": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "The complete new list of instructions"
                }
            }
        })
    }

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput> {
        let params: ReplaceInput = serde_json::from_value(input)?;
        let session = state.require_active()?;
        state
            .history()
            .replace_instructions(&session, &params.instructions)?;
        Ok(ToolOutput::new(json!({
            "success": true,
            "message": "Instructions replaced successfully",
            "session_name": session,
            "total_instructions": params.instructions.len(),
        })))
    }
}
