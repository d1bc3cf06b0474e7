use crate::errors::{AgentError, AgentResult};
use crate::llm::types::ToolDef;

/// The constrained action menu offered to the model, embedded at compile
/// time. Exactly one of these may be selected per decision.
pub fn action_tools() -> AgentResult<Vec<ToolDef>> {
    let json = include_str!("../../prompts/tools/actions.json");
    serde_json::from_str(json)
        .map_err(|e| AgentError::Config(format!("failed to parse action tools: {e}")))
}
