use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::errors::{AgentError, AgentResult};
use crate::llm::types::{ChatMessage, DecideOptions, DecisionResponse};

/// The decision boundary the core consumes. One call, one structured
/// response: either a free-form JSON object or a single constrained tool
/// choice, depending on the options.
///
/// Implementations own transport retries; a returned error means the call is
/// fatal for the task.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn decide(
        &self,
        messages: Vec<ChatMessage>,
        opts: DecideOptions,
    ) -> AgentResult<DecisionResponse>;
}

/// Parse the JSON-object content of a decision into a typed schema.
/// Empty content and schema mismatches are both decision errors.
pub fn parse_decision<T: DeserializeOwned>(
    response: &DecisionResponse,
    context: &str,
) -> AgentResult<T> {
    if response.content.trim().is_empty() {
        return Err(AgentError::Decision(format!(
            "no response content received in {context}"
        )));
    }
    serde_json::from_str(&response.content)
        .map_err(|e| AgentError::Decision(format!("malformed decision in {context}: {e}")))
}
