use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::agent::prompts;
use crate::errors::AgentResult;
use crate::llm::service::{parse_decision, CompletionService};
use crate::llm::types::{ChatMessage, DecideOptions};

#[derive(Debug, Deserialize)]
struct TaskOutputDecision {
    response: String,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: String,
    #[serde(default)]
    information: String,
}

/// Composes the final natural-language response from the conversation
/// history when the agent submits for evaluation.
pub struct TaskOutputGenerator {
    service: Arc<dyn CompletionService>,
    model: String,
    timeout: Duration,
}

impl TaskOutputGenerator {
    pub fn new(service: Arc<dyn CompletionService>, model: String, timeout: Duration) -> Self {
        Self {
            service,
            model,
            timeout,
        }
    }

    pub async fn prepare_final_response(
        &self,
        history: &[ChatMessage],
        task: &str,
    ) -> AgentResult<String> {
        let probe = ChatMessage::user(prompts::task_output_prompt(task));
        let mut messages = history.to_vec();
        messages.push(probe);

        let response = self
            .service
            .decide(
                messages,
                DecideOptions::json(self.model.clone()).with_timeout(self.timeout),
            )
            .await?;
        let decision: TaskOutputDecision = parse_decision(&response, "prepare_final_response")?;

        let formatted = if decision.information.is_empty() {
            decision.response
        } else {
            format!("{}\n\n{}", decision.response, decision.information)
        };
        tracing::info!(response = %formatted, "final response prepared");
        Ok(formatted)
    }
}
