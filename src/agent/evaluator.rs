use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::agent::prompts::TASK_EVALUATOR_SYSTEM_PROMPT;
use crate::errors::AgentResult;
use crate::llm::service::{parse_decision, CompletionService};
use crate::llm::types::{ChatMessage, DecideOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskVerdict {
    Success,
    Failed,
    Unclear,
}

impl TaskVerdict {
    /// Anything that is not a recognizable affirmative or negative counts as
    /// unclear.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "success" => TaskVerdict::Success,
            "failed" => TaskVerdict::Failed,
            _ => TaskVerdict::Unclear,
        }
    }

    /// Only an explicit affirmative verdict unblocks termination; `unclear`
    /// means "not yet proven" and keeps the loop trying.
    pub fn is_success(self) -> bool {
        matches!(self, TaskVerdict::Success)
    }
}

#[derive(Debug, Deserialize)]
struct TaskVerdictDecision {
    verdict: String,
    #[serde(default)]
    feedback: String,
}

/// Terminal-only judge: did the whole task succeed, given the full
/// screenshot history and the final response text?
pub struct TaskEvaluator {
    service: Arc<dyn CompletionService>,
    model: String,
    timeout: Duration,
}

impl TaskEvaluator {
    pub fn new(service: Arc<dyn CompletionService>, model: String, timeout: Duration) -> Self {
        Self {
            service,
            model,
            timeout,
        }
    }

    pub async fn evaluate_task(
        &self,
        task: &str,
        final_response: &str,
        screenshot_history: &[String],
    ) -> AgentResult<(bool, String)> {
        let user_message = ChatMessage::user_with_images(
            &format!("TASK: {task}\nResult Response: {final_response}"),
            screenshot_history,
        );
        let response = self
            .service
            .decide(
                vec![ChatMessage::system(TASK_EVALUATOR_SYSTEM_PROMPT), user_message],
                DecideOptions::json(self.model.clone()).with_timeout(self.timeout),
            )
            .await?;
        let decision: TaskVerdictDecision = parse_decision(&response, "evaluate_task")?;
        let verdict = TaskVerdict::parse(&decision.verdict);
        tracing::info!(verdict = ?verdict, "task evaluated");
        Ok((verdict.is_success(), decision.feedback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{json_response, ScriptedService};

    #[test]
    fn verdict_parsing_is_conservative() {
        assert!(TaskVerdict::parse("success").is_success());
        assert!(TaskVerdict::parse("Success").is_success());
        assert!(!TaskVerdict::parse("failed").is_success());
        assert!(!TaskVerdict::parse("unclear").is_success());
        assert!(!TaskVerdict::parse("unknown").is_success());
        assert!(!TaskVerdict::parse("").is_success());
        assert_eq!(TaskVerdict::parse("gibberish"), TaskVerdict::Unclear);
    }

    #[tokio::test]
    async fn unclear_verdicts_do_not_terminate() {
        let service = Arc::new(ScriptedService::new(vec![json_response(serde_json::json!({
            "verdict": "unclear",
            "feedback": "The screenshots do not show the cart contents."
        }))]));
        let evaluator = TaskEvaluator::new(service, "o4-mini".into(), Duration::from_secs(240));

        let (success, feedback) = evaluator
            .evaluate_task("add a mouse to the cart", "Added it.", &["shot-1".into()])
            .await
            .unwrap();
        assert!(!success);
        assert_eq!(feedback, "The screenshots do not show the cart contents.");
    }

    #[tokio::test]
    async fn evaluation_sees_the_full_screenshot_history() {
        let service = Arc::new(ScriptedService::new(vec![json_response(serde_json::json!({
            "verdict": "success",
            "feedback": "All steps are visible."
        }))]));
        let evaluator =
            TaskEvaluator::new(service.clone(), "o4-mini".into(), Duration::from_secs(240));

        let history: Vec<String> = (0..4).map(|i| format!("shot-{i}")).collect();
        let (success, _) = evaluator
            .evaluate_task("task", "Done.", &history)
            .await
            .unwrap();
        assert!(success);

        let calls = service.recorded();
        assert_eq!(calls[0].probe_images.len(), 4);
        assert_eq!(calls[0].model, "o4-mini");
    }
}
