use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::agent::prompts;
use crate::browser::crops::partition_screenshot;
use crate::browser::driver::PageDriver;
use crate::errors::AgentResult;
use crate::llm::service::{parse_decision, CompletionService};
use crate::llm::types::{ChatMessage, DecideOptions};

/// The currently active sub-goal and its evidence trail: every screenshot
/// captured since the goal was (re)set. Goals are superseded wholesale,
/// never merged or rolled back.
#[derive(Debug, Clone)]
pub struct Goal {
    pub text: String,
    pub screenshots: Vec<String>,
}

impl Goal {
    pub fn new(text: String, screenshot: String) -> Self {
        Self {
            text,
            screenshots: vec![screenshot],
        }
    }

    /// Supersede the goal; the evidence trail restarts at the current
    /// screenshot.
    pub fn reset(&mut self, text: String, screenshot: String) {
        self.text = text;
        self.screenshots = vec![screenshot];
    }

    pub fn record(&mut self, screenshot: String) {
        self.screenshots.push(screenshot);
    }
}

#[derive(Debug, Deserialize)]
struct NextGoalDecision {
    #[serde(default)]
    task_state: String,
    next_goal: String,
}

#[derive(Debug, Deserialize)]
struct GoalCompletionDecision {
    #[serde(default)]
    previous_action_evaluation: String,
    completed: bool,
    #[serde(default)]
    feedback: String,
}

#[derive(Debug, Deserialize)]
struct GoalValidityDecision {
    #[serde(default)]
    reasoning: String,
    should_update_goal: bool,
}

/// Goal lifecycle decisions: propose the next goal, judge completion, judge
/// continued validity. Stateless beyond its collaborators; the `Goal` itself
/// lives in the execution loop.
pub struct GoalManager {
    service: Arc<dyn CompletionService>,
    driver: Arc<dyn PageDriver>,
    model: String,
    crop_height: u32,
    timeout: Duration,
}

impl GoalManager {
    pub fn new(
        service: Arc<dyn CompletionService>,
        driver: Arc<dyn PageDriver>,
        model: String,
        crop_height: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            driver,
            model,
            crop_height,
            timeout,
        }
    }

    /// One decision over the history plus an ephemeral probe carrying the
    /// page context and full-page screenshot crops. The probe is never
    /// stored in the history.
    pub async fn determine_next_goal(&self, history: &[ChatMessage]) -> AgentResult<String> {
        let state = self.driver.state().await;
        let prompt = prompts::next_goal_prompt(&state);
        let crops = partition_screenshot(&state.full_page_screenshot, self.crop_height)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "full-page crops unavailable, probing without them");
                Vec::new()
            });
        let probe = ChatMessage::user_with_images(&prompt, &crops);

        let mut messages = history.to_vec();
        messages.push(probe);

        let response = self
            .service
            .decide(
                messages,
                DecideOptions::json(self.model.clone()).with_timeout(self.timeout),
            )
            .await?;
        let decision: NextGoalDecision = parse_decision(&response, "determine_next_goal")?;
        tracing::info!(
            task_state = %decision.task_state,
            next_goal = %decision.next_goal,
            "new goal set"
        );
        Ok(decision.next_goal)
    }

    /// Judge goal completion from exactly the goal-scoped evidence trail;
    /// screenshots from before the goal was set are never consulted.
    pub async fn evaluate_goal_completion(
        &self,
        history: &[ChatMessage],
        goal: &str,
        goal_screenshots: &[String],
    ) -> AgentResult<(bool, String)> {
        let state = self.driver.state().await;
        let prompt = prompts::goal_completion_prompt(&state, goal);
        let probe = ChatMessage::user_with_images(&prompt, goal_screenshots);

        let mut messages = history.to_vec();
        messages.push(probe);

        let response = self
            .service
            .decide(
                messages,
                DecideOptions::json(self.model.clone()).with_timeout(self.timeout),
            )
            .await?;
        let decision: GoalCompletionDecision =
            parse_decision(&response, "evaluate_goal_completion")?;

        let feedback = if decision.completed {
            decision.feedback
        } else {
            format!(
                "{}\n\n{}",
                decision.previous_action_evaluation, decision.feedback
            )
        };
        tracing::info!(completed = decision.completed, "goal completion evaluated");
        Ok((decision.completed, feedback))
    }

    /// Second-order check: the action succeeded and the goal is incomplete,
    /// but is the goal itself still worth pursuing?
    pub async fn evaluate_goal_validity(
        &self,
        history: &[ChatMessage],
        goal: &str,
        goal_screenshots: &[String],
    ) -> AgentResult<(bool, String)> {
        let state = self.driver.state().await;
        let prompt = prompts::goal_validity_prompt(&state, goal);
        let probe = ChatMessage::user_with_images(&prompt, goal_screenshots);

        let mut messages = history.to_vec();
        messages.push(probe);

        let response = self
            .service
            .decide(
                messages,
                DecideOptions::json(self.model.clone()).with_timeout(self.timeout),
            )
            .await?;
        let decision: GoalValidityDecision = parse_decision(&response, "evaluate_goal_validity")?;
        tracing::info!(
            should_update = decision.should_update_goal,
            reasoning = %decision.reasoning,
            "goal validity evaluated"
        );
        Ok((decision.should_update_goal, decision.reasoning))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{synthetic_page, MockDriver};
    use crate::llm::testing::{json_response, ScriptedService};

    fn manager(
        responses: Vec<crate::llm::types::DecisionResponse>,
    ) -> (GoalManager, Arc<ScriptedService>, Arc<MockDriver>) {
        let driver = Arc::new(
            MockDriver::builder()
                .full_page_screenshot(synthetic_page(40, 2000))
                .build(),
        );
        let service = Arc::new(ScriptedService::new(responses));
        let manager = GoalManager::new(
            service.clone(),
            driver.clone(),
            "gpt-4.1".into(),
            1600,
            Duration::from_secs(30),
        );
        (manager, service, driver)
    }

    #[tokio::test]
    async fn next_goal_probe_is_ephemeral() {
        let (manager, service, _driver) = manager(vec![json_response(serde_json::json!({
            "task_state": "nothing done yet",
            "next_goal": "type the query into the search box"
        }))]);

        let history = vec![ChatMessage::system("system prompt")];
        let goal = manager.determine_next_goal(&history).await.unwrap();
        assert_eq!(goal, "type the query into the search box");
        // The persisted history was not touched.
        assert_eq!(history.len(), 1);

        let calls = service.recorded();
        assert!(calls[0].json_format);
        assert!(calls[0].probe_text.contains("immediate next goal"));
    }

    #[tokio::test]
    async fn incomplete_goals_concatenate_both_feedback_parts() {
        let (manager, _service, _driver) = manager(vec![json_response(serde_json::json!({
            "previous_action_evaluation": "The click opened the wrong menu.",
            "completed": false,
            "feedback": "Close the menu and use the search box instead."
        }))]);

        let (completed, feedback) = manager
            .evaluate_goal_completion(&[], "open the product page", &["shot-1".into()])
            .await
            .unwrap();
        assert!(!completed);
        assert_eq!(
            feedback,
            "The click opened the wrong menu.\n\nClose the menu and use the search box instead."
        );
    }

    #[tokio::test]
    async fn completed_goals_return_only_the_summary() {
        let (manager, _service, _driver) = manager(vec![json_response(serde_json::json!({
            "previous_action_evaluation": "ignored",
            "completed": true,
            "feedback": "Search results are showing."
        }))]);

        let (completed, feedback) = manager
            .evaluate_goal_completion(&[], "run the search", &["shot-1".into()])
            .await
            .unwrap();
        assert!(completed);
        assert_eq!(feedback, "Search results are showing.");
    }

    #[tokio::test]
    async fn completion_evidence_is_exactly_the_goal_screenshots() {
        let (manager, service, _driver) = manager(vec![json_response(serde_json::json!({
            "previous_action_evaluation": "",
            "completed": false,
            "feedback": "keep going"
        }))]);

        let evidence = vec!["shot-3".to_string(), "shot-4".to_string()];
        manager
            .evaluate_goal_completion(&[], "goal", &evidence)
            .await
            .unwrap();

        let calls = service.recorded();
        assert_eq!(calls[0].probe_images.len(), 2);
        assert!(calls[0].probe_images[0].contains("shot-3"));
        assert!(calls[0].probe_images[1].contains("shot-4"));
    }

    #[tokio::test]
    async fn validity_decision_round_trips() {
        let (manager, _service, _driver) = manager(vec![json_response(serde_json::json!({
            "reasoning": "The item is out of stock.",
            "should_update_goal": true
        }))]);

        let (should_update, reasoning) = manager
            .evaluate_goal_validity(&[], "add the item to cart", &["shot-2".into()])
            .await
            .unwrap();
        assert!(should_update);
        assert_eq!(reasoning, "The item is out of stock.");
    }
}
