use std::sync::Arc;
use std::time::Duration;

use crate::agent::action::{AgentAction, ChosenAction};
use crate::agent::prompts;
use crate::agent::tools::action_tools;
use crate::browser::driver::PageState;
use crate::errors::{AgentError, AgentResult};
use crate::llm::service::CompletionService;
use crate::llm::types::{ChatMessage, DecideOptions};

/// Picks exactly one action per invocation from the constrained menu.
pub struct ActionChooser {
    service: Arc<dyn CompletionService>,
    model: String,
    timeout: Duration,
}

impl ActionChooser {
    pub fn new(service: Arc<dyn CompletionService>, model: String, timeout: Duration) -> Self {
        Self {
            service,
            model,
            timeout,
        }
    }

    /// Choose the next action towards `goal` against the given snapshot.
    /// The caller executes against the same snapshot, so resolved element
    /// ids stay valid.
    pub async fn choose_next_action(
        &self,
        history: &[ChatMessage],
        goal: &str,
        state: &PageState,
    ) -> AgentResult<ChosenAction> {
        let prompt = prompts::action_choice_prompt(state, goal);
        let probe =
            ChatMessage::user_with_images(&prompt, std::slice::from_ref(&state.annotated_screenshot));

        let mut messages = history.to_vec();
        messages.push(probe);

        let response = self
            .service
            .decide(
                messages,
                DecideOptions::constrained(self.model.clone(), action_tools()?)
                    .with_timeout(self.timeout),
            )
            .await?;

        // A defaulted guess here could cause irreversible side effects, so
        // an empty selection is a hard error.
        let Some(call) = response.tool_calls.first() else {
            return Err(AgentError::NoActionChosen(
                "model response contained no tool call".into(),
            ));
        };

        let action = AgentAction::from_tool_call(call)?;
        let chosen = ChosenAction::resolve(action, state);
        tracing::info!(action = chosen.action.name(), "action chosen");
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::driver::PageDriver;
    use crate::browser::testing::MockDriver;
    use crate::llm::testing::{json_response, tool_response, ScriptedService};
    use crate::llm::types::DecisionResponse;

    async fn snapshot() -> PageState {
        MockDriver::builder().build().state().await
    }

    #[tokio::test]
    async fn resolves_the_element_from_the_given_snapshot() {
        let service = Arc::new(ScriptedService::new(vec![tool_response(
            "click_element",
            serde_json::json!({"element_id": 2}),
        )]));
        let chooser = ActionChooser::new(service, "gpt-4.1".into(), Duration::from_secs(30));

        let state = snapshot().await;
        let chosen = chooser
            .choose_next_action(&[], "click the search button", &state)
            .await
            .unwrap();
        assert_eq!(chosen.action, AgentAction::ClickElement { element_id: 2 });
        assert_eq!(
            chosen.element.as_ref().map(|e| e.id),
            Some(2),
            "element descriptor should come from the snapshot"
        );
    }

    #[tokio::test]
    async fn no_tool_call_is_a_hard_error() {
        let service = Arc::new(ScriptedService::new(vec![DecisionResponse {
            content: "I think we should click something".into(),
            tool_calls: Vec::new(),
        }]));
        let chooser = ActionChooser::new(service, "gpt-4.1".into(), Duration::from_secs(30));

        let state = snapshot().await;
        let result = chooser.choose_next_action(&[], "goal", &state).await;
        assert!(matches!(result, Err(AgentError::NoActionChosen(_))));
    }

    #[tokio::test]
    async fn probe_carries_the_annotated_screenshot() {
        let service = Arc::new(ScriptedService::new(vec![tool_response(
            "scroll",
            serde_json::json!({"direction": "down", "amount": 0.75}),
        )]));
        let chooser = ActionChooser::new(service.clone(), "gpt-4.1".into(), Duration::from_secs(30));

        let state = snapshot().await;
        chooser
            .choose_next_action(&[], "see more of the page", &state)
            .await
            .unwrap();

        let calls = service.recorded();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].has_tools);
        assert_eq!(calls[0].probe_images.len(), 1);
        assert!(calls[0].probe_images[0].contains("anno-0"));
    }

    #[tokio::test]
    async fn json_decision_in_tool_mode_is_rejected() {
        // The scripted JSON response has no tool call, whatever its content.
        let service = Arc::new(ScriptedService::new(vec![json_response(
            serde_json::json!({"next_goal": "irrelevant"}),
        )]));
        let chooser = ActionChooser::new(service, "gpt-4.1".into(), Duration::from_secs(30));
        let state = snapshot().await;
        assert!(chooser.choose_next_action(&[], "goal", &state).await.is_err());
    }
}
