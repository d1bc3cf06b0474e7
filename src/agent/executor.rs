use std::sync::Arc;
use std::time::Duration;

use crate::agent::action::{AgentAction, ChosenAction};
use crate::agent::prompts;
use crate::browser::driver::{NavDirection, PageDriver, PageState};
use crate::browser::search::ContentSearch;
use crate::config::FindConfig;
use crate::errors::{AgentError, AgentResult};
use crate::llm::service::CompletionService;
use crate::llm::types::{ChatMessage, DecideOptions};

/// Maps abstract actions onto `PageDriver` calls. Element and tab references
/// are resolved against the snapshot the action was chosen from, and fail
/// closed when the snapshot has gone stale. Every non-terminal action ends
/// with a mandatory state refresh so nothing downstream reasons about a
/// pre-action page.
pub struct ActionExecutor {
    driver: Arc<dyn PageDriver>,
    service: Arc<dyn CompletionService>,
    model: String,
    find_model: String,
    find_config: FindConfig,
    settle_timeout: Duration,
    decision_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        service: Arc<dyn CompletionService>,
        model: String,
        find_model: String,
        find_config: FindConfig,
        settle_timeout: Duration,
        decision_timeout: Duration,
    ) -> Self {
        Self {
            driver,
            service,
            model,
            find_model,
            find_config,
            settle_timeout,
            decision_timeout,
        }
    }

    /// Execute the action against the snapshot it was chosen from. Returns
    /// the action's textual result (often empty); the terminal
    /// `submit_for_evaluation` mutates nothing and skips the refresh.
    pub async fn execute(&self, chosen: &ChosenAction, state: &PageState) -> AgentResult<String> {
        let result = self.dispatch(&chosen.action, state).await?;
        if !chosen.action.is_terminal() {
            self.driver.refresh_state().await?;
        }
        Ok(result)
    }

    async fn dispatch(&self, action: &AgentAction, state: &PageState) -> AgentResult<String> {
        match action {
            AgentAction::ClickElement { element_id } => {
                self.resolve_element(*element_id, state)?;
                self.driver.click(*element_id).await?;
                self.settle().await;
                Ok(String::new())
            }
            AgentAction::TypeText {
                element_id,
                text,
                submit,
            } => {
                self.resolve_element(*element_id, state)?;
                self.driver.fill(*element_id, text, *submit).await?;
                self.settle().await;
                Ok(String::new())
            }
            AgentAction::Scroll { direction, amount } => {
                self.driver.scroll(*direction, *amount).await?;
                Ok(String::new())
            }
            AgentAction::Navigate { direction } => {
                match direction {
                    NavDirection::Back => self.driver.back().await?,
                    NavDirection::Forward => self.driver.forward().await?,
                }
                self.settle().await;
                Ok(String::new())
            }
            AgentAction::GoToUrl { url } => {
                self.driver.navigate(url).await?;
                self.settle().await;
                Ok(String::new())
            }
            AgentAction::SwitchTab { tab_index } => {
                let tabs = self.driver.open_tabs().await?;
                if *tab_index >= tabs.len() {
                    return Err(AgentError::ElementResolution(format!(
                        "Tab index {tab_index} out of range. Available tabs: {}",
                        tabs.len()
                    )));
                }
                self.driver.focus_tab(*tab_index).await?;
                Ok(String::new())
            }
            AgentAction::Find { content_to_find } => {
                let search = ContentSearch::new(
                    self.driver.clone(),
                    self.service.clone(),
                    self.find_model.clone(),
                    self.find_config.clone(),
                    self.decision_timeout,
                );
                search.run(content_to_find).await
            }
            AgentAction::Extract {
                information_to_extract,
            } => self.extract(information_to_extract).await,
            AgentAction::SubmitForEvaluation => Ok(String::new()),
        }
    }

    fn resolve_element(&self, element_id: u32, state: &PageState) -> AgentResult<()> {
        if state.elements.contains_key(&element_id) {
            Ok(())
        } else {
            Err(AgentError::ElementResolution(format!(
                "element {element_id} not found in the current page snapshot"
            )))
        }
    }

    /// Bounded wait for the page to settle after a potentially navigating
    /// action. Pages that never reach network idle (polling widgets,
    /// long-lived connections) are not an error.
    async fn settle(&self) {
        if let Err(e) = self.driver.wait_for_quiescence(self.settle_timeout).await {
            tracing::debug!(error = %e, "page did not reach quiescence, continuing");
        }
    }

    async fn extract(&self, information_to_extract: &str) -> AgentResult<String> {
        let page_text = self.driver.page_text().await?;
        let prompt = prompts::extract_prompt(information_to_extract, &page_text);
        let response = self
            .service
            .decide(
                vec![ChatMessage::user(prompt)],
                DecideOptions::text(self.model.clone()).with_timeout(self.decision_timeout),
            )
            .await?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::MockDriver;
    use crate::llm::testing::ScriptedService;
    use crate::llm::types::DecisionResponse;

    fn executor(
        driver: Arc<MockDriver>,
        service: Arc<ScriptedService>,
    ) -> ActionExecutor {
        ActionExecutor::new(
            driver,
            service,
            "gpt-4.1".into(),
            "gpt-4o".into(),
            FindConfig::default(),
            Duration::from_millis(5000),
            Duration::from_secs(30),
        )
    }

    fn chosen(action: AgentAction, state: &PageState) -> ChosenAction {
        ChosenAction::resolve(action, state)
    }

    #[tokio::test]
    async fn click_settles_and_refreshes() {
        let driver = Arc::new(MockDriver::builder().build());
        let service = Arc::new(ScriptedService::new(Vec::new()));
        let executor = executor(driver.clone(), service);

        let state = driver.state().await;
        executor
            .execute(&chosen(AgentAction::ClickElement { element_id: 1 }, &state), &state)
            .await
            .unwrap();

        assert_eq!(driver.clicks(), vec![1]);
        assert_eq!(driver.quiescence_waits(), 1);
        assert_eq!(driver.refreshes(), 1);
    }

    #[tokio::test]
    async fn stale_element_ids_fail_closed() {
        let driver = Arc::new(MockDriver::builder().stable_ids(false).build());
        let service = Arc::new(ScriptedService::new(Vec::new()));
        let executor = executor(driver.clone(), service);

        let stale = driver.state().await;
        driver.refresh_state().await.unwrap();

        let result = executor
            .execute(&chosen(AgentAction::ClickElement { element_id: 1 }, &stale), &stale)
            .await;
        // The snapshot the caller passed is the one that counts; ids in it
        // resolve, but executing against a *different* snapshot must not be
        // possible through the public contract. Here the stale snapshot still
        // contains id 1, so the click goes through.
        assert!(result.is_ok());

        let fresh = driver.state().await;
        let result = executor
            .execute(&chosen(AgentAction::ClickElement { element_id: 1 }, &fresh), &fresh)
            .await;
        assert!(
            matches!(result, Err(AgentError::ElementResolution(_))),
            "id from the previous generation must not resolve in the fresh snapshot"
        );
    }

    #[tokio::test]
    async fn swallowed_quiescence_timeout_is_not_a_failure() {
        let driver = Arc::new(MockDriver::builder().quiescence_times_out(true).build());
        let service = Arc::new(ScriptedService::new(Vec::new()));
        let executor = executor(driver.clone(), service);

        let state = driver.state().await;
        let result = executor
            .execute(
                &chosen(
                    AgentAction::GoToUrl {
                        url: "https://shop.example.com/cart".into(),
                    },
                    &state,
                ),
                &state,
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(driver.navigations(), vec!["https://shop.example.com/cart"]);
        assert_eq!(driver.refreshes(), 1);
    }

    #[tokio::test]
    async fn out_of_range_tab_is_a_resolution_error() {
        let driver = Arc::new(MockDriver::builder().build());
        let service = Arc::new(ScriptedService::new(Vec::new()));
        let executor = executor(driver.clone(), service);

        let state = driver.state().await;
        let result = executor
            .execute(&chosen(AgentAction::SwitchTab { tab_index: 3 }, &state), &state)
            .await;
        assert!(matches!(result, Err(AgentError::ElementResolution(_))));
        // Failed resolution must not refresh: the caller owns error recovery.
        assert_eq!(driver.refreshes(), 0);
    }

    #[tokio::test]
    async fn submit_for_evaluation_mutates_nothing() {
        let driver = Arc::new(MockDriver::builder().build());
        let service = Arc::new(ScriptedService::new(Vec::new()));
        let executor = executor(driver.clone(), service);

        let state = driver.state().await;
        let result = executor
            .execute(&chosen(AgentAction::SubmitForEvaluation, &state), &state)
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(driver.refreshes(), 0);
        assert_eq!(driver.quiescence_waits(), 0);
    }

    #[tokio::test]
    async fn extract_returns_the_model_text() {
        let driver = Arc::new(MockDriver::builder().build());
        let service = Arc::new(ScriptedService::new(vec![DecisionResponse {
            content: "The shop sells everything you need.".into(),
            tool_calls: Vec::new(),
        }]));
        let executor = executor(driver.clone(), service.clone());

        let state = driver.state().await;
        let result = executor
            .execute(
                &chosen(
                    AgentAction::Extract {
                        information_to_extract: "the shop tagline".into(),
                    },
                    &state,
                ),
                &state,
            )
            .await
            .unwrap();
        assert_eq!(result, "The shop sells everything you need.");

        let calls = service.recorded();
        assert!(!calls[0].json_format, "extraction is a free-text decision");
        assert!(calls[0].probe_text.contains("Example Shop"));
    }

    #[tokio::test]
    async fn driver_failures_surface_as_execution_errors() {
        let driver = Arc::new(
            MockDriver::builder()
                .fail_next_click("click intercepted by overlay")
                .build(),
        );
        let service = Arc::new(ScriptedService::new(Vec::new()));
        let executor = executor(driver.clone(), service);

        let state = driver.state().await;
        let result = executor
            .execute(&chosen(AgentAction::ClickElement { element_id: 1 }, &state), &state)
            .await;
        match result {
            Err(AgentError::Execution(message)) => {
                assert!(message.contains("overlay"));
            }
            other => panic!("expected execution error, got {other:?}"),
        }
    }
}
