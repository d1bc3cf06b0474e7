//! The goal-directed execution loop: plan a sub-goal, choose one action,
//! execute it, re-evaluate the goal, repeat until the model submits for
//! evaluation or the iteration budget runs out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::agent::action::ChosenAction;
use crate::agent::chooser::ActionChooser;
use crate::agent::evaluator::TaskEvaluator;
use crate::agent::executor::ActionExecutor;
use crate::agent::goals::{Goal, GoalManager};
use crate::agent::output::TaskOutputGenerator;
use crate::agent::prompts;
use crate::browser::driver::PageDriver;
use crate::config::AppConfig;
use crate::errors::{AgentError, AgentResult};
use crate::llm::service::CompletionService;
use crate::llm::types::ChatMessage;

/// Immutable task input. Created once at agent construction.
#[derive(Debug, Clone)]
pub struct Task {
    pub objective: String,
    pub initial_url: String,
    pub max_iterations: u32,
}

/// Everything a run produces, handed to the artifact writer.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub final_response: String,
    pub message_history: Vec<ChatMessage>,
    pub screenshot_history: Vec<String>,
    pub url_history: Vec<String>,
    pub iterations: u32,
    pub execution_time: Duration,
}

pub struct Agent {
    task: Task,
    driver: Arc<dyn PageDriver>,
    attach_screenshots: bool,
    include_captcha_check: bool,

    goal_manager: GoalManager,
    action_chooser: ActionChooser,
    output_generator: TaskOutputGenerator,
    task_evaluator: TaskEvaluator,
    executor: ActionExecutor,

    /// Append-only; the first message is always the system prompt.
    message_history: Vec<ChatMessage>,
    url_history: Vec<String>,
    screenshot_history: Vec<String>,
    goal: Goal,

    iteration: u32,
    task_completed: bool,
    /// Tentative final response from a rejected submission, kept in case the
    /// evaluator was wrong and the budget exhausts.
    final_response: Option<String>,

    /// Resume signal for captcha suspensions. The only unbounded wait in the
    /// loop.
    human_resume: Option<mpsc::Receiver<()>>,
}

impl Agent {
    pub fn new(
        task: Task,
        driver: Arc<dyn PageDriver>,
        service: Arc<dyn CompletionService>,
        config: &AppConfig,
    ) -> Self {
        let decision_timeout = Duration::from_secs(config.llm.request_timeout_secs);
        let evaluator_timeout = Duration::from_secs(config.llm.evaluator_timeout_secs);
        let settle_timeout = Duration::from_millis(config.agent.settle_timeout_ms);

        let message_history = vec![ChatMessage::system(prompts::system_prompt(&task.objective))];

        Self {
            goal_manager: GoalManager::new(
                service.clone(),
                driver.clone(),
                config.llm.model.clone(),
                config.find.crop_height,
                decision_timeout,
            ),
            action_chooser: ActionChooser::new(
                service.clone(),
                config.llm.model.clone(),
                decision_timeout,
            ),
            output_generator: TaskOutputGenerator::new(
                service.clone(),
                config.llm.model.clone(),
                decision_timeout,
            ),
            task_evaluator: TaskEvaluator::new(
                service.clone(),
                config.llm.evaluator_model.clone(),
                evaluator_timeout,
            ),
            executor: ActionExecutor::new(
                driver.clone(),
                service,
                config.llm.model.clone(),
                config.llm.find_model.clone(),
                config.find.clone(),
                settle_timeout,
                decision_timeout,
            ),
            attach_screenshots: config.agent.attach_screenshots,
            include_captcha_check: config.agent.include_captcha_check,
            task,
            driver,
            message_history,
            url_history: Vec::new(),
            screenshot_history: Vec::new(),
            goal: Goal::new("No goal yet".into(), String::new()),
            iteration: 0,
            task_completed: false,
            final_response: None,
            human_resume: None,
        }
    }

    /// Attach the channel a human operator signals on to resume after a
    /// captcha suspension.
    pub fn with_human_resume(mut self, resume: mpsc::Receiver<()>) -> Self {
        self.human_resume = Some(resume);
        self
    }

    /// Drive the loop to a terminal state. The driver is expected to already
    /// be at the task's initial URL with a fresh state snapshot.
    ///
    /// Every normal run returns a report with a natural-language final
    /// response; only transport failures and malformed decision schemas
    /// escape as errors.
    pub async fn run(&mut self) -> AgentResult<RunReport> {
        let started = Instant::now();
        self.initialize().await?;

        while self.iteration < self.task.max_iterations && !self.task_completed {
            // Probe before counting the iteration so a suspend/resume pass
            // consumes no budget.
            if self.include_captcha_check && self.driver.check_for_captcha().await? {
                self.wait_for_human_input().await?;
                continue;
            }

            self.iteration += 1;
            tracing::info!(
                iteration = self.iteration,
                max = self.task.max_iterations,
                goal = %self.goal.text,
                "iteration started"
            );

            let state = self.driver.state().await;
            let chosen = self
                .action_chooser
                .choose_next_action(&self.message_history, &self.goal.text, &state)
                .await?;

            // The stated intent is preserved even if execution fails.
            self.message_history
                .push(ChatMessage::assistant(chosen.to_string()));

            if chosen.action.is_terminal() {
                self.handle_submission(&chosen).await?;
                continue;
            }

            match self.executor.execute(&chosen, &state).await {
                Ok(action_result) => {
                    self.process_successful_action(action_result).await?;
                }
                Err(e) if e.is_recoverable() => {
                    let error_message =
                        format!("Error executing action '{}': {e}", chosen.action.name());
                    tracing::warn!(action = chosen.action.name(), error = %e, "action failed");
                    if let Err(refresh_err) = self.driver.refresh_state().await {
                        tracing::warn!(error = %refresh_err, "state refresh after failed action");
                    }
                    // Goal evaluation is skipped entirely: there is nothing
                    // to evaluate against.
                    self.message_history.push(ChatMessage::user(error_message));
                }
                Err(e) => return Err(e),
            }
        }

        let final_response = self.final_response.take().unwrap_or_else(|| {
            format!(
                "Failed to complete task within {} iterations",
                self.task.max_iterations
            )
        });
        tracing::info!(
            iterations = self.iteration,
            completed = self.task_completed,
            "run finished"
        );

        Ok(RunReport {
            final_response,
            message_history: std::mem::take(&mut self.message_history),
            screenshot_history: std::mem::take(&mut self.screenshot_history),
            url_history: std::mem::take(&mut self.url_history),
            iterations: self.iteration,
            execution_time: started.elapsed(),
        })
    }

    async fn initialize(&mut self) -> AgentResult<()> {
        tracing::info!(objective = %self.task.objective, url = %self.task.initial_url, "starting task");

        let state = self.driver.state().await;
        let screenshot = state.screenshot.clone();
        self.screenshot_history.push(screenshot.clone());
        self.url_history.push(state.url.clone());

        let goal_text = self
            .goal_manager
            .determine_next_goal(&self.message_history)
            .await?;
        self.goal = Goal::new(goal_text, screenshot.clone());

        let announcement = format!("NEXT GOAL:\n{}", self.goal.text);
        let images = self.feedback_images(screenshot);
        self.message_history
            .push(ChatMessage::user_with_images(&announcement, &images));
        Ok(())
    }

    async fn handle_submission(&mut self, chosen: &ChosenAction) -> AgentResult<()> {
        let final_response = self
            .output_generator
            .prepare_final_response(&self.message_history, &self.task.objective)
            .await?;

        // Fold the produced response into the submission's assistant turn.
        if let Some(last) = self.message_history.last_mut() {
            *last = ChatMessage::assistant(format!("{chosen}\n\n{final_response}"));
        }

        let (success, feedback) = self
            .task_evaluator
            .evaluate_task(
                &self.task.objective,
                &final_response,
                &self.screenshot_history,
            )
            .await?;

        // Retained regardless of the verdict: if the evaluator is wrong and
        // the budget later exhausts, this beats the generic failure text.
        self.final_response = Some(final_response);

        if success {
            self.task_completed = true;
        } else {
            let screenshot = self.driver.state().await.screenshot;
            let images = self.feedback_images(screenshot);
            self.message_history.push(ChatMessage::user_with_images(
                &format!("Task was deemed incomplete.\n\nFeedback:\n{feedback}"),
                &images,
            ));
        }
        Ok(())
    }

    /// Post-action bookkeeping and the goal completion/validity ladder.
    async fn process_successful_action(&mut self, action_result: String) -> AgentResult<()> {
        let state = self.driver.state().await;
        let current_screenshot = state.screenshot.clone();

        // The post-action screenshot joins both the task-scoped history and
        // the goal evidence trail before the goal is judged.
        self.screenshot_history.push(current_screenshot.clone());
        self.goal.record(current_screenshot.clone());
        if self.url_history.last() != Some(&state.url) {
            self.url_history.push(state.url.clone());
        }

        let mut completion_ctx = self.message_history.clone();
        if !action_result.is_empty() {
            completion_ctx.push(ChatMessage::user(format!(
                "ACTION RESULT:\n{action_result}"
            )));
        }
        let (completed, feedback) = self
            .goal_manager
            .evaluate_goal_completion(&completion_ctx, &self.goal.text, &self.goal.screenshots)
            .await?;

        let mut message_content = String::new();
        if !action_result.is_empty() {
            message_content = format!("ACTION RESULT:\n{action_result}\n\n");
        }

        if completed {
            message_content.push_str(&format!("PREVIOUS GOAL COMPLETED:\n{feedback}"));
            let mut probe_ctx = self.message_history.clone();
            probe_ctx.push(ChatMessage::user_with_images(
                &message_content,
                std::slice::from_ref(&current_screenshot),
            ));
            let next_goal = self.goal_manager.determine_next_goal(&probe_ctx).await?;
            message_content.push_str(&format!("\n\nNEXT GOAL:\n{next_goal}"));
            self.goal.reset(next_goal, current_screenshot.clone());
        } else {
            message_content.push_str(&format!("FEEDBACK:\n{feedback}"));
            let mut validity_ctx = self.message_history.clone();
            validity_ctx.push(ChatMessage::user(message_content.clone()));
            let (should_update, reasoning) = self
                .goal_manager
                .evaluate_goal_validity(&validity_ctx, &self.goal.text, &self.goal.screenshots)
                .await?;

            if should_update {
                let mut probe_ctx = self.message_history.clone();
                probe_ctx.push(ChatMessage::user_with_images(
                    &message_content,
                    std::slice::from_ref(&current_screenshot),
                ));
                let next_goal = self.goal_manager.determine_next_goal(&probe_ctx).await?;
                message_content.push_str(&format!(
                    "\n\nUPDATED GOAL:\n{reasoning}\n\nNEXT GOAL:\n{next_goal}"
                ));
                self.goal.reset(next_goal, current_screenshot.clone());
            }
            // Otherwise the goal persists; its evidence trail already carries
            // the post-action screenshot.
        }

        let images = self.feedback_images(current_screenshot);
        self.message_history
            .push(ChatMessage::user_with_images(&message_content, &images));
        Ok(())
    }

    async fn wait_for_human_input(&mut self) -> AgentResult<()> {
        tracing::warn!("captcha detected, suspending until a human resumes");
        let resume = self.human_resume.as_mut().ok_or_else(|| {
            AgentError::Execution(
                "captcha detected but no human-resume channel is attached".into(),
            )
        })?;
        if resume.recv().await.is_none() {
            return Err(AgentError::Execution(
                "human-resume channel closed while suspended".into(),
            ));
        }
        self.driver.refresh_state().await?;
        tracing::info!("control yielded back to the agent");
        Ok(())
    }

    fn feedback_images(&self, screenshot: String) -> Vec<String> {
        if self.attach_screenshots {
            vec![screenshot]
        } else {
            Vec::new()
        }
    }
}
