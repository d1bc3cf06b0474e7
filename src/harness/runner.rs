//! Bounded worker pool: many tasks, each with its own driver, execution
//! loop, usage ledger, and artifact; at most `max_concurrent` in flight.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Semaphore;

use crate::agent::run::{Agent, Task};
use crate::browser::driver::PageDriver;
use crate::config::AppConfig;
use crate::errors::{AgentError, AgentResult};
use crate::harness::artifact;
use crate::llm::openai::OpenAiCompletionService;
use crate::llm::service::CompletionService;
use crate::llm::usage::UsageLedger;

/// One benchmark task to run. Tasks without an id get a generated one for
/// the artifact directory.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub id: Option<String>,
    pub objective: String,
    pub initial_url: String,
}

/// Install a global tracing subscriber honoring `RUST_LOG`, defaulting to
/// info. Call once from the embedding application.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Run every task through its own execution loop, bounded by
/// `max_concurrent` permits. `make_driver` builds a fresh driver (tab) per
/// task once its permit is acquired. Per-task failures are reported in the
/// result vector, not propagated.
pub async fn run_tasks<F, Fut>(
    specs: Vec<TaskSpec>,
    config: AppConfig,
    output_dir: PathBuf,
    max_concurrent: usize,
    make_driver: F,
) -> Vec<AgentResult<PathBuf>>
where
    F: Fn(&TaskSpec) -> Fut,
    Fut: Future<Output = AgentResult<Arc<dyn PageDriver>>>,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let config = Arc::new(config);
    let make_driver = &make_driver;

    let futures = specs.into_iter().enumerate().map(|(index, spec)| {
        let semaphore = semaphore.clone();
        let config = config.clone();
        let output_dir = output_dir.clone();
        async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| AgentError::Execution("worker pool closed".into()))?;
            // Stagger starts so a burst of fresh tabs does not land at once.
            tokio::time::sleep(Duration::from_millis((index as u64 % 20) * 250)).await;

            let driver = make_driver(&spec).await?;
            let result = run_one(&spec, &config, &output_dir, driver).await;
            if let Err(e) = &result {
                tracing::error!(task = %spec.display_id(), error = %e, "task failed");
            }
            result
        }
    });

    join_all(futures).await
}

impl TaskSpec {
    fn display_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.objective.clone())
    }

    fn artifact_dir(&self, output_dir: &Path) -> PathBuf {
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        output_dir.join(id)
    }
}

async fn run_one(
    spec: &TaskSpec,
    config: &AppConfig,
    output_dir: &Path,
    driver: Arc<dyn PageDriver>,
) -> AgentResult<PathBuf> {
    let ledger = Arc::new(UsageLedger::new());
    let service: Arc<dyn CompletionService> =
        Arc::new(OpenAiCompletionService::new(&config.llm, ledger.clone())?);

    driver.navigate(&spec.initial_url).await?;
    driver.refresh_state().await?;

    let task = Task {
        objective: spec.objective.clone(),
        initial_url: spec.initial_url.clone(),
        max_iterations: config.agent.max_iterations,
    };
    let mut agent = Agent::new(task.clone(), driver, service, config);
    let report = agent.run().await?;
    tracing::info!(
        task = %spec.display_id(),
        iterations = report.iterations,
        cost = ledger.total_cost(),
        "task finished"
    );

    artifact::save_run(
        &spec.artifact_dir(output_dir),
        &task,
        &report,
        &ledger,
        &config.llm.model,
    )
}
