pub mod agent;
pub mod browser;
pub mod config;
pub mod errors;
pub mod harness;
pub mod llm;

pub use crate::agent::run::{Agent, RunReport, Task};
pub use crate::browser::driver::{PageDriver, PageState};
pub use crate::config::{load_config, AppConfig};
pub use crate::errors::{AgentError, AgentResult};
pub use crate::llm::service::CompletionService;
