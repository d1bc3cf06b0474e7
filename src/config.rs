use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{AgentError, AgentResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub find: FindConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_base: String,
    /// Optional API key stored in config.toml (falls back to env var WEBPILOT_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Primary model: goal planning, action choice, extraction, output generation.
    #[serde(default = "default_model")]
    pub model: String,
    /// Terminal task-verdict model.
    #[serde(default = "default_evaluator_model")]
    pub evaluator_model: String,
    /// Model for the content-locating sub-procedure.
    #[serde(default = "default_find_model")]
    pub find_model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Task evaluation reasons over the full screenshot history; give it longer.
    #[serde(default = "default_evaluator_timeout_secs")]
    pub evaluator_timeout_secs: u64,
}

impl LlmConfig {
    /// Config value wins; environment variable is the fallback.
    pub fn resolve_api_key(&self) -> AgentResult<String> {
        if let Some(key) = self.api_key.clone().filter(|k| !k.is_empty()) {
            return Ok(key);
        }
        std::env::var("WEBPILOT_API_KEY").map_err(|_| {
            AgentError::Config(
                "no API key: set [llm] api_key in config.toml or the WEBPILOT_API_KEY env var"
                    .into(),
            )
        })
    }
}

fn default_model() -> String {
    "gpt-4.1".into()
}

fn default_evaluator_model() -> String {
    "o4-mini".into()
}

fn default_find_model() -> String {
    "gpt-4o".into()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_evaluator_timeout_secs() -> u64 {
    240
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Probe for a captcha before each iteration and suspend on a positive hit.
    #[serde(default)]
    pub include_captcha_check: bool,
    /// Attach the current screenshot to feedback/goal messages.
    #[serde(default = "default_true")]
    pub attach_screenshots: bool,
    /// Bounded wait for network idle after page-mutating actions. A page that
    /// never settles (e.g. a polling widget) is not an error.
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            include_captcha_check: false,
            attach_screenshots: true,
            settle_timeout_ms: default_settle_timeout_ms(),
        }
    }
}

fn default_max_iterations() -> u32 {
    30
}

fn default_settle_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindConfig {
    /// Height of each full-page screenshot crop, in pixels.
    #[serde(default = "default_crop_height")]
    pub crop_height: u32,
    /// Allowed divergence between the requested and achieved scroll position
    /// before falling back to iterative scrolling.
    #[serde(default = "default_scroll_tolerance_px")]
    pub scroll_tolerance_px: f64,
    /// Viewport fraction per step during iterative fallback scrolling.
    #[serde(default = "default_step_fraction")]
    pub step_fraction: f64,
}

impl Default for FindConfig {
    fn default() -> Self {
        Self {
            crop_height: default_crop_height(),
            scroll_tolerance_px: default_scroll_tolerance_px(),
            step_fraction: default_step_fraction(),
        }
    }
}

fn default_crop_height() -> u32 {
    1600
}

fn default_scroll_tolerance_px() -> f64 {
    32.0
}

fn default_step_fraction() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn resolve_config_path() -> AgentResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(AgentError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> AgentResult<AppConfig> {
    // Load .env first so env-var fallbacks see it (ignore if absent).
    let _ = dotenvy::dotenv();

    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), model = %config.llm.model, "config loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [llm]
            api_base = "https://api.example.com/v1/chat/completions"
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.model, "gpt-4.1");
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.agent.max_iterations, 30);
        assert!(config.agent.attach_screenshots);
        assert!(!config.agent.include_captcha_check);
        assert_eq!(config.find.crop_height, 1600);
        assert_eq!(config.find.scroll_tolerance_px, 32.0);
    }

    #[test]
    fn overrides_are_respected() {
        let config: AppConfig = toml::from_str(
            r#"
            [llm]
            api_base = "https://api.example.com/v1/chat/completions"
            model = "gpt-4o"

            [agent]
            max_iterations = 5
            include_captcha_check = true

            [find]
            crop_height = 800
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.agent.max_iterations, 5);
        assert!(config.agent.include_captcha_check);
        assert_eq!(config.find.crop_height, 800);
    }
}
