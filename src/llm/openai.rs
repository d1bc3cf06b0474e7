use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::errors::{AgentError, AgentResult};
use crate::llm::service::CompletionService;
use crate::llm::types::{
    ChatMessage, DecideOptions, DecisionResponse, FunctionCall, ToolCall,
};
use crate::llm::usage::UsageLedger;

/// OpenAI-compatible chat-completions client. One blocking round-trip per
/// decision; transport failures are retried a bounded number of times with
/// the same input before the call becomes fatal.
pub struct OpenAiCompletionService {
    api_base: String,
    api_key: String,
    client: reqwest::Client,
    ledger: Arc<UsageLedger>,
    max_retries: u32,
    retry_delay: Duration,
}

impl OpenAiCompletionService {
    pub fn new(config: &LlmConfig, ledger: Arc<UsageLedger>) -> AgentResult<Self> {
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key: config.resolve_api_key()?,
            client: reqwest::Client::new(),
            ledger,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    fn build_body(&self, messages: &[ChatMessage], opts: &DecideOptions) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": opts.model,
            "messages": messages,
            "temperature": 0.0,
        });
        match &opts.tools {
            Some(tools) => {
                body["tools"] = serde_json::to_value(tools).unwrap_or_default();
                // One action per decision: force a tool call, forbid parallel calls.
                body["tool_choice"] = serde_json::json!("required");
                body["parallel_tool_calls"] = serde_json::json!(false);
            }
            None if opts.json_format => {
                body["response_format"] = serde_json::json!({ "type": "json_object" });
            }
            None => {}
        }
        body
    }

    async fn try_call(
        &self,
        body: &serde_json::Value,
        opts: &DecideOptions,
    ) -> AgentResult<DecisionResponse> {
        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .timeout(opts.timeout)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(AgentError::Decision(format!("{status}: {err_body}")));
        }

        let json: serde_json::Value = response.json().await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let tool_calls: Vec<ToolCall> = json["choices"][0]["message"]["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .map(|call| ToolCall {
                        id: call["id"].as_str().unwrap_or("").to_string(),
                        call_type: call["type"].as_str().unwrap_or("function").to_string(),
                        function: FunctionCall {
                            name: call["function"]["name"].as_str().unwrap_or("").to_string(),
                            arguments: call["function"]["arguments"]
                                .as_str()
                                .unwrap_or("{}")
                                .to_string(),
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(usage) = json.get("usage") {
            self.ledger.record(
                &opts.model,
                usage["prompt_tokens"].as_u64().unwrap_or(0),
                usage["completion_tokens"].as_u64().unwrap_or(0),
            );
        }

        tracing::debug!(
            model = %opts.model,
            content_len = content.len(),
            tool_calls = tool_calls.len(),
            "decision response received"
        );

        Ok(DecisionResponse {
            content,
            tool_calls,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionService {
    async fn decide(
        &self,
        messages: Vec<ChatMessage>,
        opts: DecideOptions,
    ) -> AgentResult<DecisionResponse> {
        let body = self.build_body(&messages, &opts);

        // Bounded retry loop, identical input each attempt.
        let mut attempt = 0;
        loop {
            match self.try_call(&body, &opts).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(AgentError::Decision(format!(
                            "failed after {attempt} attempts: {e}"
                        )));
                    }
                    tracing::warn!(
                        attempt,
                        model = %opts.model,
                        error = %e,
                        "decision call failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
            }
        }
    }
}
