//! Scripted completion service for loop tests: canned responses are popped
//! in order and every call is recorded for assertions.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::{AgentError, AgentResult};
use crate::llm::service::CompletionService;
use crate::llm::types::{
    ChatMessage, ContentPart, DecideOptions, DecisionResponse, FunctionCall, MessageContent,
    ToolCall,
};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub json_format: bool,
    pub has_tools: bool,
    /// Text of the last (probe) message in the call.
    pub probe_text: String,
    /// Image URLs attached to the probe message.
    pub probe_images: Vec<String>,
}

pub struct ScriptedService {
    responses: Mutex<VecDeque<DecisionResponse>>,
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedService {
    pub fn new(responses: Vec<DecisionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

/// Canned JSON-object decision.
pub fn json_response(value: serde_json::Value) -> DecisionResponse {
    DecisionResponse {
        content: value.to_string(),
        tool_calls: Vec::new(),
    }
}

/// Canned single tool-call decision.
pub fn tool_response(name: &str, args: serde_json::Value) -> DecisionResponse {
    DecisionResponse {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: "call_1".into(),
            call_type: "function".into(),
            function: FunctionCall {
                name: name.into(),
                arguments: args.to_string(),
            },
        }],
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn decide(
        &self,
        messages: Vec<ChatMessage>,
        opts: DecideOptions,
    ) -> AgentResult<DecisionResponse> {
        let (probe_text, probe_images) = messages
            .last()
            .map(|message| match &message.content {
                MessageContent::Text(text) => (text.clone(), Vec::new()),
                MessageContent::Parts(parts) => {
                    let mut text = String::new();
                    let mut images = Vec::new();
                    for part in parts {
                        match part {
                            ContentPart::Text { text: t } => text.push_str(t),
                            ContentPart::ImageUrl { image_url } => {
                                images.push(image_url.url.clone())
                            }
                        }
                    }
                    (text, images)
                }
            })
            .unwrap_or_default();

        self.calls.lock().unwrap().push(RecordedCall {
            model: opts.model.clone(),
            json_format: opts.json_format,
            has_tools: opts.tools.is_some(),
            probe_text,
            probe_images,
        });

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::Decision("scripted responses exhausted".into()))
    }
}
