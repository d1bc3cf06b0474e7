use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One turn of the agent's conversation. The history only ever carries
/// system / user / assistant roles; tool selections are folded back into
/// assistant text before they are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// User message carrying text plus base64 PNG screenshots, rendered as
    /// high-detail image parts.
    pub fn user_with_images(text: &str, images: &[String]) -> Self {
        let mut parts = Vec::with_capacity(images.len() + 1);
        if !text.is_empty() {
            parts.push(ContentPart::Text {
                text: text.to_string(),
            });
        }
        for image in images {
            if image.is_empty() {
                continue;
            }
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{image}"),
                    detail: Some("high".into()),
                },
            });
        }
        Self {
            role: "user".into(),
            content: MessageContent::Parts(parts),
        }
    }

    /// Flattened text of the message (image parts rendered as a marker).
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => text.clone(),
                    ContentPart::ImageUrl { .. } => "[IMAGE ATTACHMENT]".to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub def_type: String,
    pub function: FunctionDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub strict: bool,
}

/// Parsed decision returned by the completion service.
#[derive(Debug, Clone, Default)]
pub struct DecisionResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Per-call knobs for a decision round-trip.
#[derive(Debug, Clone)]
pub struct DecideOptions {
    pub model: String,
    /// Request a JSON-object response (ignored when a tool menu is supplied).
    pub json_format: bool,
    /// Constrained single-choice tool menu.
    pub tools: Option<Vec<ToolDef>>,
    pub timeout: Duration,
}

impl DecideOptions {
    pub fn json(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            json_format: true,
            tools: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn text(model: impl Into<String>) -> Self {
        Self {
            json_format: false,
            ..Self::json(model)
        }
    }

    pub fn constrained(model: impl Into<String>, tools: Vec<ToolDef>) -> Self {
        Self {
            tools: Some(tools),
            json_format: false,
            ..Self::json(model)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_with_images_builds_data_uris() {
        let message = ChatMessage::user_with_images("look at this", &["QUJD".to_string()]);
        let MessageContent::Parts(parts) = &message.content else {
            panic!("expected multi-part content");
        };
        assert_eq!(parts.len(), 2);
        match &parts[1] {
            ContentPart::ImageUrl { image_url } => {
                assert_eq!(image_url.url, "data:image/png;base64,QUJD");
                assert_eq!(image_url.detail.as_deref(), Some("high"));
            }
            other => panic!("expected image part, got {other:?}"),
        }
    }

    #[test]
    fn empty_images_are_skipped() {
        let message = ChatMessage::user_with_images("text only", &[String::new()]);
        let MessageContent::Parts(parts) = &message.content else {
            panic!("expected multi-part content");
        };
        assert_eq!(parts.len(), 1);
    }
}
