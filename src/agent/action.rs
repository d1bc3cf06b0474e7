use std::fmt;

use serde::Deserialize;

use crate::browser::driver::{NavDirection, PageElement, PageState, ScrollDirection};
use crate::errors::{AgentError, AgentResult};
use crate::llm::types::ToolCall;

pub const DEFAULT_SCROLL_AMOUNT: f64 = 0.75;

/// The closed action vocabulary. Tool names outside this set are rejected
/// when the tool call is decoded, never dispatched reflectively.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    ClickElement {
        element_id: u32,
    },
    TypeText {
        element_id: u32,
        text: String,
        submit: bool,
    },
    Scroll {
        direction: ScrollDirection,
        amount: f64,
    },
    Navigate {
        direction: NavDirection,
    },
    GoToUrl {
        url: String,
    },
    SwitchTab {
        tab_index: usize,
    },
    Find {
        content_to_find: String,
    },
    Extract {
        information_to_extract: String,
    },
    SubmitForEvaluation,
}

impl AgentAction {
    pub fn name(&self) -> &'static str {
        match self {
            AgentAction::ClickElement { .. } => "click_element",
            AgentAction::TypeText { .. } => "type_text",
            AgentAction::Scroll { .. } => "scroll",
            AgentAction::Navigate { .. } => "navigate",
            AgentAction::GoToUrl { .. } => "go_to_url",
            AgentAction::SwitchTab { .. } => "switch_tab",
            AgentAction::Find { .. } => "find",
            AgentAction::Extract { .. } => "extract",
            AgentAction::SubmitForEvaluation => "submit_for_evaluation",
        }
    }

    pub fn element_id(&self) -> Option<u32> {
        match self {
            AgentAction::ClickElement { element_id }
            | AgentAction::TypeText { element_id, .. } => Some(*element_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentAction::SubmitForEvaluation)
    }

    /// Decode a tool call into an action. Unknown names fail with
    /// `UnsupportedAction`; malformed arguments for a known name are a
    /// decision error.
    pub fn from_tool_call(call: &ToolCall) -> AgentResult<Self> {
        let args: serde_json::Value =
            serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
        let name = call.function.name.as_str();

        match name {
            "click_element" => {
                #[derive(Deserialize)]
                struct Args {
                    element_id: u32,
                }
                let args: Args = decode_args(args, name)?;
                Ok(AgentAction::ClickElement {
                    element_id: args.element_id,
                })
            }
            "type_text" => {
                #[derive(Deserialize)]
                struct Args {
                    element_id: u32,
                    text: String,
                    #[serde(default)]
                    submit: bool,
                }
                let args: Args = decode_args(args, name)?;
                Ok(AgentAction::TypeText {
                    element_id: args.element_id,
                    text: args.text,
                    submit: args.submit,
                })
            }
            "scroll" => {
                #[derive(Deserialize)]
                struct Args {
                    direction: ScrollDirection,
                    #[serde(default = "default_scroll_amount")]
                    amount: f64,
                }
                let args: Args = decode_args(args, name)?;
                Ok(AgentAction::Scroll {
                    direction: args.direction,
                    amount: args.amount,
                })
            }
            "navigate" => {
                #[derive(Deserialize)]
                struct Args {
                    direction: NavDirection,
                }
                let args: Args = decode_args(args, name)?;
                Ok(AgentAction::Navigate {
                    direction: args.direction,
                })
            }
            "go_to_url" => {
                #[derive(Deserialize)]
                struct Args {
                    url: String,
                }
                let args: Args = decode_args(args, name)?;
                Ok(AgentAction::GoToUrl { url: args.url })
            }
            "switch_tab" => {
                #[derive(Deserialize)]
                struct Args {
                    tab_index: usize,
                }
                let args: Args = decode_args(args, name)?;
                Ok(AgentAction::SwitchTab {
                    tab_index: args.tab_index,
                })
            }
            "find" => {
                #[derive(Deserialize)]
                struct Args {
                    content_to_find: String,
                }
                let args: Args = decode_args(args, name)?;
                Ok(AgentAction::Find {
                    content_to_find: args.content_to_find,
                })
            }
            "extract" => {
                #[derive(Deserialize)]
                struct Args {
                    information_to_extract: String,
                }
                let args: Args = decode_args(args, name)?;
                Ok(AgentAction::Extract {
                    information_to_extract: args.information_to_extract,
                })
            }
            "submit_for_evaluation" => Ok(AgentAction::SubmitForEvaluation),
            other => Err(AgentError::UnsupportedAction(other.to_string())),
        }
    }

    /// Arguments as JSON for the history rendering, element id omitted (the
    /// resolved element is shown instead).
    fn args_json(&self) -> serde_json::Value {
        match self {
            AgentAction::ClickElement { .. } => serde_json::json!({}),
            AgentAction::TypeText { text, submit, .. } => {
                serde_json::json!({ "text": text, "submit": submit })
            }
            AgentAction::Scroll { direction, amount } => {
                serde_json::json!({ "direction": direction, "amount": amount })
            }
            AgentAction::Navigate { direction } => serde_json::json!({ "direction": direction }),
            AgentAction::GoToUrl { url } => serde_json::json!({ "url": url }),
            AgentAction::SwitchTab { tab_index } => serde_json::json!({ "tab_index": tab_index }),
            AgentAction::Find { content_to_find } => {
                serde_json::json!({ "content_to_find": content_to_find })
            }
            AgentAction::Extract {
                information_to_extract,
            } => serde_json::json!({ "information_to_extract": information_to_extract }),
            AgentAction::SubmitForEvaluation => serde_json::json!({}),
        }
    }
}

fn default_scroll_amount() -> f64 {
    DEFAULT_SCROLL_AMOUNT
}

fn decode_args<T: serde::de::DeserializeOwned>(
    args: serde_json::Value,
    name: &str,
) -> AgentResult<T> {
    serde_json::from_value(args)
        .map_err(|e| AgentError::Decision(format!("invalid arguments for '{name}': {e}")))
}

/// An action paired with the element it resolved to in the snapshot it was
/// chosen against. Used once, then survives only as its string rendering.
#[derive(Debug, Clone)]
pub struct ChosenAction {
    pub action: AgentAction,
    pub element: Option<PageElement>,
}

impl ChosenAction {
    pub fn resolve(action: AgentAction, state: &PageState) -> Self {
        let element = action
            .element_id()
            .and_then(|id| state.elements.get(&id).cloned());
        Self { action, element }
    }
}

impl fmt::Display for ChosenAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = serde_json::to_string_pretty(&self.action.args_json())
            .unwrap_or_else(|_| "{}".to_string());
        match &self.element {
            Some(element) => {
                let element_json = serde_json::to_string_pretty(element)
                    .unwrap_or_else(|_| "{}".to_string());
                write!(
                    f,
                    "Action: {}\nElement: {}\nArgs: {}",
                    self.action.name(),
                    element_json,
                    args
                )
            }
            None => write!(f, "Action: {}\nArgs: {}", self.action.name(), args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::FunctionCall;

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            call_type: "function".into(),
            function: FunctionCall {
                name: name.into(),
                arguments: args.to_string(),
            },
        }
    }

    #[test]
    fn decodes_known_actions() {
        let action =
            AgentAction::from_tool_call(&call("click_element", serde_json::json!({"element_id": 4})))
                .unwrap();
        assert_eq!(action, AgentAction::ClickElement { element_id: 4 });

        let action = AgentAction::from_tool_call(&call(
            "type_text",
            serde_json::json!({"element_id": 2, "text": "wireless mouse", "submit": true}),
        ))
        .unwrap();
        assert_eq!(
            action,
            AgentAction::TypeText {
                element_id: 2,
                text: "wireless mouse".into(),
                submit: true,
            }
        );
    }

    #[test]
    fn scroll_amount_defaults() {
        let action =
            AgentAction::from_tool_call(&call("scroll", serde_json::json!({"direction": "down"})))
                .unwrap();
        assert_eq!(
            action,
            AgentAction::Scroll {
                direction: ScrollDirection::Down,
                amount: DEFAULT_SCROLL_AMOUNT,
            }
        );
    }

    #[test]
    fn unknown_names_are_rejected_at_decode() {
        let result = AgentAction::from_tool_call(&call("teleport", serde_json::json!({})));
        assert!(matches!(result, Err(AgentError::UnsupportedAction(name)) if name == "teleport"));
    }

    #[test]
    fn malformed_arguments_are_a_decision_error() {
        let result = AgentAction::from_tool_call(&call("go_to_url", serde_json::json!({})));
        assert!(matches!(result, Err(AgentError::Decision(_))));
    }

    #[test]
    fn display_includes_element_but_not_its_id_in_args() {
        let mut state = PageState::default();
        state.elements.insert(
            7,
            PageElement {
                id: 7,
                description: "<button>Add to cart</button>".into(),
                in_viewport: true,
            },
        );
        let chosen = ChosenAction::resolve(AgentAction::ClickElement { element_id: 7 }, &state);
        let rendered = chosen.to_string();
        assert!(rendered.starts_with("Action: click_element"));
        assert!(rendered.contains("Add to cart"));
        assert!(!rendered.contains("element_id"));
    }
}
