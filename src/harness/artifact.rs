//! Per-run JSON artifact. Field names are a compatibility contract with the
//! surrounding grading pipeline; do not rename them.

use std::path::{Path, PathBuf};

use crate::agent::run::{RunReport, Task};
use crate::errors::{AgentError, AgentResult};
use crate::llm::types::{ChatMessage, ContentPart, MessageContent};
use crate::llm::usage::UsageLedger;

pub fn save_run(
    output_dir: &Path,
    task: &Task,
    report: &RunReport,
    ledger: &UsageLedger,
    primary_model: &str,
) -> AgentResult<PathBuf> {
    let record = serde_json::json!({
        "objective": task.objective,
        "initial_url": task.initial_url,
        "iterations": report.iterations,
        "final_response": report.final_response,
        "url_history": report.url_history,
        "execution_time": report.execution_time.as_secs_f64(),
        "token_usage": ledger.snapshot(),
        "run_cost": ledger.total_cost(),
        "primary_model": primary_model,
        "message_history": format_transcript(&report.message_history),
    });

    std::fs::create_dir_all(output_dir)
        .map_err(|e| AgentError::Artifact(format!("create {}: {e}", output_dir.display())))?;
    let path = output_dir.join("metadata.json");
    std::fs::write(&path, serde_json::to_string_pretty(&record)?)
        .map_err(|e| AgentError::Artifact(format!("write {}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "run artifact written");
    Ok(path)
}

/// Human-readable transcript of the conversation, image payloads elided.
pub fn format_transcript(messages: &[ChatMessage]) -> String {
    let mut lines = Vec::new();
    for message in messages {
        lines.push(format!("=== {} MESSAGE ===", message.role.to_uppercase()));
        match &message.content {
            MessageContent::Text(text) => {
                for line in text.lines() {
                    lines.push(format!("  {line}"));
                }
            }
            MessageContent::Parts(parts) => {
                for part in parts {
                    match part {
                        ContentPart::Text { text } => {
                            for line in text.lines() {
                                lines.push(format!("  {line}"));
                            }
                        }
                        ContentPart::ImageUrl { .. } => {
                            lines.push("  [IMAGE ATTACHMENT]".to_string());
                        }
                    }
                }
            }
        }
        lines.push(String::new());
        lines.push("-".repeat(50));
        lines.push(String::new());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_report() -> RunReport {
        RunReport {
            final_response: "Added the mouse to the cart.".into(),
            message_history: vec![
                ChatMessage::system("system prompt"),
                ChatMessage::user_with_images("NEXT GOAL:\nsearch", &["abc".to_string()]),
            ],
            screenshot_history: vec!["abc".into()],
            url_history: vec!["https://shop.example.com/".into()],
            iterations: 3,
            execution_time: Duration::from_secs_f64(12.5),
        }
    }

    #[test]
    fn transcript_elides_images_and_keeps_roles() {
        let transcript = format_transcript(&sample_report().message_history);
        assert!(transcript.contains("=== SYSTEM MESSAGE ==="));
        assert!(transcript.contains("=== USER MESSAGE ==="));
        assert!(transcript.contains("  NEXT GOAL:"));
        assert!(transcript.contains("[IMAGE ATTACHMENT]"));
        assert!(!transcript.contains("data:image"));
    }

    #[test]
    fn artifact_carries_the_compatibility_fields() {
        let dir = std::env::temp_dir().join(format!("webpilot-artifact-{}", uuid::Uuid::new_v4()));
        let task = Task {
            objective: "buy a mouse".into(),
            initial_url: "https://shop.example.com/".into(),
            max_iterations: 10,
        };
        let ledger = UsageLedger::new();
        ledger.record("gpt-4.1", 1000, 100);

        let path = save_run(&dir, &task, &sample_report(), &ledger, "gpt-4.1").unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        for field in [
            "objective",
            "initial_url",
            "iterations",
            "final_response",
            "url_history",
            "execution_time",
            "token_usage",
            "run_cost",
            "primary_model",
            "message_history",
        ] {
            assert!(written.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(written["iterations"], 3);
        assert_eq!(written["primary_model"], "gpt-4.1");
        assert_eq!(written["token_usage"]["gpt-4.1"]["total_tokens"], 1100);

        std::fs::remove_dir_all(&dir).ok();
    }
}
