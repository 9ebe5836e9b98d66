//! The top-level conversation loop: the model answers or asks for tools, the
//! tools run, and their results go back to the model until it is done.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::brain::{ModelRequest, ReasoningModel};
use crate::error::{Result, truncate};
use crate::tools::ToolRegistry;
use crate::types::{
    Artifact, ContentBlock, MAX_TOOL_ROUNDS, ToolCall, ToolResultContent, ToolSpec, Turn,
    partition, replayable,
};

const NO_RESPONSE: &str = "I couldn't generate a response.";
const TOO_MANY_ROUNDS: &str = "I used too many tool calls. Please try a simpler question.";

const SYSTEM_PROMPT: &str = "You are a helpful personal assistant connected via WhatsApp. \
Be concise and conversational; this is a chat app, not an essay.

You have access to tools when needed. Use web_search for current events, facts, or anything \
requiring up-to-date information. Use compile_latex to turn LaTeX into a PDF the user receives \
as a file. When the user sends a PDF and asks to replace their resume, call update_resume with \
the attachment's base64 data. Use apply_to_job when the user shares a job listing URL and asks \
you to apply.

Keep responses short and mobile-friendly unless the user asks for detail.";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub model: String,
    pub max_tokens: u32,
    pub max_rounds: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 1024,
            max_rounds: MAX_TOOL_ROUNDS,
        }
    }
}

/// A file the user sent along with their message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingAttachment {
    pub base64: String,
    pub filename: String,
    pub mimetype: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// A file produced by a tool during this exchange.
    pub attachment: Option<Artifact>,
}

pub struct Orchestrator {
    model: Arc<dyn ReasoningModel>,
    tools: Arc<ToolRegistry>,
    specs: Vec<ToolSpec>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ReasoningModel>,
        tools: Arc<ToolRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        let specs = tools.specs();
        Self {
            model,
            tools,
            specs,
            settings,
        }
    }

    /// Answer `message`, continuing `conversation`. Fails only if the model
    /// call itself fails.
    pub async fn run(
        &self,
        conversation: &mut Vec<Turn>,
        message: &str,
        attachment: Option<&IncomingAttachment>,
    ) -> Result<Reply> {
        conversation.push(user_turn(message, attachment));

        let mut said = Vec::new();
        let mut artifact = None;

        for round in 1..=self.settings.max_rounds {
            info!(round, turns = conversation.len(), "asking model");
            let response = self
                .model
                .respond(ModelRequest {
                    model: &self.settings.model,
                    max_tokens: self.settings.max_tokens,
                    system: SYSTEM_PROMPT,
                    tools: &self.specs,
                    messages: conversation.as_slice(),
                    betas: &[],
                })
                .await?;

            let (texts, calls) = partition(&response.content);
            let text = texts.join("\n");

            if response.finished() || calls.is_empty() {
                let content = replayable(response.content);
                if !content.is_empty() {
                    conversation.push(Turn::assistant(content));
                }
                let text = if text.is_empty() {
                    NO_RESPONSE.to_string()
                } else {
                    text
                };
                info!(round, reply = %truncate(&text, 100), "model finished");
                return Ok(Reply {
                    text,
                    attachment: artifact,
                });
            }

            if !text.is_empty() {
                said.push(text);
            }
            conversation.push(Turn::assistant(replayable(response.content)));

            let outputs = self.run_tools(&calls).await;
            let mut results = Vec::with_capacity(calls.len());
            for (call, output) in calls.iter().zip(outputs) {
                let output = match take_artifact(&output) {
                    Some((file, redacted)) => {
                        info!(tool = %call.name, file = %file.filename, bytes = file.bytes.len(), "tool produced a file");
                        artifact = Some(file);
                        redacted
                    }
                    None => output,
                };
                results.push(ContentBlock::tool_result(
                    &call.id,
                    ToolResultContent::Text(output),
                ));
            }
            conversation.push(Turn::user(results));
        }

        warn!(rounds = self.settings.max_rounds, "tool round budget exhausted");
        said.push(TOO_MANY_ROUNDS.to_string());
        let text = said.join("\n\n");
        conversation.push(Turn::assistant_text(&text));
        Ok(Reply {
            text,
            attachment: artifact,
        })
    }

    /// Run every call on the blocking pool, concurrently; outputs keep call order.
    async fn run_tools(&self, calls: &[ToolCall]) -> Vec<String> {
        join_all(calls.iter().map(|call| {
            let tools = self.tools.clone();
            let name = call.name.clone();
            let input = call.input.clone();
            async move {
                let label = name.clone();
                tokio::task::spawn_blocking(move || tools.execute(&name, &input))
                    .await
                    .unwrap_or_else(|e| format!("Error running {label}: {e}"))
            }
        }))
        .await
    }
}

fn user_turn(message: &str, attachment: Option<&IncomingAttachment>) -> Turn {
    let mut content = vec![ContentBlock::text(message)];
    if let Some(file) = attachment {
        content.push(ContentBlock::text(format!(
            "[The user attached a file: {} ({}). Its base64 data follows.]\n{}",
            file.filename, file.mimetype, file.base64
        )));
    }
    Turn::user(content)
}

/// Pull a PDF out of a tool result shaped `{"pdf_base64": .., "filename": ..}`,
/// returning the file and the result with the payload swapped for a note.
fn take_artifact(output: &str) -> Option<(Artifact, String)> {
    let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(output) else {
        return None;
    };
    let filename = fields.get("filename")?.as_str()?.to_string();
    let bytes = STANDARD.decode(fields.get("pdf_base64")?.as_str()?).ok()?;

    fields.remove("pdf_base64");
    fields.insert(
        "note".to_string(),
        Value::String(format!(
            "{filename} ({} bytes) will be sent to the user as an attachment.",
            bytes.len()
        )),
    );
    let redacted = Value::Object(fields).to_string();
    Some((
        Artifact {
            filename,
            mimetype: "application/pdf".to_string(),
            bytes,
        },
        redacted,
    ))
}
