use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{Tool, parse_args};
use crate::types::ToolDefinition;

const TIMEOUT: Duration = Duration::from_secs(60);

/// Turns LaTeX source into a PDF through a remote compile service.
///
/// The PDF comes back base64-encoded inside the JSON result; the orchestrator
/// lifts it out as an attachment before the model sees the result.
pub struct CompileLatex {
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct Args {
    latex_content: String,
    #[serde(default = "default_filename")]
    filename: String,
}

fn default_filename() -> String {
    "document".to_string()
}

#[derive(Deserialize)]
struct CompileFailure {
    message: Option<String>,
    log: Option<String>,
}

impl CompileLatex {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

impl Tool for CompileLatex {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "compile_latex".into(),
            description: "Compile LaTeX source code into a PDF document. Use this when the user asks \
                you to create, generate, or compile a document, resume, paper, letter, cheat sheet, \
                or any formatted PDF. You must provide complete, valid LaTeX source code."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "latex_content": {
                        "type": "string",
                        "description": "Complete LaTeX source code starting with \\documentclass"
                    },
                    "filename": {
                        "type": "string",
                        "description": "Name for the output PDF (without .pdf extension)",
                        "default": "document"
                    }
                },
                "required": ["latex_content"]
            }),
        }
    }

    fn call(&self, input: &Value) -> anyhow::Result<String> {
        let args: Args = parse_args(input)?;
        let client = reqwest::blocking::Client::builder().timeout(TIMEOUT).build()?;

        let mut request = client.post(format!("{}/compile", self.base_url)).json(&json!({
            "files": [{"path": "main.tex", "content": args.latex_content}],
            "projectId": format!("wa-{}", args.filename),
        }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            let pdf = response.bytes()?;
            info!(filename = %args.filename, bytes = pdf.len(), "compiled LaTeX");
            return Ok(json!({
                "success": true,
                "pdf_base64": STANDARD.encode(&pdf),
                "filename": format!("{}.pdf", args.filename),
            })
            .to_string());
        }

        let body = response.text().unwrap_or_default();
        let result = match serde_json::from_str::<CompileFailure>(&body) {
            Ok(failure) => json!({
                "success": false,
                "error": failure.message.unwrap_or_else(|| "Compilation failed".to_string()),
                "log": prefix(&failure.log.unwrap_or_default(), 500),
            }),
            Err(_) => json!({
                "success": false,
                "error": format!("HTTP {}: {}", status.as_u16(), prefix(&body, 200)),
            }),
        };
        Ok(result.to_string())
    }
}

fn prefix(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
