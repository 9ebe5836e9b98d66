use std::path::PathBuf;

use anyhow::{Context, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{Tool, parse_args};
use crate::subagent::context::line_count;
use crate::types::ToolDefinition;

const PDF_SIGNATURE: &[u8] = b"%PDF";

/// Replaces the stored resume used by job applications.
pub struct UpdateResume {
    path: PathBuf,
}

#[derive(Deserialize)]
struct Args {
    attachment_base64: String,
}

impl UpdateResume {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Tool for UpdateResume {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "update_resume".into(),
            description: "Update the stored resume with a new PDF file sent as an attachment. Call \
                this tool when the user sends a PDF attachment and asks to update/replace their \
                resume. The attachment_base64 parameter should be the base64-encoded PDF data from \
                the user's attachment."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "attachment_base64": {
                        "type": "string",
                        "description": "Base64-encoded PDF file data from the user's attachment"
                    }
                },
                "required": ["attachment_base64"]
            }),
        }
    }

    fn call(&self, input: &Value) -> anyhow::Result<String> {
        let args: Args = parse_args(input)?;
        let bytes = STANDARD
            .decode(args.attachment_base64.trim())
            .context("invalid base64 data")?;
        if !bytes.starts_with(PDF_SIGNATURE) {
            bail!("the attachment does not appear to be a valid PDF file");
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&self.path, &bytes)
            .with_context(|| format!("writing {}", self.path.display()))?;

        let size_kb = bytes.len() as f64 / 1024.0;
        info!(path = %self.path.display(), size_kb, "resume updated");

        let lines = line_count(&self.path)
            .map(|n| format!(" Extracted {n} lines of text."))
            .unwrap_or_default();
        Ok(format!(
            "Resume updated successfully ({size_kb:.1} KB).{lines} It will be used for future job applications."
        ))
    }
}
