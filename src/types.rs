use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a turn in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Turn {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![ContentBlock::text(text)])
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::assistant(vec![ContentBlock::text(text)])
    }
}

/// A content block, in the Messages API wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: ToolResultContent,
    },
    Image {
        source: ImageSource,
    },
    /// Block types this agent does not act on (e.g. thinking). Never sent back.
    #[serde(other)]
    Unsupported,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn png(bytes: &[u8]) -> Self {
        ContentBlock::Image {
            source: ImageSource::png(bytes),
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: ToolResultContent) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
        }
    }
}

/// Payload of a tool_result block: a plain string or nested text/image blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    pub fn png(bytes: &[u8]) -> Self {
        Self {
            kind: "base64".to_string(),
            media_type: "image/png".to_string(),
            data: STANDARD.encode(bytes),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Split model output into its text parts and its tool invocations, both in order.
pub fn partition(content: &[ContentBlock]) -> (Vec<&str>, Vec<ToolCall>) {
    let mut texts = Vec::new();
    let mut calls = Vec::new();
    for block in content {
        match block {
            ContentBlock::Text { text } => texts.push(text.as_str()),
            ContentBlock::ToolUse { id, name, input } => calls.push(ToolCall {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            }),
            _ => {}
        }
    }
    (texts, calls)
}

/// Blocks that are safe to echo back to the model as an assistant turn.
pub fn replayable(content: Vec<ContentBlock>) -> Vec<ContentBlock> {
    content
        .into_iter()
        .filter(|b| !matches!(b, ContentBlock::Unsupported))
        .collect()
}

/// Declared shape of a tool, as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Anthropic's built-in computer-use tool, used by the browser sub-agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputerTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub display_width_px: u32,
    pub display_height_px: u32,
    pub display_number: u32,
}

impl ComputerTool {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            kind: "computer_20250124",
            name: "computer",
            display_width_px: viewport.width,
            display_height_px: viewport.height,
            display_number: 0,
        }
    }
}

/// Anything that can go into the `tools` array of a model request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolSpec {
    Custom(ToolDefinition),
    Computer(ComputerTool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: DISPLAY_WIDTH,
            height: DISPLAY_HEIGHT,
        }
    }
}

/// A file produced by a tool and delivered to the user out-of-band.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub filename: String,
    pub mimetype: String,
    pub bytes: Vec<u8>,
}

pub const MAX_TOOL_ROUNDS: usize = 10;
pub const MAX_BROWSER_STEPS: usize = 30;
pub const DISPLAY_WIDTH: u32 = 1280;
pub const DISPLAY_HEIGHT: u32 = 800;
pub const MAX_HISTORY_PAIRS: usize = 20;
