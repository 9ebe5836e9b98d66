use std::any::Any;
use std::time::Duration;

/// Errors crossing module boundaries inside the agent.
///
/// Tool callables report failures through `anyhow`; those never reach this
/// type because the dispatcher turns them into result strings.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Transport or decoding failure talking to the model.
    #[error("model request failed: {0}")]
    Model(String),

    /// The model API answered with a non-success status.
    #[error("model API error ({status}): {message}")]
    ModelApi { status: u16, message: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    /// A computer-use action whose parameters have the wrong shape.
    #[error("invalid action parameters: {0}")]
    InvalidAction(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("config error: {0}")]
    Config(String),

    /// The worker thread running a nested runtime died without a result.
    #[error("worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;

/// Render a caught panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Shorten text for log lines, on a char boundary.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
