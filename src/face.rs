//! HTTP face of the agent: the chat webhook and a health probe.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::error::truncate;
use crate::history::HistoryStore;
use crate::orchestrator::{IncomingAttachment, Orchestrator};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub history: Arc<HistoryStore>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    pub sender: String,
    pub text: String,
    #[serde(default)]
    pub attachment: Option<IncomingAttachment>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FileAttachment {
    pub base64: String,
    pub filename: String,
    pub mimetype: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct WebhookResponse {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
}

/// A handler failure, reported as `500 {"detail": ...}`.
pub struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.0 })),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "webhook server listening");
    axum::serve(listener, router(state))
        .await
        .context("server stopped")
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn webhook_handler(
    State(state): State<AppState>,
    Json(req): Json<WebhookRequest>,
) -> Result<Json<WebhookResponse>, ApiError> {
    info!(sender = %req.sender, text = %truncate(&req.text, 100), "incoming message");
    if let Some(file) = &req.attachment {
        info!(filename = %file.filename, mimetype = %file.mimetype, "message has an attachment");
    }

    let mut conversation = state.history.snapshot(&req.sender).await;
    let reply = state
        .orchestrator
        .run(&mut conversation, &req.text, req.attachment.as_ref())
        .await
        .map_err(|e| {
            error!(sender = %req.sender, error = %e, "agent error");
            ApiError(e.to_string())
        })?;

    // Only the text of the exchange is kept; attachments are too large.
    state
        .history
        .record(&req.sender, &req.text, &reply.text)
        .await;

    info!(sender = %req.sender, reply = %truncate(&reply.text, 100), "replying");
    let file = reply.attachment.map(|artifact| {
        info!(filename = %artifact.filename, "sending file");
        FileAttachment {
            base64: STANDARD.encode(&artifact.bytes),
            filename: artifact.filename,
            mimetype: artifact.mimetype,
        }
    });

    Ok(Json(WebhookResponse {
        reply: reply.text,
        file,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::orchestrator::OrchestratorSettings;
    use crate::testing::{ScriptedModel, text_reply, tool_reply};
    use crate::tools::{Tool, ToolRegistry};
    use crate::types::{ToolDefinition, Turn};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    struct FakeCompiler;

    impl Tool for FakeCompiler {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "compile_latex".into(),
                description: "Compile LaTeX".into(),
                input_schema: json!({"type": "object"}),
            }
        }

        fn call(&self, _input: &Value) -> anyhow::Result<String> {
            Ok(json!({
                "success": true,
                "pdf_base64": STANDARD.encode(b"%PDF-1.5"),
                "filename": "letter.pdf"
            })
            .to_string())
        }
    }

    fn state(model: Arc<ScriptedModel>) -> AppState {
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(FakeCompiler)];
        AppState {
            orchestrator: Arc::new(Orchestrator::new(
                model,
                Arc::new(ToolRegistry::new(tools).unwrap()),
                OrchestratorSettings::default(),
            )),
            history: Arc::new(HistoryStore::in_memory()),
        }
    }

    fn post_webhook(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = router(state(Arc::new(ScriptedModel::default())));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn webhook_replies_and_records_history() {
        let model = Arc::new(ScriptedModel::new(vec![text_reply("Hello Sam!")]));
        let state = state(model);
        let app = router(state.clone());

        let response = app
            .oneshot(post_webhook(json!({"sender": "sam", "text": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"reply": "Hello Sam!"}));
        assert_eq!(
            state.history.snapshot("sam").await,
            vec![Turn::user_text("hi"), Turn::assistant_text("Hello Sam!")]
        );
    }

    #[tokio::test]
    async fn prior_history_reaches_the_model() {
        let model = Arc::new(ScriptedModel::new(vec![text_reply("one"), text_reply("two")]));
        let state = state(model.clone());

        for text in ["first", "second"] {
            router(state.clone())
                .oneshot(post_webhook(json!({"sender": "sam", "text": text})))
                .await
                .unwrap();
        }

        let seen = model.seen();
        assert_eq!(seen[1].messages.len(), 3);
        assert_eq!(seen[1].messages[0], Turn::user_text("first"));
    }

    #[tokio::test]
    async fn generated_files_are_returned() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_reply(&[("toolu_1", "compile_latex", json!({"latex_content": "\\documentclass{letter}"}))]),
            text_reply("Your cover letter is attached."),
        ]));
        let response = router(state(model))
            .oneshot(post_webhook(json!({"sender": "sam", "text": "make a cover letter"})))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["reply"], "Your cover letter is attached.");
        assert_eq!(body["file"]["filename"], "letter.pdf");
        assert_eq!(body["file"]["mimetype"], "application/pdf");
        assert_eq!(body["file"]["base64"], STANDARD.encode(b"%PDF-1.5"));
    }

    #[tokio::test]
    async fn agent_errors_are_500_with_detail() {
        let model = Arc::new(ScriptedModel::failing(AgentError::ModelApi {
            status: 401,
            message: "authentication_error: invalid x-api-key".into(),
        }));
        let state = state(model);
        let response = router(state.clone())
            .oneshot(post_webhook(json!({"sender": "sam", "text": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("invalid x-api-key"));
        assert!(state.history.snapshot("sam").await.is_empty());
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected() {
        let response = router(state(Arc::new(ScriptedModel::default())))
            .oneshot(post_webhook(json!({"text": "no sender"})))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
