//! Scripted stand-ins for the model and the browser, shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::brain::{ModelRequest, ModelResponse, ReasoningModel, StopReason};
use crate::error::{AgentError, Result};
use crate::hands::{BrowserLauncher, BrowserSession, KeyPress, MouseButton, Point, SessionOptions};
use crate::types::{ContentBlock, Turn};

pub fn text_reply(text: &str) -> ModelResponse {
    ModelResponse {
        content: vec![ContentBlock::text(text)],
        stop_reason: Some(StopReason::EndTurn),
    }
}

pub fn tool_reply(calls: &[(&str, &str, Value)]) -> ModelResponse {
    ModelResponse {
        content: calls
            .iter()
            .map(|(id, name, input)| ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: input.clone(),
            })
            .collect(),
        stop_reason: Some(StopReason::ToolUse),
    }
}

/// What the model was shown on one call.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub model: String,
    pub system: String,
    pub tool_names: Vec<String>,
    pub messages: Vec<Turn>,
    pub betas: Vec<String>,
}

/// Replies from a fixed script; errors once the script runs out.
#[derive(Default)]
pub struct ScriptedModel {
    pub replies: Mutex<VecDeque<Result<ModelResponse>>>,
    pub seen: Mutex<Vec<SeenRequest>>,
    /// Repeat this reply forever after the script is used up.
    pub fallback: Option<ModelResponse>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelResponse>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            ..Default::default()
        }
    }

    pub fn repeating(reply: ModelResponse) -> Self {
        Self {
            fallback: Some(reply),
            ..Default::default()
        }
    }

    pub fn failing(error: AgentError) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(error)])),
            ..Default::default()
        }
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningModel for ScriptedModel {
    async fn respond(&self, request: ModelRequest<'_>) -> Result<ModelResponse> {
        self.seen.lock().unwrap().push(SeenRequest {
            model: request.model.to_string(),
            system: request.system.to_string(),
            tool_names: request
                .tools
                .iter()
                .map(|t| serde_json::to_value(t).unwrap()["name"].as_str().unwrap().to_string())
                .collect(),
            messages: request.messages.to_vec(),
            betas: request.betas.iter().map(|b| b.to_string()).collect(),
        });
        let next = self.replies.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(AgentError::Model("script exhausted".into())),
        }
    }
}

/// A primitive the fake browser was asked to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Navigate(String),
    Screenshot,
    Click(Point, MouseButton, u32),
    Drag(Point, Point),
    Type(String),
    Key(String),
    Wheel(Point, f64, f64),
    ScrollBy(f64, f64),
    Release,
}

/// In-memory browser. Clones share the call log and release counter.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub releases: Arc<AtomicUsize>,
    pub fail_input: bool,
    pub fail_navigation: bool,
    pub navigation_delay: Duration,
}

impl FakeBrowser {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn input(&self, call: Call) -> Result<()> {
        if self.fail_input {
            return Err(AgentError::Browser("input dispatch failed".into()));
        }
        self.record(call);
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    fn id(&self) -> &str {
        "fake"
    }

    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<()> {
        self.record(Call::Navigate(url.to_string()));
        if !self.navigation_delay.is_zero() {
            tokio::time::sleep(self.navigation_delay).await;
        }
        if self.fail_navigation {
            return Err(AgentError::Navigation("net::ERR_NAME_NOT_RESOLVED".into()));
        }
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.record(Call::Screenshot);
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn click(&mut self, at: Point, button: MouseButton, count: u32) -> Result<()> {
        self.input(Call::Click(at, button, count))
    }

    async fn drag(&mut self, from: Point, to: Point) -> Result<()> {
        self.input(Call::Drag(from, to))
    }

    async fn type_text(&mut self, text: &str, _key_delay: Duration) -> Result<()> {
        self.input(Call::Type(text.to_string()))
    }

    async fn press_key(&mut self, key: &KeyPress) -> Result<()> {
        self.input(Call::Key(key.key.clone()))
    }

    async fn wheel(&mut self, at: Point, delta_x: f64, delta_y: f64) -> Result<()> {
        self.input(Call::Wheel(at, delta_x, delta_y))
    }

    async fn scroll_by(&mut self, delta_x: f64, delta_y: f64) -> Result<()> {
        self.input(Call::ScrollBy(delta_x, delta_y))
    }

    async fn release(&mut self) -> Result<()> {
        self.record(Call::Release);
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out clones of one fake browser, or fails to launch.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub browser: FakeBrowser,
    pub fail: bool,
    pub launches: Arc<AtomicUsize>,
    pub last_options: Arc<Mutex<Option<SessionOptions>>>,
}

impl FakeLauncher {
    pub fn new(browser: FakeBrowser) -> Self {
        Self {
            browser,
            ..Default::default()
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<SessionOptions> {
        self.last_options.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options.clone());
        if self.fail {
            return Err(AgentError::Browser("chrome not found".into()));
        }
        Ok(Box::new(self.browser.clone()))
    }
}
