//! Computer-use actions: parsing the model's flat parameter bag into a typed
//! action, and executing it against a browser session.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{AgentError, Result, truncate};
use crate::hands::{BrowserSession, KeyPress, Modifier, MouseButton, Point};
use crate::types::{ContentBlock, ToolResultContent, Viewport};

/// Pixels scrolled per unit of `amount`.
const SCROLL_STEP: f64 = 100.0;
const DEFAULT_SCROLL_AMOUNT: f64 = 3.0;
const DEFAULT_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Screenshot,
    Click { at: Point, button: MouseButton },
    DoubleClick { at: Point },
    TripleClick { at: Point },
    Drag { from: Point, to: Point },
    Type { text: String },
    Key { name: String },
    Scroll {
        at: Point,
        direction: ScrollDirection,
        amount: f64,
    },
    Wait { duration: Duration },
    CursorPosition,
    Unknown { name: String },
}

/// The flat parameter bag the model sends. Keys it doesn't use are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ActionInput {
    action: Option<String>,
    coordinate: Option<[f64; 2]>,
    start_coordinate: Option<[f64; 2]>,
    end_coordinate: Option<[f64; 2]>,
    text: Option<String>,
    key: Option<String>,
    #[serde(alias = "scroll_direction")]
    direction: Option<String>,
    #[serde(alias = "scroll_amount")]
    amount: Option<f64>,
    duration: Option<f64>,
}

impl Action {
    /// Parse an action invocation. Fails only on malformed parameter types.
    pub fn from_input(input: &Value, viewport: Viewport) -> Result<Self> {
        let bag: ActionInput = serde_json::from_value(input.clone())
            .map_err(|e| AgentError::InvalidAction(e.to_string()))?;
        let name = bag.action.as_deref().unwrap_or_default();
        let at = bag.coordinate.map(point).unwrap_or_default();
        let text = || bag.text.clone().unwrap_or_default();

        let action = match name {
            "screenshot" => Action::Screenshot,
            "click" | "left_click" => Action::Click {
                at,
                button: MouseButton::Left,
            },
            "right_click" => Action::Click {
                at,
                button: MouseButton::Right,
            },
            "middle_click" => Action::Click {
                at,
                button: MouseButton::Middle,
            },
            "double_click" => Action::DoubleClick { at },
            "triple_click" => Action::TripleClick { at },
            "left_click_drag" | "drag" => Action::Drag {
                from: bag.start_coordinate.map(point).unwrap_or_default(),
                to: bag.end_coordinate.or(bag.coordinate).map(point).unwrap_or_default(),
            },
            "type" => Action::Type { text: text() },
            "key" => Action::Key {
                name: bag.key.clone().unwrap_or_else(text),
            },
            "scroll" => Action::Scroll {
                at: bag.coordinate.map(point).unwrap_or(Point::new(
                    f64::from(viewport.width / 2),
                    f64::from(viewport.height / 2),
                )),
                direction: match bag.direction.as_deref() {
                    Some("up") => ScrollDirection::Up,
                    Some("left") => ScrollDirection::Left,
                    Some("right") => ScrollDirection::Right,
                    _ => ScrollDirection::Down,
                },
                amount: bag.amount.unwrap_or(DEFAULT_SCROLL_AMOUNT),
            },
            "wait" => Action::Wait {
                duration: bag.duration.map_or(DEFAULT_WAIT, wait_duration),
            },
            "cursor_position" => Action::CursorPosition,
            other => Action::Unknown {
                name: other.to_string(),
            },
        };
        Ok(action)
    }

    pub fn name(&self) -> &str {
        match self {
            Action::Screenshot => "screenshot",
            Action::Click { .. } => "click",
            Action::DoubleClick { .. } => "double_click",
            Action::TripleClick { .. } => "triple_click",
            Action::Drag { .. } => "drag",
            Action::Type { .. } => "type",
            Action::Key { .. } => "key",
            Action::Scroll { .. } => "scroll",
            Action::Wait { .. } => "wait",
            Action::CursorPosition => "cursor_position",
            Action::Unknown { name } => name,
        }
    }
}

fn point([x, y]: [f64; 2]) -> Point {
    Point::new(x, y)
}

/// Oversized waits saturate; negative or NaN ones fall back to the default.
fn wait_duration(secs: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) => duration,
        Err(_) if secs > 0.0 => Duration::MAX,
        Err(_) => DEFAULT_WAIT,
    }
}

/// Translate xdotool-style key names (`Return`, `ctrl+a`, `Page_Down`) into
/// the DOM key names the browser understands.
pub fn translate_key(name: &str) -> KeyPress {
    let mut parts: Vec<&str> = name.split('+').collect();
    // "ctrl++" style: a literal plus as the final key.
    let key = match parts.pop() {
        Some("") if name.ends_with('+') => {
            parts.pop();
            "+"
        }
        Some(key) => key,
        None => "",
    };

    let modifiers = parts
        .iter()
        .filter_map(|m| match m.to_ascii_lowercase().as_str() {
            "ctrl" | "control" | "control_l" | "control_r" => Some(Modifier::Ctrl),
            "alt" | "alt_l" | "alt_r" | "option" => Some(Modifier::Alt),
            "shift" | "shift_l" | "shift_r" => Some(Modifier::Shift),
            "super" | "super_l" | "super_r" | "meta" | "cmd" | "command" | "win" => {
                Some(Modifier::Meta)
            }
            _ => None,
        })
        .collect();

    let key = match key {
        "Return" | "KP_Enter" | "enter" | "return" => "Enter",
        "BackSpace" | "backspace" => "Backspace",
        "space" | "Space" => " ",
        "Tab" | "tab" => "Tab",
        "Escape" | "escape" | "Esc" | "esc" => "Escape",
        "Delete" | "delete" | "KP_Delete" => "Delete",
        "Home" | "KP_Home" => "Home",
        "End" | "KP_End" => "End",
        "Page_Up" | "Prior" | "KP_Page_Up" => "PageUp",
        "Page_Down" | "Next" | "KP_Page_Down" => "PageDown",
        "Up" | "KP_Up" => "ArrowUp",
        "Down" | "KP_Down" => "ArrowDown",
        "Left" | "KP_Left" => "ArrowLeft",
        "Right" | "KP_Right" => "ArrowRight",
        "Insert" => "Insert",
        other => other,
    };

    KeyPress {
        key: key.to_string(),
        modifiers,
    }
}

/// What an action produced for the model to look at.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Screenshot(Vec<u8>),
    Text(String),
}

impl Observation {
    pub fn into_content(self) -> ToolResultContent {
        let block = match self {
            Observation::Screenshot(png) => ContentBlock::png(&png),
            Observation::Text(text) => ContentBlock::text(text),
        };
        ToolResultContent::Blocks(vec![block])
    }
}

/// Pauses that let the page react before the follow-up screenshot.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub after_pointer: Duration,
    pub after_keyboard: Duration,
    pub key_delay: Duration,
    /// Ceiling on a single `wait` action.
    pub max_wait: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            after_pointer: Duration::from_millis(500),
            after_keyboard: Duration::from_millis(300),
            key_delay: Duration::from_millis(50),
            max_wait: Duration::from_secs(30),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            after_pointer: Duration::ZERO,
            after_keyboard: Duration::ZERO,
            key_delay: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }
}

/// Runs actions against one session and tracks the pointer.
pub struct ActionExecutor<'a> {
    session: &'a mut dyn BrowserSession,
    pacing: Pacing,
    cursor: Point,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(session: &'a mut dyn BrowserSession, pacing: Pacing) -> Self {
        Self {
            session,
            pacing,
            cursor: Point::default(),
        }
    }

    /// Capture the current page.
    pub async fn observe(&mut self) -> Result<Vec<u8>> {
        self.session.screenshot().await
    }

    /// Execute one action. Failures come back as text observations.
    pub async fn execute(&mut self, action: &Action) -> Observation {
        info!(action = action.name(), detail = %describe(action), "executing action");
        match self.apply(action).await {
            Ok(observation) => observation,
            Err(e) => {
                debug!(action = action.name(), error = %e, "action failed");
                Observation::Text(format!("Error executing {}: {e}", action.name()))
            }
        }
    }

    async fn apply(&mut self, action: &Action) -> Result<Observation> {
        let settle = match action {
            Action::Screenshot => Duration::ZERO,
            Action::Click { at, button } => {
                self.session.click(*at, *button, 1).await?;
                self.cursor = *at;
                self.pacing.after_pointer
            }
            Action::DoubleClick { at } => {
                self.session.click(*at, MouseButton::Left, 2).await?;
                self.cursor = *at;
                self.pacing.after_pointer
            }
            Action::TripleClick { at } => {
                self.session.click(*at, MouseButton::Left, 3).await?;
                self.cursor = *at;
                self.pacing.after_pointer
            }
            Action::Drag { from, to } => {
                self.session.drag(*from, *to).await?;
                self.cursor = *to;
                self.pacing.after_pointer
            }
            Action::Type { text } => {
                self.session.type_text(text, self.pacing.key_delay).await?;
                self.pacing.after_keyboard
            }
            Action::Key { name } => {
                self.session.press_key(&translate_key(name)).await?;
                self.pacing.after_keyboard
            }
            Action::Scroll {
                at,
                direction,
                amount,
            } => {
                let delta = amount * SCROLL_STEP;
                match direction {
                    ScrollDirection::Down => self.session.wheel(*at, 0.0, delta).await?,
                    ScrollDirection::Up => self.session.wheel(*at, 0.0, -delta).await?,
                    ScrollDirection::Left => self.session.scroll_by(-delta, 0.0).await?,
                    ScrollDirection::Right => self.session.scroll_by(delta, 0.0).await?,
                }
                self.cursor = *at;
                self.pacing.after_keyboard
            }
            Action::Wait { duration } => (*duration).min(self.pacing.max_wait),
            Action::CursorPosition => {
                return Ok(Observation::Text(format!(
                    "Cursor position: ({}, {})",
                    self.cursor.x, self.cursor.y
                )));
            }
            Action::Unknown { name } => {
                return Ok(Observation::Text(format!("Unknown action: {name}")));
            }
        };

        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        Ok(Observation::Screenshot(self.observe().await?))
    }
}

fn describe(action: &Action) -> String {
    match action {
        Action::Click { at, .. }
        | Action::DoubleClick { at }
        | Action::TripleClick { at }
        | Action::Scroll { at, .. } => format!("({}, {})", at.x, at.y),
        Action::Drag { from, to } => format!("({}, {}) -> ({}, {})", from.x, from.y, to.x, to.y),
        Action::Type { text } => truncate(text, 50),
        Action::Key { name } => name.clone(),
        Action::Wait { duration } => format!("{}ms", duration.as_millis()),
        _ => String::new(),
    }
}
