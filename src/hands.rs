//! The browser-control surface: a session trait the sub-agent drives, and its
//! headless Chrome implementation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::browser::tab::ModifierKey;
use headless_chrome::protocol::cdp::Page::events::FileChooserOpenedEventParams;
use headless_chrome::protocol::cdp::{DOM, Input};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{info, warn};

use crate::error::{AgentError, Result};
use crate::types::Viewport;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Time given to client-side rendering after the document loads.
const RENDER_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Meta,
}

/// A key in DOM naming (`Enter`, `ArrowDown`, `a`) plus held modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    pub modifiers: Vec<Modifier>,
}

/// How to set up a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub viewport: Viewport,
    /// The browser shuts itself down after this much inactivity.
    pub idle_timeout: Duration,
    /// Supplied automatically whenever the page opens a file chooser.
    pub upload_file: PathBuf,
}

/// One exclusively-owned browser session.
///
/// `release` must be called exactly once when the owner is done with it.
#[async_trait]
pub trait BrowserSession: Send {
    fn id(&self) -> &str;
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;
    async fn screenshot(&mut self) -> Result<Vec<u8>>;
    async fn click(&mut self, at: Point, button: MouseButton, count: u32) -> Result<()>;
    async fn drag(&mut self, from: Point, to: Point) -> Result<()>;
    async fn type_text(&mut self, text: &str, key_delay: Duration) -> Result<()>;
    async fn press_key(&mut self, key: &KeyPress) -> Result<()>;
    async fn wheel(&mut self, at: Point, delta_x: f64, delta_y: f64) -> Result<()>;
    async fn scroll_by(&mut self, delta_x: f64, delta_y: f64) -> Result<()>;
    async fn release(&mut self) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>>;
}

/// Launches a fresh headless Chrome per session.
pub struct ChromeLauncher;

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>> {
        let options = options.clone();
        let session = tokio::task::spawn_blocking(move || ChromeSession::launch(&options))
            .await
            .map_err(|e| AgentError::Browser(format!("browser launch panicked: {e}")))??;
        Ok(Box::new(session))
    }
}

pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
    id: String,
}

impl ChromeSession {
    fn launch(options: &SessionOptions) -> Result<Self> {
        let launch = LaunchOptions {
            headless: true,
            window_size: Some((options.viewport.width, options.viewport.height)),
            idle_browser_timeout: options.idle_timeout,
            args: vec![
                std::ffi::OsStr::new("--no-first-run"),
                std::ffi::OsStr::new("--no-default-browser-check"),
                std::ffi::OsStr::new("--disable-blink-features=AutomationControlled"),
            ],
            ..Default::default()
        };

        let browser = Browser::new(launch).map_err(browser_err)?;
        let tab = browser.new_tab().map_err(browser_err)?;
        tab.set_user_agent(USER_AGENT, None, None).map_err(browser_err)?;
        intercept_file_chooser(&tab, &options.upload_file)?;

        let id = tab.get_target_id().to_string();
        info!(session = %id, "browser session started");
        Ok(Self {
            browser: Some(browser),
            tab,
            id,
        })
    }

    /// Run a blocking tab operation on the blocking pool.
    async fn with_tab<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || op(&tab))
            .await
            .map_err(|e| AgentError::Browser(format!("browser task panicked: {e}")))?
            .map_err(browser_err)
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let url = url.to_string();
        let load = self.with_tab(move |tab| {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)?.wait_until_navigated()?;
            std::thread::sleep(RENDER_GRACE);
            Ok(())
        });
        match tokio::time::timeout(timeout + RENDER_GRACE, load).await {
            Ok(result) => result.map_err(|e| AgentError::Navigation(e.to_string())),
            Err(_) => Err(AgentError::Navigation(format!(
                "page did not load within {}s",
                timeout.as_secs()
            ))),
        }
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.with_tab(|tab| {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
        })
        .await
    }

    async fn click(&mut self, at: Point, button: MouseButton, count: u32) -> Result<()> {
        self.with_tab(move |tab| {
            mouse(tab, Input::DispatchMouseEventTypeOption::MouseMoved, at, None, None)?;
            mouse(
                tab,
                Input::DispatchMouseEventTypeOption::MousePressed,
                at,
                Some(button),
                Some(count),
            )?;
            mouse(
                tab,
                Input::DispatchMouseEventTypeOption::MouseReleased,
                at,
                Some(button),
                Some(count),
            )
        })
        .await
    }

    async fn drag(&mut self, from: Point, to: Point) -> Result<()> {
        let left = Some(MouseButton::Left);
        self.with_tab(move |tab| {
            mouse(tab, Input::DispatchMouseEventTypeOption::MouseMoved, from, None, None)?;
            mouse(tab, Input::DispatchMouseEventTypeOption::MousePressed, from, left, Some(1))?;
            mouse(tab, Input::DispatchMouseEventTypeOption::MouseMoved, to, left, None)?;
            mouse(tab, Input::DispatchMouseEventTypeOption::MouseReleased, to, left, Some(1))
        })
        .await
    }

    async fn type_text(&mut self, text: &str, key_delay: Duration) -> Result<()> {
        let text = text.to_string();
        self.with_tab(move |tab| {
            let mut buf = [0u8; 4];
            for ch in text.chars() {
                tab.type_str(ch.encode_utf8(&mut buf))?;
                std::thread::sleep(key_delay);
            }
            Ok(())
        })
        .await
    }

    async fn press_key(&mut self, key: &KeyPress) -> Result<()> {
        let key = key.clone();
        self.with_tab(move |tab| {
            if key.modifiers.is_empty() {
                tab.press_key(&key.key)?;
            } else {
                let modifiers: Vec<ModifierKey> = key
                    .modifiers
                    .iter()
                    .map(|m| match m {
                        Modifier::Ctrl => ModifierKey::Ctrl,
                        Modifier::Alt => ModifierKey::Alt,
                        Modifier::Shift => ModifierKey::Shift,
                        Modifier::Meta => ModifierKey::Meta,
                    })
                    .collect();
                tab.press_key_with_modifiers(&key.key, Some(&modifiers))?;
            }
            Ok(())
        })
        .await
    }

    async fn wheel(&mut self, at: Point, delta_x: f64, delta_y: f64) -> Result<()> {
        self.with_tab(move |tab| {
            mouse(tab, Input::DispatchMouseEventTypeOption::MouseMoved, at, None, None)?;
            let mut event = mouse_event(Input::DispatchMouseEventTypeOption::MouseWheel, at);
            event.delta_x = Some(delta_x);
            event.delta_y = Some(delta_y);
            tab.call_method(event)?;
            Ok(())
        })
        .await
    }

    async fn scroll_by(&mut self, delta_x: f64, delta_y: f64) -> Result<()> {
        self.with_tab(move |tab| {
            tab.evaluate(&format!("window.scrollBy({delta_x}, {delta_y})"), false)?;
            Ok(())
        })
        .await
    }

    async fn release(&mut self) -> Result<()> {
        let Some(browser) = self.browser.take() else {
            return Ok(());
        };
        info!(session = %self.id, "releasing browser session");
        let closed = self.with_tab(|tab| tab.close(true).map(|_| ())).await;
        // Dropping the handle terminates the Chrome process.
        tokio::task::spawn_blocking(move || drop(browser))
            .await
            .map_err(|e| AgentError::Browser(format!("browser shutdown panicked: {e}")))?;
        closed
    }
}

fn mouse(
    tab: &Tab,
    kind: Input::DispatchMouseEventTypeOption,
    at: Point,
    button: Option<MouseButton>,
    click_count: Option<u32>,
) -> anyhow::Result<()> {
    let button = button.map(|b| match b {
        MouseButton::Left => Input::MouseButton::Left,
        MouseButton::Right => Input::MouseButton::Right,
        MouseButton::Middle => Input::MouseButton::Middle,
    });
    let mut event = mouse_event(kind, at);
    event.button = button;
    event.click_count = click_count;
    tab.call_method(event)?;
    Ok(())
}

fn mouse_event(kind: Input::DispatchMouseEventTypeOption, at: Point) -> Input::DispatchMouseEvent {
    Input::DispatchMouseEvent {
        Type: kind,
        x: at.x,
        y: at.y,
        modifiers: None,
        timestamp: None,
        button: None,
        buttons: None,
        click_count: None,
        force: None,
        tangential_pressure: None,
        tilt_x: None,
        tilt_y: None,
        twist: None,
        delta_x: None,
        delta_y: None,
        pointer_Type: None,
    }
}

/// Answer every native file chooser with `upload`, without the model's help.
///
/// Registered before navigation so choosers opened during page load are covered.
fn intercept_file_chooser(tab: &Arc<Tab>, upload: &Path) -> Result<()> {
    tab.set_file_chooser_dialog_interception(true, None)
        .map_err(browser_err)?;

    let weak = Arc::downgrade(tab);
    let upload = upload.to_path_buf();
    tab.add_event_listener(Arc::new(move |event: &Event| {
        if let Event::PageFileChooserOpened(opened) = event {
            match upload_command(&opened.params, &upload) {
                Some(command) => supply_upload(weak.clone(), command),
                None => warn!("file chooser opened without a target input"),
            }
        }
    }))
    .map_err(browser_err)?;
    Ok(())
}

/// The CDP call that fills the chooser's input with `upload`.
///
/// The event names its input by backend node id, which is not a DOM `NodeId`.
fn upload_command(
    opened: &FileChooserOpenedEventParams,
    upload: &Path,
) -> Option<DOM::SetFileInputFiles> {
    let backend_node_id = opened.backend_node_id?;
    Some(DOM::SetFileInputFiles {
        files: vec![upload.to_string_lossy().into_owned()],
        node_id: None,
        backend_node_id: Some(backend_node_id),
        object_id: None,
    })
}

/// Fill the chooser off the event thread; the tab cannot answer calls made from
/// inside its own listener.
fn supply_upload(tab: Weak<Tab>, command: DOM::SetFileInputFiles) {
    std::thread::spawn(move || {
        let Some(tab) = tab.upgrade() else {
            return;
        };
        info!(files = ?command.files, "file chooser opened, attaching resume");
        if let Err(e) = tab.call_method(command) {
            warn!(error = %e, "failed to attach file to chooser");
        }
    });
}

fn browser_err(e: anyhow::Error) -> AgentError {
    AgentError::Browser(format!("{e:#}"))
}
