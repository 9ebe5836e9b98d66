//! The browser-control sub-agent: a bounded observe/decide/act loop over one
//! exclusively-owned browser session.

pub mod bridge;
pub mod context;

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::actions::{Action, ActionExecutor, Observation, Pacing};
use crate::brain::{ModelRequest, ReasoningModel};
use crate::error::{panic_message, truncate};
use crate::hands::{BrowserLauncher, BrowserSession, SessionOptions};
use crate::types::{
    ComputerTool, ContentBlock, MAX_BROWSER_STEPS, ToolSpec, Turn, Viewport, partition,
    replayable,
};

const COMPUTER_USE_BETA: &str = "computer-use-2025-01-24";
const INCOMPLETE: &str = "Job application process did not complete.";

#[derive(Debug, Clone)]
pub struct SubAgentSettings {
    pub model: String,
    pub max_tokens: u32,
    pub max_iterations: usize,
    pub viewport: Viewport,
    pub navigation_timeout: Duration,
    /// The browser closes itself after this much inactivity.
    pub idle_timeout: Duration,
    /// Wall-clock ceiling for a whole run.
    pub run_timeout: Duration,
    pub pacing: Pacing,
}

impl Default for SubAgentSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 4096,
            max_iterations: MAX_BROWSER_STEPS,
            viewport: Viewport::default(),
            navigation_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            run_timeout: Duration::from_secs(300),
            pacing: Pacing::default(),
        }
    }
}

/// One job application to attempt.
#[derive(Debug, Clone)]
pub struct JobApplication {
    pub job_url: String,
    pub resume_path: PathBuf,
    pub profile_path: PathBuf,
}

/// How a run ended. Whether a completed run succeeded or hit a blocker is
/// left to the summary the model wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    NavigationFailed,
    BudgetExhausted,
    ModelFailed,
    BrowserFailed,
    LaunchFailed,
    Panicked,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub status: RunStatus,
    pub summary: String,
    /// Model calls made before the run ended.
    pub iterations: usize,
}

impl RunReport {
    fn new(status: RunStatus, summary: impl Into<String>, iterations: usize) -> Self {
        Self {
            status,
            summary: summary.into(),
            iterations,
        }
    }
}

#[derive(Clone)]
pub struct SubAgent {
    model: Arc<dyn ReasoningModel>,
    launcher: Arc<dyn BrowserLauncher>,
    settings: SubAgentSettings,
}

impl SubAgent {
    pub fn new(
        model: Arc<dyn ReasoningModel>,
        launcher: Arc<dyn BrowserLauncher>,
        settings: SubAgentSettings,
    ) -> Self {
        Self {
            model,
            launcher,
            settings,
        }
    }

    pub fn settings(&self) -> &SubAgentSettings {
        &self.settings
    }

    /// Attempt the application. Never fails; every outcome is a report, and
    /// a launched session is released exactly once before this returns.
    pub async fn run(&self, job: &JobApplication) -> RunReport {
        let (profile_path, resume_path) = (job.profile_path.clone(), job.resume_path.clone());
        let loaded = tokio::task::spawn_blocking(move || {
            (
                context::load_profile(&profile_path),
                context::resume_text(&resume_path),
            )
        })
        .await;
        let system = match loaded {
            Ok((profile, resume)) => system_prompt(&profile, &resume),
            Err(e) => {
                return RunReport::new(
                    RunStatus::Panicked,
                    format!("Error during job application: {e}"),
                    0,
                );
            }
        };

        let options = SessionOptions {
            viewport: self.settings.viewport,
            idle_timeout: self.settings.idle_timeout,
            upload_file: job.resume_path.clone(),
        };
        let mut session = match self.launcher.launch(&options).await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "could not start browser");
                return RunReport::new(
                    RunStatus::LaunchFailed,
                    format!("Error during job application: {e}"),
                    0,
                );
            }
        };

        let mut iterations = 0;
        let outcome = tokio::time::timeout(
            self.settings.run_timeout,
            AssertUnwindSafe(self.drive(session.as_mut(), job, &system, &mut iterations))
                .catch_unwind(),
        )
        .await;

        let id = session.id().to_string();
        if let Err(e) = session.release().await {
            warn!(session = %id, error = %e, "failed to release browser session");
        }

        match outcome {
            Ok(Ok(report)) => report,
            Ok(Err(payload)) => {
                let message = panic_message(payload.as_ref());
                error!(session = %id, error = %message, "browser agent panicked");
                RunReport::new(
                    RunStatus::Panicked,
                    format!("Error during job application: {message}"),
                    iterations,
                )
            }
            Err(_) => {
                warn!(session = %id, iterations, "browser agent hit its time limit");
                RunReport::new(
                    RunStatus::TimedOut,
                    format!(
                        "{INCOMPLETE} Timed out after {}s.",
                        self.settings.run_timeout.as_secs()
                    ),
                    iterations,
                )
            }
        }
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        job: &JobApplication,
        system: &str,
        iterations: &mut usize,
    ) -> RunReport {
        let settings = &self.settings;
        info!(session = session.id(), url = %job.job_url, "navigating to job listing");
        if let Err(e) = session.navigate(&job.job_url, settings.navigation_timeout).await {
            warn!(url = %job.job_url, error = %e, "navigation failed");
            return RunReport::new(
                RunStatus::NavigationFailed,
                format!("Failed to load job URL: {e}"),
                0,
            );
        }

        let mut executor = ActionExecutor::new(session, settings.pacing);
        let first = match executor.observe().await {
            Ok(png) => png,
            Err(e) => {
                return RunReport::new(
                    RunStatus::BrowserFailed,
                    format!("Error during job application: {e}"),
                    0,
                );
            }
        };

        let tools = [ToolSpec::Computer(ComputerTool::new(settings.viewport))];
        let mut messages = vec![Turn::user(vec![
            ContentBlock::png(&first),
            ContentBlock::text(format!("Apply to this job: {}", job.job_url)),
        ])];

        for iteration in 1..=settings.max_iterations {
            *iterations = iteration;
            info!(iteration, max = settings.max_iterations, "browser agent step");

            let request = ModelRequest {
                model: &settings.model,
                max_tokens: settings.max_tokens,
                system,
                tools: &tools,
                messages: &messages,
                betas: &[COMPUTER_USE_BETA],
            };
            let response = match self.model.respond(request).await {
                Ok(response) => response,
                Err(e) => {
                    error!(iteration, error = %e, "model call failed");
                    return RunReport::new(
                        RunStatus::ModelFailed,
                        format!("Error during job application: {e}"),
                        iteration,
                    );
                }
            };

            let (texts, calls) = partition(&response.content);
            if calls.is_empty() {
                let summary = if texts.is_empty() {
                    INCOMPLETE.to_string()
                } else {
                    texts.join("\n")
                };
                info!(iteration, summary = %truncate(&summary, 200), "browser agent finished");
                return RunReport::new(RunStatus::Completed, summary, iteration);
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let observation = match Action::from_input(&call.input, settings.viewport) {
                    Ok(action) => executor.execute(&action).await,
                    Err(e) => {
                        let name = call.input.get("action").and_then(Value::as_str);
                        Observation::Text(format!(
                            "Error executing {}: {e}",
                            name.unwrap_or("action")
                        ))
                    }
                };
                results.push(ContentBlock::tool_result(&call.id, observation.into_content()));
            }

            messages.push(Turn::assistant(replayable(response.content)));
            messages.push(Turn::user(results));
        }

        warn!(steps = settings.max_iterations, "browser agent ran out of steps");
        RunReport::new(
            RunStatus::BudgetExhausted,
            format!("{INCOMPLETE} Stopped after {} steps.", settings.max_iterations),
            settings.max_iterations,
        )
    }
}

fn system_prompt(profile: &str, resume: &str) -> String {
    format!(
        "You are a job application assistant controlling a web browser. Your goal is to \
navigate a job listing page and complete the application.

Instructions:
- You can see screenshots of the browser and control it with mouse/keyboard actions.
- Find the \"Apply\" button or scroll down to the application form and fill it out.
- Fill in all required fields using the applicant profile and resume information provided below.
- For file upload fields (resume/CV): simply click on the upload button/area. The resume PDF \
is attached automatically; you do NOT need to interact with any file dialog.
- Submit the application when all fields are filled.
- If the site requires login or account creation, STOP and report that to the user. Do not \
try to create accounts.
- If you encounter a CAPTCHA you cannot solve, STOP and report it.
- When you are done (application submitted, or blocked), respond with a text message \
summarizing what happened. Do NOT use the computer tool when you are done.

Applicant profile:
{profile}

Resume content:
{resume}
"
    )
}
