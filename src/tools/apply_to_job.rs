use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{Tool, parse_args};
use crate::subagent::{JobApplication, SubAgent, bridge};
use crate::types::ToolDefinition;

/// Extra time past the run limit for session release to finish.
const RELEASE_GRACE: Duration = Duration::from_secs(15);

/// Launches the browser sub-agent against a job listing.
pub struct ApplyToJob {
    agent: SubAgent,
    resume_path: PathBuf,
    profile_path: PathBuf,
}

#[derive(Deserialize)]
struct Args {
    job_url: String,
    resume_path: Option<PathBuf>,
}

impl ApplyToJob {
    pub fn new(agent: SubAgent, resume_path: PathBuf, profile_path: PathBuf) -> Self {
        Self {
            agent,
            resume_path,
            profile_path,
        }
    }
}

impl Tool for ApplyToJob {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "apply_to_job".into(),
            description: format!(
                "Apply to a job listing by navigating to the URL and filling out the application \
                 form using browser automation. Provide the job listing URL. The stored resume PDF \
                 at {} is used for uploads.",
                self.resume_path.display()
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "job_url": {
                        "type": "string",
                        "description": "The URL of the job listing to apply to"
                    },
                    "resume_path": {
                        "type": "string",
                        "description": format!(
                            "Path to the resume PDF file (default: {})",
                            self.resume_path.display()
                        ),
                        "default": self.resume_path.display().to_string()
                    }
                },
                "required": ["job_url"]
            }),
        }
    }

    fn call(&self, input: &Value) -> anyhow::Result<String> {
        let args: Args = parse_args(input)?;
        let job = JobApplication {
            job_url: args.job_url,
            resume_path: args.resume_path.unwrap_or_else(|| self.resume_path.clone()),
            profile_path: self.profile_path.clone(),
        };
        info!(url = %job.job_url, resume = %job.resume_path.display(), "starting job application");

        let agent = self.agent.clone();
        let limit = agent.settings().run_timeout + RELEASE_GRACE;
        match bridge::run_bounded(limit, move || async move { agent.run(&job).await }) {
            Ok(report) => {
                info!(status = ?report.status, iterations = report.iterations, "job application ended");
                Ok(report.summary)
            }
            Err(e) => {
                warn!(error = %e, "job application did not return");
                Ok(format!("Error during job application: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Pacing;
    use crate::subagent::SubAgentSettings;
    use crate::testing::{FakeBrowser, FakeLauncher, ScriptedModel, text_reply};
    use std::sync::Arc;

    fn tool(launcher: &FakeLauncher, settings: SubAgentSettings, dir: &tempfile::TempDir) -> ApplyToJob {
        let model = Arc::new(ScriptedModel::new(vec![text_reply("Application submitted.")]));
        ApplyToJob::new(
            SubAgent::new(model, Arc::new(launcher.clone()), settings),
            dir.path().join("resume.pdf"),
            dir.path().join("profile.md"),
        )
    }

    fn settings() -> SubAgentSettings {
        SubAgentSettings {
            pacing: Pacing::none(),
            ..Default::default()
        }
    }

    #[test]
    fn runs_without_an_ambient_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::default();
        let out = tool(&launcher, settings(), &dir)
            .call(&json!({"job_url": "https://jobs.example.com/1"}))
            .unwrap();
        assert_eq!(out, "Application submitted.");
        assert_eq!(launcher.browser.releases(), 1);
        assert_eq!(
            launcher.last_options().unwrap().upload_file,
            dir.path().join("resume.pdf")
        );
    }

    #[tokio::test]
    async fn runs_from_the_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::default();
        let tool = tool(&launcher, settings(), &dir);
        let override_path = dir.path().join("other.pdf");
        let input = json!({"job_url": "https://jobs.example.com/2", "resume_path": override_path});

        let out = tokio::task::spawn_blocking(move || tool.call(&input))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(out, "Application submitted.");
        assert_eq!(launcher.last_options().unwrap().upload_file, override_path);
    }

    #[test]
    fn slow_runs_end_with_a_summary() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::new(FakeBrowser {
            navigation_delay: Duration::from_secs(10),
            ..Default::default()
        });
        let settings = SubAgentSettings {
            run_timeout: Duration::from_millis(50),
            ..settings()
        };
        let out = tool(&launcher, settings, &dir)
            .call(&json!({"job_url": "https://jobs.example.com/3"}))
            .unwrap();
        assert!(out.starts_with("Job application process did not complete."), "{out}");
        assert_eq!(launcher.browser.releases(), 1);
    }

    #[test]
    fn missing_url_is_an_argument_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool(&FakeLauncher::default(), settings(), &dir)
            .call(&json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("invalid arguments"));
    }
}
