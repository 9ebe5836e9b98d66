use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jobpilot::brain::Brain;
use jobpilot::config::Config;
use jobpilot::face::{self, AppState};
use jobpilot::hands::ChromeLauncher;
use jobpilot::history::HistoryStore;
use jobpilot::orchestrator::{Orchestrator, OrchestratorSettings};
use jobpilot::subagent::{JobApplication, SubAgent};
use jobpilot::tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "jobpilot", version, about = "Chat assistant that can apply to jobs for you")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server.
    Serve {
        /// Address to listen on, e.g. 0.0.0.0:8000.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Send one message and print the reply.
    Chat { message: String },
    /// Run the browser agent against one job listing.
    Apply {
        url: String,
        #[arg(long)]
        resume: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve { bind } => {
            let history = match &config.history_path {
                Some(path) => HistoryStore::open(path)
                    .with_context(|| format!("loading history from {}", path.display()))?,
                None => HistoryStore::in_memory(),
            };
            let state = AppState {
                orchestrator: Arc::new(orchestrator(&config)?),
                history: Arc::new(history),
            };
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            face::serve(state, &bind).await?;
        }
        Command::Chat { message } => {
            let reply = orchestrator(&config)?
                .run(&mut Vec::new(), &message, None)
                .await?;
            println!("{}", reply.text);
            if let Some(file) = reply.attachment {
                std::fs::write(&file.filename, &file.bytes)
                    .with_context(|| format!("writing {}", file.filename))?;
                println!("(saved {})", file.filename);
            }
        }
        Command::Apply { url, resume } => {
            let agent = SubAgent::new(
                Arc::new(Brain::with_base_url(
                    &config.anthropic_api_key,
                    &config.anthropic_base_url,
                )),
                Arc::new(ChromeLauncher),
                config.browser_settings(),
            );
            let job = JobApplication {
                job_url: url,
                resume_path: resume.unwrap_or_else(|| config.resume_path.clone()),
                profile_path: config.profile_path.clone(),
            };
            let report = agent.run(&job).await;
            info!(status = ?report.status, iterations = report.iterations, "run finished");
            println!("{}", report.summary);
        }
    }

    Ok(())
}

fn orchestrator(config: &Config) -> Result<Orchestrator> {
    let tools = ToolRegistry::from_config(config)?;
    info!(tools = ?tools.definitions().iter().map(|d| &d.name).collect::<Vec<_>>(), "tools registered");
    Ok(Orchestrator::new(
        Arc::new(Brain::with_base_url(
            &config.anthropic_api_key,
            &config.anthropic_base_url,
        )),
        Arc::new(tools),
        OrchestratorSettings {
            model: config.chat_model.clone(),
            max_rounds: config.max_tool_rounds,
            ..Default::default()
        },
    ))
}
