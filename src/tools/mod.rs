//! Tool registry and dispatcher.
//!
//! The registry is built once at startup and shared read-only. Dispatch never
//! fails: unknown names, tool errors and tool panics all come back as result
//! strings so the model always gets a tool_result to react to.

pub mod apply_to_job;
pub mod compile_latex;
pub mod run_command;
pub mod update_resume;
pub mod web_search;

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::brain::Brain;
use crate::config::Config;
use crate::error::{AgentError, Result, panic_message, truncate};
use crate::hands::ChromeLauncher;
use crate::subagent::SubAgent;
use crate::types::{ToolDefinition, ToolSpec};

/// A callable the model can invoke by name.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. Blocking; the orchestrator calls this off the async workers.
    fn call(&self, input: &Value) -> anyhow::Result<String>;
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    /// Build a registry. Tool names must be unique.
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Result<Self> {
        let mut map = HashMap::with_capacity(tools.len());
        let mut definitions = Vec::with_capacity(tools.len());
        for tool in tools {
            let definition = tool.definition();
            if map.contains_key(&definition.name) {
                return Err(AgentError::Config(format!(
                    "duplicate tool name: {}",
                    definition.name
                )));
            }
            map.insert(definition.name.clone(), tool);
            definitions.push(definition);
        }
        Ok(Self {
            tools: map,
            definitions,
        })
    }

    /// The standard tool set, wired from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let model = Brain::with_base_url(&config.anthropic_api_key, &config.anthropic_base_url)
            .unpooled();
        let sub_agent = SubAgent::new(
            Arc::new(model),
            Arc::new(ChromeLauncher),
            config.browser_settings(),
        );

        Self::new(vec![
            Arc::new(web_search::WebSearch::new()),
            Arc::new(compile_latex::CompileLatex::new(
                &config.compile_url,
                config.compile_jwt.clone(),
            )),
            Arc::new(run_command::RunCommand::new()),
            Arc::new(update_resume::UpdateResume::new(config.resume_path.clone())),
            Arc::new(apply_to_job::ApplyToJob::new(
                sub_agent,
                config.resume_path.clone(),
                config.profile_path.clone(),
            )),
        ])
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.definitions.iter().cloned().map(ToolSpec::Custom).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Run a tool by name. Always yields a string.
    pub fn execute(&self, name: &str, input: &Value) -> String {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "model requested unknown tool");
            return format!("Error: Unknown tool '{name}'");
        };

        info!(tool = name, input = %truncate(&input.to_string(), 200), "running tool");
        match catch_unwind(AssertUnwindSafe(|| tool.call(input))) {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(tool = name, error = %e, "tool failed");
                format!("Error running {name}: {e:#}")
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(tool = name, error = %message, "tool panicked");
                format!("Error running {name}: {message}")
            }
        }
    }
}

/// Parse a tool's input bag into its typed arguments.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(input: &Value) -> anyhow::Result<T> {
    serde_json::from_value(input.clone()).map_err(|e| anyhow::anyhow!("invalid arguments: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl Tool for Echo {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".into(),
                description: "Echo the text back".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }),
            }
        }

        fn call(&self, input: &Value) -> anyhow::Result<String> {
            #[derive(serde::Deserialize)]
            struct Args {
                text: String,
            }
            let args: Args = parse_args(input)?;
            Ok(args.text)
        }
    }

    struct Failing;

    impl Tool for Failing {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "failing".into(),
                description: "Always fails".into(),
                input_schema: json!({"type": "object"}),
            }
        }

        fn call(&self, _input: &Value) -> anyhow::Result<String> {
            anyhow::bail!("disk on fire")
        }
    }

    struct Panicking;

    impl Tool for Panicking {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "panicking".into(),
                description: "Always panics".into(),
                input_schema: json!({"type": "object"}),
            }
        }

        fn call(&self, _input: &Value) -> anyhow::Result<String> {
            panic!("index out of bounds")
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(vec![Arc::new(Echo), Arc::new(Failing), Arc::new(Panicking)]).unwrap()
    }

    #[test]
    fn dispatches_by_name() {
        assert_eq!(registry().execute("echo", &json!({"text": "hi"})), "hi");
    }

    #[test]
    fn unknown_tool_is_reported_not_raised() {
        for name in ["", "nope", "ECHO", "web_search"] {
            let out = registry().execute(name, &json!({}));
            assert_eq!(out, format!("Error: Unknown tool '{name}'"));
        }
    }

    #[test]
    fn tool_errors_become_result_strings() {
        let out = registry().execute("failing", &json!({}));
        assert_eq!(out, "Error running failing: disk on fire");
    }

    #[test]
    fn tool_panics_become_result_strings() {
        let out = registry().execute("panicking", &json!({}));
        assert!(out.starts_with("Error running panicking:"), "{out}");
        assert!(out.contains("index out of bounds"), "{out}");
    }

    #[test]
    fn bad_arguments_are_tool_errors() {
        let out = registry().execute("echo", &json!({"txt": "hi"}));
        assert!(out.starts_with("Error running echo: invalid arguments"), "{out}");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ToolRegistry::new(vec![Arc::new(Echo), Arc::new(Echo)]).err().unwrap();
        assert!(err.to_string().contains("duplicate tool name: echo"));
    }

    #[test]
    fn definitions_keep_registration_order() {
        let names: Vec<_> = registry()
            .definitions()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(names, ["echo", "failing", "panicking"]);
        assert_eq!(registry().specs().len(), 3);
    }
}
