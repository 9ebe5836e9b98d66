use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;

use super::{Tool, parse_args};
use crate::process::run_blocking;
use crate::types::ToolDefinition;

const TIMEOUT: Duration = Duration::from_secs(30);
const MAX_OUTPUT_CHARS: usize = 3000;

/// Shell access on the host running the agent.
pub struct RunCommand {
    timeout: Duration,
}

#[derive(Deserialize)]
struct Args {
    command: String,
}

impl RunCommand {
    pub fn new() -> Self {
        Self { timeout: TIMEOUT }
    }
}

impl Default for RunCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for RunCommand {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "run_command".into(),
            description: "Execute a shell command on the server and return the output. Use this for \
                running scripts, checking system info, installing packages, running Python code, \
                file operations, etc."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    }
                },
                "required": ["command"]
            }),
        }
    }

    fn call(&self, input: &Value) -> anyhow::Result<String> {
        let args: Args = parse_args(input)?;
        let mut command = Command::new("sh");
        command.arg("-c").arg(&args.command);

        let Some(done) = run_blocking(command, self.timeout)? else {
            return Ok(format!("Command timed out after {}s", self.timeout.as_secs()));
        };

        let mut output = done.stdout;
        if !done.stderr.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&done.stderr);
        }
        if output.is_empty() {
            let code = done
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Ok(format!("(no output, exit code {code})"));
        }
        Ok(clip(output))
    }
}

fn clip(output: String) -> String {
    match output.char_indices().nth(MAX_OUTPUT_CHARS) {
        Some((idx, _)) => format!("{}\n... (truncated)", &output[..idx]),
        None => output,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn run(command: &str) -> String {
        RunCommand::new().call(&json!({ "command": command })).unwrap()
    }

    #[test]
    fn returns_stdout_then_stderr() {
        assert_eq!(run("echo hello; echo oops >&2"), "hello\n\noops\n");
    }

    #[test]
    fn reports_silent_exit_code() {
        assert_eq!(run("exit 4"), "(no output, exit code 4)");
    }

    #[test]
    fn truncates_long_output() {
        let out = run("head -c 5000 /dev/zero | tr '\\0' 'a'");
        assert!(out.ends_with("\n... (truncated)"));
        assert_eq!(out.trim_end_matches("\n... (truncated)").len(), MAX_OUTPUT_CHARS);
    }

    #[test]
    fn times_out() {
        let tool = RunCommand {
            timeout: Duration::from_millis(100),
        };
        let out = tool.call(&json!({"command": "exec sleep 3"})).unwrap();
        assert_eq!(out, "Command timed out after 0s");
    }
}
