//! A shell command exposed as a single tool.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::error::ToolCallError;
use super::interface::ToolServerInterface;
use super::schema::{normalise_arguments, validate_arguments};
use crate::constants::DEFAULT_CALL_TIMEOUT;
use crate::domain::types::ToolDescriptor;

/// Wraps a command line program as `<name>_execute(args)`.
///
/// The tool result reports the exit code, stdout and stderr. A non-zero exit
/// is still a result; only failing to run the program at all is an error.
#[derive(Debug, Clone)]
pub struct CliToolServer {
    name: String,
    command: PathBuf,
    base_args: Vec<String>,
    env: HashMap<String, String>,
    workdir: Option<PathBuf>,
    description: Option<String>,
    timeout: Duration,
}

impl CliToolServer {
    pub fn new(name: impl Into<String>, command: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            base_args: Vec::new(),
            env: HashMap::new(),
            workdir: None,
            description: None,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Arguments placed before the model-supplied ones on every run.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tool_name(&self) -> String {
        format!("{}_execute", self.name)
    }

    fn descriptor(&self) -> ToolDescriptor {
        let description = self.description.clone().unwrap_or_else(|| {
            format!(
                "Run the `{}` command line tool. Pass its arguments as a single string.",
                self.command.display()
            )
        });
        ToolDescriptor::new(self.tool_name())
            .with_description(description)
            .with_schema(json!({
                "type": "object",
                "properties": {
                    "args": {
                        "type": "string",
                        "description": "Arguments passed to the command, separated by spaces"
                    }
                }
            }))
            .with_server(self.name.clone())
    }

    async fn execute(&self, tool: &str, args: &str) -> Result<String, ToolCallError> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.base_args)
            .args(args.split_whitespace())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }

        debug!(server = %self.name, tool, args, "running CLI tool");
        let output = match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(ToolCallError::Execution {
                    tool: tool.to_string(),
                    message: format!("failed to run {}: {err}", self.command.display()),
                });
            }
            Err(_) => {
                return Err(ToolCallError::Timeout {
                    server: self.name.clone(),
                    tool: tool.to_string(),
                    after: self.timeout,
                });
            }
        };

        let code = output
            .status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        Ok(format!(
            "Exit code: {code}\nSTDOUT:\n{}\nSTDERR:\n{}",
            String::from_utf8_lossy(&output.stdout).trim_end(),
            String::from_utf8_lossy(&output.stderr).trim_end()
        ))
    }
}

#[async_trait]
impl ToolServerInterface for CliToolServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn tools(&self) -> Vec<ToolDescriptor> {
        vec![self.descriptor()]
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, ToolCallError> {
        let descriptor = self.descriptor();
        if tool != descriptor.name {
            return Err(ToolCallError::UnknownTool {
                server: self.name.clone(),
                tool: tool.to_string(),
                available: vec![descriptor.name],
            });
        }
        let arguments = normalise_arguments(arguments);
        validate_arguments(&descriptor, &arguments)?;
        let args = arguments
            .get("args")
            .and_then(Value::as_str)
            .unwrap_or_default();
        self.execute(tool, args).await
    }
}
