use crate::classifier::looks_like_status_query;
use crate::platform::{ShellProgram, ShellSelector};
use anyhow::Context;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Exit code reported when the interpreter could not be started
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// Runner-wide settings shared by every invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Frame process output with header, footer and hint lines
    #[serde(default)]
    pub announce: bool,

    /// Width of the rule lines written in announce mode
    #[serde(default = "default_separator_width")]
    pub separator_width: usize,

    /// Exit code reported when the interpreter could not be started
    #[serde(default = "default_spawn_failure_code")]
    pub spawn_failure_code: i32,

    /// Time between the polite and the forced stop of a cancelled command (in milliseconds)
    #[serde(default = "default_termination_grace_ms")]
    pub termination_grace_ms: u64,

    /// Interpreter used for `ShellSelector::Native` requests instead of the platform default
    #[serde(default)]
    pub shell: Option<ShellProgram>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            announce: false,
            separator_width: default_separator_width(),
            spawn_failure_code: default_spawn_failure_code(),
            termination_grace_ms: default_termination_grace_ms(),
            shell: None,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings of an interactive log view: framed output, quick cancellation
    pub fn announced() -> Self {
        Self {
            announce: true,
            termination_grace_ms: 500,
            ..Self::default()
        }
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.separator_width == 0 || self.separator_width > 200 {
            return Err(anyhow::anyhow!(
                "separatorWidth must be between 1 and 200"
            ));
        }

        if self.spawn_failure_code == 0 {
            return Err(anyhow::anyhow!(
                "spawnFailureCode must be non-zero so failures are not mistaken for success"
            ));
        }

        if self.termination_grace_ms > 60_000 {
            return Err(anyhow::anyhow!(
                "terminationGraceMs should not exceed 60 seconds"
            ));
        }

        if let Some(shell) = &self.shell {
            if shell.program.as_os_str().is_empty() {
                return Err(anyhow::anyhow!("shell.program must not be empty"));
            }
        }

        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: RunnerConfig =
            serde_json::from_str(json).context("Failed to parse runner configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Interpreter a request will run under, honouring the native shell override
    pub fn shell_for(&self, selector: &ShellSelector) -> ShellProgram {
        match (selector, &self.shell) {
            (ShellSelector::Native, Some(shell)) => shell.clone(),
            _ => selector.resolve(),
        }
    }

    pub fn termination_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.termination_grace_ms)
    }
}

/// One command to execute; immutable once submitted
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into, strip_option), build_fn(validate = "Self::validate"))]
pub struct CommandRequest {
    /// Full command text, handed to the interpreter untouched
    pub command: String,
    #[builder(default)]
    pub shell: ShellSelector,
    #[builder(default)]
    pub working_directory: Option<PathBuf>,
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,
    /// Feed output lines through the status classifier
    #[builder(default)]
    pub status_query: bool,
    /// Human label used in announce mode
    #[builder(default)]
    pub description: Option<String>,
}

impl CommandRequest {
    pub fn builder() -> CommandRequestBuilder {
        CommandRequestBuilder::default()
    }

    /// Request for `command` under the native shell with no extras
    pub fn native(command: impl Into<String>) -> Result<Self, CommandRequestBuilderError> {
        Self::builder().command(command).build()
    }
}

impl CommandRequestBuilder {
    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());

        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// Mark the request as a status query when the command text mentions `status`
    pub fn detect_status_query(&mut self) -> &mut Self {
        if let Some(command) = &self.command {
            self.status_query = Some(looks_like_status_query(command));
        }
        self
    }

    fn validate(&self) -> Result<(), String> {
        match &self.command {
            Some(command) if command.trim().is_empty() => Err("command is empty".to_string()),
            _ => Ok(()),
        }
    }
}

// Default value functions for serde
fn default_separator_width() -> usize {
    60
}
fn default_spawn_failure_code() -> i32 {
    SPAWN_FAILURE_EXIT_CODE
}
fn default_termination_grace_ms() -> u64 {
    2_000
}
