use thiserror::Error;

/// Core error types for command runner operations
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read command output: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to wait for command exit: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Invalid command request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("No tokio runtime available to host background workers")]
    NoRuntime,
}

impl RunnerError {
    /// Whether the child process was never started
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, RunnerError::Spawn { .. })
    }

    /// Whether the error happened while a child process was alive
    pub fn is_io_after_spawn(&self) -> bool {
        matches!(self, RunnerError::Read(_) | RunnerError::Wait(_))
    }

    /// Text of the synthetic log line reported to the sink in place of this error
    pub fn log_line(&self) -> String {
        format!("[error] {self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_categorization() {
        let spawn = RunnerError::Spawn {
            program: "/bin/sh".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert!(spawn.is_spawn_failure());
        assert!(!spawn.is_io_after_spawn());

        let read = RunnerError::Read(io::Error::other("broken pipe"));
        assert!(read.is_io_after_spawn());
        assert!(!read.is_spawn_failure());

        assert!(!RunnerError::NoRuntime.is_spawn_failure());
        assert!(!RunnerError::InvalidRequest("empty".to_string()).is_io_after_spawn());
    }

    #[test]
    fn test_error_display() {
        let error = RunnerError::Spawn {
            program: "cmd.exe".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "program not found"),
        };
        let display = format!("{error}");
        assert!(display.contains("Failed to start cmd.exe"));
        assert!(display.contains("program not found"));

        let error = RunnerError::InvalidConfig("separatorWidth".to_string());
        assert!(format!("{error}").contains("Configuration error"));
    }

    #[test]
    fn test_log_line_is_tagged() {
        let error = RunnerError::Wait(io::Error::other("interrupted"));
        assert!(error.log_line().starts_with("[error] Failed to wait"));
    }
}
