use serde::{Deserialize, Serialize};
use std::process::ExitStatus;

/// Exit code reported when the OS gives no code and no signal for a finished child
pub const ABNORMAL_EXIT_CODE: i32 = -2;

/// Who produced a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineOrigin {
    /// Merged stdout/stderr of the child
    Process,
    /// Written by the runner itself (errors, transcript framing, hints)
    Runner,
}

/// One decoded line, in emission order within its invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub seq: u64,
    pub text: String,
    pub origin: LineOrigin,
}

impl LogLine {
    pub fn is_process_output(&self) -> bool {
        self.origin == LineOrigin::Process
    }
}

/// Terminal outcome of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub exit_code: i32,
    /// The runner itself failed (spawn, read or wait), as opposed to a non-zero exit
    pub had_error: bool,
}

impl ExecutionResult {
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            had_error: false,
        }
    }

    pub fn failed(exit_code: i32) -> Self {
        Self {
            exit_code,
            had_error: true,
        }
    }

    pub fn from_status(status: ExitStatus) -> Self {
        Self::exited(exit_code_of(status))
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.had_error
    }
}

/// Exit code of a finished child; signal deaths follow the shell's `128 + n` convention
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    ABNORMAL_EXIT_CODE
}

/// Strips the line terminator; a `\r` before the `\n` goes with it
pub fn trim_line_ending(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_constructors() {
        assert!(ExecutionResult::exited(0).success());
        assert!(!ExecutionResult::exited(3).success());
        assert!(!ExecutionResult::exited(3).had_error);

        let failed = ExecutionResult::failed(-1);
        assert!(failed.had_error);
        assert!(!failed.success());
    }

    #[test]
    fn test_trim_line_ending() {
        assert_eq!(trim_line_ending(b"hello\n"), b"hello");
        assert_eq!(trim_line_ending(b"hello\r\n"), b"hello");
        assert_eq!(trim_line_ending(b"partial"), b"partial");
        assert_eq!(trim_line_ending(b"\n"), b"");
        assert_eq!(trim_line_ending(b"keep\rinner\n"), b"keep\rinner");
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_exit_code() {
        use std::os::unix::process::ExitStatusExt;

        // SIGTERM raw wait status
        let status = ExitStatus::from_raw(15);
        assert_eq!(exit_code_of(status), 143);

        let status = ExitStatus::from_raw(2 << 8);
        assert_eq!(exit_code_of(status), 2);
    }

    #[test]
    fn test_line_serialization() {
        let line = LogLine {
            seq: 4,
            text: "Service stopped.".to_string(),
            origin: LineOrigin::Process,
        };
        let json = serde_json::to_string(&line).unwrap();
        assert!(json.contains("\"origin\":\"process\""));
        assert!(line.is_process_output());
    }
}
