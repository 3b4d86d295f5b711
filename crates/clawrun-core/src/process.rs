use crate::config::CommandRequest;
use crate::decode::TextDecoder;
use crate::error::RunnerError;
use crate::platform::{ShellProgram, TextEncoding};
use async_trait::async_trait;
use std::fmt;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Unique identifier for a process
pub type ProcessId = u32;

/// Result of a process termination operation
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Process was successfully terminated
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Insufficient privileges to signal the process
    AccessDenied,
    /// Operation failed with specific error message
    Failed(String),
}

impl TerminationResult {
    /// The process is gone, whether we stopped it or it had already exited
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            TerminationResult::Success | TerminationResult::ProcessNotFound
        )
    }
}

/// A started interpreter whose stdout and stderr both feed `output`
pub struct SpawnedShell {
    pub child: Child,
    pub output: Box<dyn Read + Send>,
}

impl SpawnedShell {
    pub fn pid(&self) -> ProcessId {
        self.child.id()
    }
}

impl fmt::Debug for SpawnedShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedShell")
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

/// Command line `<program> <switch> <command>` with the request's directory and environment
pub fn shell_command(shell: &ShellProgram, request: &CommandRequest) -> Command {
    let mut cmd = base_command(shell, request);
    cmd.args(shell.args_for(&request.command));
    cmd
}

/// The interpreter with the request's directory and environment, without arguments
pub fn base_command(shell: &ShellProgram, request: &CommandRequest) -> Command {
    let mut cmd = Command::new(&shell.program);

    if let Some(dir) = &request.working_directory {
        cmd.current_dir(dir);
    }

    for (key, value) in &request.env {
        cmd.env(key, value);
    }

    cmd
}

/// Spawn `cmd` with stderr merged into stdout through one anonymous pipe.
///
/// Both streams share a single pipe, so the reader sees writes in the order the child
/// made them. The parent's copies of the write end are dropped before returning;
/// otherwise reads would never reach EOF.
pub fn spawn_merged(mut cmd: Command, shell: &ShellProgram) -> Result<SpawnedShell, RunnerError> {
    let spawn_error = |source| RunnerError::Spawn {
        program: shell.display_name(),
        source,
    };

    let (reader, writer) = std::io::pipe().map_err(spawn_error)?;
    let stderr_writer = writer.try_clone().map_err(spawn_error)?;

    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(writer))
        .stderr(Stdio::from(stderr_writer));

    let child = cmd.spawn().map_err(spawn_error)?;
    drop(cmd);

    Ok(SpawnedShell {
        child,
        output: Box::new(reader),
    })
}

/// Platform-specific way of starting an interpreter and decoding what it prints
pub trait ShellLauncher: Send + Sync {
    /// Start `shell` for `request` with merged output
    fn spawn_shell(
        &self,
        shell: &ShellProgram,
        request: &CommandRequest,
    ) -> Result<SpawnedShell, RunnerError>;

    /// Decoder for output written in `encoding`
    fn decoder_for(&self, encoding: TextEncoding) -> Box<dyn TextDecoder>;
}

/// Best-effort termination of a command and everything it started
#[async_trait]
pub trait ProcessTermination: Send + Sync {
    /// Ask the process (tree) to stop (SIGTERM on Unix)
    async fn terminate_gracefully(&self, pid: ProcessId) -> TerminationResult;

    /// Stop the process (tree) unconditionally (SIGKILL on Unix)
    async fn force_kill(&self, pid: ProcessId) -> TerminationResult;

    /// Blocking forced stop, usable from a worker thread or while unwinding
    fn abort_tree(&self, pid: ProcessId) -> TerminationResult;

    /// Polite request first, forced stop once `grace` has passed
    async fn terminate_tree(&self, pid: ProcessId, grace: Duration) -> TerminationResult {
        match self.terminate_gracefully(pid).await {
            TerminationResult::ProcessNotFound => TerminationResult::ProcessNotFound,
            _ => {
                tokio::time::sleep(grace).await;
                match self.force_kill(pid).await {
                    // Already gone after the polite request
                    TerminationResult::ProcessNotFound => TerminationResult::Success,
                    result => result,
                }
            }
        }
    }
}

/// Launcher and terminator of one platform
pub trait ProcessManager: ShellLauncher + ProcessTermination {
    /// Create a new process manager instance
    fn new() -> Self
    where
        Self: Sized;
}

/// Factory trait for creating platform-specific process managers
pub trait ProcessManagerFactory {
    /// The type of process manager this factory creates
    type Manager: ProcessManager + 'static;

    /// Create a process manager for the current platform
    fn create_process_manager() -> Self::Manager;

    /// Get the platform name for logging and debugging
    fn platform_name() -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use std::sync::Mutex;

    #[test]
    fn test_shell_command_layout() {
        let request = CommandRequest::builder()
            .command("echo one && echo two")
            .working_directory("/tmp")
            .env("LANG", "C")
            .build()
            .unwrap();
        let shell = Platform::Posix.native_shell();
        let cmd = shell_command(&shell, &request);

        assert_eq!(cmd.get_program(), "/bin/sh");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["-c", "echo one && echo two"]);
        assert_eq!(cmd.get_current_dir(), Some(std::path::Path::new("/tmp")));
        assert!(
            cmd.get_envs()
                .any(|(k, v)| k == "LANG" && v == Some(std::ffi::OsStr::new("C")))
        );
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let request = CommandRequest::native("echo hi").unwrap();
        let shell = ShellProgram {
            program: "/definitely/not/a/shell".into(),
            switch: "-c".to_string(),
            encoding: TextEncoding::Utf8,
        };
        let err = spawn_merged(shell_command(&shell, &request), &shell).unwrap_err();
        assert!(err.is_spawn_failure());
        assert!(err.to_string().contains("/definitely/not/a/shell"));
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_merged_reads_both_streams() {
        use std::io::Read;

        let request = CommandRequest::native("echo out; echo err 1>&2").unwrap();
        let shell = Platform::Posix.native_shell();
        let mut spawned = spawn_merged(shell_command(&shell, &request), &shell).unwrap();

        let mut output = String::new();
        spawned.output.read_to_string(&mut output).unwrap();
        let status = spawned.child.wait().unwrap();

        assert!(status.success());
        assert_eq!(output, "out\nerr\n");
    }

    struct RecordingTermination {
        calls: Mutex<Vec<&'static str>>,
        graceful: TerminationResult,
    }

    #[async_trait]
    impl ProcessTermination for RecordingTermination {
        async fn terminate_gracefully(&self, _pid: ProcessId) -> TerminationResult {
            self.calls.lock().unwrap().push("graceful");
            self.graceful.clone()
        }

        async fn force_kill(&self, _pid: ProcessId) -> TerminationResult {
            self.calls.lock().unwrap().push("force");
            TerminationResult::ProcessNotFound
        }

        fn abort_tree(&self, _pid: ProcessId) -> TerminationResult {
            self.calls.lock().unwrap().push("abort");
            TerminationResult::ProcessNotFound
        }
    }

    #[tokio::test]
    async fn test_terminate_tree_escalates() {
        let termination = RecordingTermination {
            calls: Mutex::new(Vec::new()),
            graceful: TerminationResult::Success,
        };
        let result = termination.terminate_tree(1, Duration::from_millis(1)).await;
        assert_eq!(result, TerminationResult::Success);
        assert_eq!(*termination.calls.lock().unwrap(), ["graceful", "force"]);
    }

    #[tokio::test]
    async fn test_terminate_tree_skips_missing_process() {
        let termination = RecordingTermination {
            calls: Mutex::new(Vec::new()),
            graceful: TerminationResult::ProcessNotFound,
        };
        let result = termination.terminate_tree(1, Duration::from_millis(1)).await;
        assert!(result.is_gone());
        assert_eq!(*termination.calls.lock().unwrap(), ["graceful"]);
    }
}
