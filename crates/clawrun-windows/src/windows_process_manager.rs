use async_trait::async_trait;
use clawrun_core::{
    CommandRequest, ProcessId, ProcessManager, ProcessTermination, RunnerError, ShellLauncher,
    ShellProgram, SpawnedShell, TerminationResult, TextDecoder, TextEncoding, Utf8Decoder,
    base_command, spawn_merged,
};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::process::Command;
use tracing::{info, warn};

use crate::code_page::CodePageDecoder;

/// CREATE_NO_WINDOW: no console window pops up behind the installer
#[cfg_attr(not(windows), allow(dead_code))]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Exit code of taskkill when no matching process exists
const TASKKILL_NOT_FOUND: i32 = 128;

/// Windows process manager: `cmd.exe /c` without a console, `taskkill` for trees
pub struct WindowsProcessManager {
    system: std::sync::Mutex<System>,
}

impl Default for WindowsProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellLauncher for WindowsProcessManager {
    fn spawn_shell(
        &self,
        shell: &ShellProgram,
        request: &CommandRequest,
    ) -> Result<SpawnedShell, RunnerError> {
        let mut cmd = base_command(shell, request);
        cmd.arg(&shell.switch);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;

            // cmd.exe parses its own command line; MSVC-style quoting would mangle it
            cmd.raw_arg(&request.command);
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
        #[cfg(not(windows))]
        cmd.arg(&request.command);

        let spawned = spawn_merged(cmd, shell)?;
        info!(
            pid = spawned.pid(),
            program = %shell.display_name(),
            command = %request.command,
            "Spawned Windows shell"
        );
        Ok(spawned)
    }

    fn decoder_for(&self, encoding: TextEncoding) -> Box<dyn TextDecoder> {
        match encoding {
            TextEncoding::ConsoleCodePage => {
                let decoder = CodePageDecoder::console();
                info!(code_page = decoder.code_page(), "Decoding output with console code page");
                Box::new(decoder)
            }
            TextEncoding::Utf8 => Box::new(Utf8Decoder),
        }
    }
}

#[async_trait]
impl ProcessTermination for WindowsProcessManager {
    async fn terminate_gracefully(&self, pid: ProcessId) -> TerminationResult {
        match Self::taskkill(pid, false).await {
            Ok(true) => {
                info!(pid, "Sent graceful termination to process tree");
                TerminationResult::Success
            }
            Ok(false) => {
                info!(pid, "Process not found for graceful termination");
                TerminationResult::ProcessNotFound
            }
            Err(e) => {
                warn!(pid, error = %e, "Failed to gracefully terminate process tree");
                TerminationResult::Failed(format!("Graceful termination failed: {e}"))
            }
        }
    }

    async fn force_kill(&self, pid: ProcessId) -> TerminationResult {
        match Self::taskkill(pid, true).await {
            Ok(true) => {
                info!(pid, "Force killed process tree");
                TerminationResult::Success
            }
            Ok(false) => {
                info!(pid, "Process not found for force kill");
                TerminationResult::ProcessNotFound
            }
            Err(e) => {
                warn!(pid, error = %e, "taskkill unavailable, killing process tree manually");
                self.kill_tree_manually(pid)
            }
        }
    }

    fn abort_tree(&self, pid: ProcessId) -> TerminationResult {
        match Self::taskkill_blocking(pid, true) {
            Ok(true) => {
                info!(pid, "Aborted process tree");
                TerminationResult::Success
            }
            Ok(false) => TerminationResult::ProcessNotFound,
            Err(e) => {
                warn!(pid, error = %e, "taskkill unavailable, killing process tree manually");
                self.kill_tree_manually(pid)
            }
        }
    }
}

impl ProcessManager for WindowsProcessManager {
    fn new() -> Self {
        info!("Initializing Windows process manager with system monitoring");
        Self {
            system: std::sync::Mutex::new(System::new()),
        }
    }
}

impl WindowsProcessManager {
    /// `taskkill /T` on `pid`; `Ok(false)` when no such process exists
    async fn taskkill(pid: ProcessId, force: bool) -> std::io::Result<bool> {
        let mut cmd = Command::new("taskkill");
        cmd.args(Self::taskkill_args(pid, force));
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        Self::taskkill_outcome(cmd.output().await?)
    }

    /// Blocking variant of [`Self::taskkill`] for worker threads
    fn taskkill_blocking(pid: ProcessId, force: bool) -> std::io::Result<bool> {
        let mut cmd = std::process::Command::new("taskkill");
        cmd.args(Self::taskkill_args(pid, force));
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        Self::taskkill_outcome(cmd.output()?)
    }

    fn taskkill_args(pid: ProcessId, force: bool) -> Vec<String> {
        let mut args = Vec::with_capacity(4);
        if force {
            args.push("/F".to_string());
        }
        args.extend(["/T".to_string(), "/PID".to_string(), pid.to_string()]);
        args
    }

    fn taskkill_outcome(output: std::process::Output) -> std::io::Result<bool> {
        if output.status.success() {
            return Ok(true);
        }
        match output.status.code() {
            Some(TASKKILL_NOT_FOUND) => Ok(false),
            _ => Err(std::io::Error::other(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
        }
    }

    /// Kill `root` and its descendants through sysinfo, children first
    fn kill_tree_manually(&self, root: ProcessId) -> TerminationResult {
        let system = match self.system.lock() {
            Ok(mut system) => {
                system.refresh_processes_specifics(
                    ProcessesToUpdate::All,
                    true,
                    ProcessRefreshKind::everything(),
                );
                system
            }
            Err(_) => return TerminationResult::Failed("process table lock poisoned".into()),
        };

        if system.process(Pid::from_u32(root)).is_none() {
            return TerminationResult::ProcessNotFound;
        }

        let mut pids = Vec::new();
        Self::find_children_recursive(&system, root, &mut pids);
        pids.push(root);

        let mut all_killed = true;
        for pid in pids {
            if let Some(process) = system.process(Pid::from_u32(pid)) {
                if !process.kill() {
                    warn!(pid, "Failed to kill process");
                    all_killed = false;
                }
            }
        }

        if all_killed {
            TerminationResult::Success
        } else {
            TerminationResult::Failed(format!("Some processes of tree {root} survived"))
        }
    }

    /// Recursively find all child processes
    fn find_children_recursive(system: &System, parent_pid: u32, result: &mut Vec<u32>) {
        for (pid, process) in system.processes() {
            if process.parent().is_some_and(|ppid| ppid.as_u32() == parent_pid) {
                let child_pid = pid.as_u32();
                // Recursively find grandchildren first
                Self::find_children_recursive(system, child_pid, result);
                // Then add this child
                result.push(child_pid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawrun_core::Platform;

    #[test]
    fn test_decoder_selection() {
        let manager = WindowsProcessManager::new();
        assert_eq!(manager.decoder_for(TextEncoding::Utf8).label(), "utf-8");
        assert!(
            manager
                .decoder_for(TextEncoding::ConsoleCodePage)
                .label()
                .starts_with("cp")
        );
    }

    #[test]
    fn test_taskkill_arguments() {
        assert_eq!(
            WindowsProcessManager::taskkill_args(42, true),
            ["/F", "/T", "/PID", "42"]
        );
        assert_eq!(
            WindowsProcessManager::taskkill_args(42, false),
            ["/T", "/PID", "42"]
        );
    }

    #[test]
    fn test_kill_tree_of_missing_process() {
        let manager = WindowsProcessManager::new();
        assert_eq!(
            manager.kill_tree_manually(4_000_000_000),
            TerminationResult::ProcessNotFound
        );
    }

    #[cfg(windows)]
    #[test]
    fn test_cmd_keeps_quotes() {
        use std::io::Read;

        let manager = WindowsProcessManager::new();
        let request = CommandRequest::native(r#"echo "quoted value" & echo done"#).unwrap();
        let mut spawned = manager
            .spawn_shell(&Platform::Windows.native_shell(), &request)
            .unwrap();

        let mut output = Vec::new();
        spawned.output.read_to_end(&mut output).unwrap();
        spawned.child.wait().unwrap();

        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("\"quoted value\""));
        assert!(text.contains("done"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_spawn_failure_off_windows() {
        let manager = WindowsProcessManager::new();
        let request = CommandRequest::native("echo hi").unwrap();
        let err = manager
            .spawn_shell(&Platform::Windows.native_shell(), &request)
            .unwrap_err();
        assert!(err.is_spawn_failure());
    }
}
