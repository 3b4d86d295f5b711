use async_trait::async_trait;
use clawrun_core::{
    CommandRequest, ProcessId, ProcessManager, ProcessTermination, RunnerError, ShellLauncher,
    ShellProgram, SpawnedShell, TerminationResult, TextDecoder, TextEncoding, Utf8Decoder,
    shell_command, spawn_merged,
};
use std::time::Duration;

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use std::os::unix::process::CommandExt;
    use tokio::time::Instant;
    use tracing::{debug, info, warn};

    const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Unix process manager: `/bin/sh -c` in a fresh process group, signals per group
    #[derive(Debug, Default)]
    pub struct UnixProcessManager;

    impl ShellLauncher for UnixProcessManager {
        fn spawn_shell(
            &self,
            shell: &ShellProgram,
            request: &CommandRequest,
        ) -> Result<SpawnedShell, RunnerError> {
            let mut cmd = shell_command(shell, request);

            // The shell leads its own group so a cancel reaches everything it started
            cmd.process_group(0);

            let spawned = spawn_merged(cmd, shell)?;
            info!(
                pid = spawned.pid(),
                program = %shell.display_name(),
                command = %request.command,
                "Spawned Unix shell"
            );
            Ok(spawned)
        }

        fn decoder_for(&self, encoding: TextEncoding) -> Box<dyn TextDecoder> {
            if encoding == TextEncoding::ConsoleCodePage {
                debug!("No console code page on Unix, decoding output as UTF-8");
            }
            Box::new(Utf8Decoder)
        }
    }

    #[async_trait]
    impl ProcessTermination for UnixProcessManager {
        async fn terminate_gracefully(&self, pid: ProcessId) -> TerminationResult {
            Self::signal_group(pid, Signal::SIGTERM)
        }

        async fn force_kill(&self, pid: ProcessId) -> TerminationResult {
            Self::signal_group(pid, Signal::SIGKILL)
        }

        fn abort_tree(&self, pid: ProcessId) -> TerminationResult {
            Self::signal_group(pid, Signal::SIGKILL)
        }

        async fn terminate_tree(&self, pid: ProcessId, grace: Duration) -> TerminationResult {
            info!(pid, "Terminating process group");

            match self.terminate_gracefully(pid).await {
                TerminationResult::Success => {}
                other => return other,
            }

            // Give the group `grace` to exit on its own before escalating
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline {
                if !Self::group_alive(pid) {
                    info!(pid, "Process group exited after SIGTERM");
                    return TerminationResult::Success;
                }
                tokio::time::sleep(GROUP_POLL_INTERVAL).await;
            }

            match self.force_kill(pid).await {
                TerminationResult::ProcessNotFound => TerminationResult::Success,
                result => result,
            }
        }
    }

    impl ProcessManager for UnixProcessManager {
        fn new() -> Self {
            info!("Initializing Unix process manager");
            Self
        }
    }

    impl UnixProcessManager {
        fn signal_group(pid: ProcessId, signal: Signal) -> TerminationResult {
            let pgid = NixPid::from_raw(pid as i32);

            match signal::killpg(pgid, signal) {
                Ok(()) => {
                    info!(pid, ?signal, "Signalled process group");
                    TerminationResult::Success
                }
                Err(Errno::ESRCH) => {
                    info!(pid, "Process group not found (already terminated)");
                    TerminationResult::ProcessNotFound
                }
                Err(Errno::EPERM) => {
                    warn!(pid, ?signal, "Permission denied to signal process group");
                    TerminationResult::AccessDenied
                }
                Err(e) => {
                    warn!(pid, ?signal, error = %e, "Failed to signal process group");
                    TerminationResult::Failed(format!("{signal} to process group failed: {e}"))
                }
            }
        }

        /// Signal 0 checks the group without touching it
        fn group_alive(pid: ProcessId) -> bool {
            signal::killpg(NixPid::from_raw(pid as i32), None::<Signal>).is_ok()
        }
    }

}

#[cfg(unix)]
pub use unix_impl::UnixProcessManager;
