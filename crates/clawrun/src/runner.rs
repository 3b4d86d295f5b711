use crate::factory::PlatformProcessManagerFactory;
use crate::transcript;
use clawrun_core::{
    ABNORMAL_EXIT_CODE, CommandRequest, ExecutionResult, InvocationId, LineOrigin, LogLine,
    LogSink, ProcessId, ProcessManager, ProcessManagerFactory, ProcessTermination, RunnerConfig,
    RunnerError, ShellLauncher, ShellProgram, SpawnedShell, StatusCell, TerminationResult,
    TextDecoder, trim_line_ending,
};
use std::io::{BufRead, BufReader, ErrorKind};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::process::{Child, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Executes shell commands in the background and streams their output to a [`LogSink`].
///
/// Every `run` gets its own blocking worker, so invocations never wait on each other.
/// Status queries update the runner's [`StatusCell`], which outlives single invocations.
pub struct CommandRunner {
    config: Arc<RunnerConfig>,
    manager: Arc<dyn ProcessManager>,
    status: StatusCell,
    handle: Handle,
    cancellation_token: CancellationToken,
    next_id: AtomicU64,
    active: Arc<AtomicUsize>,
}

impl CommandRunner {
    /// Create a runner on the current tokio runtime
    pub fn new(config: RunnerConfig) -> Result<Self, RunnerError> {
        let handle = Handle::try_current().map_err(|_| RunnerError::NoRuntime)?;
        Self::with_handle(config, handle)
    }

    /// Create a runner whose workers run on `handle`
    pub fn with_handle(config: RunnerConfig, handle: Handle) -> Result<Self, RunnerError> {
        info!(
            platform = PlatformProcessManagerFactory::platform_name(),
            "Using platform process manager"
        );
        let manager = Arc::new(PlatformProcessManagerFactory::create_process_manager());
        Self::build(config, handle, manager)
    }

    /// Create a runner on the current tokio runtime that starts and stops commands
    /// through `manager` instead of the platform's own
    pub fn with_manager(
        config: RunnerConfig,
        manager: Arc<dyn ProcessManager>,
    ) -> Result<Self, RunnerError> {
        let handle = Handle::try_current().map_err(|_| RunnerError::NoRuntime)?;
        Self::build(config, handle, manager)
    }

    fn build(
        config: RunnerConfig,
        handle: Handle,
        manager: Arc<dyn ProcessManager>,
    ) -> Result<Self, RunnerError> {
        config
            .validate()
            .map_err(|e| RunnerError::InvalidConfig(e.to_string()))?;

        info!(announce = config.announce, "Creating command runner");

        Ok(Self {
            config: Arc::new(config),
            manager,
            status: StatusCell::new(),
            handle,
            cancellation_token: CancellationToken::new(),
            next_id: AtomicU64::new(1),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Share `status` with other runners instead of owning a fresh cell
    pub fn with_status_cell(mut self, status: StatusCell) -> Self {
        self.status = status;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The cell status queries write into
    pub fn status(&self) -> &StatusCell {
        &self.status
    }

    /// Number of invocations whose worker has not finished yet
    pub fn active_invocations(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Start `request` in the background and return immediately.
    ///
    /// `sink` receives every line in order, then exactly one `on_done`.
    pub fn run<S: LogSink>(&self, request: CommandRequest, sink: S) -> Invocation {
        let id = InvocationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let token = self.cancellation_token.child_token();
        let (pid_tx, pid_rx) = watch::channel(None);
        let (done_tx, done_rx) = watch::channel(None);

        info!(invocation = %id, command = %request.command, "Starting command");
        self.active.fetch_add(1, Ordering::SeqCst);

        let worker = Worker {
            id,
            request,
            sink,
            config: self.config.clone(),
            manager: self.manager.clone(),
            status: self.status.clone(),
            pid_tx,
            seq: 0,
            sink_failed: false,
        };
        let task = self.handle.spawn_blocking(move || worker.run());

        let manager = self.manager.clone();
        let grace = self.config.termination_grace();
        let active = self.active.clone();
        let watch_token = token.clone();
        self.handle.spawn(async move {
            let mut task = task;
            let joined = tokio::select! {
                joined = &mut task => joined,
                _ = watch_token.cancelled() => {
                    terminate(&*manager, id, pid_rx, grace).await;
                    task.await
                }
            };

            let result = joined.unwrap_or_else(|e| {
                warn!(invocation = %id, error = %e, "Command worker did not complete");
                ExecutionResult::failed(ABNORMAL_EXIT_CODE)
            });
            active.fetch_sub(1, Ordering::SeqCst);
            let _ = done_tx.send(Some(result));
        });

        Invocation {
            id,
            token,
            done: done_rx,
        }
    }

    /// Best-effort cancel of every invocation still running
    pub fn cancel_all(&self) {
        info!(active = self.active_invocations(), "Cancelling all commands");
        self.cancellation_token.cancel();
    }
}

/// Stop the invocation's process tree once its pid is known; no-op if the worker already reaped it
async fn terminate<M: ProcessTermination + ?Sized>(
    manager: &M,
    id: InvocationId,
    mut pid_rx: watch::Receiver<Option<ProcessId>>,
    grace: std::time::Duration,
) {
    let pid = match pid_rx.wait_for(Option::is_some).await {
        Ok(pid) => *pid,
        Err(_) => None,
    };

    match pid {
        Some(pid) => {
            info!(invocation = %id, pid, "Cancelling command");
            let result = manager.terminate_tree(pid, grace).await;
            if !result.is_gone() {
                warn!(invocation = %id, pid, ?result, "Command could not be terminated");
            }
        }
        None => debug!(invocation = %id, "Cancel requested after the command finished"),
    }
}

/// Handle to one background invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    id: InvocationId,
    token: CancellationToken,
    done: watch::Receiver<Option<ExecutionResult>>,
}

impl Invocation {
    pub fn id(&self) -> InvocationId {
        self.id
    }

    /// Ask the command and everything it started to stop.
    ///
    /// Output already produced is still delivered and `on_done` still fires once.
    pub fn cancel(&self) {
        if self.is_finished() {
            debug!(invocation = %self.id, "Ignoring cancel of finished command");
            return;
        }
        self.token.cancel();
    }

    /// Whether `on_done` has been delivered
    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Wait for the terminal result
    pub async fn wait(&self) -> ExecutionResult {
        let mut done = self.done.clone();
        let result = match done.wait_for(Option::is_some).await {
            Ok(result) => *result,
            Err(_) => None,
        };
        // The watcher only disappears without a result when the runtime shuts down
        result.unwrap_or(ExecutionResult::failed(ABNORMAL_EXIT_CODE))
    }
}

/// State of one invocation on its blocking thread
struct Worker<S> {
    id: InvocationId,
    request: CommandRequest,
    sink: S,
    config: Arc<RunnerConfig>,
    manager: Arc<dyn ProcessManager>,
    status: StatusCell,
    pid_tx: watch::Sender<Option<ProcessId>>,
    seq: u64,
    /// The sink panicked; it gets no more lines, only the final `on_done`
    sink_failed: bool,
}

impl<S: LogSink> Worker<S> {
    fn run(mut self) -> ExecutionResult {
        let shell = self.config.shell_for(&self.request.shell);
        let platform = self.request.shell.platform();
        let width = self.config.separator_width;

        if self.config.announce {
            for line in transcript::header(&self.request, platform, width) {
                self.emit(line, LineOrigin::Runner);
            }
        }

        let mut result = if self.sink_failed {
            ExecutionResult::failed(ABNORMAL_EXIT_CODE)
        } else {
            match self.manager.spawn_shell(&shell, &self.request) {
                Ok(spawned) => self.stream(spawned, &shell),
                Err(e) => {
                    self.report(&e);
                    ExecutionResult::failed(self.config.spawn_failure_code)
                }
            }
        };

        if self.config.announce {
            for line in transcript::footer(&result, width) {
                self.emit(line, LineOrigin::Runner);
            }
            if let Some(hint) = transcript::follow_up_hint(&self.request, platform, &result) {
                self.emit(hint.to_string(), LineOrigin::Runner);
            }
        }

        result.had_error |= self.sink_failed;
        self.finish(&result);
        result
    }

    /// Read the merged output to EOF, then reap the child
    fn stream(&mut self, spawned: SpawnedShell, shell: &ShellProgram) -> ExecutionResult {
        let SpawnedShell { child, output } = spawned;
        let child = ChildGuard::new(child, self.manager.clone());
        let pid = child.pid;
        self.pid_tx.send_replace(Some(pid));

        let decoder = self.manager.decoder_for(shell.encoding);
        debug!(invocation = %self.id, pid, decoder = %decoder.label(), "Streaming command output");

        let mut reader = BufReader::new(output);
        let mut raw = Vec::new();
        let mut read_error = None;
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) => break,
                Ok(_) => {
                    let text = decoder.decode(trim_line_ending(&raw));
                    if self.request.status_query {
                        if let Some(status) = self.status.observe(&text) {
                            info!(invocation = %self.id, %status, "Service status updated");
                        }
                    }
                    self.emit(text, LineOrigin::Process);

                    if self.sink_failed {
                        let outcome = child.abort();
                        warn!(invocation = %self.id, pid, ?outcome, "Stopped command after log sink failure");
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    read_error = Some(RunnerError::Read(e));
                    break;
                }
            }
        }
        drop(reader);

        if let Some(e) = &read_error {
            self.report(e);
        }

        let waited = child.wait();
        self.pid_tx.send_replace(None);

        match waited {
            Ok(status) => {
                let result = ExecutionResult {
                    had_error: read_error.is_some() || self.sink_failed,
                    ..ExecutionResult::from_status(status)
                };
                info!(invocation = %self.id, pid, exit_code = result.exit_code, "Command finished");
                result
            }
            Err(e) => {
                self.report(&RunnerError::Wait(e));
                ExecutionResult::failed(ABNORMAL_EXIT_CODE)
            }
        }
    }

    /// Log a runner failure and hand its synthetic line to the sink
    fn report(&mut self, e: &RunnerError) {
        let stage = if e.is_io_after_spawn() {
            "running"
        } else {
            "starting"
        };
        warn!(invocation = %self.id, stage, error = %e, "Command failed");
        self.emit(e.log_line(), LineOrigin::Runner);
    }

    fn emit(&mut self, text: String, origin: LineOrigin) {
        if self.sink_failed {
            return;
        }
        let line = LogLine {
            seq: self.seq,
            text,
            origin,
        };
        self.seq += 1;

        let (id, sink) = (self.id, &self.sink);
        if catch_unwind(AssertUnwindSafe(|| sink.on_line(id, line))).is_err() {
            warn!(invocation = %self.id, "Log sink panicked, dropping further lines");
            self.sink_failed = true;
        }
    }

    fn finish(&self, result: &ExecutionResult) {
        let (id, sink) = (self.id, &self.sink);
        if catch_unwind(AssertUnwindSafe(|| sink.on_done(id, result))).is_err() {
            warn!(invocation = %self.id, "Log sink panicked in on_done");
        }
    }
}

/// Owns a spawned child until it is reaped.
///
/// Dropping the guard before `wait` stops the child's whole tree and reaps it, so no
/// command outlives its worker.
struct ChildGuard {
    pid: ProcessId,
    child: Option<Child>,
    manager: Arc<dyn ProcessManager>,
}

impl ChildGuard {
    fn new(child: Child, manager: Arc<dyn ProcessManager>) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
            manager,
        }
    }

    fn abort(&self) -> TerminationResult {
        self.manager.abort_tree(self.pid)
    }

    fn wait(mut self) -> std::io::Result<ExitStatus> {
        match self.child.take() {
            Some(mut child) => child.wait(),
            None => Err(std::io::Error::other("child already reaped")),
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let outcome = self.abort();
            warn!(pid = self.pid, ?outcome, "Command abandoned, stopped its process tree");
            if let Err(e) = child.wait() {
                warn!(pid = self.pid, error = %e, "Failed to reap abandoned command");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_requires_runtime() {
        let err = CommandRunner::new(RunnerConfig::default()).err().unwrap();
        assert!(matches!(err, RunnerError::NoRuntime));
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = RunnerConfig {
            separator_width: 0,
            ..RunnerConfig::default()
        };
        let err = CommandRunner::new(config).err().unwrap();
        assert!(matches!(err, RunnerError::InvalidConfig(_)));
    }

    struct Recorder(Mutex<Vec<ProcessId>>);

    #[async_trait::async_trait]
    impl ProcessTermination for Recorder {
        async fn terminate_gracefully(&self, pid: ProcessId) -> TerminationResult {
            self.0.lock().unwrap().push(pid);
            TerminationResult::Success
        }

        async fn force_kill(&self, _pid: ProcessId) -> TerminationResult {
            TerminationResult::ProcessNotFound
        }

        fn abort_tree(&self, _pid: ProcessId) -> TerminationResult {
            TerminationResult::ProcessNotFound
        }
    }

    #[tokio::test]
    async fn test_terminate_waits_for_pid() {
        let recorder = Recorder(Mutex::new(Vec::new()));
        let (pid_tx, pid_rx) = watch::channel(None);

        let publish = async {
            tokio::task::yield_now().await;
            pid_tx.send_replace(Some(42));
        };
        tokio::join!(
            terminate(&recorder, InvocationId(1), pid_rx, std::time::Duration::ZERO),
            publish
        );

        assert_eq!(*recorder.0.lock().unwrap(), [42]);
    }

    #[tokio::test]
    async fn test_terminate_after_exit_is_noop() {
        let recorder = Recorder(Mutex::new(Vec::new()));
        let (pid_tx, pid_rx) = watch::channel(None);
        drop(pid_tx);

        terminate(&recorder, InvocationId(1), pid_rx, std::time::Duration::ZERO).await;
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_dropped_guard_stops_and_reaps_child() {
        use clawrun_core::Platform;
        use std::time::{Duration, Instant};

        let manager: Arc<dyn ProcessManager> =
            Arc::new(PlatformProcessManagerFactory::create_process_manager());
        let request = CommandRequest::native("sleep 30").unwrap();
        let spawned = manager
            .spawn_shell(&Platform::Posix.native_shell(), &request)
            .unwrap();
        let pid = spawned.pid();

        let started = Instant::now();
        drop(ChildGuard::new(spawned.child, manager.clone()));

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(manager.abort_tree(pid), TerminationResult::ProcessNotFound);
    }
}
