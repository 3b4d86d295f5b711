use crate::line::{ExecutionResult, LogLine};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Identifier of one invocation, unique per runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InvocationId(pub u64);

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Consumer of an invocation's line stream.
///
/// For one invocation, `on_line` calls arrive in emission order and `on_done` is called
/// exactly once, after the last line. Lines of concurrent invocations may interleave.
pub trait LogSink: Send + Sync + 'static {
    fn on_line(&self, invocation: InvocationId, line: LogLine);

    fn on_done(&self, invocation: InvocationId, result: &ExecutionResult);
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn on_line(&self, invocation: InvocationId, line: LogLine) {
        (**self).on_line(invocation, line)
    }

    fn on_done(&self, invocation: InvocationId, result: &ExecutionResult) {
        (**self).on_done(invocation, result)
    }
}

/// Message sent from a background worker to the loop that owns the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    Line {
        invocation: InvocationId,
        line: LogLine,
    },
    Done {
        invocation: InvocationId,
        result: ExecutionResult,
    },
}

impl RunnerEvent {
    pub fn invocation(&self) -> InvocationId {
        match self {
            RunnerEvent::Line { invocation, .. } | RunnerEvent::Done { invocation, .. } => {
                *invocation
            }
        }
    }
}

/// Forwards everything to a channel drained by the UI loop
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RunnerEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<RunnerEvent>) -> Self {
        Self { tx }
    }

    /// A sink together with the receiving end for the UI loop
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunnerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: RunnerEvent) {
        if self.tx.send(event).is_err() {
            debug!("Runner event dropped, receiver is gone");
        }
    }
}

impl LogSink for ChannelSink {
    fn on_line(&self, invocation: InvocationId, line: LogLine) {
        self.send(RunnerEvent::Line { invocation, line });
    }

    fn on_done(&self, invocation: InvocationId, result: &ExecutionResult) {
        self.send(RunnerEvent::Done {
            invocation,
            result: *result,
        });
    }
}

/// Sink made of an `on_line` and an `on_done` closure
pub struct FnSink<L, D> {
    on_line: L,
    on_done: D,
}

impl<L, D> FnSink<L, D>
where
    L: Fn(InvocationId, LogLine) + Send + Sync + 'static,
    D: Fn(InvocationId, &ExecutionResult) + Send + Sync + 'static,
{
    pub fn new(on_line: L, on_done: D) -> Self {
        Self { on_line, on_done }
    }
}

impl<L, D> LogSink for FnSink<L, D>
where
    L: Fn(InvocationId, LogLine) + Send + Sync + 'static,
    D: Fn(InvocationId, &ExecutionResult) + Send + Sync + 'static,
{
    fn on_line(&self, invocation: InvocationId, line: LogLine) {
        (self.on_line)(invocation, line)
    }

    fn on_done(&self, invocation: InvocationId, result: &ExecutionResult) {
        (self.on_done)(invocation, result)
    }
}
