//! clawrun - background command runner of the OpenClaw installer
//!
//! [`CommandRunner`] executes shell commands off the UI thread and streams their merged
//! output line by line to a [`LogSink`]. Status queries are classified into a shared
//! [`StatusCell`] the UI can watch.
//!
//! ```no_run
//! use clawrun::{ChannelSink, CommandRequest, CommandRunner, RunnerConfig, RunnerEvent};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let runner = CommandRunner::new(RunnerConfig::default())?;
//! let (sink, mut events) = ChannelSink::channel();
//!
//! let request = CommandRequest::builder()
//!     .command("openclaw gateway status")
//!     .status_query(true)
//!     .build()?;
//! runner.run(request, sink);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         RunnerEvent::Line { line, .. } => println!("{}", line.text),
//!         RunnerEvent::Done { result, .. } => {
//!             println!("exit {} / status {}", result.exit_code, runner.status().current());
//!             break;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
mod factory;
pub mod logging;
mod runner;
pub mod transcript;

pub use factory::{PlatformProcessManager, PlatformProcessManagerFactory};
pub use runner::{CommandRunner, Invocation};

// Re-export core functionality
pub use clawrun_core::*;
