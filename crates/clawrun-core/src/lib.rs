//! clawrun core - platform-independent pieces of the command runner
//!
//! This crate provides the request/config types, the status classifier, line
//! decoding, sinks and the process traits implemented by the platform crates.

mod classifier;
mod config;
mod decode;
mod error;
mod line;
mod platform;
mod process;
mod sink;
mod status;

pub use classifier::*;
pub use config::*;
pub use decode::*;
pub use error::*;
pub use line::*;
pub use platform::*;
pub use process::*;
pub use sink::*;
pub use status::*;
