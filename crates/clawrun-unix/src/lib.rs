//! Unix-specific process management implementation

#[cfg(unix)]
mod unix_process_manager;

#[cfg(unix)]
pub use unix_process_manager::UnixProcessManager;

/// Unix-specific process manager factory
#[cfg(unix)]
pub struct UnixProcessManagerFactory;

#[cfg(unix)]
impl clawrun_core::ProcessManagerFactory for UnixProcessManagerFactory {
    type Manager = UnixProcessManager;

    fn create_process_manager() -> Self::Manager {
        <UnixProcessManager as clawrun_core::ProcessManager>::new()
    }

    fn platform_name() -> &'static str {
        "Unix"
    }
}
