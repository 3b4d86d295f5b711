//! Windows-specific process management implementation

mod code_page;
mod windows_process_manager;

pub use code_page::{CP_UTF8, CodePageDecoder};
pub use windows_process_manager::WindowsProcessManager;

/// Windows-specific process manager factory
pub struct WindowsProcessManagerFactory;

impl clawrun_core::ProcessManagerFactory for WindowsProcessManagerFactory {
    type Manager = WindowsProcessManager;

    fn create_process_manager() -> Self::Manager {
        use clawrun_core::ProcessManager;
        WindowsProcessManager::new()
    }

    fn platform_name() -> &'static str {
        "Windows"
    }
}
