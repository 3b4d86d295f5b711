use clawrun_core::ProcessManagerFactory;

/// Platform-independent factory that selects the appropriate implementation at compile time
pub struct PlatformProcessManagerFactory;

impl ProcessManagerFactory for PlatformProcessManagerFactory {
    #[cfg(unix)]
    type Manager = clawrun_unix::UnixProcessManager;

    #[cfg(windows)]
    type Manager = clawrun_windows::WindowsProcessManager;

    fn create_process_manager() -> Self::Manager {
        #[cfg(unix)]
        return clawrun_unix::UnixProcessManagerFactory::create_process_manager();

        #[cfg(windows)]
        return clawrun_windows::WindowsProcessManagerFactory::create_process_manager();
    }

    fn platform_name() -> &'static str {
        #[cfg(unix)]
        return clawrun_unix::UnixProcessManagerFactory::platform_name();

        #[cfg(windows)]
        return clawrun_windows::WindowsProcessManagerFactory::platform_name();
    }
}

/// Process manager of the platform this binary was built for
pub type PlatformProcessManager = <PlatformProcessManagerFactory as ProcessManagerFactory>::Manager;
