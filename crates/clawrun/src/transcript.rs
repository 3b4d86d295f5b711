//! Runner-authored lines that frame a command's output in announce mode.

use clawrun_core::{CommandRequest, ExecutionResult, Platform};

const DEFAULT_DESCRIPTION: &str = "command";

/// Printed after a successful `winget install`; the running installer still has the old PATH
pub const RESTART_HINT: &str = "[hint] Dependencies were installed. Close and reopen the installer \
so the updated PATH is picked up before continuing, otherwise the new commands will not be found.";

/// Lines written before the command starts
pub fn header(request: &CommandRequest, platform: Platform, width: usize) -> Vec<String> {
    let description = request
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(DEFAULT_DESCRIPTION);

    vec![
        format!("[{description}] target: {platform} | command:"),
        format!("> {}", request.command),
        "-".repeat(width),
    ]
}

/// Lines written after the command finished
pub fn footer(result: &ExecutionResult, width: usize) -> Vec<String> {
    vec![
        format!("[done] exit code: {}", result.exit_code),
        "=".repeat(width),
    ]
}

/// Follow-up advice for commands whose effect needs a restart to be visible
pub fn follow_up_hint(
    request: &CommandRequest,
    platform: Platform,
    result: &ExecutionResult,
) -> Option<&'static str> {
    let installed = platform == Platform::Windows
        && request.command.contains("winget install")
        && result.success();
    installed.then_some(RESTART_HINT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(command: &str) -> CommandRequest {
        CommandRequest::native(command).unwrap()
    }

    #[test]
    fn test_header_uses_description() {
        let request = CommandRequest::builder()
            .command("openclaw gateway status")
            .description("Gateway status")
            .build()
            .unwrap();
        let lines = header(&request, Platform::Posix, 10);
        assert_eq!(
            lines,
            [
                "[Gateway status] target: POSIX | command:",
                "> openclaw gateway status",
                "----------",
            ]
        );
    }

    #[test]
    fn test_header_without_description() {
        let lines = header(&request("dir"), Platform::Windows, 3);
        assert_eq!(lines[0], "[command] target: WINDOWS | command:");
    }

    #[test]
    fn test_footer() {
        let lines = footer(&ExecutionResult::exited(3), 4);
        assert_eq!(lines, ["[done] exit code: 3", "===="]);
    }

    #[test]
    fn test_restart_hint_only_after_windows_install() {
        let winget = request("winget install OpenJS.NodeJS.LTS --accept-package-agreements");
        let ok = ExecutionResult::exited(0);

        assert_eq!(
            follow_up_hint(&winget, Platform::Windows, &ok),
            Some(RESTART_HINT)
        );
        assert_eq!(follow_up_hint(&winget, Platform::Posix, &ok), None);
        assert_eq!(
            follow_up_hint(&winget, Platform::Windows, &ExecutionResult::exited(1)),
            None
        );
        assert_eq!(
            follow_up_hint(&request("winget upgrade git"), Platform::Windows, &ok),
            None
        );
    }
}
