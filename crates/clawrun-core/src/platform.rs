use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Platform family a command is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Posix,
}

impl Platform {
    /// The platform this binary was compiled for
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    /// Native command interpreter of the platform
    pub fn native_shell(self) -> ShellProgram {
        match self {
            Platform::Windows => ShellProgram {
                program: PathBuf::from("cmd.exe"),
                switch: "/c".to_string(),
                encoding: TextEncoding::ConsoleCodePage,
            },
            Platform::Posix => ShellProgram {
                program: PathBuf::from("/bin/sh"),
                switch: "-c".to_string(),
                encoding: TextEncoding::Utf8,
            },
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => f.write_str("WINDOWS"),
            Platform::Posix => f.write_str("POSIX"),
        }
    }
}

/// Encoding used to decode a child's output bytes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// The active console (OEM) code page of the host
    ConsoleCodePage,
}

/// A command interpreter that receives the whole command text as a single argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellProgram {
    pub program: PathBuf,
    /// Argument that precedes the command text, `-c` or `/c`
    pub switch: String,
    #[serde(default)]
    pub encoding: TextEncoding,
}

impl ShellProgram {
    /// Argument vector handed to the interpreter for `command`
    pub fn args_for(&self, command: &str) -> [String; 2] {
        [self.switch.clone(), command.to_string()]
    }

    pub fn display_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Which interpreter a request should be executed with
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum ShellSelector {
    /// The interpreter of the host platform
    #[default]
    Native,
    Windows,
    Posix,
    Custom(ShellProgram),
}

impl ShellSelector {
    /// Platform whose conventions the command text follows
    pub fn platform(&self) -> Platform {
        match self {
            ShellSelector::Native => Platform::current(),
            ShellSelector::Windows => Platform::Windows,
            ShellSelector::Posix => Platform::Posix,
            ShellSelector::Custom(shell) => match shell.encoding {
                TextEncoding::ConsoleCodePage => Platform::Windows,
                TextEncoding::Utf8 => Platform::Posix,
            },
        }
    }

    pub fn resolve(&self) -> ShellProgram {
        match self {
            ShellSelector::Custom(shell) => shell.clone(),
            other => other.platform().native_shell(),
        }
    }
}

impl From<Platform> for ShellSelector {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::Windows => ShellSelector::Windows,
            Platform::Posix => ShellSelector::Posix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_shells() {
        let windows = Platform::Windows.native_shell();
        assert_eq!(windows.program, PathBuf::from("cmd.exe"));
        assert_eq!(windows.switch, "/c");
        assert_eq!(windows.encoding, TextEncoding::ConsoleCodePage);

        let posix = Platform::Posix.native_shell();
        assert_eq!(posix.program, PathBuf::from("/bin/sh"));
        assert_eq!(posix.switch, "-c");
        assert_eq!(posix.encoding, TextEncoding::Utf8);
    }

    #[test]
    fn test_command_is_a_single_argument() {
        let shell = Platform::Posix.native_shell();
        let args = shell.args_for("npm config delete registry && npm install -g openclaw");
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], "-c");
        assert_eq!(
            args[1],
            "npm config delete registry && npm install -g openclaw"
        );
    }

    #[test]
    fn test_selector_resolution() {
        assert_eq!(ShellSelector::Native.platform(), Platform::current());
        assert_eq!(
            ShellSelector::Windows.resolve(),
            Platform::Windows.native_shell()
        );

        let custom = ShellProgram {
            program: PathBuf::from("/usr/bin/bash"),
            switch: "-lc".to_string(),
            encoding: TextEncoding::Utf8,
        };
        let selector = ShellSelector::Custom(custom.clone());
        assert_eq!(selector.resolve(), custom);
        assert_eq!(selector.platform(), Platform::Posix);
    }

    #[test]
    fn test_platform_display() {
        assert_eq!(Platform::Windows.to_string(), "WINDOWS");
        assert_eq!(Platform::Posix.to_string(), "POSIX");
    }
}
