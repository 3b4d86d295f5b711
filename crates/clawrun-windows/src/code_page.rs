use clawrun_core::TextDecoder;

/// Identifier of the UTF-8 code page
pub const CP_UTF8: u32 = 65001;

/// Decodes bytes written in a Windows code page, e.g. cp936 on a Chinese system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodePageDecoder {
    code_page: u32,
}

impl CodePageDecoder {
    pub fn new(code_page: u32) -> Self {
        Self { code_page }
    }

    /// Decoder for the code page console programs write in.
    ///
    /// A windowless installer has no console, so the OEM code page stands in.
    #[cfg(windows)]
    pub fn console() -> Self {
        use windows::Win32::Globalization::GetOEMCP;
        use windows::Win32::System::Console::GetConsoleOutputCP;

        let code_page = match unsafe { GetConsoleOutputCP() } {
            0 => unsafe { GetOEMCP() },
            cp => cp,
        };
        Self::new(code_page)
    }

    #[cfg(not(windows))]
    pub fn console() -> Self {
        Self::new(CP_UTF8)
    }

    pub fn code_page(&self) -> u32 {
        self.code_page
    }
}

impl TextDecoder for CodePageDecoder {
    fn decode(&self, bytes: &[u8]) -> String {
        if bytes.is_empty() {
            return String::new();
        }
        if self.code_page == CP_UTF8 {
            return String::from_utf8_lossy(bytes).into_owned();
        }

        #[cfg(windows)]
        {
            if let Some(text) = multi_byte_to_string(self.code_page, bytes) {
                return text;
            }
        }

        String::from_utf8_lossy(bytes).into_owned()
    }

    fn label(&self) -> String {
        format!("cp{}", self.code_page)
    }
}

/// Invalid sequences are substituted by the system's default character, never rejected
#[cfg(windows)]
fn multi_byte_to_string(code_page: u32, bytes: &[u8]) -> Option<String> {
    use windows::Win32::Globalization::{MULTI_BYTE_TO_WIDE_CHAR_FLAGS, MultiByteToWideChar};

    let flags = MULTI_BYTE_TO_WIDE_CHAR_FLAGS(0);
    let len = unsafe { MultiByteToWideChar(code_page, flags, bytes, None) };
    if len <= 0 {
        tracing::debug!(code_page, "MultiByteToWideChar could not size the output");
        return None;
    }

    let mut wide = vec![0u16; len as usize];
    let written = unsafe { MultiByteToWideChar(code_page, flags, bytes, Some(&mut wide)) };
    if written <= 0 {
        return None;
    }
    wide.truncate(written as usize);
    Some(String::from_utf16_lossy(&wide))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_code_page() {
        let decoder = CodePageDecoder::new(CP_UTF8);
        assert_eq!(decoder.decode("返回码 0".as_bytes()), "返回码 0");
        assert!(decoder.decode(b"bad\xff").contains('\u{FFFD}'));
        assert_eq!(decoder.label(), "cp65001");
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(CodePageDecoder::new(936).decode(b""), "");
    }

    #[test]
    fn test_ascii_survives_any_code_page() {
        assert_eq!(CodePageDecoder::new(936).decode(b"npm ok"), "npm ok");
    }

    #[cfg(windows)]
    #[test]
    fn test_gbk_bytes() {
        // "完成" in GBK
        let decoder = CodePageDecoder::new(936);
        assert_eq!(decoder.decode(&[0xCD, 0xEA, 0xB3, 0xC9]), "完成");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_console_falls_back_to_utf8_off_windows() {
        assert_eq!(CodePageDecoder::console().code_page(), CP_UTF8);
    }
}
