/// Turns one raw output line into text without ever failing.
///
/// Byte sequences that are invalid in the decoder's encoding become U+FFFD.
pub trait TextDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> String;

    /// Name for logs, e.g. `utf-8` or `cp936`
    fn label(&self) -> String;
}

/// Lossy UTF-8 decoding
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Decoder;

impl TextDecoder for Utf8Decoder {
    fn decode(&self, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    fn label(&self) -> String {
        "utf-8".to_string()
    }
}

impl<D: TextDecoder + ?Sized> TextDecoder for Box<D> {
    fn decode(&self, bytes: &[u8]) -> String {
        (**self).decode(bytes)
    }

    fn label(&self) -> String {
        (**self).label()
    }
}
