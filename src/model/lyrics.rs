#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LyricsFormat {
    #[default]
    Unsynchronized,
    Synchronized,
}

/// One timed lyrics line.
#[derive(Debug, Clone, PartialEq)]
pub struct LyricsPhrase {
    pub timestamp_ms: u32,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LyricsInfo {
    /// ISO-639-2 code, e.g. "eng".
    pub language: String,
    pub description: String,
    pub format: LyricsFormat,
    /// Full text body for unsynchronized lyrics.
    pub text: String,
    /// Timed phrases, kept in the order they appear on disk.
    pub phrases: Vec<LyricsPhrase>,
}

impl LyricsInfo {
    pub fn unsynchronized(language: &str, text: &str) -> Self {
        Self {
            language: language.to_string(),
            format: LyricsFormat::Unsynchronized,
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.phrases.is_empty()
    }
}
