//! Container format descriptors and the dispatch registry. Resolution tries
//! the extension candidates first, then falls back to sniffing the leading
//! bytes; anything unrecognized maps to [`Format::UNKNOWN`] and a no-op
//! reader rather than an error.

use std::path::Path;

const MPEG_SYNC_BYTE: u8 = 0xFF;
const MPEG_SYNC_MASK: u8 = 0xE0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    pub id: u32,
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    pub mime_types: &'static [&'static str],
    pub readable: bool,
    pub writable: bool,
}

impl Format {
    pub const UNKNOWN: Format = Format {
        id: 0,
        name: "Unknown",
        extensions: &[],
        mime_types: &[],
        readable: false,
        writable: false,
    };

    pub const MPEG: Format = Format {
        id: 1,
        name: "MPEG Audio",
        extensions: &["mp3", "mp2"],
        mime_types: &["audio/mpeg"],
        readable: true,
        writable: true,
    };

    pub const WAVE: Format = Format {
        id: 2,
        name: "Waveform Audio",
        extensions: &["wav", "wave", "bwf"],
        mime_types: &["audio/wav", "audio/x-wav"],
        readable: true,
        writable: true,
    };

    pub const AIFF: Format = Format {
        id: 3,
        name: "Audio Interchange File Format",
        extensions: &["aif", "aiff", "aifc"],
        mime_types: &["audio/aiff", "audio/x-aiff"],
        readable: true,
        writable: true,
    };

    pub fn is_unknown(&self) -> bool {
        self.id == Format::UNKNOWN.id
    }

    fn matches_signature(&self, head: &[u8]) -> bool {
        match self.id {
            1 => {
                head.len() >= 3
                    && (&head[0..3] == b"ID3"
                        || (head[0] == MPEG_SYNC_BYTE && head[1] & MPEG_SYNC_MASK == MPEG_SYNC_MASK))
            }
            2 => head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WAVE",
            3 => {
                head.len() >= 12
                    && &head[0..4] == b"FORM"
                    && (&head[8..12] == b"AIFF" || &head[8..12] == b"AIFC")
            }
            _ => false,
        }
    }
}

/// Known formats, in probe order. Built once at startup and never mutated;
/// share one instance across threads freely.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: Vec<Format>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self {
            formats: vec![Format::MPEG, Format::WAVE, Format::AIFF],
        }
    }

    pub fn formats(&self) -> &[Format] {
        &self.formats
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        self.formats
            .iter()
            .flat_map(|f| f.extensions.iter().copied())
            .collect()
    }

    /// Candidates for a file extension, most likely first.
    pub fn by_extension(&self, ext: &str) -> Vec<Format> {
        let ext = ext.to_lowercase();
        self.formats
            .iter()
            .filter(|f| f.extensions.contains(&ext.as_str()))
            .copied()
            .collect()
    }

    pub fn sniff(&self, head: &[u8]) -> Option<Format> {
        self.formats
            .iter()
            .find(|f| f.matches_signature(head))
            .copied()
    }

    /// Resolve a path + leading bytes to a format. Extension candidates are
    /// tried in order and must also match the signature; a bare signature
    /// match wins when the extension lies or is missing.
    pub fn resolve(&self, path: &Path, head: &[u8]) -> Format {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        for candidate in self.by_extension(ext) {
            if candidate.matches_signature(head) {
                return candidate;
            }
        }
        if let Some(found) = self.sniff(head) {
            return found;
        }
        log::warn!(
            "{}: no recognizable audio format, treating as tagless",
            path.display()
        );
        Format::UNKNOWN
    }
}
