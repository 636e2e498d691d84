use crate::systems::TagSystemId;

// Copy buffer floor for the splice path
const MIN_BUFFER_SIZE: usize = 4096;

/// Which ID3v2 minor version new tags are serialized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Id3v2Version {
    V3,
    V4,
}

impl Id3v2Version {
    pub fn major(&self) -> u8 {
        match self {
            Id3v2Version::V3 => 3,
            Id3v2Version::V4 => 4,
        }
    }
}

/// Explicit configuration for read and write calls. Constructed by the caller
/// and passed by reference; nothing in the crate keeps ambient mutable state.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Copy buffer size for the splice path.
    pub buffer_size: usize,
    /// Reclaim and create padding so small edits rewrite in place.
    pub use_padding: bool,
    /// Padding reservoir size (bytes) created when a tag has to move anyway.
    pub padding_size: u32,
    /// ID3v2 minor version to emit.
    pub id3v2_version: Id3v2Version,
    /// Emit a CTOC table-of-contents frame alongside CHAP frames.
    pub write_chapter_toc: bool,
    /// Resolve each field across tag systems instead of trusting one system.
    pub cross_reading: bool,
    /// Tag-system ranking used when merging and when picking the single
    /// source with cross-reading off. Most expressive systems first.
    pub priority: Vec<TagSystemId>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            buffer_size: 128 * 1024,
            use_padding: true,
            padding_size: 2048,
            id3v2_version: Id3v2Version::V4,
            write_chapter_toc: true,
            cross_reading: true,
            priority: vec![
                TagSystemId::Id3v2,
                TagSystemId::Ape,
                TagSystemId::Native,
                TagSystemId::Id3v1,
            ],
        }
    }
}

impl Settings {
    pub fn io_buffer(&self) -> usize {
        self.buffer_size.max(MIN_BUFFER_SIZE)
    }
}
