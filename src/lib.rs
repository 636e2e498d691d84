//! tagsmith reads and rewrites embedded audio metadata with byte-exact
//! precision: only the bytes of changed tag regions move, size markers
//! elsewhere in the container are kept consistent, and a save either lands
//! completely or leaves the original file untouched.
//!
//! ```no_run
//! use tagsmith::Track;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut track = Track::open("song.mp3")?;
//! track.tag.title = Some("Night Drive".to_string());
//! track.save()?;
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod batch;
pub mod containers;
pub mod engine;
pub mod error;
pub mod format;
pub mod model;
mod prelude;
pub mod settings;
pub mod systems;
pub mod zone;

use crate::aggregator::{FileProbe, OpenFile};
use crate::prelude::*;
use std::path::{Path, PathBuf};

pub use crate::engine::{Progress, SaveReport};
pub use crate::error::TagError;
pub use crate::format::{Format, FormatRegistry};
pub use crate::model::{
    ChapterInfo, LyricsFormat, LyricsInfo, LyricsPhrase, PictureInfo, PictureType, TagData,
};
pub use crate::settings::{Id3v2Version, Settings};
pub use crate::systems::TagSystemId;

/// One audio file and its merged metadata view. The tag is read once at
/// open, mutated freely by the caller, and written back by [`Track::save`].
pub struct Track {
    path: PathBuf,
    settings: Settings,
    probe: FileProbe,
    present: Vec<TagSystemId>,
    pub tag: TagData,
}

impl Track {
    pub fn open(path: impl AsRef<Path>) -> R<Self> {
        Self::open_with(path, Settings::default())
    }

    pub fn open_with(path: impl AsRef<Path>, settings: Settings) -> R<Self> {
        let path = path.as_ref().to_path_buf();
        let registry = FormatRegistry::new();
        let OpenFile {
            probe,
            tag,
            present,
        } = aggregator::open_path(&path, &registry, &settings)?;
        Ok(Self {
            path,
            settings,
            probe,
            present,
            tag,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> &Format {
        &self.probe.format
    }

    /// The tag systems found in the file at open time, in file order.
    pub fn tag_systems(&self) -> &[TagSystemId] {
        &self.present
    }

    /// Write the current tag back into the systems already present (or the
    /// format's native system when the file carries none).
    pub fn save(&mut self) -> R<SaveReport> {
        self.save_inner(None, None)
    }

    pub fn save_with_progress(&mut self, progress: Progress) -> R<SaveReport> {
        self.save_inner(None, Some(progress))
    }

    /// Write into an explicit set of tag systems, creating them as needed.
    pub fn save_to(&mut self, targets: &[TagSystemId]) -> R<SaveReport> {
        self.save_inner(Some(targets), None)
    }

    fn save_inner(
        &mut self,
        targets: Option<&[TagSystemId]>,
        progress: Option<Progress>,
    ) -> R<SaveReport> {
        let report = aggregator::save_path(
            &self.path,
            &self.probe,
            &self.tag,
            targets,
            &self.settings,
            progress,
        )?;
        self.refresh()?;
        Ok(report)
    }

    /// Excise one tag system from the file. Absent systems are a no-op.
    pub fn remove_tag(&mut self, system: TagSystemId) -> R<SaveReport> {
        let report = aggregator::remove_path(&self.path, &self.probe, system, &self.settings)?;
        self.refresh()?;
        Ok(report)
    }

    // Offsets are stale after any rewrite; rescan, keeping the caller's
    // in-memory tag as-is.
    fn refresh(&mut self) -> R<()> {
        let registry = FormatRegistry::new();
        let open = aggregator::open_path(&self.path, &registry, &self.settings)?;
        self.probe = open.probe;
        self.present = open.present;
        Ok(())
    }
}

/// Read a file's merged tag with default settings.
pub fn read_tag(path: impl AsRef<Path>) -> R<TagData> {
    let registry = FormatRegistry::new();
    aggregator::open_path(path.as_ref(), &registry, &Settings::default()).map(|open| open.tag)
}

/// Copy the canonical tag of `src` onto `dst` (same container format only).
pub fn copy_tags(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> R<()> {
    let src_track = Track::open(src)?;
    let mut dst_track = Track::open(dst)?;
    if src_track.format().id != dst_track.format().id {
        return Err(anyhow!(
            "cannot copy tags between different file formats ({} -> {})",
            src_track.format().name,
            dst_track.format().name
        ));
    }
    dst_track.tag = src_track.tag;
    dst_track.save()?;
    Ok(())
}

/// The pictures found during one read pass: a finite, single-use sequence.
/// Consume it once; reopen the file for a fresh pass.
pub struct Pictures {
    inner: std::vec::IntoIter<PictureInfo>,
}

impl Iterator for Pictures {
    type Item = PictureInfo;

    fn next(&mut self) -> Option<PictureInfo> {
        self.inner.next()
    }
}

pub fn read_pictures(path: impl AsRef<Path>) -> R<Pictures> {
    let tag = read_tag(path)?;
    Ok(Pictures {
        inner: tag.pictures.into_iter(),
    })
}
