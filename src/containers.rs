//! Container awareness: where each tag system lives inside a given format,
//! which zones and size markers a write needs, and where a brand-new tag is
//! inserted. One module per container, dispatched by matching the kind.

pub mod aiff;
pub mod mpeg;
pub mod riff;

use crate::format::Format;
use crate::model::TagData;
use crate::prelude::*;
use crate::settings::Settings;
use crate::systems::TagSystemId;
use crate::zone::ZoneSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Mpeg,
    Riff,
    Aiff,
    /// Unrecognized format: nothing to read, nothing writable.
    None,
}

impl ContainerKind {
    pub fn for_format(format: &Format) -> Self {
        match format.id {
            1 => ContainerKind::Mpeg,
            2 => ContainerKind::Riff,
            3 => ContainerKind::Aiff,
            _ => ContainerKind::None,
        }
    }

    /// The system a write defaults to when the file carries no tag yet.
    pub fn default_system(&self) -> Option<TagSystemId> {
        match self {
            ContainerKind::Mpeg => Some(TagSystemId::Id3v2),
            ContainerKind::Riff => Some(TagSystemId::Native),
            ContainerKind::Aiff => Some(TagSystemId::Id3v2),
            ContainerKind::None => None,
        }
    }

    pub fn scan(&self, data: &[u8], loc_str: &str) -> R<Layout> {
        match self {
            ContainerKind::Mpeg => Ok(Layout::Mpeg(mpeg::scan(data))),
            ContainerKind::Riff => riff::scan(data, loc_str).map(Layout::Riff),
            ContainerKind::Aiff => aiff::scan(data, loc_str).map(Layout::Aiff),
            ContainerKind::None => Ok(Layout::Empty {
                file_len: data.len() as u64,
            }),
        }
    }

    pub fn read_system(
        &self,
        data: &[u8],
        layout: &Layout,
        system: TagSystemId,
        loc_str: &str,
    ) -> Option<TagData> {
        match (self, layout) {
            (ContainerKind::Mpeg, Layout::Mpeg(l)) => mpeg::read_system(data, l, system, loc_str),
            (ContainerKind::Riff, Layout::Riff(l)) => riff::read_system(data, l, system, loc_str),
            (ContainerKind::Aiff, Layout::Aiff(l)) => aiff::read_system(data, l, system, loc_str),
            _ => None,
        }
    }

    pub fn zones_for_write(
        &self,
        layout: &Layout,
        tag: &TagData,
        targets: &[TagSystemId],
        settings: &Settings,
        loc_str: &str,
    ) -> R<ZoneSet> {
        match (self, layout) {
            (ContainerKind::Mpeg, Layout::Mpeg(l)) => {
                mpeg::zones_for_write(l, tag, targets, settings, loc_str)
            }
            (ContainerKind::Riff, Layout::Riff(l)) => {
                riff::zones_for_write(l, tag, targets, settings, loc_str)
            }
            (ContainerKind::Aiff, Layout::Aiff(l)) => {
                aiff::zones_for_write(l, tag, targets, settings, loc_str)
            }
            _ => Err(anyhow!("{}: this format is not writable", loc_str)),
        }
    }

    pub fn zones_for_remove(
        &self,
        layout: &Layout,
        system: TagSystemId,
        loc_str: &str,
    ) -> R<ZoneSet> {
        match (self, layout) {
            (ContainerKind::Mpeg, Layout::Mpeg(l)) => Ok(mpeg::zones_for_remove(l, system)),
            (ContainerKind::Riff, Layout::Riff(l)) => Ok(riff::zones_for_remove(l, system)),
            (ContainerKind::Aiff, Layout::Aiff(l)) => Ok(aiff::zones_for_remove(l, system)),
            _ => Err(anyhow!("{}: this format is not writable", loc_str)),
        }
    }
}

/// Structural snapshot captured at read time: file length plus the location
/// of every tag system found. Write zones are computed fresh from this.
#[derive(Debug, Clone)]
pub enum Layout {
    Mpeg(mpeg::MpegLayout),
    Riff(riff::RiffLayout),
    Aiff(aiff::AiffLayout),
    Empty { file_len: u64 },
}

impl Layout {
    pub fn file_len(&self) -> u64 {
        match self {
            Layout::Mpeg(l) => l.file_len,
            Layout::Riff(l) => l.file_len,
            Layout::Aiff(l) => l.file_len,
            Layout::Empty { file_len } => *file_len,
        }
    }

    /// The tag systems present, in file order.
    pub fn systems(&self) -> Vec<TagSystemId> {
        match self {
            Layout::Mpeg(l) => l.systems(),
            Layout::Riff(l) => l.systems(),
            Layout::Aiff(l) => l.systems(),
            Layout::Empty { .. } => Vec::new(),
        }
    }

    /// Total byte extent a system occupies, when present.
    pub fn extent_of(&self, system: TagSystemId) -> Option<(u64, u64)> {
        match self {
            Layout::Mpeg(l) => l.extent_of(system),
            Layout::Riff(l) => l.extent_of(system),
            Layout::Aiff(l) => l.extent_of(system),
            Layout::Empty { .. } => None,
        }
    }
}
