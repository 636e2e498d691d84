//! Orchestration across tag systems: decide which systems a file carries,
//! merge them into one view (priority order, optional cross-reading), and
//! drive writes and removals through the zone engine.

use crate::containers::{ContainerKind, Layout};
use crate::engine::{self, Progress, SaveReport};
use crate::format::{Format, FormatRegistry};
use crate::model::TagData;
use crate::prelude::*;
use crate::settings::Settings;
use crate::systems::TagSystemId;
use std::fs::File;
use std::path::Path;

/// Structural facts about a file captured at read time.
#[derive(Debug, Clone)]
pub struct FileProbe {
    pub format: Format,
    pub container: ContainerKind,
    pub layout: Layout,
}

#[derive(Debug)]
pub struct OpenFile {
    pub probe: FileProbe,
    pub tag: TagData,
    /// Per-system views, highest priority first (used by cross-read tests
    /// and by callers that want the unmerged data).
    pub present: Vec<TagSystemId>,
}

/// Read a file: resolve its format, scan the container, read every present
/// tag system and merge them. Unrecognized formats yield an empty view.
pub fn open_path(path: &Path, registry: &FormatRegistry, settings: &Settings) -> R<OpenFile> {
    let loc = path.display().to_string();
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        log::warn!("{}: empty file, nothing to read", loc);
        return Ok(OpenFile {
            probe: FileProbe {
                format: Format::UNKNOWN,
                container: ContainerKind::None,
                layout: Layout::Empty { file_len: 0 },
            },
            tag: TagData::new(),
            present: Vec::new(),
        });
    }
    let map = unsafe { MmapOptions::new().map(&file)? };

    let format = registry.resolve(path, &map[..map.len().min(16)]);
    let container = ContainerKind::for_format(&format);
    let layout = container.scan(&map, &loc)?;
    let present = layout.systems();

    let mut sources: Vec<(TagSystemId, TagData)> = Vec::new();
    for system in ordered_by_priority(&present, &settings.priority) {
        match container.read_system(&map, &layout, system, &loc) {
            Some(tag) => sources.push((system, tag)),
            None => log::warn!("{}: {} reported present but unreadable", loc, system.name()),
        }
    }

    let tag = merge(sources, settings.cross_reading);
    Ok(OpenFile {
        probe: FileProbe {
            format,
            container,
            layout,
        },
        tag,
        present,
    })
}

/// Present systems ranked by the caller's priority; systems the ranking does
/// not mention go last, in file order.
fn ordered_by_priority(present: &[TagSystemId], priority: &[TagSystemId]) -> Vec<TagSystemId> {
    let mut out: Vec<TagSystemId> = priority
        .iter()
        .filter(|s| present.contains(*s))
        .copied()
        .collect();
    for system in present {
        if !out.contains(system) {
            out.push(*system);
        }
    }
    out
}

/// Merge per-system views, highest priority first. With cross-reading off
/// the top system supplies everything; with it on, each field independently
/// falls back to the first system where it is non-empty, and pictures,
/// chapters and lyrics are unioned.
pub fn merge(sources: Vec<(TagSystemId, TagData)>, cross_reading: bool) -> TagData {
    let mut sources = sources;
    if sources.is_empty() {
        return TagData::new();
    }
    if !cross_reading {
        return sources.swap_remove(0).1;
    }

    let mut out = TagData::new();

    macro_rules! merge_text {
        ($($field:ident),+ $(,)?) => {
            $(
                out.$field = sources
                    .iter()
                    .map(|(_, t)| &t.$field)
                    .find(|v| crate::model::has_text(v))
                    .cloned()
                    .flatten();
            )+
        };
    }
    macro_rules! merge_number {
        ($($field:ident),+ $(,)?) => {
            $(
                out.$field = sources.iter().find_map(|(_, t)| t.$field);
            )+
        };
    }

    merge_text!(
        title,
        artist,
        album,
        album_artist,
        composer,
        comment,
        description,
        genre,
        date,
        copyright,
        publisher,
        encoder,
    );
    merge_number!(track_number, track_total, disc_number, disc_total);

    for (_, tag) in &sources {
        for (key, value) in &tag.additional_fields {
            if out.additional_field(key).is_none() {
                out.set_additional_field(key, value);
            }
        }
    }

    let mut seen_hashes = Vec::new();
    for (_, tag) in &sources {
        for picture in &tag.pictures {
            let hash = picture.hash();
            if !seen_hashes.contains(&hash) {
                seen_hashes.push(hash);
                out.pictures.push(picture.clone());
            }
        }
    }

    for (_, tag) in &sources {
        for chapter in &tag.chapters {
            if !out.chapters.contains(chapter) {
                out.chapters.push(chapter.clone());
            }
        }
        for lyrics in &tag.lyrics {
            if !out.lyrics.contains(lyrics) {
                out.lyrics.push(lyrics.clone());
            }
        }
    }

    out
}

/// Write `tag` into `targets` (default: the systems already present, else
/// the container's native choice), then hand the merged zones to the engine.
pub fn save_path(
    path: &Path,
    probe: &FileProbe,
    tag: &TagData,
    targets: Option<&[TagSystemId]>,
    settings: &Settings,
    progress: Option<Progress>,
) -> R<SaveReport> {
    let loc = path.display().to_string();
    let present = probe.layout.systems();
    let targets: Vec<TagSystemId> = match targets {
        Some(t) => t.to_vec(),
        None if present.is_empty() => probe.container.default_system().into_iter().collect(),
        None => present,
    };
    if targets.is_empty() {
        return Err(anyhow!("{}: no writable tag system for this format", loc));
    }

    warn_unrepresentable(tag, &targets, &loc);
    let set = probe
        .container
        .zones_for_write(&probe.layout, tag, &targets, settings, &loc)?;
    engine::commit(path, set, settings, progress)
}

/// Excise one tag system. Removing a system that is not present is a no-op.
pub fn remove_path(
    path: &Path,
    probe: &FileProbe,
    system: TagSystemId,
    settings: &Settings,
) -> R<SaveReport> {
    let loc = path.display().to_string();
    if !probe.layout.systems().contains(&system) {
        log::debug!("{}: {} not present, nothing to remove", loc, system.name());
    }
    let set = probe.container.zones_for_remove(&probe.layout, system, &loc)?;
    engine::commit(path, set, settings, None)
}

/// A field the target cannot represent is dropped from that target's output,
/// never a failed save; say so once per save.
fn warn_unrepresentable(tag: &TagData, targets: &[TagSystemId], loc: &str) {
    use crate::model::LyricsFormat;
    for target in targets {
        let caps = target.caps();
        if !caps.pictures && !tag.pictures.is_empty() {
            log::warn!("{}: {} cannot store pictures, dropping them there", loc, target.name());
        }
        if !caps.chapters && !tag.chapters.is_empty() {
            log::warn!("{}: {} cannot store chapters, dropping them there", loc, target.name());
        }
        let has_sync = tag
            .lyrics
            .iter()
            .any(|l| l.format == LyricsFormat::Synchronized);
        if !caps.sync_lyrics && has_sync {
            log::warn!(
                "{}: {} cannot store synchronized lyrics, dropping them there",
                loc,
                target.name()
            );
        }
        if !caps.extra_fields && !tag.additional_fields.is_empty() {
            log::warn!(
                "{}: {} cannot store additional fields, dropping them there",
                loc,
                target.name()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_with(title: Option<&str>, date: Option<&str>) -> TagData {
        TagData {
            title: title.map(str::to_string),
            date: date.map(str::to_string),
            ..TagData::new()
        }
    }

    #[test]
    fn single_system_supplies_everything_without_cross_reading() {
        // the higher-priority system has no date; the lower one does
        let sources = vec![
            (TagSystemId::Id3v1, tag_with(Some("T"), None)),
            (TagSystemId::Id3v2, tag_with(Some("Other"), Some("1984"))),
        ];
        let merged = merge(sources, false);
        assert_eq!(merged.title.as_deref(), Some("T"));
        assert_eq!(merged.date, None);
    }

    #[test]
    fn cross_reading_falls_back_per_field() {
        let sources = vec![
            (TagSystemId::Id3v1, tag_with(Some("T"), None)),
            (TagSystemId::Id3v2, tag_with(Some("Other"), Some("1984"))),
        ];
        let merged = merge(sources, true);
        assert_eq!(merged.title.as_deref(), Some("T"));
        assert_eq!(merged.date.as_deref(), Some("1984"));
    }

    #[test]
    fn whitespace_counts_as_empty_but_zero_does_not() {
        let sources = vec![
            (TagSystemId::Id3v2, tag_with(Some("  "), Some("0"))),
            (TagSystemId::Ape, tag_with(Some("Real"), Some("1999"))),
        ];
        let merged = merge(sources, true);
        assert_eq!(merged.title.as_deref(), Some("Real"));
        // "0" is a value, not an absence
        assert_eq!(merged.date.as_deref(), Some("0"));
    }

    #[test]
    fn pictures_union_dedups_by_hash() {
        use crate::model::{PictureInfo, PictureType};
        let mut a = TagData::new();
        a.pictures.push(PictureInfo::new(vec![1, 2, 3], "image/png", PictureType::FrontCover));
        let mut b = TagData::new();
        b.pictures.push(PictureInfo::new(vec![1, 2, 3], "image/png", PictureType::FrontCover));
        b.pictures.push(PictureInfo::new(vec![9, 9], "image/jpeg", PictureType::BackCover));

        let merged = merge(vec![(TagSystemId::Id3v2, a), (TagSystemId::Ape, b)], true);
        assert_eq!(merged.pictures.len(), 2);
    }

    #[test]
    fn priority_ordering_respects_caller_ranking() {
        let present = vec![TagSystemId::Id3v2, TagSystemId::Id3v1];
        let ranked = ordered_by_priority(
            &present,
            &[TagSystemId::Id3v1, TagSystemId::Ape, TagSystemId::Id3v2],
        );
        assert_eq!(ranked, vec![TagSystemId::Id3v1, TagSystemId::Id3v2]);
    }
}
