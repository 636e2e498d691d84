//! MPEG audio streams: ID3v2 at the head, APE and ID3v1 trailers at the tail.
//! All three can coexist; the audio frames between them are never touched.

use crate::model::TagData;
use crate::prelude::*;
use crate::settings::Settings;
use crate::systems::{TagSystemId, ape, id3v1, id3v2};
use crate::zone::{SizeMarker, Zone, ZoneKind, ZoneSet};

const ID3V2_ZONE: &str = "id3v2";
const ID3V2_PAD_ZONE: &str = "id3v2-pad";
const APE_ZONE: &str = "ape";
const ID3V1_ZONE: &str = "id3v1";

#[derive(Debug, Clone)]
pub struct MpegLayout {
    pub file_len: u64,
    pub id3v2: Option<id3v2::Id3v2Location>,
    pub ape: Option<ape::ApeLocation>,
    pub id3v1: Option<u64>,
}

pub fn scan(data: &[u8]) -> MpegLayout {
    let file_len = data.len() as u64;
    let id3v1 = id3v1::probe(data);
    let ape_limit = id3v1.unwrap_or(file_len);
    MpegLayout {
        file_len,
        id3v2: id3v2::probe(data, 0, file_len),
        ape: ape::probe(data, ape_limit),
        id3v1,
    }
}

impl MpegLayout {
    pub fn systems(&self) -> Vec<TagSystemId> {
        let mut out = Vec::new();
        if self.id3v2.is_some() {
            out.push(TagSystemId::Id3v2);
        }
        if self.ape.is_some() {
            out.push(TagSystemId::Ape);
        }
        if self.id3v1.is_some() {
            out.push(TagSystemId::Id3v1);
        }
        out
    }

    pub fn extent_of(&self, system: TagSystemId) -> Option<(u64, u64)> {
        match system {
            TagSystemId::Id3v2 => self.id3v2.map(|l| (l.offset, l.total_size)),
            TagSystemId::Ape => self.ape.map(|l| (l.offset, l.size)),
            TagSystemId::Id3v1 => self.id3v1.map(|off| (off, id3v1::TAG_SIZE)),
            TagSystemId::Native => None,
        }
    }
}

pub fn read_system(
    data: &[u8],
    layout: &MpegLayout,
    system: TagSystemId,
    loc_str: &str,
) -> Option<TagData> {
    match system {
        TagSystemId::Id3v2 => layout
            .id3v2
            .as_ref()
            .map(|loc| id3v2::read(data, loc, loc_str)),
        TagSystemId::Ape => layout.ape.as_ref().map(|loc| ape::read(data, loc, loc_str)),
        TagSystemId::Id3v1 => layout.id3v1.map(|off| {
            let block = &data[off as usize..(off + id3v1::TAG_SIZE) as usize];
            match id3v1::read(block) {
                Ok(tag) => tag,
                Err(e) => {
                    log::warn!("{}: ID3v1 read failed ({}), treating as absent", loc_str, e);
                    TagData::new()
                }
            }
        }),
        TagSystemId::Native => None,
    }
}

pub fn zones_for_write(
    layout: &MpegLayout,
    tag: &TagData,
    targets: &[TagSystemId],
    settings: &Settings,
    loc_str: &str,
) -> R<ZoneSet> {
    let mut set = ZoneSet::new(layout.file_len);

    // Head-to-tail order regardless of how the caller listed the targets, so
    // freshly inserted trailers land as ... audio, APE, ID3v1.
    const WRITE_ORDER: [TagSystemId; 4] = [
        TagSystemId::Id3v2,
        TagSystemId::Native,
        TagSystemId::Ape,
        TagSystemId::Id3v1,
    ];
    for target in WRITE_ORDER.iter().filter(|t| targets.contains(*t)) {
        match target {
            TagSystemId::Id3v2 => id3v2_zones(layout, tag, settings, loc_str, &mut set)?,
            TagSystemId::Ape => {
                let content = ape::render(tag, loc_str);
                match layout.ape {
                    Some(loc) => {
                        set.push_zone(Zone::resizable(APE_ZONE, loc.offset, loc.size, content));
                    }
                    None if ape::is_renderable(tag) => {
                        let at = layout.id3v1.unwrap_or(layout.file_len);
                        set.push_zone(Zone::resizable(APE_ZONE, at, 0, content));
                    }
                    None => log::debug!("{}: nothing to write into a new APE tag", loc_str),
                }
            }
            TagSystemId::Id3v1 => {
                let content = id3v1::render(tag, loc_str);
                match layout.id3v1 {
                    Some(off) => set.push_zone(Zone::new(
                        ID3V1_ZONE,
                        off,
                        id3v1::TAG_SIZE,
                        content,
                        ZoneKind::FixedSize,
                    )),
                    None => set.push_zone(Zone::resizable(
                        ID3V1_ZONE,
                        layout.file_len,
                        0,
                        content,
                    )),
                }
            }
            TagSystemId::Native => {
                log::warn!("{}: MPEG has no native tag system, skipping target", loc_str);
            }
        }
    }

    Ok(set)
}

/// Frames + padding as separate zones against the existing header when the
/// on-disk version matches (the header's syncsafe size field becomes an
/// external marker and padding absorbs small edits). Otherwise one
/// self-contained zone that re-sizes itself internally.
fn id3v2_zones(
    layout: &MpegLayout,
    tag: &TagData,
    settings: &Settings,
    loc_str: &str,
    set: &mut ZoneSet,
) -> R<()> {
    match layout.id3v2 {
        Some(loc) if loc.version == settings.id3v2_version.major() && !loc.has_footer => {
            let frames = id3v2::render_frames(tag, settings, loc_str)?;
            set.push_zone(Zone::resizable(
                ID3V2_ZONE,
                loc.frames_offset(),
                loc.frames_size,
                frames,
            ));
            set.push_zone(Zone::new(
                ID3V2_PAD_ZONE,
                loc.padding_offset(),
                loc.padding_size,
                vec![0u8; loc.padding_size as usize],
                ZoneKind::Padding,
            ));
            set.push_marker(SizeMarker::syncsafe(
                loc.size_field_offset(),
                &[ID3V2_ZONE, ID3V2_PAD_ZONE],
            ));
        }
        Some(loc) => {
            let frames_len = id3v2::render_frames(tag, settings, loc_str)?.len() as u64;
            let old_body = loc.total_size - id3v2::HEADER_SIZE;
            let padding = if settings.use_padding && frames_len <= old_body {
                old_body - frames_len
            } else if settings.use_padding {
                settings.padding_size as u64
            } else {
                0
            };
            let content = id3v2::render_tag(tag, settings, padding, loc_str)?;
            set.push_zone(Zone::resizable(ID3V2_ZONE, loc.offset, loc.total_size, content));
        }
        None => {
            let frames_len = id3v2::render_frames(tag, settings, loc_str)?.len();
            if frames_len == 0 {
                log::debug!("{}: nothing to write into a new ID3v2 tag", loc_str);
                return Ok(());
            }
            let padding = if settings.use_padding {
                settings.padding_size as u64
            } else {
                0
            };
            let content = id3v2::render_tag(tag, settings, padding, loc_str)?;
            set.push_zone(Zone::resizable(ID3V2_ZONE, 0, 0, content));
        }
    }
    Ok(())
}

pub fn zones_for_remove(layout: &MpegLayout, system: TagSystemId) -> ZoneSet {
    let mut set = ZoneSet::new(layout.file_len);
    if let Some((offset, size)) = layout.extent_of(system) {
        let name = match system {
            TagSystemId::Id3v2 => ID3V2_ZONE,
            TagSystemId::Ape => APE_ZONE,
            TagSystemId::Id3v1 => ID3V1_ZONE,
            TagSystemId::Native => return set,
        };
        set.push_zone(Zone::deletion(name, offset, size));
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio() -> Vec<u8> {
        let mut data = vec![0xFF, 0xFB, 0x90, 0x00];
        data.extend_from_slice(&[0x55; 400]);
        data
    }

    #[test]
    fn scan_finds_coexisting_systems() {
        let mut tag = TagData::new();
        tag.title = Some("T".to_string());

        let mut file = id3v2::render_tag(&tag, &Settings::default(), 64, "mem").unwrap();
        file.extend_from_slice(&audio());
        file.extend_from_slice(&ape::render(&tag, "mem"));
        file.extend_from_slice(&id3v1::render(&tag, "mem"));

        let layout = scan(&file);
        assert_eq!(
            layout.systems(),
            vec![TagSystemId::Id3v2, TagSystemId::Ape, TagSystemId::Id3v1]
        );
        let (ape_off, ape_size) = layout.extent_of(TagSystemId::Ape).unwrap();
        assert_eq!(ape_off + ape_size + 128, file.len() as u64);
    }

    #[test]
    fn version_match_produces_pad_zone_and_marker() {
        let mut tag = TagData::new();
        tag.title = Some("T".to_string());
        let settings = Settings::default();
        let mut file = id3v2::render_tag(&tag, &settings, 64, "mem").unwrap();
        file.extend_from_slice(&audio());

        let layout = scan(&file);
        let set = zones_for_write(&layout, &tag, &[TagSystemId::Id3v2], &settings, "mem").unwrap();
        assert_eq!(set.zones.len(), 2);
        assert_eq!(set.zones[1].kind, ZoneKind::Padding);
        assert_eq!(set.markers.len(), 1);
        assert_eq!(set.markers[0].offset, 6);
    }

    #[test]
    fn new_tag_is_inserted_at_start() {
        let file = audio();
        let layout = scan(&file);
        assert!(layout.systems().is_empty());

        let mut tag = TagData::new();
        tag.title = Some("T".to_string());
        let set =
            zones_for_write(&layout, &tag, &[TagSystemId::Id3v2], &Settings::default(), "mem")
                .unwrap();
        assert_eq!(set.zones.len(), 1);
        assert_eq!(set.zones[0].offset, 0);
        assert_eq!(set.zones[0].old_size, 0);
        assert!(!set.zones[0].content.is_empty());
    }
}
