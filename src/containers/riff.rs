//! RIFF/WAVE containers. The native system is the `LIST`/`INFO` chunk plus
//! the `iXML` chunk; an ID3v2 tag rides embedded in an `id3 ` chunk, whose
//! own size field and the top-level RIFF size field form a marker chain over
//! the embedded tag zone. All size fields are little-endian.

use crate::model::TagData;
use crate::prelude::*;
use crate::settings::Settings;
use crate::systems::{TagSystemId, id3v2, riff_info};
use crate::zone::{SizeMarker, Zone, ZoneSet};

const RIFF_ID: &[u8; 4] = b"RIFF";
const WAVE_ID: &[u8; 4] = b"WAVE";
const LIST_ID: &[u8; 4] = b"LIST";
const IXML_ID: &[u8; 4] = b"iXML";

const HEADER_SIZE: u64 = 12;
const CHUNK_HEADER: u64 = 8;
const RIFF_SIZE_OFFSET: u64 = 4;
const SIZE_FIELD_OFFSET: u64 = 4;

const INFO_ZONE: &str = "riff-info";
const IXML_ZONE: &str = "riff-ixml";
const ID3_ZONE: &str = "riff-id3";

#[derive(Debug, Clone, Copy)]
pub struct RiffChunk {
    pub offset: u64,
    pub payload_offset: u64,
    pub payload_size: u64,
}

impl RiffChunk {
    /// Full byte extent: header, payload, pad byte when the payload is odd.
    pub fn extent_size(&self) -> u64 {
        CHUNK_HEADER + self.payload_size + self.payload_size % 2
    }

    pub fn size_field(&self) -> u64 {
        self.offset + SIZE_FIELD_OFFSET
    }
}

#[derive(Debug, Clone)]
pub struct RiffLayout {
    pub file_len: u64,
    pub info: Option<RiffChunk>,
    pub ixml: Option<RiffChunk>,
    pub id3: Option<(RiffChunk, id3v2::Id3v2Location)>,
    /// Canonical insertion point for new chunks: after the last chunk.
    pub insert_at: u64,
}

pub fn scan(data: &[u8], loc_str: &str) -> R<RiffLayout> {
    if data.len() < HEADER_SIZE as usize || &data[0..4] != RIFF_ID || &data[8..12] != WAVE_ID {
        return Err(anyhow!("{}: missing RIFF/WAVE signature", loc_str));
    }

    let file_len = data.len() as u64;
    let mut layout = RiffLayout {
        file_len,
        info: None,
        ixml: None,
        id3: None,
        insert_at: HEADER_SIZE,
    };

    let mut pos = HEADER_SIZE;
    while pos + CHUNK_HEADER <= file_len {
        let p = pos as usize;
        let id: [u8; 4] = data[p..p + 4].try_into().unwrap();
        let payload_size =
            u32::from_le_bytes([data[p + 4], data[p + 5], data[p + 6], data[p + 7]]) as u64;
        let chunk = RiffChunk {
            offset: pos,
            payload_offset: pos + CHUNK_HEADER,
            payload_size,
        };
        if chunk.payload_offset + payload_size > file_len {
            log::warn!("{} @{}: chunk {:?} overruns the file, stopping scan", loc_str, pos, id);
            break;
        }

        match &id {
            LIST_ID => {
                let pl = chunk.payload_offset as usize;
                if payload_size >= 4 && &data[pl..pl + 4] == b"INFO" {
                    layout.info = Some(chunk);
                }
            }
            IXML_ID => layout.ixml = Some(chunk),
            b"id3 " | b"ID3 " => {
                match id3v2::probe(data, chunk.payload_offset, chunk.payload_offset + payload_size)
                {
                    Some(loc) => layout.id3 = Some((chunk, loc)),
                    None => {
                        log::warn!("{} @{}: id3 chunk with no parsable tag", loc_str, pos);
                    }
                }
            }
            _ => {}
        }

        pos += chunk.extent_size();
    }
    layout.insert_at = pos.min(file_len);

    Ok(layout)
}

impl RiffLayout {
    pub fn systems(&self) -> Vec<TagSystemId> {
        let mut found: Vec<(u64, TagSystemId)> = Vec::new();
        if let Some(c) = &self.info {
            found.push((c.offset, TagSystemId::Native));
        } else if let Some(c) = &self.ixml {
            found.push((c.offset, TagSystemId::Native));
        }
        if let Some((c, _)) = &self.id3 {
            found.push((c.offset, TagSystemId::Id3v2));
        }
        found.sort_by_key(|(off, _)| *off);
        found.into_iter().map(|(_, s)| s).collect()
    }

    pub fn extent_of(&self, system: TagSystemId) -> Option<(u64, u64)> {
        match system {
            TagSystemId::Native => self
                .info
                .as_ref()
                .or(self.ixml.as_ref())
                .map(|c| (c.offset, c.extent_size())),
            TagSystemId::Id3v2 => self.id3.as_ref().map(|(c, _)| (c.offset, c.extent_size())),
            _ => None,
        }
    }
}

pub fn read_system(
    data: &[u8],
    layout: &RiffLayout,
    system: TagSystemId,
    loc_str: &str,
) -> Option<TagData> {
    match system {
        TagSystemId::Native => {
            if layout.info.is_none() && layout.ixml.is_none() {
                return None;
            }
            let mut tag = TagData::new();
            if let Some(chunk) = &layout.info {
                let pl = chunk.payload_offset as usize;
                riff_info::read_info(&data[pl..pl + chunk.payload_size as usize], &mut tag, loc_str);
            }
            if let Some(chunk) = &layout.ixml {
                let pl = chunk.payload_offset as usize;
                riff_info::read_ixml(&data[pl..pl + chunk.payload_size as usize], &mut tag, loc_str);
            }
            Some(tag)
        }
        TagSystemId::Id3v2 => layout
            .id3
            .as_ref()
            .map(|(_, loc)| id3v2::read(data, loc, loc_str)),
        _ => None,
    }
}

pub fn zones_for_write(
    layout: &RiffLayout,
    tag: &TagData,
    targets: &[TagSystemId],
    settings: &Settings,
    loc_str: &str,
) -> R<ZoneSet> {
    let mut set = ZoneSet::new(layout.file_len);

    for target in targets {
        match target {
            TagSystemId::Native => {
                let info_payload = riff_info::has_info(tag).then(|| riff_info::render_info(tag));
                chunk_zones(&mut set, INFO_ZONE, LIST_ID, layout.info.as_ref(), info_payload, layout.insert_at);
                chunk_zones(&mut set, IXML_ZONE, IXML_ID, layout.ixml.as_ref(), riff_info::render_ixml(tag), layout.insert_at);
            }
            TagSystemId::Id3v2 => {
                let existing = layout.id3.as_ref().map(|(c, _)| c);
                let payload = embedded_id3_payload(tag, existing, settings, loc_str)?;
                chunk_zones(&mut set, ID3_ZONE, b"id3 ", existing, payload, layout.insert_at);
            }
            other => {
                log::warn!("{}: RIFF cannot carry {}, skipping target", loc_str, other.name());
            }
        }
    }

    finish_with_riff_marker(&mut set);
    Ok(set)
}

/// A complete embedded tag, padded internally to keep the chunk payload size
/// stable when it fits, and always even.
fn embedded_id3_payload(
    tag: &TagData,
    existing: Option<&RiffChunk>,
    settings: &Settings,
    loc_str: &str,
) -> R<Option<Vec<u8>>> {
    let frames_len = id3v2::render_frames(tag, settings, loc_str)?.len() as u64;
    if frames_len == 0 && existing.is_none() {
        return Ok(None);
    }
    let min_size = id3v2::HEADER_SIZE + frames_len;
    let padding = match existing {
        Some(chunk) if settings.use_padding && min_size <= chunk.payload_size => {
            chunk.payload_size - min_size
        }
        _ => {
            let base = if settings.use_padding {
                settings.padding_size as u64
            } else {
                0
            };
            base + (min_size + base) % 2
        }
    };
    Ok(Some(id3v2::render_tag(tag, settings, padding, loc_str)?))
}

/// Zones and markers for one chunk slot. An even existing payload is
/// rewritten through a payload zone plus its chunk-size marker; odd or
/// missing chunks are rewritten whole (size field inside the content).
fn chunk_zones(
    set: &mut ZoneSet,
    name: &str,
    chunk_id: &[u8; 4],
    existing: Option<&RiffChunk>,
    payload: Option<Vec<u8>>,
    insert_at: u64,
) {
    match (existing, payload) {
        (Some(chunk), Some(payload)) => {
            if chunk.payload_size % 2 == 0 {
                set.push_marker(SizeMarker::le32(chunk.size_field(), &[name]));
                set.push_zone(Zone::resizable(
                    name,
                    chunk.payload_offset,
                    chunk.payload_size,
                    payload,
                ));
            } else {
                set.push_zone(Zone::resizable(
                    name,
                    chunk.offset,
                    chunk.extent_size(),
                    whole_chunk(chunk_id, &payload),
                ));
            }
        }
        (Some(chunk), None) => {
            set.push_zone(Zone::deletion(name, chunk.offset, chunk.extent_size()));
        }
        (None, Some(payload)) => {
            set.push_zone(Zone::resizable(
                name,
                insert_at,
                0,
                whole_chunk(chunk_id, &payload),
            ));
        }
        (None, None) => {}
    }
}

fn whole_chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(CHUNK_HEADER as usize + payload.len() + 1);
    out.extend_from_slice(id);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

/// Every zone in the set moves bytes the top-level RIFF size field counts.
fn finish_with_riff_marker(set: &mut ZoneSet) {
    if set.zones.is_empty() {
        return;
    }
    let names: Vec<&str> = set.zones.iter().map(|z| z.name.as_str()).collect();
    let marker = SizeMarker::le32(RIFF_SIZE_OFFSET, &names);
    set.push_marker(marker);
}

pub fn zones_for_remove(layout: &RiffLayout, system: TagSystemId) -> ZoneSet {
    let mut set = ZoneSet::new(layout.file_len);
    match system {
        TagSystemId::Native => {
            if let Some(chunk) = &layout.info {
                set.push_zone(Zone::deletion(INFO_ZONE, chunk.offset, chunk.extent_size()));
            }
            if let Some(chunk) = &layout.ixml {
                set.push_zone(Zone::deletion(IXML_ZONE, chunk.offset, chunk.extent_size()));
            }
        }
        TagSystemId::Id3v2 => {
            if let Some((chunk, _)) = &layout.id3 {
                set.push_zone(Zone::deletion(ID3_ZONE, chunk.offset, chunk.extent_size()));
            }
        }
        _ => {}
    }
    finish_with_riff_marker(&mut set);
    set
}

#[cfg(test)]
pub(crate) fn minimal_wave() -> Vec<u8> {
    // RIFF header, fmt chunk, small data chunk
    let mut fmt = Vec::new();
    fmt.write_u16::<LittleEndian>(1).unwrap(); // PCM
    fmt.write_u16::<LittleEndian>(1).unwrap();
    fmt.write_u32::<LittleEndian>(44_100).unwrap();
    fmt.write_u32::<LittleEndian>(88_200).unwrap();
    fmt.write_u16::<LittleEndian>(2).unwrap();
    fmt.write_u16::<LittleEndian>(16).unwrap();

    let data = vec![0u8; 64];
    let mut out = Vec::new();
    out.extend_from_slice(RIFF_ID);
    out.write_u32::<LittleEndian>(0).unwrap(); // patched below
    out.extend_from_slice(WAVE_ID);
    out.extend_from_slice(b"fmt ");
    out.write_u32::<LittleEndian>(fmt.len() as u32).unwrap();
    out.extend_from_slice(&fmt);
    out.extend_from_slice(b"data");
    out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
    out.extend_from_slice(&data);

    let riff_size = out.len() as u32 - 8;
    out[4..8].copy_from_slice(&riff_size.to_le_bytes());
    out
}
