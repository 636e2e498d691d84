//! AIFF/AIFC containers (`FORM` + big-endian chunks). The native system is
//! the `NAME`/`AUTH`/`ANNO`/`(c) ` text chunks; ID3v2 rides in an `ID3 `
//! chunk. Same chunk discipline as RIFF with the byte order flipped.

use crate::model::TagData;
use crate::prelude::*;
use crate::settings::Settings;
use crate::systems::{TagSystemId, aiff_text, id3v2};
use crate::zone::{SizeMarker, Zone, ZoneSet};

const FORM_ID: &[u8; 4] = b"FORM";
const AIFF_TYPE: &[u8; 4] = b"AIFF";
const AIFC_TYPE: &[u8; 4] = b"AIFC";
const ID3_CHUNK_ID: &[u8; 4] = b"ID3 ";

const HEADER_SIZE: u64 = 12;
const CHUNK_HEADER: u64 = 8;
const FORM_SIZE_OFFSET: u64 = 4;

const ID3_ZONE: &str = "aiff-id3";

const TEXT_CHUNKS: [(&[u8; 4], &str); 4] = [
    (aiff_text::NAME_ID, "aiff-name"),
    (aiff_text::AUTH_ID, "aiff-auth"),
    (aiff_text::ANNO_ID, "aiff-anno"),
    (aiff_text::COPYRIGHT_ID, "aiff-copy"),
];

#[derive(Debug, Clone, Copy)]
pub struct AiffChunk {
    pub offset: u64,
    pub payload_offset: u64,
    pub payload_size: u64,
}

impl AiffChunk {
    pub fn extent_size(&self) -> u64 {
        CHUNK_HEADER + self.payload_size + self.payload_size % 2
    }

    pub fn size_field(&self) -> u64 {
        self.offset + 4
    }
}

#[derive(Debug, Clone)]
pub struct AiffLayout {
    pub file_len: u64,
    /// Present text chunks, keyed by chunk id.
    pub text: Vec<([u8; 4], AiffChunk)>,
    pub id3: Option<(AiffChunk, id3v2::Id3v2Location)>,
    pub insert_at: u64,
}

pub fn scan(data: &[u8], loc_str: &str) -> R<AiffLayout> {
    if data.len() < HEADER_SIZE as usize
        || &data[0..4] != FORM_ID
        || (&data[8..12] != AIFF_TYPE && &data[8..12] != AIFC_TYPE)
    {
        return Err(anyhow!("{}: missing FORM/AIFF signature", loc_str));
    }

    let file_len = data.len() as u64;
    let mut layout = AiffLayout {
        file_len,
        text: Vec::new(),
        id3: None,
        insert_at: HEADER_SIZE,
    };

    let mut pos = HEADER_SIZE;
    while pos + CHUNK_HEADER <= file_len {
        let p = pos as usize;
        let id: [u8; 4] = data[p..p + 4].try_into().unwrap();
        let payload_size =
            u32::from_be_bytes([data[p + 4], data[p + 5], data[p + 6], data[p + 7]]) as u64;
        let chunk = AiffChunk {
            offset: pos,
            payload_offset: pos + CHUNK_HEADER,
            payload_size,
        };
        if chunk.payload_offset + payload_size > file_len {
            log::warn!("{} @{}: chunk {:?} overruns the file, stopping scan", loc_str, pos, id);
            break;
        }

        if TEXT_CHUNKS.iter().any(|(tid, _)| **tid == id) {
            layout.text.push((id, chunk));
        } else if &id == ID3_CHUNK_ID || &id == b"id3 " {
            match id3v2::probe(data, chunk.payload_offset, chunk.payload_offset + payload_size) {
                Some(loc) => layout.id3 = Some((chunk, loc)),
                None => log::warn!("{} @{}: ID3 chunk with no parsable tag", loc_str, pos),
            }
        }

        pos += chunk.extent_size();
    }
    layout.insert_at = pos.min(file_len);

    Ok(layout)
}

impl AiffLayout {
    fn text_chunk(&self, id: &[u8; 4]) -> Option<&AiffChunk> {
        self.text.iter().find(|(tid, _)| tid == id).map(|(_, c)| c)
    }

    pub fn systems(&self) -> Vec<TagSystemId> {
        let mut out = Vec::new();
        if !self.text.is_empty() {
            out.push(TagSystemId::Native);
        }
        if self.id3.is_some() {
            out.push(TagSystemId::Id3v2);
        }
        out
    }

    pub fn extent_of(&self, system: TagSystemId) -> Option<(u64, u64)> {
        match system {
            TagSystemId::Native => self
                .text
                .first()
                .map(|(_, c)| (c.offset, c.extent_size())),
            TagSystemId::Id3v2 => self.id3.as_ref().map(|(c, _)| (c.offset, c.extent_size())),
            _ => None,
        }
    }
}

pub fn read_system(
    data: &[u8],
    layout: &AiffLayout,
    system: TagSystemId,
    loc_str: &str,
) -> Option<TagData> {
    match system {
        TagSystemId::Native => {
            if layout.text.is_empty() {
                return None;
            }
            let mut tag = TagData::new();
            for (id, chunk) in &layout.text {
                let pl = chunk.payload_offset as usize;
                aiff_text::apply(&mut tag, id, &data[pl..pl + chunk.payload_size as usize]);
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
    layout: &AiffLayout,
    tag: &TagData,
    targets: &[TagSystemId],
    settings: &Settings,
    loc_str: &str,
) -> R<ZoneSet> {
    let mut set = ZoneSet::new(layout.file_len);

    for target in targets {
        match target {
            TagSystemId::Native => {
                for (id, name) in TEXT_CHUNKS {
                    let payload = aiff_text::value_for(tag, id).map(aiff_text::render_payload);
                    chunk_zones(&mut set, name, id, layout.text_chunk(id), payload, layout.insert_at);
                }
            }
            TagSystemId::Id3v2 => {
                let existing = layout.id3.as_ref().map(|(c, _)| c);
                let payload = embedded_id3_payload(tag, existing, settings, loc_str)?;
                chunk_zones(&mut set, ID3_ZONE, ID3_CHUNK_ID, existing, payload, layout.insert_at);
            }
            other => {
                log::warn!("{}: AIFF cannot carry {}, skipping target", loc_str, other.name());
            }
        }
    }

    finish_with_form_marker(&mut set);
    Ok(set)
}

fn embedded_id3_payload(
    tag: &TagData,
    existing: Option<&AiffChunk>,
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

fn chunk_zones(
    set: &mut ZoneSet,
    name: &str,
    chunk_id: &[u8; 4],
    existing: Option<&AiffChunk>,
    payload: Option<Vec<u8>>,
    insert_at: u64,
) {
    match (existing, payload) {
        (Some(chunk), Some(payload)) => {
            if chunk.payload_size % 2 == 0 {
                set.push_marker(SizeMarker::be32(chunk.size_field(), &[name]));
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
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn finish_with_form_marker(set: &mut ZoneSet) {
    if set.zones.is_empty() {
        return;
    }
    let names: Vec<&str> = set.zones.iter().map(|z| z.name.as_str()).collect();
    let marker = SizeMarker::be32(FORM_SIZE_OFFSET, &names);
    set.push_marker(marker);
}

pub fn zones_for_remove(layout: &AiffLayout, system: TagSystemId) -> ZoneSet {
    let mut set = ZoneSet::new(layout.file_len);
    match system {
        TagSystemId::Native => {
            for (id, chunk) in &layout.text {
                let name = TEXT_CHUNKS
                    .iter()
                    .find(|(tid, _)| *tid == id)
                    .map(|(_, n)| *n)
                    .unwrap_or("aiff-text");
                set.push_zone(Zone::deletion(name, chunk.offset, chunk.extent_size()));
            }
        }
        TagSystemId::Id3v2 => {
            if let Some((chunk, _)) = &layout.id3 {
                set.push_zone(Zone::deletion(ID3_ZONE, chunk.offset, chunk.extent_size()));
            }
        }
        _ => {}
    }
    finish_with_form_marker(&mut set);
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_aiff() -> Vec<u8> {
        // FORM header plus a COMM chunk; big-endian sizes throughout
        let comm = [0u8, 1, 0, 0, 0, 0, 0, 16, 0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0];
        let mut out = Vec::new();
        out.extend_from_slice(FORM_ID);
        out.write_u32::<BigEndian>(0).unwrap();
        out.extend_from_slice(AIFF_TYPE);
        out.extend_from_slice(b"COMM");
        out.write_u32::<BigEndian>(comm.len() as u32).unwrap();
        out.extend_from_slice(&comm);
        let form_size = out.len() as u32 - 8;
        out[4..8].copy_from_slice(&form_size.to_be_bytes());
        out
    }

    #[test]
    fn scan_and_append_text_chunks() {
        let file = minimal_aiff();
        let layout = scan(&file, "mem").unwrap();
        assert!(layout.systems().is_empty());

        let mut tag = TagData::new();
        tag.title = Some("Night Drive".to_string());
        tag.artist = Some("The Examples".to_string());

        let set =
            zones_for_write(&layout, &tag, &[TagSystemId::Native], &Settings::default(), "mem")
                .unwrap();
        assert_eq!(set.zones.len(), 2); // NAME + AUTH
        assert_eq!(set.markers.len(), 1);
        assert_eq!(set.markers[0].offset, FORM_SIZE_OFFSET);

        // insertion chunks carry big-endian sizes
        let name_zone = set.zones.iter().find(|z| z.name == "aiff-name").unwrap();
        assert_eq!(&name_zone.content[0..4], b"NAME");
        let declared =
            u32::from_be_bytes(name_zone.content[4..8].try_into().unwrap()) as usize;
        assert_eq!(declared, name_zone.content.len() - 8);
    }

    #[test]
    fn existing_text_chunk_gets_be_marker() {
        let mut file = minimal_aiff();
        file.extend_from_slice(&whole_chunk(aiff_text::NAME_ID, b"Old Title\0"));
        let form_size = file.len() as u32 - 8;
        file[4..8].copy_from_slice(&form_size.to_be_bytes());

        let layout = scan(&file, "mem").unwrap();
        assert_eq!(layout.systems(), vec![TagSystemId::Native]);

        let mut tag = TagData::new();
        tag.title = Some("New".to_string());
        let set =
            zones_for_write(&layout, &tag, &[TagSystemId::Native], &Settings::default(), "mem")
                .unwrap();
        let chunk_marker = set
            .markers
            .iter()
            .find(|m| m.offset != FORM_SIZE_OFFSET)
            .unwrap();
        assert_eq!(chunk_marker.endian, crate::zone::MarkerEndian::Big);
    }
}
