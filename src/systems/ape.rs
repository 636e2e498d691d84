//! APEv2: key/value items framed by a 32-byte header and footer, sitting at
//! the end of the file (before any ID3v1 trailer).

use crate::model::{LyricsFormat, LyricsInfo, PictureInfo, PictureType, TagData, has_text};
use crate::prelude::*;
use crate::systems::TagSystemId;

const PREAMBLE: &[u8; 8] = b"APETAGEX";
pub const STRUCT_SIZE: u64 = 32;
const VERSION: u32 = 2000;

const FLAG_HAS_HEADER: u32 = 0x8000_0000;
const FLAG_IS_HEADER: u32 = 0x2000_0000;
const ITEM_KIND_MASK: u32 = 0x0000_0006;
const ITEM_KIND_BINARY: u32 = 0x0000_0002;

const FRONT_COVER_KEY: &str = "Cover Art (Front)";
const BACK_COVER_KEY: &str = "Cover Art (Back)";
const GENERIC_COVER_KEY: &str = "Cover Art (Media)";

#[derive(Debug, Clone, Copy)]
pub struct ApeLocation {
    pub offset: u64,
    pub size: u64,
    pub item_count: u32,
    pub has_header: bool,
}

impl ApeLocation {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Look for a tag whose footer ends at `limit` (end of file, or the start of
/// an ID3v1 trailer).
pub fn probe(data: &[u8], limit: u64) -> Option<ApeLocation> {
    if limit < STRUCT_SIZE || limit > data.len() as u64 {
        return None;
    }
    let footer_start = (limit - STRUCT_SIZE) as usize;
    let footer = &data[footer_start..footer_start + STRUCT_SIZE as usize];
    if &footer[0..8] != PREAMBLE {
        return None;
    }
    let mut cursor = Cursor::new(&footer[8..]);
    let version = cursor.read_u32::<LittleEndian>().ok()?;
    let tag_size = cursor.read_u32::<LittleEndian>().ok()? as u64;
    let item_count = cursor.read_u32::<LittleEndian>().ok()?;
    let flags = cursor.read_u32::<LittleEndian>().ok()?;
    if version > 2000 || flags & FLAG_IS_HEADER != 0 {
        return None;
    }

    let has_header = flags & FLAG_HAS_HEADER != 0;
    let full_size = tag_size + if has_header { STRUCT_SIZE } else { 0 };
    if full_size > limit {
        log::warn!("@{}: APE tag size exceeds file, ignoring tag", footer_start);
        return None;
    }
    let offset = limit - full_size;
    if has_header {
        let h = offset as usize;
        if &data[h..h + 8] != PREAMBLE {
            log::warn!("@{}: APE header preamble missing, ignoring tag", h);
            return None;
        }
    }

    Some(ApeLocation {
        offset,
        size: full_size,
        item_count,
        has_header,
    })
}

pub fn read(data: &[u8], loc: &ApeLocation, loc_str: &str) -> TagData {
    let mut tag = TagData::new();
    let items_start = loc.offset + if loc.has_header { STRUCT_SIZE } else { 0 };
    let items_end = loc.end() - STRUCT_SIZE;
    let mut pos = items_start as usize;
    let end = items_end as usize;

    for _ in 0..loc.item_count {
        if pos + 8 > end {
            log::warn!("{}: APE item list truncated", loc_str);
            break;
        }
        let value_size =
            u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let flags =
            u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]);
        pos += 8;

        let key_end = match data[pos..end].iter().position(|&b| b == 0) {
            Some(rel) => pos + rel,
            None => {
                log::warn!("{}: unterminated APE item key", loc_str);
                break;
            }
        };
        let key = String::from_utf8_lossy(&data[pos..key_end]).to_string();
        pos = key_end + 1;
        if pos + value_size > end {
            log::warn!("{}: APE item `{}` overruns the tag", loc_str, key);
            break;
        }
        let value = &data[pos..pos + value_size];
        pos += value_size;

        if flags & ITEM_KIND_MASK == ITEM_KIND_BINARY {
            read_binary_item(&mut tag, &key, value);
        } else {
            read_text_item(&mut tag, &key, &String::from_utf8_lossy(value));
        }
    }

    tag
}

fn read_text_item(tag: &mut TagData, key: &str, value: &str) {
    let value = value.trim_end_matches('\0');
    match key.to_lowercase().as_str() {
        "title" => tag.title = Some(value.to_string()),
        "artist" => tag.artist = Some(value.to_string()),
        "album" => tag.album = Some(value.to_string()),
        "album artist" => tag.album_artist = Some(value.to_string()),
        "composer" => tag.composer = Some(value.to_string()),
        "genre" => tag.genre = Some(value.to_string()),
        "year" => tag.date = Some(value.to_string()),
        "track" => tag.set_track_string(value),
        "disc" => tag.set_disc_string(value),
        "comment" => tag.comment = Some(value.to_string()),
        "copyright" => tag.copyright = Some(value.to_string()),
        "publisher" => tag.publisher = Some(value.to_string()),
        "description" => tag.description = Some(value.to_string()),
        "encoder" => tag.encoder = Some(value.to_string()),
        "lyrics" => tag
            .lyrics
            .push(LyricsInfo::unsynchronized("", value)),
        _ => tag.set_additional_field(key, value),
    }
}

fn read_binary_item(tag: &mut TagData, key: &str, value: &[u8]) {
    if !key.starts_with("Cover Art") {
        log::debug!("ignoring binary APE item `{}`", key);
        return;
    }
    // filename, NUL, image bytes
    let (filename, data) = match value.iter().position(|&b| b == 0) {
        Some(pos) => (&value[..pos], &value[pos + 1..]),
        None => (&value[..0], value),
    };
    let pic_type = match key {
        FRONT_COVER_KEY => PictureType::FrontCover,
        BACK_COVER_KEY => PictureType::BackCover,
        _ => PictureType::Generic,
    };
    let mime = mime_from_filename(&String::from_utf8_lossy(filename));
    let mut picture = PictureInfo::new(data.to_vec(), mime, pic_type);
    picture.source = Some(TagSystemId::Ape);
    tag.pictures.push(picture);
}

fn mime_from_filename(name: &str) -> &'static str {
    if name.to_lowercase().ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

fn filename_for(picture: &PictureInfo) -> &'static str {
    if picture.mime_type.eq_ignore_ascii_case("image/png") {
        "cover.png"
    } else {
        "cover.jpg"
    }
}

fn cover_key(picture: &PictureInfo) -> &'static str {
    match picture.pic_type {
        PictureType::FrontCover => FRONT_COVER_KEY,
        PictureType::BackCover => BACK_COVER_KEY,
        _ => GENERIC_COVER_KEY,
    }
}

/// Serialize a complete tag (header, items, footer).
pub fn render(tag: &TagData, loc_str: &str) -> Vec<u8> {
    let mut items = Vec::new();
    let mut count = 0u32;

    let track = tag.track_string();
    let disc = tag.disc_string();
    let text_items: [(&str, &Option<String>); 14] = [
        ("Title", &tag.title),
        ("Artist", &tag.artist),
        ("Album", &tag.album),
        ("Album Artist", &tag.album_artist),
        ("Composer", &tag.composer),
        ("Genre", &tag.genre),
        ("Year", &tag.date),
        ("Track", &track),
        ("Disc", &disc),
        ("Comment", &tag.comment),
        ("Copyright", &tag.copyright),
        ("Publisher", &tag.publisher),
        ("Description", &tag.description),
        ("Encoder", &tag.encoder),
    ];
    for (key, value) in text_items {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            push_item(&mut items, key, value.as_bytes(), false);
            count += 1;
        }
    }

    for (key, value) in &tag.additional_fields {
        push_item(&mut items, key, value.as_bytes(), false);
        count += 1;
    }

    for lyrics in &tag.lyrics {
        match lyrics.format {
            LyricsFormat::Unsynchronized if !lyrics.text.is_empty() => {
                push_item(&mut items, "Lyrics", lyrics.text.as_bytes(), false);
                count += 1;
            }
            LyricsFormat::Synchronized => {
                log::warn!(
                    "{}: APE cannot store synchronized lyrics, dropping them",
                    loc_str
                );
            }
            _ => {}
        }
    }

    for picture in &tag.pictures {
        let mut value = filename_for(picture).as_bytes().to_vec();
        value.push(0);
        value.extend_from_slice(&picture.data);
        push_item(&mut items, cover_key(picture), &value, true);
        count += 1;
    }

    let tag_size = (items.len() as u64 + STRUCT_SIZE) as u32;
    let mut out = Vec::with_capacity(items.len() + 2 * STRUCT_SIZE as usize);
    write_struct(&mut out, tag_size, count, FLAG_HAS_HEADER | FLAG_IS_HEADER);
    out.extend_from_slice(&items);
    write_struct(&mut out, tag_size, count, FLAG_HAS_HEADER);
    out
}

fn push_item(out: &mut Vec<u8>, key: &str, value: &[u8], binary: bool) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    let flags = if binary { ITEM_KIND_BINARY } else { 0 };
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(key.as_bytes());
    out.push(0);
    out.extend_from_slice(value);
}

fn write_struct(out: &mut Vec<u8>, tag_size: u32, count: u32, flags: u32) {
    out.extend_from_slice(PREAMBLE);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&tag_size.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&[0u8; 8]);
}

/// True when the tag has at least one item worth writing.
pub fn is_renderable(tag: &TagData) -> bool {
    let texts = [
        &tag.title,
        &tag.artist,
        &tag.album,
        &tag.album_artist,
        &tag.composer,
        &tag.genre,
        &tag.date,
        &tag.comment,
        &tag.copyright,
        &tag.publisher,
        &tag.description,
        &tag.encoder,
    ];
    texts.iter().any(|v| has_text(v))
        || tag.track_number.is_some()
        || tag.disc_number.is_some()
        || !tag.additional_fields.is_empty()
        || !tag.pictures.is_empty()
        || !tag.lyrics.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_cover() {
        let mut tag = TagData::new();
        tag.title = Some("Night Drive".to_string());
        tag.artist = Some("The Examples".to_string());
        tag.date = Some("1984".to_string());
        tag.track_number = Some(5);
        tag.set_additional_field("Catalog", "EX-001");
        tag.pictures.push(PictureInfo::new(
            vec![1, 2, 3, 4],
            "image/png",
            PictureType::FrontCover,
        ));
        tag.lyrics.push(LyricsInfo::unsynchronized("eng", "la la"));

        let bytes = render(&tag, "mem");
        let loc = probe(&bytes, bytes.len() as u64).unwrap();
        assert!(loc.has_header);
        assert_eq!(loc.offset, 0);
        assert_eq!(loc.size, bytes.len() as u64);

        let back = read(&bytes, &loc, "mem");
        assert_eq!(back.title.as_deref(), Some("Night Drive"));
        assert_eq!(back.date.as_deref(), Some("1984"));
        assert_eq!(back.track_number, Some(5));
        assert_eq!(back.additional_field("Catalog"), Some("EX-001"));
        assert_eq!(back.pictures.len(), 1);
        assert_eq!(back.pictures[0].data, vec![1, 2, 3, 4]);
        assert_eq!(back.pictures[0].mime_type, "image/png");
        assert_eq!(back.lyrics.len(), 1);
        assert_eq!(back.lyrics[0].text, "la la");
    }

    #[test]
    fn probe_rejects_header_struct() {
        let tag = TagData {
            title: Some("x".to_string()),
            ..TagData::new()
        };
        let bytes = render(&tag, "mem");
        // pointing limit at the end of the *header* struct must not match
        assert!(probe(&bytes, STRUCT_SIZE).is_none());
    }

    #[test]
    fn synchronized_lyrics_are_dropped() {
        let mut tag = TagData::new();
        tag.title = Some("x".to_string());
        tag.lyrics.push(LyricsInfo {
            format: LyricsFormat::Synchronized,
            phrases: vec![crate::model::LyricsPhrase {
                timestamp_ms: 0,
                text: "hi".to_string(),
            }],
            ..LyricsInfo::default()
        });
        let bytes = render(&tag, "mem");
        let loc = probe(&bytes, bytes.len() as u64).unwrap();
        let back = read(&bytes, &loc, "mem");
        assert!(back.lyrics.is_empty());
    }
}
