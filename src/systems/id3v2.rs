//! ID3v2.2/2.3/2.4. Reads all three minor versions; writes 2.3 or 2.4
//! depending on [`Settings::id3v2_version`]. The tag body is frames followed
//! by zero padding, all covered by the syncsafe size in the 10-byte header.

use super::text;
use crate::model::{
    ChapterInfo, LyricsFormat, LyricsInfo, LyricsPhrase, PictureInfo, PictureType, TagData,
};
use crate::prelude::*;
use crate::settings::{Id3v2Version, Settings};
use crate::systems::TagSystemId;
use crate::zone::{syncsafe_decode, syncsafe_encode};

pub const HEADER_SIZE: u64 = 10;
const FOOTER_SIZE: u64 = 10;
const FRAME_HEADER_V22: usize = 6;
const FRAME_HEADER: usize = 10;
const MAGIC: &[u8; 3] = b"ID3";

const FLAG_EXTENDED_HEADER: u8 = 0x40;
const FLAG_FOOTER: u8 = 0x10;

const DEFAULT_LANGUAGE: &[u8; 3] = b"eng";
const SYLT_FORMAT_MS: u8 = 2;
const SYLT_CONTENT_LYRICS: u8 = 1;
const CHAP_NO_OFFSET: u32 = 0xFFFF_FFFF;
const CTOC_TOP_LEVEL_ORDERED: u8 = 0x03;
const TOC_ELEMENT_ID: &[u8] = b"toc";

/// Where an ID3v2 tag sits and how its bytes divide into frames and padding.
#[derive(Debug, Clone, Copy)]
pub struct Id3v2Location {
    pub offset: u64,
    pub version: u8,
    pub frames_size: u64,
    pub padding_size: u64,
    /// Header + frames + padding (+ footer when present).
    pub total_size: u64,
    pub has_footer: bool,
}

impl Id3v2Location {
    pub fn end(&self) -> u64 {
        self.offset + self.total_size
    }

    pub fn frames_offset(&self) -> u64 {
        self.offset + HEADER_SIZE
    }

    pub fn padding_offset(&self) -> u64 {
        self.frames_offset() + self.frames_size
    }

    /// File offset of the header's syncsafe size field.
    pub fn size_field_offset(&self) -> u64 {
        self.offset + 6
    }
}

/// Look for a tag at `offset`. `limit` bounds the region the tag may occupy
/// (the end of an enclosing chunk, or the file).
pub fn probe(data: &[u8], offset: u64, limit: u64) -> Option<Id3v2Location> {
    let start = offset as usize;
    if start + HEADER_SIZE as usize > data.len() || &data[start..start + 3] != MAGIC {
        return None;
    }
    let version = data[start + 3];
    if !(2..=4).contains(&version) {
        return None;
    }
    let flags = data[start + 5];
    let size = syncsafe_decode([
        data[start + 6],
        data[start + 7],
        data[start + 8],
        data[start + 9],
    ]) as u64;
    let mut total = HEADER_SIZE + size;
    if flags & FLAG_FOOTER != 0 {
        total += FOOTER_SIZE;
    }
    if offset + total > limit || start + (HEADER_SIZE + size) as usize > data.len() {
        log::warn!("@{}: ID3v2 size field exceeds its container, ignoring tag", offset);
        return None;
    }

    let mut body = &data[start + HEADER_SIZE as usize..start + (HEADER_SIZE + size) as usize];
    if flags & FLAG_EXTENDED_HEADER != 0 {
        body = skip_extended_header(body, version);
    }
    let ext_len = (size as usize - body.len()) as u64;
    let frames_size = ext_len + walk_frames(body, version);
    let padding_size = size - frames_size;

    Some(Id3v2Location {
        offset,
        version,
        frames_size,
        padding_size,
        total_size: total,
        has_footer: flags & FLAG_FOOTER != 0,
    })
}

fn skip_extended_header(body: &[u8], version: u8) -> &[u8] {
    if body.len() < 4 {
        return body;
    }
    let declared = if version == 4 {
        syncsafe_decode([body[0], body[1], body[2], body[3]]) as usize
    } else {
        // v2.3 stores the size excluding its own four length bytes
        u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize + 4
    };
    if declared <= body.len() { &body[declared..] } else { body }
}

/// Bytes consumed by well-formed frames before padding (or garbage) begins.
fn walk_frames(body: &[u8], version: u8) -> u64 {
    let header_len = if version == 2 { FRAME_HEADER_V22 } else { FRAME_HEADER };
    let mut pos = 0usize;
    while pos + header_len <= body.len() {
        if body[pos] == 0 {
            break;
        }
        let size = match frame_size(&body[pos..], version) {
            Some(s) => s,
            None => break,
        };
        if size == 0 || pos + header_len + size > body.len() {
            break;
        }
        pos += header_len + size;
    }
    pos as u64
}

fn frame_size(frame: &[u8], version: u8) -> Option<usize> {
    match version {
        2 => Some(((frame[3] as usize) << 16) | ((frame[4] as usize) << 8) | frame[5] as usize),
        3 => Some(u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize),
        4 => Some(syncsafe_decode([frame[4], frame[5], frame[6], frame[7]]) as usize),
        _ => None,
    }
}

fn map_v22_id(id: &[u8]) -> Option<&'static str> {
    match id {
        b"TT2" => Some("TIT2"),
        b"TP1" => Some("TPE1"),
        b"TAL" => Some("TALB"),
        b"TP2" => Some("TPE2"),
        b"TCM" => Some("TCOM"),
        b"TCO" => Some("TCON"),
        b"TYE" => Some("TYER"),
        b"TRK" => Some("TRCK"),
        b"TPA" => Some("TPOS"),
        b"TCR" => Some("TCOP"),
        b"TPB" => Some("TPUB"),
        b"TT3" => Some("TIT3"),
        b"COM" => Some("COMM"),
        b"ULT" => Some("USLT"),
        b"SLT" => Some("SYLT"),
        b"PIC" => Some("PIC"),
        b"TXX" => Some("TXXX"),
        _ => None,
    }
}

pub fn read(data: &[u8], loc: &Id3v2Location, loc_str: &str) -> TagData {
    let mut tag = TagData::new();
    let start = loc.frames_offset() as usize;
    let end = (loc.frames_offset() + loc.frames_size) as usize;
    let mut body = &data[start..end];
    if data[loc.offset as usize + 5] & FLAG_EXTENDED_HEADER != 0 {
        body = skip_extended_header(body, loc.version);
    }

    let header_len = if loc.version == 2 { FRAME_HEADER_V22 } else { FRAME_HEADER };
    let mut pos = 0usize;
    while pos + header_len <= body.len() {
        if body[pos] == 0 {
            break;
        }
        let Some(size) = frame_size(&body[pos..], loc.version) else {
            break;
        };
        if size == 0 || pos + header_len + size > body.len() {
            log::warn!(
                "{} @{}: truncated ID3v2 frame, stopping frame parse",
                loc_str,
                loc.offset + (HEADER_SIZE as usize + pos) as u64
            );
            break;
        }

        let (id, frame) = if loc.version == 2 {
            (map_v22_id(&body[pos..pos + 3]).unwrap_or(""), &body[pos + 6..pos + 6 + size])
        } else {
            (
                std::str::from_utf8(&body[pos..pos + 4]).unwrap_or(""),
                &body[pos + 10..pos + 10 + size],
            )
        };

        parse_frame(&mut tag, id, frame, loc.version, loc_str);
        pos += header_len + size;
    }

    tag
}

fn parse_frame(tag: &mut TagData, id: &str, frame: &[u8], version: u8, loc_str: &str) {
    if frame.is_empty() {
        return;
    }
    match id {
        "TXXX" => {
            let enc = frame[0];
            let (desc, value) = text::split_terminated(enc, &frame[1..]);
            tag.set_additional_field(&text::decode(enc, desc), &text::decode(enc, value));
        }
        "COMM" => {
            if frame.len() < 4 {
                return;
            }
            let enc = frame[0];
            let (_desc, body) = text::split_terminated(enc, &frame[4..]);
            let value = text::decode(enc, body);
            if tag.comment.is_none() && !value.is_empty() {
                tag.comment = Some(value);
            }
        }
        "USLT" => {
            if frame.len() < 4 {
                return;
            }
            let enc = frame[0];
            let language = text::from_fixed(&frame[1..4]);
            let (desc, body) = text::split_terminated(enc, &frame[4..]);
            let mut lyrics = LyricsInfo::unsynchronized(&language, &text::decode(enc, body));
            lyrics.description = text::decode(enc, desc);
            tag.lyrics.push(lyrics);
        }
        "SYLT" => {
            if let Some(lyrics) = parse_sylt(frame) {
                tag.lyrics.push(lyrics);
            } else {
                log::warn!("{}: malformed SYLT frame skipped", loc_str);
            }
        }
        "APIC" => {
            if let Some(picture) = parse_apic(frame) {
                tag.pictures.push(picture);
            } else {
                log::warn!("{}: malformed APIC frame skipped", loc_str);
            }
        }
        "PIC" => {
            if let Some(picture) = parse_pic_v22(frame) {
                tag.pictures.push(picture);
            }
        }
        "CHAP" => {
            if let Some(chapter) = parse_chap(frame, version, loc_str) {
                tag.chapters.push(chapter);
            } else {
                log::warn!("{}: malformed CHAP frame skipped", loc_str);
            }
        }
        "CTOC" => {} // regenerated from the chapter list on write
        _ if id.starts_with('T') && id.len() == 4 => {
            let enc = frame[0];
            let value = text::decode(enc, &frame[1..]);
            if !value.is_empty() {
                map_text_frame(tag, id, value);
            }
        }
        _ => {
            log::debug!("{}: ignoring unmapped ID3v2 frame {:?}", loc_str, id);
        }
    }
}

fn map_text_frame(tag: &mut TagData, id: &str, value: String) {
    match id {
        "TIT2" => tag.title = Some(value),
        "TPE1" => tag.artist = Some(value),
        "TALB" => tag.album = Some(value),
        "TPE2" => tag.album_artist = Some(value),
        "TCOM" => tag.composer = Some(value),
        "TCON" => tag.genre = Some(value),
        "TDRC" | "TDRL" => tag.date = Some(value),
        "TYER" => {
            if tag.date.is_none() {
                tag.date = Some(value);
            }
        }
        "TRCK" => tag.set_track_string(&value),
        "TPOS" => tag.set_disc_string(&value),
        "TCOP" => tag.copyright = Some(value),
        "TPUB" => tag.publisher = Some(value),
        "TSSE" => tag.encoder = Some(value),
        "TIT3" => tag.description = Some(value),
        other => tag.set_additional_field(other, &value),
    }
}

fn parse_apic(frame: &[u8]) -> Option<PictureInfo> {
    if frame.len() < 3 {
        return None;
    }
    let enc = frame[0];
    let (mime, rest) = text::split_terminated(text::ENC_LATIN1, &frame[1..]);
    let (&type_code, rest) = rest.split_first()?;
    let (desc, data) = text::split_terminated(enc, rest);
    let mut picture = PictureInfo::new(
        data.to_vec(),
        &text::decode(text::ENC_LATIN1, mime),
        PictureType::from_id3_code(type_code),
    );
    picture.description = text::decode(enc, desc);
    picture.source = Some(TagSystemId::Id3v2);
    Some(picture)
}

// v2.2 stores a 3-byte image format instead of a MIME type
fn parse_pic_v22(frame: &[u8]) -> Option<PictureInfo> {
    if frame.len() < 6 {
        return None;
    }
    let enc = frame[0];
    let format = text::from_fixed(&frame[1..4]);
    let type_code = frame[4];
    let (desc, data) = text::split_terminated(enc, &frame[5..]);
    let mime = match format.to_ascii_uppercase().as_str() {
        "PNG" => "image/png".to_string(),
        "JPG" => "image/jpeg".to_string(),
        other => format!("image/{}", other.to_lowercase()),
    };
    let mut picture =
        PictureInfo::new(data.to_vec(), &mime, PictureType::from_id3_code(type_code));
    picture.description = text::decode(enc, desc);
    picture.source = Some(TagSystemId::Id3v2);
    Some(picture)
}

fn parse_sylt(frame: &[u8]) -> Option<LyricsInfo> {
    if frame.len() < 6 {
        return None;
    }
    let enc = frame[0];
    let language = text::from_fixed(&frame[1..4]);
    let _format = frame[4];
    let _content_type = frame[5];
    let (desc, mut rest) = text::split_terminated(enc, &frame[6..]);

    let mut lyrics = LyricsInfo {
        language,
        description: text::decode(enc, desc),
        format: LyricsFormat::Synchronized,
        ..LyricsInfo::default()
    };
    while !rest.is_empty() {
        let (phrase, after) = text::split_terminated(enc, rest);
        if after.len() < 4 {
            break;
        }
        let timestamp = u32::from_be_bytes([after[0], after[1], after[2], after[3]]);
        lyrics.phrases.push(LyricsPhrase {
            timestamp_ms: timestamp,
            text: text::decode(enc, phrase),
        });
        rest = &after[4..];
    }
    Some(lyrics)
}

fn parse_chap(frame: &[u8], version: u8, loc_str: &str) -> Option<ChapterInfo> {
    let (element_id, rest) = text::split_terminated(text::ENC_LATIN1, frame);
    if rest.len() < 16 {
        return None;
    }
    let mut chapter = ChapterInfo {
        unique_id: text::decode(text::ENC_LATIN1, element_id),
        start_ms: u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]),
        end_ms: u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]),
        ..ChapterInfo::default()
    };
    let start_offset = u32::from_be_bytes([rest[8], rest[9], rest[10], rest[11]]);
    let end_offset = u32::from_be_bytes([rest[12], rest[13], rest[14], rest[15]]);
    if start_offset != CHAP_NO_OFFSET {
        chapter.start_offset = Some(start_offset);
    }
    if end_offset != CHAP_NO_OFFSET {
        chapter.end_offset = Some(end_offset);
    }

    // Embedded subframes: title, subtitle, url, picture
    let sub = &rest[16..];
    let mut pos = 0usize;
    while pos + FRAME_HEADER <= sub.len() {
        if sub[pos] == 0 {
            break;
        }
        let Some(size) = frame_size(&sub[pos..], version) else { break };
        if size == 0 || pos + FRAME_HEADER + size > sub.len() {
            break;
        }
        let id = std::str::from_utf8(&sub[pos..pos + 4]).unwrap_or("");
        let body = &sub[pos + 10..pos + 10 + size];
        match id {
            "TIT2" if !body.is_empty() => {
                chapter.title = text::decode(body[0], &body[1..]);
            }
            "TIT3" if !body.is_empty() => {
                chapter.subtitle = Some(text::decode(body[0], &body[1..]));
            }
            "WXXX" if !body.is_empty() => {
                let (_desc, url) = text::split_terminated(body[0], &body[1..]);
                chapter.url = Some(text::decode(text::ENC_LATIN1, url));
            }
            "APIC" => {
                chapter.picture = parse_apic(body);
            }
            _ => {
                log::debug!("{}: ignoring CHAP subframe {:?}", loc_str, id);
            }
        }
        pos += FRAME_HEADER + size;
    }
    Some(chapter)
}

// ---- serialization ----

fn pick_encoding(version: Id3v2Version, value: &str) -> u8 {
    if text::is_latin1(value) {
        text::ENC_LATIN1
    } else {
        match version {
            Id3v2Version::V4 => text::ENC_UTF8,
            Id3v2Version::V3 => text::ENC_UTF16_BOM,
        }
    }
}

fn push_frame(out: &mut Vec<u8>, id: &str, body: &[u8], version: Id3v2Version) -> R<()> {
    if body.len() > (1 << 28) - 1 {
        return Err(anyhow!("ID3v2 frame {} too large ({} bytes)", id, body.len()));
    }
    out.extend_from_slice(id.as_bytes());
    match version {
        Id3v2Version::V4 => out.extend_from_slice(&syncsafe_encode(body.len() as u32)),
        Id3v2Version::V3 => out.extend_from_slice(&(body.len() as u32).to_be_bytes()),
    }
    out.extend_from_slice(&[0, 0]); // frame flags
    out.extend_from_slice(body);
    Ok(())
}

fn push_text_frame(out: &mut Vec<u8>, id: &str, value: &str, version: Id3v2Version) -> R<()> {
    let enc = pick_encoding(version, value);
    let mut body = vec![enc];
    body.extend_from_slice(&text::encode(enc, value));
    push_frame(out, id, &body, version)
}

fn language_bytes(language: &str) -> [u8; 3] {
    let bytes = language.as_bytes();
    if bytes.len() == 3 && bytes.iter().all(u8::is_ascii) {
        [bytes[0], bytes[1], bytes[2]]
    } else {
        *DEFAULT_LANGUAGE
    }
}

fn apic_body(picture: &PictureInfo, version: Id3v2Version) -> Vec<u8> {
    let enc = pick_encoding(version, &picture.description);
    let mut body = vec![enc];
    body.extend_from_slice(&text::encode(text::ENC_LATIN1, &picture.mime_type));
    body.push(0);
    body.push(picture.pic_type.to_id3_code());
    body.extend_from_slice(&text::encode(enc, &picture.description));
    body.extend_from_slice(text::terminator(enc));
    body.extend_from_slice(&picture.data);
    body
}

/// Serialize the frame region (no header, no padding), deterministically:
/// canonical text frames, additional fields, comment, lyrics, chapters,
/// pictures, in that order.
pub fn render_frames(tag: &TagData, settings: &Settings, loc_str: &str) -> R<Vec<u8>> {
    let version = settings.id3v2_version;
    let mut out = Vec::new();

    let date_frame = match version {
        Id3v2Version::V4 => "TDRC",
        Id3v2Version::V3 => "TYER",
    };
    let track = tag.track_string();
    let disc = tag.disc_string();
    let text_frames: [(&str, &Option<String>); 13] = [
        ("TIT2", &tag.title),
        ("TPE1", &tag.artist),
        ("TALB", &tag.album),
        ("TPE2", &tag.album_artist),
        ("TCOM", &tag.composer),
        ("TCON", &tag.genre),
        (date_frame, &tag.date),
        ("TCOP", &tag.copyright),
        ("TPUB", &tag.publisher),
        ("TSSE", &tag.encoder),
        ("TIT3", &tag.description),
        ("TRCK", &track),
        ("TPOS", &disc),
    ];
    for (id, value) in text_frames {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            push_text_frame(&mut out, id, value, version)?;
        }
    }

    for (key, value) in &tag.additional_fields {
        // Four-letter T-frames read back from a foreign tag keep their slot
        if key.len() == 4 && key.starts_with('T') && key.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            push_text_frame(&mut out, key, value, version)?;
            continue;
        }
        let enc = pick_encoding(version, value).max(pick_encoding(version, key));
        let mut body = vec![enc];
        body.extend_from_slice(&text::encode(enc, key));
        body.extend_from_slice(text::terminator(enc));
        body.extend_from_slice(&text::encode(enc, value));
        push_frame(&mut out, "TXXX", &body, version)?;
    }

    if let Some(comment) = tag.comment.as_deref().filter(|v| !v.trim().is_empty()) {
        let enc = pick_encoding(version, comment);
        let mut body = vec![enc];
        body.extend_from_slice(DEFAULT_LANGUAGE);
        body.extend_from_slice(text::terminator(enc)); // empty description
        body.extend_from_slice(&text::encode(enc, comment));
        push_frame(&mut out, "COMM", &body, version)?;
    }

    for lyrics in &tag.lyrics {
        if lyrics.is_empty() {
            continue;
        }
        match lyrics.format {
            LyricsFormat::Unsynchronized => {
                let enc = pick_encoding(version, &lyrics.text);
                let mut body = vec![enc];
                body.extend_from_slice(&language_bytes(&lyrics.language));
                body.extend_from_slice(&text::encode(enc, &lyrics.description));
                body.extend_from_slice(text::terminator(enc));
                body.extend_from_slice(&text::encode(enc, &lyrics.text));
                push_frame(&mut out, "USLT", &body, version)?;
            }
            LyricsFormat::Synchronized => {
                let enc = text::ENC_UTF8;
                let mut body = vec![enc];
                body.extend_from_slice(&language_bytes(&lyrics.language));
                body.push(SYLT_FORMAT_MS);
                body.push(SYLT_CONTENT_LYRICS);
                body.extend_from_slice(&text::encode(enc, &lyrics.description));
                body.extend_from_slice(text::terminator(enc));
                for phrase in &lyrics.phrases {
                    body.extend_from_slice(&text::encode(enc, &phrase.text));
                    body.extend_from_slice(text::terminator(enc));
                    body.extend_from_slice(&phrase.timestamp_ms.to_be_bytes());
                }
                push_frame(&mut out, "SYLT", &body, version)?;
            }
        }
    }

    if !tag.chapters.is_empty() {
        if settings.write_chapter_toc {
            let mut body = Vec::new();
            body.extend_from_slice(TOC_ELEMENT_ID);
            body.push(0);
            body.push(CTOC_TOP_LEVEL_ORDERED);
            body.push(tag.chapters.len().min(255) as u8);
            for (i, chapter) in tag.chapters.iter().enumerate() {
                body.extend_from_slice(chapter_element_id(chapter, i).as_bytes());
                body.push(0);
            }
            push_frame(&mut out, "CTOC", &body, version)?;
        }
        for (i, chapter) in tag.chapters.iter().enumerate() {
            let mut body = Vec::new();
            body.extend_from_slice(chapter_element_id(chapter, i).as_bytes());
            body.push(0);
            body.extend_from_slice(&chapter.start_ms.to_be_bytes());
            body.extend_from_slice(&chapter.end_ms.to_be_bytes());
            body.extend_from_slice(&chapter.start_offset.unwrap_or(CHAP_NO_OFFSET).to_be_bytes());
            body.extend_from_slice(&chapter.end_offset.unwrap_or(CHAP_NO_OFFSET).to_be_bytes());

            let mut sub = Vec::new();
            if !chapter.title.is_empty() {
                push_text_frame(&mut sub, "TIT2", &chapter.title, version)?;
            }
            if let Some(subtitle) = chapter.subtitle.as_deref() {
                push_text_frame(&mut sub, "TIT3", subtitle, version)?;
            }
            if let Some(url) = chapter.url.as_deref() {
                let mut wxxx = vec![text::ENC_LATIN1, 0];
                wxxx.extend_from_slice(&text::encode(text::ENC_LATIN1, url));
                push_frame(&mut sub, "WXXX", &wxxx, version)?;
            }
            if let Some(picture) = &chapter.picture {
                push_frame(&mut sub, "APIC", &apic_body(picture, version), version)?;
            }
            body.extend_from_slice(&sub);
            push_frame(&mut out, "CHAP", &body, version)?;
        }
    }

    for picture in &tag.pictures {
        push_frame(&mut out, "APIC", &apic_body(picture, version), version)?;
    }

    if out.is_empty() {
        log::debug!("{}: ID3v2 tag serialized empty", loc_str);
    }
    Ok(out)
}

/// A complete tag: header, frames, `padding` zero bytes.
pub fn render_tag(tag: &TagData, settings: &Settings, padding: u64, loc_str: &str) -> R<Vec<u8>> {
    let frames = render_frames(tag, settings, loc_str)?;
    let size = frames.len() as u64 + padding;
    if size > (1 << 28) - 1 {
        return Err(anyhow!("ID3v2 tag too large ({} bytes)", size));
    }

    let mut out = Vec::with_capacity((HEADER_SIZE + size) as usize);
    out.extend_from_slice(MAGIC);
    out.push(settings.id3v2_version.major());
    out.push(0); // revision
    out.push(0); // flags
    out.extend_from_slice(&syncsafe_encode(size as u32));
    out.extend_from_slice(&frames);
    out.resize((HEADER_SIZE + size) as usize, 0);
    Ok(out)
}

fn chapter_element_id(chapter: &ChapterInfo, index: usize) -> String {
    if chapter.unique_id.is_empty() {
        format!("chp{}", index)
    } else {
        chapter.unique_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_tag() -> TagData {
        let mut tag = TagData::new();
        tag.title = Some("Night Drive 夜".to_string());
        tag.artist = Some("The Examples".to_string());
        tag.album = Some("Retrieval".to_string());
        tag.date = Some("1984".to_string());
        tag.track_number = Some(5);
        tag.track_total = Some(12);
        tag.comment = Some("first pressing".to_string());
        tag.set_additional_field("MOOD", "calm");
        tag.pictures.push({
            let mut p = PictureInfo::new(vec![0x89, b'P', b'N', b'G', 1, 2, 3], "image/png", PictureType::FrontCover);
            p.description = "cover".to_string();
            p
        });
        tag.lyrics.push(LyricsInfo {
            language: "eng".to_string(),
            description: String::new(),
            format: LyricsFormat::Synchronized,
            text: String::new(),
            phrases: vec![
                LyricsPhrase { timestamp_ms: 0, text: "line one".to_string() },
                LyricsPhrase { timestamp_ms: 1500, text: "line two".to_string() },
            ],
        });
        tag.chapters.push(ChapterInfo::new("ch1", 0, 60_000, "Intro"));
        tag
    }

    #[test]
    fn render_probe_read_round_trip_v4() {
        let tag = full_tag();
        let settings = Settings::default();
        let bytes = render_tag(&tag, &settings, 256, "mem").unwrap();

        let loc = probe(&bytes, 0, bytes.len() as u64).unwrap();
        assert_eq!(loc.version, 4);
        assert_eq!(loc.padding_size, 256);
        assert_eq!(loc.total_size, bytes.len() as u64);

        let back = read(&bytes, &loc, "mem");
        assert_eq!(back.title, tag.title);
        assert_eq!(back.artist, tag.artist);
        assert_eq!(back.date.as_deref(), Some("1984"));
        assert_eq!(back.track_number, Some(5));
        assert_eq!(back.track_total, Some(12));
        assert_eq!(back.comment.as_deref(), Some("first pressing"));
        assert_eq!(back.additional_field("MOOD"), Some("calm"));
        assert_eq!(back.pictures.len(), 1);
        assert_eq!(back.pictures[0].pic_type, PictureType::FrontCover);
        assert_eq!(back.pictures[0].data, tag.pictures[0].data);
        assert_eq!(back.lyrics.len(), 1);
        assert_eq!(back.lyrics[0].phrases.len(), 2);
        assert_eq!(back.lyrics[0].phrases[1].timestamp_ms, 1500);
        assert_eq!(back.chapters.len(), 1);
        assert_eq!(back.chapters[0].title, "Intro");
        assert_eq!(back.chapters[0].end_ms, 60_000);
    }

    #[test]
    fn v3_write_reads_back() {
        let tag = full_tag();
        let settings = Settings {
            id3v2_version: Id3v2Version::V3,
            ..Settings::default()
        };
        let bytes = render_tag(&tag, &settings, 0, "mem").unwrap();
        let loc = probe(&bytes, 0, bytes.len() as u64).unwrap();
        assert_eq!(loc.version, 3);
        assert_eq!(loc.padding_size, 0);
        let back = read(&bytes, &loc, "mem");
        // non-latin1 title forces UTF-16 in v2.3 and must survive
        assert_eq!(back.title, tag.title);
        assert_eq!(back.date.as_deref(), Some("1984"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let tag = full_tag();
        let settings = Settings::default();
        let a = render_tag(&tag, &settings, 64, "mem").unwrap();
        let b = render_tag(&tag, &settings, 64, "mem").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn oversized_declared_length_is_rejected() {
        let mut bytes = render_tag(&full_tag(), &Settings::default(), 0, "mem").unwrap();
        // corrupt the header size to reach past the buffer
        bytes[6..10].copy_from_slice(&syncsafe_encode(1 << 20));
        assert!(probe(&bytes, 0, bytes.len() as u64).is_none());
    }
}
