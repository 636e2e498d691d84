//! The RIFF-native text mechanism: a `LIST`/`INFO` chunk of four-letter
//! subchunks, plus the production-metadata `iXML` chunk surfaced through
//! `AdditionalFields` under an `ixml.` prefix.

use crate::model::{TagData, has_text};
use crate::prelude::*;

const INFO_TYPE_ID: &[u8; 4] = b"INFO";
pub const IXML_PREFIX: &str = "ixml.";
pub const INFO_PREFIX: &str = "info.";
const IXML_ROOT: &str = "BWFXML";

const INFO_FIELDS: [(&[u8; 4], InfoSlot); 10] = [
    (b"INAM", InfoSlot::Title),
    (b"IART", InfoSlot::Artist),
    (b"IPRD", InfoSlot::Album),
    (b"ICMT", InfoSlot::Comment),
    (b"ICRD", InfoSlot::Date),
    (b"IGNR", InfoSlot::Genre),
    (b"ICOP", InfoSlot::Copyright),
    (b"ISFT", InfoSlot::Encoder),
    (b"IENG", InfoSlot::Composer),
    (b"ITRK", InfoSlot::Track),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InfoSlot {
    Title,
    Artist,
    Album,
    Comment,
    Date,
    Genre,
    Copyright,
    Encoder,
    Composer,
    Track,
}

/// Parse a `LIST` chunk payload (starting at its `INFO` type id) into `tag`.
pub fn read_info(payload: &[u8], tag: &mut TagData, loc_str: &str) {
    if payload.len() < 4 || &payload[0..4] != INFO_TYPE_ID {
        log::warn!("{}: LIST chunk is not an INFO list, skipping", loc_str);
        return;
    }
    let mut pos = 4usize;
    while pos + 8 <= payload.len() {
        let id: [u8; 4] = payload[pos..pos + 4].try_into().unwrap();
        let size =
            u32::from_le_bytes([payload[pos + 4], payload[pos + 5], payload[pos + 6], payload[pos + 7]])
                as usize;
        pos += 8;
        if pos + size > payload.len() {
            log::warn!("{}: INFO subchunk {:?} overruns the list", loc_str, id);
            break;
        }
        let value = String::from_utf8_lossy(&payload[pos..pos + size])
            .trim_end_matches('\0')
            .trim()
            .to_string();
        if !value.is_empty() {
            apply_info(tag, &id, &value);
        }
        pos += size + size % 2;
    }
}

fn apply_info(tag: &mut TagData, id: &[u8; 4], value: &str) {
    match INFO_FIELDS.iter().find(|(fid, _)| *fid == id) {
        Some((_, InfoSlot::Title)) => tag.title = Some(value.to_string()),
        Some((_, InfoSlot::Artist)) => tag.artist = Some(value.to_string()),
        Some((_, InfoSlot::Album)) => tag.album = Some(value.to_string()),
        Some((_, InfoSlot::Comment)) => tag.comment = Some(value.to_string()),
        Some((_, InfoSlot::Date)) => tag.date = Some(value.to_string()),
        Some((_, InfoSlot::Genre)) => tag.genre = Some(value.to_string()),
        Some((_, InfoSlot::Copyright)) => tag.copyright = Some(value.to_string()),
        Some((_, InfoSlot::Encoder)) => tag.encoder = Some(value.to_string()),
        Some((_, InfoSlot::Composer)) => tag.composer = Some(value.to_string()),
        Some((_, InfoSlot::Track)) => tag.set_track_string(value),
        None => {
            let key = format!("{}{}", INFO_PREFIX, String::from_utf8_lossy(id).trim());
            tag.set_additional_field(&key, value);
        }
    }
}

/// Serialize the INFO list payload. Values are NUL-terminated and padded to
/// even length so the enclosing chunk never needs a pad byte.
pub fn render_info(tag: &TagData) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(INFO_TYPE_ID);

    let track = tag.track_string();
    let slots: [(&[u8; 4], &Option<String>); 10] = [
        (b"INAM", &tag.title),
        (b"IART", &tag.artist),
        (b"IPRD", &tag.album),
        (b"ICMT", &tag.comment),
        (b"ICRD", &tag.date),
        (b"IGNR", &tag.genre),
        (b"ICOP", &tag.copyright),
        (b"ISFT", &tag.encoder),
        (b"IENG", &tag.composer),
        (b"ITRK", &track),
    ];
    for (id, value) in slots {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            push_info_subchunk(&mut out, id, value);
        }
    }
    for (key, value) in &tag.additional_fields {
        if let Some(id) = key.strip_prefix(INFO_PREFIX) {
            if id.len() == 4 && id.is_ascii() {
                push_info_subchunk(&mut out, id.as_bytes().try_into().unwrap(), value);
            }
        }
    }
    out
}

fn push_info_subchunk(out: &mut Vec<u8>, id: &[u8; 4], value: &str) {
    // NUL terminator, then a second NUL when needed to stay even
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0);
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    out.extend_from_slice(id);
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&bytes);
}

/// True when the tag would produce at least one INFO subchunk.
pub fn has_info(tag: &TagData) -> bool {
    has_text(&tag.title)
        || has_text(&tag.artist)
        || has_text(&tag.album)
        || has_text(&tag.comment)
        || has_text(&tag.date)
        || has_text(&tag.genre)
        || has_text(&tag.copyright)
        || has_text(&tag.encoder)
        || has_text(&tag.composer)
        || tag.track_number.is_some()
        || tag
            .additional_fields
            .iter()
            .any(|(k, _)| k.starts_with(INFO_PREFIX))
}

/// Flatten an iXML document into `ixml.`-prefixed additional fields.
/// Elements directly under the root keep their name; deeper nesting joins
/// the path with dots.
pub fn read_ixml(payload: &[u8], tag: &mut TagData, loc_str: &str) {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let xml = String::from_utf8_lossy(payload);
    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current_text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).to_string());
                current_text.clear();
            }
            Ok(Event::Text(ref e)) => {
                if let Ok(text) = e.unescape() {
                    current_text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                if path.len() > 1 && !current_text.trim().is_empty() {
                    let key = format!("{}{}", IXML_PREFIX, path[1..].join("."));
                    tag.set_additional_field(&key, current_text.trim());
                }
                path.pop();
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("{}: iXML parse error ({}), keeping what was read", loc_str, e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Serialize `ixml.` fields back into a flat iXML document, padded to even
/// length. Returns `None` when the tag carries no iXML fields.
pub fn render_ixml(tag: &TagData) -> Option<Vec<u8>> {
    let fields: Vec<(&str, &str)> = tag
        .additional_fields
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(IXML_PREFIX).map(|key| (key, v.as_str())))
        .collect();
    if fields.is_empty() {
        return None;
    }

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<{}>\n", IXML_ROOT));
    for (key, value) in fields {
        xml.push_str(&format!("  <{}>{}</{}>\n", key, xml_escape(value), key));
    }
    xml.push_str(&format!("</{}>\n", IXML_ROOT));

    let mut out = xml.into_bytes();
    if out.len() % 2 == 1 {
        out.push(b'\n');
    }
    Some(out)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_round_trip() {
        let mut tag = TagData::new();
        tag.title = Some("Night Drive".to_string());
        tag.artist = Some("The Examples".to_string());
        tag.date = Some("1984".to_string());
        tag.track_number = Some(5);
        tag.set_additional_field("info.ISBJ", "subject line");

        let payload = render_info(&tag);
        assert_eq!(payload.len() % 2, 0);

        let mut back = TagData::new();
        read_info(&payload, &mut back, "mem");
        assert_eq!(back.title.as_deref(), Some("Night Drive"));
        assert_eq!(back.date.as_deref(), Some("1984"));
        assert_eq!(back.track_number, Some(5));
        assert_eq!(back.additional_field("info.ISBJ"), Some("subject line"));
    }

    #[test]
    fn ixml_round_trip() {
        let mut tag = TagData::new();
        tag.set_additional_field("ixml.PROJECT", "Retrieval");
        tag.set_additional_field("ixml.SCENE", "12A");

        let payload = render_ixml(&tag).unwrap();
        assert_eq!(payload.len() % 2, 0);

        let mut back = TagData::new();
        read_ixml(&payload, &mut back, "mem");
        assert_eq!(back.additional_field("ixml.PROJECT"), Some("Retrieval"));
        assert_eq!(back.additional_field("ixml.SCENE"), Some("12A"));
    }

    #[test]
    fn ixml_escapes_markup() {
        let mut tag = TagData::new();
        tag.set_additional_field("ixml.NOTE", "a < b & c");
        let payload = render_ixml(&tag).unwrap();
        let mut back = TagData::new();
        read_ixml(&payload, &mut back, "mem");
        assert_eq!(back.additional_field("ixml.NOTE"), Some("a < b & c"));
    }

    #[test]
    fn no_ixml_fields_no_chunk() {
        let tag = TagData::new();
        assert!(render_ixml(&tag).is_none());
    }
}
