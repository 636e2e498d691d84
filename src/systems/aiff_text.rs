//! AIFF's native text chunks: `NAME`, `AUTH`, `ANNO` and `(c) `. Plain text
//! payloads, one chunk each.

use crate::model::{TagData, has_text};

pub const NAME_ID: &[u8; 4] = b"NAME";
pub const AUTH_ID: &[u8; 4] = b"AUTH";
pub const ANNO_ID: &[u8; 4] = b"ANNO";
pub const COPYRIGHT_ID: &[u8; 4] = b"(c) ";

pub fn apply(tag: &mut TagData, id: &[u8; 4], payload: &[u8]) {
    let value = String::from_utf8_lossy(payload)
        .trim_end_matches('\0')
        .trim()
        .to_string();
    if value.is_empty() {
        return;
    }
    match id {
        NAME_ID => tag.title = Some(value),
        AUTH_ID => tag.artist = Some(value),
        ANNO_ID => tag.comment = Some(value),
        COPYRIGHT_ID => tag.copyright = Some(value),
        _ => {}
    }
}

pub fn value_for<'a>(tag: &'a TagData, id: &[u8; 4]) -> Option<&'a str> {
    let slot = match id {
        NAME_ID => &tag.title,
        AUTH_ID => &tag.artist,
        ANNO_ID => &tag.comment,
        COPYRIGHT_ID => &tag.copyright,
        _ => return None,
    };
    slot.as_deref().filter(|v| !v.trim().is_empty())
}

/// Even-length payload for a text chunk (NUL-padded, not counted as text).
pub fn render_payload(value: &str) -> Vec<u8> {
    let mut bytes = value.as_bytes().to_vec();
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    bytes
}

pub fn has_any(tag: &TagData) -> bool {
    has_text(&tag.title) || has_text(&tag.artist) || has_text(&tag.comment) || has_text(&tag.copyright)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_and_render() {
        let mut tag = TagData::new();
        apply(&mut tag, NAME_ID, b"Night Drive");
        apply(&mut tag, AUTH_ID, b"The Examples\0");
        assert_eq!(tag.title.as_deref(), Some("Night Drive"));
        assert_eq!(tag.artist.as_deref(), Some("The Examples"));

        let payload = render_payload("odd");
        assert_eq!(payload.len(), 4);
        let mut back = TagData::new();
        apply(&mut back, ANNO_ID, &payload);
        assert_eq!(back.comment.as_deref(), Some("odd"));
    }
}
