//! ID3v1 / v1.1: a fixed 128-byte block at the very end of the file.

use super::text;
use crate::model::TagData;
use crate::prelude::*;

pub const TAG_SIZE: u64 = 128;
const MAGIC: &[u8; 3] = b"TAG";

const TITLE_RANGE: std::ops::Range<usize> = 3..33;
const ARTIST_RANGE: std::ops::Range<usize> = 33..63;
const ALBUM_RANGE: std::ops::Range<usize> = 63..93;
const YEAR_RANGE: std::ops::Range<usize> = 93..97;
const COMMENT_START: usize = 97;
const TRACK_FLAG_BYTE: usize = 125;
const TRACK_BYTE: usize = 126;
const GENRE_BYTE: usize = 127;
const NO_GENRE: u8 = 0xFF;

pub const GENRES: &[&str] = &[
    "Blues",
    "Classic Rock",
    "Country",
    "Dance",
    "Disco",
    "Funk",
    "Grunge",
    "Hip-Hop",
    "Jazz",
    "Metal",
    "New Age",
    "Oldies",
    "Other",
    "Pop",
    "R&B",
    "Rap",
    "Reggae",
    "Rock",
    "Techno",
    "Industrial",
    "Alternative",
    "Ska",
    "Death Metal",
    "Pranks",
    "Soundtrack",
    "Euro-Techno",
    "Ambient",
    "Trip-Hop",
    "Vocal",
    "Jazz+Funk",
    "Fusion",
    "Trance",
    "Classical",
    "Instrumental",
    "Acid",
    "House",
    "Game",
    "Sound Clip",
    "Gospel",
    "Noise",
    "Alternative Rock",
    "Bass",
    "Soul",
    "Punk",
    "Space",
    "Meditative",
    "Instrumental Pop",
    "Instrumental Rock",
    "Ethnic",
    "Gothic",
    "Darkwave",
    "Techno-Industrial",
    "Electronic",
    "Pop-Folk",
    "Eurodance",
    "Dream",
    "Southern Rock",
    "Comedy",
    "Cult",
    "Gangsta",
    "Top 40",
    "Christian Rap",
    "Pop/Funk",
    "Jungle",
    "Native US",
    "Cabaret",
    "New Wave",
    "Psychadelic",
    "Rave",
    "Showtunes",
    "Trailer",
    "Lo-Fi",
    "Tribal",
    "Acid Punk",
    "Acid Jazz",
    "Polka",
    "Retro",
    "Musical",
    "Rock & Roll",
    "Hard Rock",
];

/// Offset of the tag if the file ends with one.
pub fn probe(data: &[u8]) -> Option<u64> {
    if data.len() < TAG_SIZE as usize {
        return None;
    }
    let start = data.len() - TAG_SIZE as usize;
    (&data[start..start + 3] == MAGIC).then_some(start as u64)
}

pub fn read(block: &[u8]) -> R<TagData> {
    if block.len() != TAG_SIZE as usize || &block[0..3] != MAGIC {
        return Err(anyhow!("not an ID3v1 block"));
    }

    let mut tag = TagData::new();
    tag.title = non_empty(text::from_fixed(&block[TITLE_RANGE]));
    tag.artist = non_empty(text::from_fixed(&block[ARTIST_RANGE]));
    tag.album = non_empty(text::from_fixed(&block[ALBUM_RANGE]));
    tag.date = non_empty(text::from_fixed(&block[YEAR_RANGE]));

    // v1.1: a zero byte before a nonzero track number steals two comment bytes
    let comment_end = if block[TRACK_FLAG_BYTE] == 0 && block[TRACK_BYTE] != 0 {
        tag.track_number = Some(block[TRACK_BYTE] as u32);
        TRACK_FLAG_BYTE
    } else {
        GENRE_BYTE
    };
    tag.comment = non_empty(text::from_fixed(&block[COMMENT_START..comment_end]));

    let genre = block[GENRE_BYTE];
    if (genre as usize) < GENRES.len() {
        tag.genre = Some(GENRES[genre as usize].to_string());
    }

    Ok(tag)
}

/// Serialize the 128-byte block. Anything beyond the fixed fields is dropped
/// by the caller's capability checks; overlong values are truncated here.
pub fn render(tag: &TagData, loc: &str) -> Vec<u8> {
    let mut block = vec![0u8; TAG_SIZE as usize];
    block[0..3].copy_from_slice(MAGIC);

    write_fixed(&mut block, TITLE_RANGE, tag.title.as_deref(), loc, "title");
    write_fixed(&mut block, ARTIST_RANGE, tag.artist.as_deref(), loc, "artist");
    write_fixed(&mut block, ALBUM_RANGE, tag.album.as_deref(), loc, "album");
    write_fixed(&mut block, YEAR_RANGE, tag.date.as_deref(), loc, "year");

    let comment_width = if tag.track_number.is_some() {
        TRACK_FLAG_BYTE - COMMENT_START
    } else {
        GENRE_BYTE - COMMENT_START
    };
    if let Some(comment) = tag.comment.as_deref() {
        let field = text::to_fixed(comment, comment_width);
        block[COMMENT_START..COMMENT_START + comment_width].copy_from_slice(&field);
    }
    if let Some(track) = tag.track_number {
        block[TRACK_FLAG_BYTE] = 0;
        block[TRACK_BYTE] = track.min(255) as u8;
    }

    block[GENRE_BYTE] = tag
        .genre
        .as_deref()
        .and_then(genre_index)
        .unwrap_or(NO_GENRE);

    block
}

fn write_fixed(
    block: &mut [u8],
    range: std::ops::Range<usize>,
    value: Option<&str>,
    loc: &str,
    field: &str,
) {
    let Some(value) = value else { return };
    let width = range.len();
    if value.len() > width {
        log::warn!("{}: ID3v1 {} truncated to {} bytes", loc, field, width);
    }
    let fixed = text::to_fixed(value, width);
    block[range].copy_from_slice(&fixed);
}

fn genre_index(name: &str) -> Option<u8> {
    GENRES
        .iter()
        .position(|g| g.eq_ignore_ascii_case(name))
        .map(|i| i as u8)
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut tag = TagData::new();
        tag.title = Some("Night Drive".to_string());
        tag.artist = Some("The Examples".to_string());
        tag.album = Some("Retrieval".to_string());
        tag.date = Some("1984".to_string());
        tag.comment = Some("test".to_string());
        tag.track_number = Some(7);
        tag.genre = Some("Techno".to_string());

        let block = render(&tag, "mem");
        assert_eq!(block.len(), 128);
        let back = read(&block).unwrap();
        assert_eq!(back.title.as_deref(), Some("Night Drive"));
        assert_eq!(back.artist.as_deref(), Some("The Examples"));
        assert_eq!(back.date.as_deref(), Some("1984"));
        assert_eq!(back.track_number, Some(7));
        assert_eq!(back.genre.as_deref(), Some("Techno"));
    }

    #[test]
    fn empty_year_reads_as_absent() {
        let tag = TagData {
            title: Some("t".to_string()),
            ..TagData::new()
        };
        let back = read(&render(&tag, "mem")).unwrap();
        assert_eq!(back.date, None);
        assert_eq!(back.track_number, None);
    }

    #[test]
    fn probe_needs_magic_at_tail() {
        let mut data = vec![0u8; 300];
        assert_eq!(probe(&data), None);
        data[300 - 128..300 - 125].copy_from_slice(b"TAG");
        assert_eq!(probe(&data), Some(172));
    }
}
