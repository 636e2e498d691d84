mod chapter;
mod lyrics;
mod picture;

pub use chapter::ChapterInfo;
pub use lyrics::{LyricsFormat, LyricsInfo, LyricsPhrase};
pub use picture::{PictureInfo, PictureType, fnv1a32};

/// Separator for multi-valued text fields (e.g. several artists in one slot).
pub const VALUE_SEPARATOR: &str = "; ";

/// Format-agnostic view of a file's metadata. Built fresh on every read,
/// mutated only by the caller between a read and a save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagData {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub comment: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub date: Option<String>,
    pub copyright: Option<String>,
    pub publisher: Option<String>,
    pub encoder: Option<String>,

    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,

    /// Fields with no canonical slot, in insertion order.
    pub additional_fields: Vec<(String, String)>,
    pub pictures: Vec<PictureInfo>,
    pub chapters: Vec<ChapterInfo>,
    pub lyrics: Vec<LyricsInfo>,
}

/// A string field counts as set when it contains something other than
/// whitespace. A literal `"0"` is a value, not an absence.
pub fn has_text(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl TagData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        let texts = [
            &self.title,
            &self.artist,
            &self.album,
            &self.album_artist,
            &self.composer,
            &self.comment,
            &self.description,
            &self.genre,
            &self.date,
            &self.copyright,
            &self.publisher,
            &self.encoder,
        ];
        !texts.iter().any(|v| has_text(v))
            && self.track_number.is_none()
            && self.track_total.is_none()
            && self.disc_number.is_none()
            && self.disc_total.is_none()
            && self.additional_fields.is_empty()
            && self.pictures.is_empty()
            && self.chapters.is_empty()
            && self.lyrics.is_empty()
    }

    pub fn additional_field(&self, key: &str) -> Option<&str> {
        self.additional_fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or replace an additional field, keeping first-seen key order.
    pub fn set_additional_field(&mut self, key: &str, value: &str) {
        match self.additional_fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self
                .additional_fields
                .push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove_additional_field(&mut self, key: &str) -> Option<String> {
        let pos = self.additional_fields.iter().position(|(k, _)| k == key)?;
        Some(self.additional_fields.remove(pos).1)
    }

    pub fn add_picture(&mut self, picture: PictureInfo) {
        self.pictures.push(picture);
    }

    /// "n" or "n/total" as tag systems with a single track slot expect it.
    pub fn track_string(&self) -> Option<String> {
        join_number_pair(self.track_number, self.track_total)
    }

    pub fn disc_string(&self) -> Option<String> {
        join_number_pair(self.disc_number, self.disc_total)
    }

    pub fn set_track_string(&mut self, s: &str) {
        let (n, total) = split_number_pair(s);
        if n.is_some() {
            self.track_number = n;
        }
        if total.is_some() {
            self.track_total = total;
        }
    }

    pub fn set_disc_string(&mut self, s: &str) {
        let (n, total) = split_number_pair(s);
        if n.is_some() {
            self.disc_number = n;
        }
        if total.is_some() {
            self.disc_total = total;
        }
    }
}

fn join_number_pair(n: Option<u32>, total: Option<u32>) -> Option<String> {
    match (n, total) {
        (Some(n), Some(t)) => Some(format!("{}/{}", n, t)),
        (Some(n), None) => Some(n.to_string()),
        _ => None,
    }
}

fn split_number_pair(s: &str) -> (Option<u32>, Option<u32>) {
    match s.split_once('/') {
        Some((n, t)) => (n.trim().parse().ok(), t.trim().parse().ok()),
        None => (s.trim().parse().ok(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_a_value() {
        let mut tag = TagData::new();
        tag.title = Some("0".to_string());
        assert!(has_text(&tag.title));
        tag.title = Some("   ".to_string());
        assert!(!has_text(&tag.title));
    }

    #[test]
    fn number_pairs_round_trip() {
        let mut tag = TagData::new();
        tag.set_track_string("5/12");
        assert_eq!(tag.track_number, Some(5));
        assert_eq!(tag.track_total, Some(12));
        assert_eq!(tag.track_string().as_deref(), Some("5/12"));

        tag.set_disc_string("2");
        assert_eq!(tag.disc_string().as_deref(), Some("2"));
    }

    #[test]
    fn additional_fields_keep_order() {
        let mut tag = TagData::new();
        tag.set_additional_field("MOOD", "calm");
        tag.set_additional_field("ISRC", "US1234567890");
        tag.set_additional_field("MOOD", "tense");
        assert_eq!(
            tag.additional_fields,
            vec![
                ("MOOD".to_string(), "tense".to_string()),
                ("ISRC".to_string(), "US1234567890".to_string()),
            ]
        );
    }
}
