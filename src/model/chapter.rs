use super::picture::PictureInfo;

/// One chapter mark. Times are milliseconds; byte offsets are optional and
/// only meaningful for formats that store them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterInfo {
    pub start_ms: u32,
    pub end_ms: u32,
    pub start_offset: Option<u32>,
    pub end_offset: Option<u32>,
    pub unique_id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub url: Option<String>,
    pub picture: Option<PictureInfo>,
}

impl ChapterInfo {
    pub fn new(unique_id: &str, start_ms: u32, end_ms: u32, title: &str) -> Self {
        Self {
            start_ms,
            end_ms,
            unique_id: unique_id.to_string(),
            title: title.to_string(),
            ..Self::default()
        }
    }
}
