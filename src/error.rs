use thiserror::Error;

/// Fatal conditions on the write path. These are carried inside the `anyhow`
/// chain so callers can downcast when they need to distinguish them; read-path
/// problems never surface through this type (they degrade and log instead).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    #[error("size marker at offset {offset} cannot hold {value} in {width} bytes")]
    SizeMarkerOverflow { offset: u64, width: u8, value: i128 },

    #[error("zones `{first}` and `{second}` overlap")]
    ZoneOverlap { first: String, second: String },

    #[error("zone `{name}` extends past the end of the file")]
    ZoneOutOfBounds { name: String },

    #[error("fixed-size zone `{name}` changed length ({old} -> {new})")]
    FixedSizeViolation { name: String, old: u64, new: u64 },

    #[error("size marker at offset {offset} lies inside zone `{zone}`")]
    MarkerInsideZone { offset: u64, zone: String },

    #[error("size marker references unknown zone `{zone}`")]
    UnknownMarkerZone { zone: String },

    #[error("file changed on disk since it was read (expected {expected} bytes, found {found})")]
    ConcurrentModification { expected: u64, found: u64 },
}
