use crate::prelude::*;

// Syncsafe integers carry 7 payload bits per byte
const SYNCSAFE_MAX: u64 = (1 << 28) - 1;

/// How a zone may change size during a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    /// May grow or shrink freely.
    Resizable,
    /// Must keep its exact byte length.
    FixedSize,
    /// Slack reservoir; the engine resizes it to absorb a neighbor's delta.
    Padding,
}

/// A named, contiguous byte range of the source file together with the bytes
/// that should replace it. Empty `content` deletes the extent.
#[derive(Debug, Clone)]
pub struct Zone {
    pub name: String,
    pub offset: u64,
    pub old_size: u64,
    pub content: Vec<u8>,
    pub kind: ZoneKind,
}

impl Zone {
    pub fn new(name: &str, offset: u64, old_size: u64, content: Vec<u8>, kind: ZoneKind) -> Self {
        Self {
            name: name.to_string(),
            offset,
            old_size,
            content,
            kind,
        }
    }

    pub fn resizable(name: &str, offset: u64, old_size: u64, content: Vec<u8>) -> Self {
        Self::new(name, offset, old_size, content, ZoneKind::Resizable)
    }

    pub fn deletion(name: &str, offset: u64, old_size: u64) -> Self {
        Self::new(name, offset, old_size, Vec::new(), ZoneKind::Resizable)
    }

    pub fn end(&self) -> u64 {
        self.offset + self.old_size
    }

    pub fn delta(&self) -> i64 {
        self.content.len() as i64 - self.old_size as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerEndian {
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerEncoding {
    /// Ordinary fixed-width binary integer.
    Plain,
    /// ID3v2 28-bit syncsafe integer (always 4 bytes, big-endian bit order).
    Syncsafe,
}

/// A fixed-width integer field somewhere in the file whose stored value must
/// absorb the net size delta of the named zones. Markers live in gap bytes,
/// never inside a zone being rewritten; size fields inside rewritten zones
/// are the owning writer's job.
#[derive(Debug, Clone)]
pub struct SizeMarker {
    pub offset: u64,
    pub width: u8,
    pub endian: MarkerEndian,
    pub encoding: MarkerEncoding,
    /// Names of the zones whose deltas this marker absorbs.
    pub zones: Vec<String>,
}

impl SizeMarker {
    pub fn le32(offset: u64, zones: &[&str]) -> Self {
        Self {
            offset,
            width: 4,
            endian: MarkerEndian::Little,
            encoding: MarkerEncoding::Plain,
            zones: zones.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn be32(offset: u64, zones: &[&str]) -> Self {
        Self {
            offset,
            width: 4,
            endian: MarkerEndian::Big,
            encoding: MarkerEncoding::Plain,
            zones: zones.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn syncsafe(offset: u64, zones: &[&str]) -> Self {
        Self {
            offset,
            width: 4,
            endian: MarkerEndian::Big,
            encoding: MarkerEncoding::Syncsafe,
            zones: zones.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn max_value(&self) -> u64 {
        match (self.encoding, self.width) {
            (MarkerEncoding::Syncsafe, _) => SYNCSAFE_MAX,
            (MarkerEncoding::Plain, 8) => u64::MAX,
            _ => u32::MAX as u64,
        }
    }

    pub fn read_value(&self, data: &[u8]) -> R<u64> {
        let start = self.offset as usize;
        let end = start + self.width as usize;
        if end > data.len() {
            return Err(anyhow!("size marker at {} is out of bounds", self.offset));
        }
        let field = &data[start..end];
        match self.encoding {
            MarkerEncoding::Syncsafe => Ok(syncsafe_decode([
                field[0], field[1], field[2], field[3],
            ]) as u64),
            MarkerEncoding::Plain => {
                let mut cursor = Cursor::new(field);
                match (self.width, self.endian) {
                    (4, MarkerEndian::Little) => Ok(cursor.read_u32::<LittleEndian>()? as u64),
                    (4, MarkerEndian::Big) => Ok(cursor.read_u32::<BigEndian>()? as u64),
                    (8, MarkerEndian::Little) => Ok(cursor.read_u64::<LittleEndian>()?),
                    (8, MarkerEndian::Big) => Ok(cursor.read_u64::<BigEndian>()?),
                    (w, _) => Err(anyhow!("unsupported size marker width {}", w)),
                }
            }
        }
    }

    /// Encode `value` into the marker's wire form, checking its range.
    pub fn encode_value(&self, value: u64) -> R<Vec<u8>> {
        if value > self.max_value() {
            return Err(TagError::SizeMarkerOverflow {
                offset: self.offset,
                width: self.width,
                value: value as i128,
            }
            .into());
        }
        match self.encoding {
            MarkerEncoding::Syncsafe => Ok(syncsafe_encode(value as u32).to_vec()),
            MarkerEncoding::Plain => {
                let mut out = Vec::with_capacity(self.width as usize);
                match (self.width, self.endian) {
                    (4, MarkerEndian::Little) => out.write_u32::<LittleEndian>(value as u32)?,
                    (4, MarkerEndian::Big) => out.write_u32::<BigEndian>(value as u32)?,
                    (8, MarkerEndian::Little) => out.write_u64::<LittleEndian>(value)?,
                    (8, MarkerEndian::Big) => out.write_u64::<BigEndian>(value)?,
                    (w, _) => return Err(anyhow!("unsupported size marker width {}", w)),
                }
                Ok(out)
            }
        }
    }
}

pub fn syncsafe_encode(value: u32) -> [u8; 4] {
    [
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ]
}

pub fn syncsafe_decode(bytes: [u8; 4]) -> u32 {
    ((bytes[0] as u32 & 0x7F) << 21)
        | ((bytes[1] as u32 & 0x7F) << 14)
        | ((bytes[2] as u32 & 0x7F) << 7)
        | (bytes[3] as u32 & 0x7F)
}

/// Everything one save operation wants changed: zones in file order plus the
/// size markers that depend on them. `source_len` is the file length captured
/// when the layout was scanned.
#[derive(Debug, Default)]
pub struct ZoneSet {
    pub zones: Vec<Zone>,
    pub markers: Vec<SizeMarker>,
    pub source_len: u64,
}

impl ZoneSet {
    pub fn new(source_len: u64) -> Self {
        Self {
            zones: Vec::new(),
            markers: Vec::new(),
            source_len,
        }
    }

    pub fn push_zone(&mut self, zone: Zone) {
        self.zones.push(zone);
    }

    pub fn push_marker(&mut self, marker: SizeMarker) {
        self.markers.push(marker);
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn net_delta(&self) -> i64 {
        self.zones.iter().map(Zone::delta).sum()
    }

    /// Sort zones by offset and check every structural invariant before a
    /// single byte is written. Insertion zones (old_size 0) may share an
    /// offset; their relative order is preserved.
    pub fn validate(&mut self) -> R<()> {
        self.zones.sort_by_key(|z| z.offset);

        for pair in self.zones.windows(2) {
            if pair[0].end() > pair[1].offset {
                return Err(TagError::ZoneOverlap {
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                }
                .into());
            }
        }

        for zone in &self.zones {
            if zone.end() > self.source_len {
                return Err(TagError::ZoneOutOfBounds {
                    name: zone.name.clone(),
                }
                .into());
            }
            if zone.kind == ZoneKind::FixedSize && zone.delta() != 0 {
                return Err(TagError::FixedSizeViolation {
                    name: zone.name.clone(),
                    old: zone.old_size,
                    new: zone.content.len() as u64,
                }
                .into());
            }
        }

        for marker in &self.markers {
            if marker.offset + marker.width as u64 > self.source_len {
                return Err(anyhow!(
                    "size marker at {} is out of bounds",
                    marker.offset
                ));
            }
            for zone in &self.zones {
                if marker.offset >= zone.offset && marker.offset < zone.end() {
                    return Err(TagError::MarkerInsideZone {
                        offset: marker.offset,
                        zone: zone.name.clone(),
                    }
                    .into());
                }
            }
            for dep in &marker.zones {
                if !self.zones.iter().any(|z| &z.name == dep) {
                    return Err(TagError::UnknownMarkerZone { zone: dep.clone() }.into());
                }
            }
        }

        Ok(())
    }
}
