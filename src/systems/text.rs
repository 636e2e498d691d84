//! Text encodings shared by the frame-based tag systems.

pub const ENC_LATIN1: u8 = 0;
pub const ENC_UTF16_BOM: u8 = 1;
pub const ENC_UTF16_BE: u8 = 2;
pub const ENC_UTF8: u8 = 3;

/// Decode a text payload according to its leading-encoding-byte convention.
/// Unknown encodings fall back to UTF-8, lossily.
pub fn decode(encoding: u8, data: &[u8]) -> String {
    let text = match encoding {
        ENC_LATIN1 => data.iter().map(|&b| b as char).collect(),
        ENC_UTF16_BOM => {
            if data.len() >= 2 {
                let bom = u16::from_be_bytes([data[0], data[1]]);
                match bom {
                    0xFEFF => decode_utf16(&data[2..], true),
                    0xFFFE => decode_utf16(&data[2..], false),
                    _ => decode_utf16(data, true),
                }
            } else {
                String::new()
            }
        }
        ENC_UTF16_BE => decode_utf16(data, true),
        _ => String::from_utf8_lossy(data).to_string(),
    };
    text.trim_end_matches('\0').to_string()
}

fn decode_utf16(data: &[u8], big_endian: bool) -> String {
    let mut result = String::new();
    let mut i = 0;

    while i + 1 < data.len() {
        let unit = if big_endian {
            u16::from_be_bytes([data[i], data[i + 1]])
        } else {
            u16::from_le_bytes([data[i], data[i + 1]])
        };

        if unit == 0 {
            break;
        }

        // Surrogate pairs for characters outside the BMP
        if (0xD800..=0xDBFF).contains(&unit) && i + 3 < data.len() {
            let low = if big_endian {
                u16::from_be_bytes([data[i + 2], data[i + 3]])
            } else {
                u16::from_le_bytes([data[i + 2], data[i + 3]])
            };
            if (0xDC00..=0xDFFF).contains(&low) {
                let code = 0x10000u32 + (((unit as u32) & 0x3FF) << 10) + ((low as u32) & 0x3FF);
                if let Some(ch) = char::from_u32(code) {
                    result.push(ch);
                }
                i += 4;
                continue;
            }
        }

        if let Some(ch) = char::from_u32(unit as u32) {
            result.push(ch);
        }
        i += 2;
    }

    result
}

pub fn encode(encoding: u8, text: &str) -> Vec<u8> {
    match encoding {
        ENC_LATIN1 => text
            .chars()
            .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
            .collect(),
        ENC_UTF16_BOM => {
            let mut out = vec![0xFF, 0xFE];
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            out
        }
        ENC_UTF16_BE => text
            .encode_utf16()
            .flat_map(|u| u.to_be_bytes())
            .collect(),
        _ => text.as_bytes().to_vec(),
    }
}

pub fn is_latin1(text: &str) -> bool {
    text.chars().all(|c| (c as u32) < 256)
}

/// The encoding's string terminator.
pub fn terminator(encoding: u8) -> &'static [u8] {
    match encoding {
        ENC_UTF16_BOM | ENC_UTF16_BE => &[0, 0],
        _ => &[0],
    }
}

/// Split `data` at the encoding's terminator; returns the raw head and the
/// remainder after the terminator. Without one, everything is the head.
pub fn split_terminated(encoding: u8, data: &[u8]) -> (&[u8], &[u8]) {
    match encoding {
        ENC_UTF16_BOM | ENC_UTF16_BE => {
            let mut i = 0;
            while i + 1 < data.len() {
                if data[i] == 0 && data[i + 1] == 0 {
                    return (&data[..i], &data[i + 2..]);
                }
                i += 2;
            }
            (data, &[])
        }
        _ => match data.iter().position(|&b| b == 0) {
            Some(pos) => (&data[..pos], &data[pos + 1..]),
            None => (data, &[]),
        },
    }
}

/// Fixed-width byte field to trimmed text (ID3v1-style storage).
pub fn from_fixed(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

/// Text into a fixed-width, NUL-padded field, truncating on overflow.
pub fn to_fixed(text: &str, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    let bytes = text.as_bytes();
    let len = bytes.len().min(width);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}
