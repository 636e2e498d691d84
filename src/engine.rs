//! The rewrite engine. Takes the current file bytes plus a [`ZoneSet`] and
//! produces the new file with minimal movement: absorb deltas into padding
//! and patch in place when nothing has to shift, otherwise splice through a
//! temporary file and swap it into place. Either the whole save lands or the
//! original file is left untouched.

use crate::prelude::*;
use crate::settings::Settings;
use crate::zone::{Zone, ZoneKind, ZoneSet};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::ops::Range;
use std::path::{Path, PathBuf};

const TEMP_SUFFIX: &str = ".tagsmith.tmp";

/// Caller-supplied progress sink, fed a non-decreasing fraction in [0, 1].
/// Invoked synchronously on the saving thread.
pub type Progress<'a> = &'a dyn Fn(f32);

#[derive(Debug, Clone, Copy)]
pub struct SaveReport {
    /// True when the file was patched without moving any byte.
    pub in_place: bool,
    pub bytes_written: u64,
    pub new_len: u64,
}

/// Apply a zone set to the file at `path`.
pub fn commit(
    path: &Path,
    mut set: ZoneSet,
    settings: &Settings,
    progress: Option<Progress>,
) -> R<SaveReport> {
    let loc = path.display().to_string();
    let file = File::open(path)?;
    let found = file.metadata()?.len();
    if found != set.source_len {
        return Err(TagError::ConcurrentModification {
            expected: set.source_len,
            found,
        }
        .into());
    }
    if set.is_empty() {
        return Ok(SaveReport {
            in_place: true,
            bytes_written: 0,
            new_len: found,
        });
    }

    set.validate()?;
    let map = unsafe { MmapOptions::new().map(&file)? };

    absorb_padding(&mut set, settings);

    // Marker adjustments are computed before anything is written so overflow
    // aborts with the original file intact.
    let deltas: HashMap<&str, i64> = set
        .zones
        .iter()
        .map(|z| (z.name.as_str(), z.delta()))
        .collect();
    let mut marker_patches: Vec<(u64, Vec<u8>)> = Vec::new();
    for marker in &set.markers {
        let delta: i64 = marker
            .zones
            .iter()
            .map(|name| deltas.get(name.as_str()).copied().unwrap_or(0))
            .sum();
        if delta == 0 {
            continue;
        }
        let old = marker.read_value(&map)? as i128;
        let new = old + delta as i128;
        if new < 0 {
            return Err(TagError::SizeMarkerOverflow {
                offset: marker.offset,
                width: marker.width,
                value: new,
            }
            .into());
        }
        marker_patches.push((marker.offset, marker.encode_value(new as u64)?));
    }

    let runs = contiguous_runs(&set.zones);
    let in_place = runs
        .iter()
        .all(|r| set.zones[r.clone()].iter().map(Zone::delta).sum::<i64>() == 0);

    if in_place {
        commit_in_place(path, &loc, &set, &map, runs, marker_patches, progress)
    } else {
        commit_splice(path, &loc, &set, &map, marker_patches, settings, progress)
    }
}

/// Trade a resizable zone's delta against the padding reservoir that follows
/// it. A shrink grows the pad, a small growth consumes it; a growth past the
/// reservoir rebuilds it at the configured size and lets the splice path run.
fn absorb_padding(set: &mut ZoneSet, settings: &Settings) {
    if !settings.use_padding {
        return;
    }
    for i in 0..set.zones.len().saturating_sub(1) {
        let delta = set.zones[i].delta();
        if delta == 0 || set.zones[i].kind != ZoneKind::Resizable {
            continue;
        }
        if set.zones[i + 1].kind != ZoneKind::Padding
            || set.zones[i].end() != set.zones[i + 1].offset
        {
            continue;
        }
        let pad_new = set.zones[i + 1].old_size as i64 - delta;
        if pad_new >= 0 {
            set.zones[i + 1].content = vec![0u8; pad_new as usize];
        } else {
            set.zones[i + 1].content = vec![0u8; settings.padding_size as usize];
        }
    }
}

/// Maximal runs of zones with no gap bytes between them. A run whose deltas
/// cancel out can be rewritten in place as one block.
fn contiguous_runs(zones: &[Zone]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    if zones.is_empty() {
        return runs;
    }
    let mut start = 0;
    for i in 1..zones.len() {
        if zones[i - 1].end() != zones[i].offset {
            runs.push(start..i);
            start = i;
        }
    }
    runs.push(start..zones.len());
    runs
}

fn commit_in_place(
    path: &Path,
    loc: &str,
    set: &ZoneSet,
    map: &[u8],
    runs: Vec<Range<usize>>,
    marker_patches: Vec<(u64, Vec<u8>)>,
    progress: Option<Progress>,
) -> R<SaveReport> {
    // Plan every write first; a run whose bytes already match is skipped, so
    // a semantic no-op touches nothing and the file stays bit-identical.
    let mut writes: Vec<(u64, Vec<u8>)> = Vec::new();
    for run in runs {
        let zones = &set.zones[run];
        let changed = zones.iter().any(|z| {
            let old = &map[z.offset as usize..z.end() as usize];
            old != z.content.as_slice()
        });
        if !changed {
            continue;
        }
        let mut block = Vec::with_capacity(zones.iter().map(|z| z.content.len()).sum());
        for z in zones {
            block.extend_from_slice(&z.content);
        }
        writes.push((zones[0].offset, block));
    }
    writes.extend(marker_patches);

    if writes.is_empty() {
        log::debug!("{}: nothing changed, skipping write", loc);
        return Ok(SaveReport {
            in_place: true,
            bytes_written: 0,
            new_len: set.source_len,
        });
    }

    if let Some(cb) = progress {
        cb(0.0);
    }
    let mut out = OpenOptions::new().write(true).open(path)?;
    let mut written = 0u64;
    for (offset, bytes) in &writes {
        out.seek(SeekFrom::Start(*offset))?;
        out.write_all(bytes)?;
        written += bytes.len() as u64;
    }
    out.sync_data()?;
    if let Some(cb) = progress {
        cb(1.0);
    }
    log::debug!("{}: patched {} bytes in place", loc, written);
    Ok(SaveReport {
        in_place: true,
        bytes_written: written,
        new_len: set.source_len,
    })
}

fn commit_splice(
    path: &Path,
    loc: &str,
    set: &ZoneSet,
    map: &[u8],
    marker_patches: Vec<(u64, Vec<u8>)>,
    settings: &Settings,
    progress: Option<Progress>,
) -> R<SaveReport> {
    let total_out = (set.source_len as i64 + set.net_delta()) as u64;
    let tmp = temp_path(path);

    let result: R<()> = (|| {
        let mut out = File::create(&tmp)?;
        let buf_size = settings.io_buffer();
        let mut written = 0u64;
        if let Some(cb) = progress {
            cb(0.0);
        }

        let mut report = |written: u64| {
            if let Some(cb) = progress {
                cb((written as f64 / total_out.max(1) as f64) as f32);
            }
        };

        // Left-to-right copy: gap bytes verbatim, zone contents replaced,
        // the running shift implied by writing sequentially.
        let mut pos = 0u64;
        for zone in &set.zones {
            written = copy_range(&mut out, map, pos..zone.offset, buf_size, written, &mut report)?;
            out.write_all(&zone.content)?;
            written += zone.content.len() as u64;
            report(written);
            pos = zone.end();
        }
        written = copy_range(
            &mut out,
            map,
            pos..set.source_len,
            buf_size,
            written,
            &mut report,
        )?;

        // Markers keep their file-relative position up to the shift of every
        // zone that ended before them.
        for (orig_offset, bytes) in &marker_patches {
            let shift: i64 = set
                .zones
                .iter()
                .filter(|z| z.end() <= *orig_offset)
                .map(Zone::delta)
                .sum();
            out.seek(SeekFrom::Start((*orig_offset as i64 + shift) as u64))?;
            out.write_all(bytes)?;
        }

        out.sync_all()?;
        report(written.max(total_out));
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    swap_into_place(&tmp, path)?;
    log::debug!(
        "{}: spliced {} -> {} bytes",
        loc,
        set.source_len,
        total_out
    );
    Ok(SaveReport {
        in_place: false,
        bytes_written: total_out,
        new_len: total_out,
    })
}

fn copy_range<W: Write>(
    out: &mut W,
    map: &[u8],
    range: Range<u64>,
    buf_size: usize,
    mut written: u64,
    report: &mut dyn FnMut(u64),
) -> R<u64> {
    let mut pos = range.start as usize;
    let end = range.end as usize;
    while pos < end {
        let chunk = (end - pos).min(buf_size);
        out.write_all(&map[pos..pos + chunk])?;
        pos += chunk;
        written += chunk as u64;
        report(written);
    }
    Ok(written)
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!("{}{}", name, TEMP_SUFFIX))
}

/// Rename the finished temp file over the original. Falls back to copy +
/// delete when rename is not possible (e.g. across mount points).
fn swap_into_place(tmp: &Path, path: &Path) -> R<()> {
    match fs::rename(tmp, path) {
        Ok(_) => Ok(()),
        Err(e) => {
            if fs::copy(tmp, path).is_err() {
                let _ = fs::remove_file(tmp);
                return Err(e.into());
            }
            let _ = fs::remove_file(tmp);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::SizeMarker;
    use std::cell::Cell;

    fn write_temp(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let p = dir.path().join(name);
        fs::write(&p, bytes).unwrap();
        p
    }

    /// 44 bytes: 4 magic, 4 LE size field (36), 16 head, 10 tag, 10 tail.
    fn marker_file() -> Vec<u8> {
        let mut f = Vec::new();
        f.extend_from_slice(b"CONT");
        f.extend_from_slice(&36u32.to_le_bytes());
        f.extend_from_slice(&[0xAA; 16]);
        f.extend_from_slice(b"TAGPAYLOAD");
        f.extend_from_slice(&[0xBB; 10]);
        f
    }

    #[test]
    fn splice_shrinks_and_updates_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "a.bin", &marker_file());

        let mut set = ZoneSet::new(44);
        set.push_zone(Zone::resizable("tag", 24, 10, b"TAG!".to_vec()));
        set.push_marker(SizeMarker::le32(4, &["tag"]));

        let report = commit(&path, set, &Settings::default(), None).unwrap();
        assert!(!report.in_place);

        let out = fs::read(&path).unwrap();
        assert_eq!(out.len(), 38);
        assert_eq!(&out[0..4], b"CONT");
        assert_eq!(u32::from_le_bytes(out[4..8].try_into().unwrap()), 30);
        assert_eq!(&out[24..28], b"TAG!");
        assert_eq!(&out[28..38], &[0xBB; 10]);
    }

    #[test]
    fn growth_absorbed_by_padding_stays_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = marker_file();
        // turn the tail into an 10-byte padding reservoir
        bytes[34..44].fill(0);
        let path = write_temp(&dir, "b.bin", &bytes);

        let mut set = ZoneSet::new(44);
        set.push_zone(Zone::resizable("tag", 24, 10, b"TAGPAYLOAD+4".to_vec()));
        set.push_zone(Zone::new("pad", 34, 10, vec![0; 10], ZoneKind::Padding));
        set.push_marker(SizeMarker::le32(4, &["tag", "pad"]));

        let report = commit(&path, set, &Settings::default(), None).unwrap();
        assert!(report.in_place);

        let out = fs::read(&path).unwrap();
        assert_eq!(out.len(), 44);
        // marker untouched: the pair's deltas cancel
        assert_eq!(u32::from_le_bytes(out[4..8].try_into().unwrap()), 36);
        assert_eq!(&out[24..36], b"TAGPAYLOAD+4");
        assert_eq!(&out[36..44], &[0u8; 8]);
    }

    #[test]
    fn noop_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let original = marker_file();
        let path = write_temp(&dir, "c.bin", &original);

        let mut set = ZoneSet::new(44);
        set.push_zone(Zone::resizable("tag", 24, 10, b"TAGPAYLOAD".to_vec()));
        set.push_marker(SizeMarker::le32(4, &["tag"]));

        let report = commit(&path, set, &Settings::default(), None).unwrap();
        assert!(report.in_place);
        assert_eq!(report.bytes_written, 0);
        assert_eq!(fs::read(&path).unwrap(), original);
    }

    #[test]
    fn marker_overflow_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = marker_file();
        bytes[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        let path = write_temp(&dir, "d.bin", &bytes);

        let mut set = ZoneSet::new(44);
        set.push_zone(Zone::resizable("tag", 24, 10, vec![0x11; 20]));
        set.push_marker(SizeMarker::le32(4, &["tag"]));

        let err = commit(&path, set, &Settings::default(), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TagError>(),
            Some(TagError::SizeMarkerOverflow { .. })
        ));
        assert_eq!(fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn length_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "e.bin", &marker_file());

        let mut set = ZoneSet::new(9999);
        set.push_zone(Zone::resizable("tag", 24, 10, vec![]));
        let err = commit(&path, set, &Settings::default(), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TagError>(),
            Some(TagError::ConcurrentModification { .. })
        ));
    }

    #[test]
    fn insertion_and_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "f.bin", &marker_file());

        // append 8 bytes at EOF
        let mut set = ZoneSet::new(44);
        set.push_zone(Zone::resizable("trailer", 44, 0, b"APPENDED".to_vec()));
        commit(&path, set, &Settings::default(), None).unwrap();
        let out = fs::read(&path).unwrap();
        assert_eq!(out.len(), 52);
        assert_eq!(&out[44..], b"APPENDED");

        // and excise them again
        let mut set = ZoneSet::new(52);
        set.push_zone(Zone::deletion("trailer", 44, 8));
        commit(&path, set, &Settings::default(), None).unwrap();
        assert_eq!(fs::read(&path).unwrap(), marker_file());
    }

    #[test]
    fn progress_is_monotone_and_reaches_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "g.bin", &marker_file());

        let last = Cell::new(-1.0f32);
        let monotone = Cell::new(true);
        let cb = |f: f32| {
            if f < last.get() {
                monotone.set(false);
            }
            last.set(f);
        };

        let mut set = ZoneSet::new(44);
        set.push_zone(Zone::resizable("tag", 24, 10, vec![0x22; 30]));
        set.push_marker(SizeMarker::le32(4, &["tag"]));
        commit(&path, set, &Settings::default(), Some(&cb)).unwrap();

        assert!(monotone.get());
        assert!((last.get() - 1.0).abs() < f32::EPSILON);
    }
}
