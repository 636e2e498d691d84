//! End-to-end behavior on real files: no-op idempotence, cross-reading,
//! deletion, picture round-trips, and size-marker consistency across RIFF
//! and AIFF containers.

use std::fs;
use std::path::PathBuf;

use tagsmith::{
    PictureInfo, PictureType, Settings, TagError, TagSystemId, Track, read_pictures, read_tag,
};

fn make_mp3(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    let mut data = vec![0xFF, 0xFB, 0x90, 0x00];
    data.extend_from_slice(&[0x55; 1000]);
    let path = dir.path().join(name);
    fs::write(&path, data).unwrap();
    path
}

fn make_wav(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&1u16.to_le_bytes()); // PCM
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&44_100u32.to_le_bytes());
    fmt.extend_from_slice(&88_200u32.to_le_bytes());
    fmt.extend_from_slice(&2u16.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());

    let audio = vec![0u8; 256];
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
    out.extend_from_slice(&fmt);
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(audio.len() as u32).to_le_bytes());
    out.extend_from_slice(&audio);
    let riff_size = out.len() as u32 - 8;
    out[4..8].copy_from_slice(&riff_size.to_le_bytes());

    let path = dir.path().join(name);
    fs::write(&path, out).unwrap();
    path
}

fn make_aiff(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    let comm = [
        0u8, 1, 0, 0, 0, 0, 0, 16, 0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0,
    ];
    let mut out = Vec::new();
    out.extend_from_slice(b"FORM");
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(b"AIFF");
    out.extend_from_slice(b"COMM");
    out.extend_from_slice(&(comm.len() as u32).to_be_bytes());
    out.extend_from_slice(&comm);
    let form_size = out.len() as u32 - 8;
    out[4..8].copy_from_slice(&form_size.to_be_bytes());

    let path = dir.path().join(name);
    fs::write(&path, out).unwrap();
    path
}

fn riff_declared_size(path: &PathBuf) -> u32 {
    let data = fs::read(path).unwrap();
    u32::from_le_bytes(data[4..8].try_into().unwrap())
}

fn form_declared_size(path: &PathBuf) -> u32 {
    let data = fs::read(path).unwrap();
    u32::from_be_bytes(data[4..8].try_into().unwrap())
}

#[test]
fn unchanged_save_is_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = make_mp3(&dir, "a.mp3");

    let mut track = Track::open(&path).unwrap();
    track.tag.title = Some("Night Drive".to_string());
    track.tag.artist = Some("The Examples".to_string());
    track.tag.date = Some("1984".to_string());
    track.save().unwrap();

    let after_first = fs::read(&path).unwrap();

    let mut again = Track::open(&path).unwrap();
    let report = again.save().unwrap();
    let after_second = fs::read(&path).unwrap();

    assert_eq!(report.bytes_written, 0);
    assert_eq!(after_first.len(), after_second.len());
    assert_eq!(after_first, after_second);
}

#[test]
fn small_edit_lands_in_padding_without_moving_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = make_mp3(&dir, "b.mp3");

    let mut track = Track::open(&path).unwrap();
    track.tag.title = Some("Short".to_string());
    track.save().unwrap();
    let len_before = fs::metadata(&path).unwrap().len();

    let mut track = Track::open(&path).unwrap();
    track.tag.title = Some("A somewhat longer title".to_string());
    let report = track.save().unwrap();

    assert!(report.in_place);
    assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
    assert_eq!(
        read_tag(&path).unwrap().title.as_deref(),
        Some("A somewhat longer title")
    );
}

#[test]
fn cross_reading_year_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = make_mp3(&dir, "c.mp3");

    // ID3v2 carries the year; ID3v1 is written without one
    let mut track = Track::open(&path).unwrap();
    track.tag.title = Some("T".to_string());
    track.tag.date = Some("1984".to_string());
    track.save_to(&[TagSystemId::Id3v2]).unwrap();
    track.tag.date = None;
    track.save_to(&[TagSystemId::Id3v1]).unwrap();

    let favor_v1 = |cross: bool| Settings {
        cross_reading: cross,
        priority: vec![TagSystemId::Id3v1, TagSystemId::Ape, TagSystemId::Id3v2],
        ..Settings::default()
    };

    let solo = Track::open_with(&path, favor_v1(false)).unwrap();
    assert_eq!(solo.tag.title.as_deref(), Some("T"));
    assert_eq!(solo.tag.date, None);

    let crossed = Track::open_with(&path, favor_v1(true)).unwrap();
    assert_eq!(crossed.tag.date.as_deref(), Some("1984"));
}

#[test]
fn deleting_a_tag_system_shrinks_by_its_extent() {
    let dir = tempfile::tempdir().unwrap();
    let path = make_mp3(&dir, "d.mp3");

    let mut track = Track::open(&path).unwrap();
    track.tag.title = Some("T".to_string());
    track.save_to(&[TagSystemId::Id3v2, TagSystemId::Id3v1]).unwrap();

    let len_with_both = fs::metadata(&path).unwrap().len();
    let mut track = Track::open(&path).unwrap();
    assert_eq!(
        track.tag_systems(),
        &[TagSystemId::Id3v2, TagSystemId::Id3v1]
    );

    track.remove_tag(TagSystemId::Id3v1).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), len_with_both - 128);
    assert_eq!(track.tag_systems(), &[TagSystemId::Id3v2]);

    // removing the remaining tag restores the bare stream
    track.remove_tag(TagSystemId::Id3v2).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), 1004);
    assert!(track.tag_systems().is_empty());
}

#[test]
fn front_cover_round_trips_by_bytes_and_hash() {
    let dir = tempfile::tempdir().unwrap();
    let path = make_mp3(&dir, "e.mp3");

    let image = vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3, 4, 5, 6, 7];
    let picture = PictureInfo::new(image.clone(), "image/png", PictureType::FrontCover);
    let expected_hash = picture.hash();

    let mut track = Track::open(&path).unwrap();
    track.tag.title = Some("T".to_string());
    track.tag.pictures.push(picture);
    track.save().unwrap();

    let pictures: Vec<PictureInfo> = read_pictures(&path).unwrap().collect();
    assert_eq!(pictures.len(), 1);
    assert_eq!(pictures[0].pic_type, PictureType::FrontCover);
    assert_eq!(pictures[0].data, image);
    assert_eq!(pictures[0].hash(), expected_hash);
}

#[test]
fn ape_and_id3v1_coexist_and_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = make_mp3(&dir, "f.mp3");

    let mut track = Track::open(&path).unwrap();
    track.tag.title = Some("Night Drive".to_string());
    track.tag.set_additional_field("Catalog", "EX-001");
    track
        .save_to(&[TagSystemId::Ape, TagSystemId::Id3v1])
        .unwrap();

    let track = Track::open(&path).unwrap();
    assert_eq!(track.tag_systems(), &[TagSystemId::Ape, TagSystemId::Id3v1]);
    assert_eq!(track.tag.title.as_deref(), Some("Night Drive"));
    assert_eq!(track.tag.additional_field("Catalog"), Some("EX-001"));
}

#[test]
fn wav_native_write_keeps_riff_size_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let path = make_wav(&dir, "g.wav");

    let mut track = Track::open(&path).unwrap();
    assert_eq!(track.format().name, "Waveform Audio");
    track.tag.title = Some("Night Drive".to_string());
    track.tag.artist = Some("The Examples".to_string());
    track.tag.set_additional_field("ixml.PROJECT", "Retrieval");
    track.save().unwrap();

    let len = fs::metadata(&path).unwrap().len();
    assert_eq!(riff_declared_size(&path) as u64, len - 8);

    let back = Track::open(&path).unwrap();
    assert_eq!(back.tag_systems(), &[TagSystemId::Native]);
    assert_eq!(back.tag.title.as_deref(), Some("Night Drive"));
    assert_eq!(back.tag.additional_field("ixml.PROJECT"), Some("Retrieval"));
}

#[test]
fn wav_unchanged_save_is_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = make_wav(&dir, "h.wav");

    let mut track = Track::open(&path).unwrap();
    track.tag.title = Some("Stable".to_string());
    track.save().unwrap();
    let first = fs::read(&path).unwrap();

    let mut again = Track::open(&path).unwrap();
    again.save().unwrap();
    assert_eq!(fs::read(&path).unwrap(), first);
}

#[test]
fn embedded_id3_in_wav_updates_the_marker_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = make_wav(&dir, "i.wav");
    let bare_len = fs::metadata(&path).unwrap().len();

    let mut track = Track::open(&path).unwrap();
    track.tag.title = Some("T".to_string());
    track.tag.date = Some("1984".to_string());
    track.save_to(&[TagSystemId::Id3v2]).unwrap();

    // outer marker: RIFF size tracks the appended chunk exactly
    let len = fs::metadata(&path).unwrap().len();
    assert!(len > bare_len);
    assert_eq!(riff_declared_size(&path) as u64, len - 8);

    // inner marker: the id3 chunk's size field covers its payload
    let data = fs::read(&path).unwrap();
    let pos = data
        .windows(4)
        .position(|w| w == b"id3 ")
        .expect("id3 chunk present");
    let declared = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().unwrap()) as usize;
    assert_eq!(pos + 8 + declared, data.len());

    let back = Track::open(&path).unwrap();
    assert_eq!(back.tag_systems(), &[TagSystemId::Id3v2]);
    assert_eq!(back.tag.date.as_deref(), Some("1984"));

    // growing the embedded tag keeps both markers in lockstep
    let mut track = Track::open(&path).unwrap();
    track.tag.comment = Some("x".repeat(4096));
    track.save().unwrap();
    let len = fs::metadata(&path).unwrap().len();
    assert_eq!(riff_declared_size(&path) as u64, len - 8);
    let data = fs::read(&path).unwrap();
    let declared = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().unwrap()) as usize;
    assert_eq!(pos + 8 + declared, data.len());
}

#[test]
fn aiff_text_chunks_write_big_endian_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let path = make_aiff(&dir, "j.aiff");

    let mut track = Track::open(&path).unwrap();
    assert_eq!(track.format().name, "Audio Interchange File Format");
    track.tag.title = Some("Night Drive".to_string());
    track.tag.copyright = Some("1984 The Examples".to_string());
    track.save_to(&[TagSystemId::Native]).unwrap();

    let len = fs::metadata(&path).unwrap().len();
    assert_eq!(form_declared_size(&path) as u64, len - 8);

    let back = Track::open(&path).unwrap();
    assert_eq!(back.tag_systems(), &[TagSystemId::Native]);
    assert_eq!(back.tag.title.as_deref(), Some("Night Drive"));
    assert_eq!(back.tag.copyright.as_deref(), Some("1984 The Examples"));
}

#[test]
fn external_modification_fails_the_save_and_keeps_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = make_mp3(&dir, "k.mp3");

    let mut track = Track::open(&path).unwrap();
    track.tag.title = Some("T".to_string());

    // someone else appends a byte between our read and our save
    let mut data = fs::read(&path).unwrap();
    data.push(0x00);
    fs::write(&path, &data).unwrap();

    let err = track.save().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TagError>(),
        Some(TagError::ConcurrentModification { .. })
    ));
    assert_eq!(fs::read(&path).unwrap(), data);
}

#[test]
fn unknown_format_reads_empty_and_refuses_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, b"just some text\n").unwrap();

    let mut track = Track::open(&path).unwrap();
    assert!(track.format().is_unknown());
    assert!(track.tag.is_empty());
    assert!(track.tag_systems().is_empty());

    track.tag.title = Some("T".to_string());
    assert!(track.save().is_err());
}

#[test]
fn copy_tags_between_same_format_files() {
    let dir = tempfile::tempdir().unwrap();
    let src = make_mp3(&dir, "src.mp3");
    let dst = make_mp3(&dir, "dst.mp3");

    let mut track = Track::open(&src).unwrap();
    track.tag.title = Some("Copied".to_string());
    track.save().unwrap();

    tagsmith::copy_tags(&src, &dst).unwrap();
    assert_eq!(read_tag(&dst).unwrap().title.as_deref(), Some("Copied"));

    let wav = make_wav(&dir, "other.wav");
    assert!(tagsmith::copy_tags(&src, &wav).is_err());
}

#[test]
fn progress_reaches_completion_on_splice() {
    use std::cell::Cell;
    let dir = tempfile::tempdir().unwrap();
    let path = make_mp3(&dir, "l.mp3");

    let mut track = Track::open(&path).unwrap();
    track.tag.title = Some("T".to_string());

    let last = Cell::new(-1.0f32);
    let monotone = Cell::new(true);
    let cb = |f: f32| {
        if f < last.get() {
            monotone.set(false);
        }
        last.set(f);
    };
    track.save_with_progress(&cb).unwrap();

    assert!(monotone.get());
    assert!((last.get() - 1.0).abs() < f32::EPSILON);
}
