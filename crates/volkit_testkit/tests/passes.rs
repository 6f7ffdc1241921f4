//! End-to-end tests for the volume passes.

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use volkit_core::clock::{unix_now_ns, FixedTime, NANOS_PER_DAY};
use volkit_core::index::load_from_idx;
use volkit_core::passes::{self, PassOptions, RewritePass};
use volkit_core::{
    check_liveness, scan_volume_file, Cipher, CipherKey, CoreResult, Liveness, Needle, NeedleId,
    SuperBlock, TransformOptions, Ttl, TtlUnit, VisitFlow, VolumeFiles, VolumeId, VolumeVisitor,
    WriteStage,
};
use volkit_testkit::prelude::*;

const VID: VolumeId = VolumeId(7);

#[derive(Default)]
struct Collected {
    needles: Vec<(u64, Needle)>,
}

impl VolumeVisitor for Collected {
    fn visit_super_block(&mut self, _super_block: &SuperBlock) -> CoreResult<()> {
        Ok(())
    }

    fn visit_needle(
        &mut self,
        needle: &Needle,
        offset: u64,
        _header: &[u8],
        _body: &[u8],
    ) -> CoreResult<VisitFlow> {
        self.needles.push((offset, needle.clone()));
        Ok(VisitFlow::Continue)
    }
}

fn read_volume(dir: &Path, collection: &str) -> Vec<(u64, Needle)> {
    let mut collected = Collected::default();
    scan_volume_file(dir, collection, VID, &mut collected).unwrap();
    collected.needles
}

/// Source volume with live, stale, deleted and unindexed needles.
///
/// Live: 1 ("one v2"), 3, 5. Stale: first copy of 1, 2 and its tombstone.
/// Missing: 9.
fn mixed_source(dir: &Path) -> VolumeFiles {
    let mut fixture = VolumeFixture::new(dir, "pics", VID);
    fixture.put(1, b"one v1");
    fixture.put(2, b"two");
    fixture.put(3, b"three");
    fixture.put(1, b"one v2");
    fixture.delete(2);
    fixture.put_unindexed(9, b"orphan");
    fixture.put(5, b"five");
    fixture.write().unwrap()
}

struct Dirs {
    _root: TempDir,
    source: std::path::PathBuf,
    destination: std::path::PathBuf,
}

fn dirs() -> Dirs {
    let root = TempDir::new().unwrap();
    let source = root.path().join("src");
    let destination = root.path().join("dst");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::create_dir_all(&destination).unwrap();
    Dirs {
        _root: root,
        source,
        destination,
    }
}

fn options(dirs: &Dirs) -> PassOptions {
    PassOptions::new(&dirs.source, VID)
        .collection("pics")
        .destination_dir(&dirs.destination)
}

#[test]
fn compact_keeps_exactly_the_live_needles() {
    let dirs = dirs();
    mixed_source(&dirs.source);

    let result = passes::compact(&options(&dirs)).unwrap();
    assert_eq!(result.processed, 3);
    assert_eq!(result.skipped_stale, 3);
    assert_eq!(result.skipped_missing, 1);
    assert_eq!(result.matched, None);
    assert!(!result.stopped_early);

    let needles = read_volume(&dirs.destination, "pics");
    let ids: Vec<u64> = needles.iter().map(|(_, n)| n.id.as_u64()).collect();
    assert_eq!(ids, vec![3, 1, 5]);
    assert_eq!(needles[1].1.data, b"one v2");

    let index = load_from_idx(&options(&dirs).destination_files().idx_path()).unwrap();
    assert_eq!(index.len(), 3);
    for (offset, needle) in &needles {
        assert_eq!(check_liveness(&index, needle.id, *offset), Liveness::Live);
    }
}

#[test]
fn destination_offsets_increase() {
    let dirs = dirs();
    mixed_source(&dirs.source);
    passes::compact(&options(&dirs)).unwrap();

    let needles = read_volume(&dirs.destination, "pics");
    assert!(needles.windows(2).all(|w| w[0].0 < w[1].0));
    assert!(needles.iter().all(|(offset, _)| offset % 8 == 0));
}

#[test]
fn compact_preserves_needles_verbatim() {
    let dirs = dirs();
    let mut fixture = VolumeFixture::new(&dirs.source, "pics", VID);
    let mut needle = Needle::new(NeedleId(4), volkit_core::Cookie(99), b"payload".to_vec());
    needle.set_name(b"cat.jpg".to_vec());
    needle.set_mime(b"image/jpeg".to_vec());
    needle.set_last_modified(1_650_000_000);
    needle.set_pairs(br#"{"k":"v"}"#.to_vec());
    fixture.put_needle(needle);
    fixture.write().unwrap();

    passes::compact(&options(&dirs)).unwrap();

    let source = read_volume(&dirs.source, "pics");
    let destination = read_volume(&dirs.destination, "pics");
    assert_eq!(source[0].1, destination[0].1);
}

#[test]
fn transform_stops_after_limit() {
    let dirs = dirs();
    mixed_source(&dirs.source);

    let result = passes::transform(&options(&dirs).limit(2), TransformOptions::default()).unwrap();
    assert_eq!(result.processed, 2);
    assert!(result.stopped_early);
    assert_eq!(read_volume(&dirs.destination, "pics").len(), 2);
}

#[test]
fn transform_with_zero_limit_writes_only_super_block() {
    let dirs = dirs();
    mixed_source(&dirs.source);

    let result = passes::transform(&options(&dirs).limit(0), TransformOptions::default()).unwrap();
    assert_eq!(result.processed, 0);
    assert!(result.stopped_early);
    let files = options(&dirs).destination_files();
    assert_eq!(std::fs::metadata(files.dat_path()).unwrap().len(), 8);
    assert!(load_from_idx(&files.idx_path()).unwrap().is_empty());
}

#[test]
fn transform_restamps_append_time() {
    let dirs = dirs();
    mixed_source(&dirs.source);
    let before = unix_now_ns();

    passes::transform(&options(&dirs), TransformOptions::default()).unwrap();

    let needles = read_volume(&dirs.destination, "pics");
    assert_eq!(needles.len(), 3);
    assert!(needles.iter().all(|(_, n)| n.append_at_ns >= before));
}

fn ttl_source(dir: &Path) {
    let mut fixture = VolumeFixture::new(dir, "pics", VID);
    let mut needle = Needle::new(NeedleId(1), volkit_core::Cookie(5), b"ttl".to_vec());
    needle.set_ttl(Ttl::new(10, TtlUnit::Day));
    needle.set_last_modified(1_000);
    needle.append_at_ns = 1_000;
    fixture.put_needle(needle);
    fixture.put_modified(2, b"fresh", 5_000);
    fixture.write().unwrap();
}

#[test]
fn aged_ttl_is_restamped_with_transform_time() {
    let dirs = dirs();
    ttl_source(&dirs.source);
    let now = 5 * NANOS_PER_DAY + 1_000;

    RewritePass::new(
        "transform",
        &options(&dirs),
        TransformOptions::default().age_ttl(true),
    )
    .at_time(now)
    .run()
    .unwrap();

    let needles = read_volume(&dirs.destination, "pics");
    assert_eq!(needles[0].1.ttl.days(), 5);
    assert!(needles.iter().all(|(_, n)| n.append_at_ns == now));
}

#[test]
fn transform_with_aging_restamps_append_time() {
    let dirs = dirs();
    ttl_source(&dirs.source);
    let before = unix_now_ns();

    passes::transform(&options(&dirs), TransformOptions::default().age_ttl(true)).unwrap();

    let needles = read_volume(&dirs.destination, "pics");
    assert!(needles.iter().all(|(_, n)| n.append_at_ns >= before));
    // Stored for decades, so the TTL has run out.
    assert!(!needles[0].1.has_ttl());
}

#[test]
fn encryption_round_trip() {
    let dirs = dirs();
    mixed_source(&dirs.source);
    let key = CipherKey::from_bytes(&[7u8; 32]).unwrap();

    let result = passes::transform(
        &options(&dirs).cipher_key(key.clone()),
        TransformOptions::default().encrypt(true),
    )
    .unwrap();
    assert_eq!(result.processed, 3);

    let cipher = Cipher::new(&key);
    let needles = read_volume(&dirs.destination, "pics");
    let plain: Vec<Vec<u8>> = needles
        .iter()
        .map(|(_, n)| cipher.decrypt(&n.data).unwrap())
        .collect();
    assert_eq!(plain, vec![b"three".to_vec(), b"one v2".to_vec(), b"five".to_vec()]);

    let wrong = Cipher::new(&CipherKey::from_bytes(&[8u8; 32]).unwrap());
    assert!(wrong.decrypt(&needles[0].1.data).is_err());
}

#[test]
fn encryption_without_key_is_rejected() {
    let dirs = dirs();
    mixed_source(&dirs.source);

    let err = passes::transform(&options(&dirs), TransformOptions::default().encrypt(true))
        .unwrap_err();
    assert!(matches!(err, volkit_core::CoreError::MissingCipherKey));
    assert!(!options(&dirs).destination_files().dat_path().exists());
}

#[test]
fn clean_drops_needles_older_than_cutoff() {
    let dirs = dirs();
    let mut fixture = VolumeFixture::new(&dirs.source, "pics", VID);
    fixture.put_modified(1, b"old", 1_000);
    fixture.put_modified(2, b"new", 2_000);
    fixture.put_modified(3, b"edge", 1_500);
    fixture.put(4, b"undated");
    fixture.write().unwrap();

    let result = passes::clean(&options(&dirs).cutoff_secs(1_500)).unwrap();
    assert_eq!(result.processed, 3);
    assert_eq!(result.matched, Some(1));

    let ids: Vec<u64> = read_volume(&dirs.destination, "pics")
        .iter()
        .map(|(_, n)| n.id.as_u64())
        .collect();
    assert_eq!(ids, vec![2, 3, 4]);
}

#[test]
fn clean_requires_cutoff() {
    let dirs = dirs();
    mixed_source(&dirs.source);
    assert!(passes::clean(&options(&dirs)).is_err());
}

#[test]
fn check_counts_without_writing() {
    let dirs = dirs();
    let mut fixture = VolumeFixture::new(&dirs.source, "pics", VID);
    fixture.put_modified(1, b"old", 1_000);
    fixture.put_modified(1, b"old again", 1_100);
    fixture.put_modified(2, b"new", 2_000);
    fixture.put(3, b"undated");
    fixture.write().unwrap();

    let result = passes::check(&options(&dirs).cutoff_secs(1_500)).unwrap();
    assert_eq!(result.processed, 3);
    assert_eq!(result.matched, Some(1));
    assert_eq!(result.skipped_stale, 1);
    assert_eq!(result.bytes_written, 0);
    assert!(!options(&dirs).destination_files().dat_path().exists());
}

#[test]
fn generate_sets_last_modified_from_time_source() {
    let dirs = dirs();
    mixed_source(&dirs.source);
    let before = unix_now_ns();

    let result = passes::generate(&options(&dirs), Arc::new(FixedTime(1_234_567))).unwrap();
    assert_eq!(result.processed, 3);
    assert_eq!(result.matched, None);

    let needles = read_volume(&dirs.destination, "pics");
    assert_eq!(needles.len(), 3);
    assert!(needles
        .iter()
        .all(|(_, n)| n.has_last_modified() && n.last_modified == 1_234_567));
    assert!(needles.iter().all(|(_, n)| n.append_at_ns >= before));
}

#[test]
fn generate_ages_ttl_and_counts_needles_older_than_cutoff() {
    let dirs = dirs();
    ttl_source(&dirs.source);

    let result = passes::generate(
        &options(&dirs).cutoff_secs(2_000),
        Arc::new(FixedTime(1_234_567)),
    )
    .unwrap();
    assert_eq!(result.processed, 2);
    assert_eq!(result.matched, Some(1));

    let needles = read_volume(&dirs.destination, "pics");
    assert_eq!(needles.len(), 2);
    assert!(!needles[0].1.has_ttl());
}

#[test]
fn existing_destination_is_not_touched() {
    let dirs = dirs();
    mixed_source(&dirs.source);
    let files = options(&dirs).destination_files();
    std::fs::write(files.dat_path(), b"precious").unwrap();

    let err = passes::compact(&options(&dirs)).unwrap_err();
    assert_eq!(err.stage(), Some(WriteStage::CreateDestination));
    assert_eq!(std::fs::read(files.dat_path()).unwrap(), b"precious");
}

#[test]
fn write_failure_removes_destination() {
    let dirs = dirs();
    mixed_source(&dirs.source);
    let crash = CrashingOpener::after_writes(2).torn();
    let opener = crash.opener();

    let err = RewritePass::new("compact", &options(&dirs), TransformOptions::verbatim())
        .with_destination_opener(&*opener)
        .run()
        .unwrap_err();

    assert!(crash.crashed());
    assert_eq!(err.stage(), Some(WriteStage::WriteBytes));
    let files = options(&dirs).destination_files();
    assert!(!files.dat_path().exists());
    assert!(!files.idx_path().exists());
}

#[test]
fn sync_failure_removes_destination() {
    let dirs = dirs();
    mixed_source(&dirs.source);
    let crash = CrashingOpener::on_sync();
    let opener = crash.opener();

    let err = RewritePass::new("compact", &options(&dirs), TransformOptions::verbatim())
        .with_destination_opener(&*opener)
        .run()
        .unwrap_err();

    assert!(err.stage().is_some());
    assert!(!options(&dirs).destination_files().dat_path().exists());
}

#[test]
fn corrupted_source_aborts_pass() {
    let dirs = dirs();
    let files = mixed_source(&dirs.source);
    // Flip a data byte of the first needle: 8 super block + 16 header + 4 size.
    corrupt_byte(&files.dat_path(), 8 + 16 + 4).unwrap();

    let err = passes::compact(&options(&dirs)).unwrap_err();
    assert!(err.is_corruption());
    assert!(!options(&dirs).destination_files().dat_path().exists());
}

#[test]
fn swap_replaces_source() {
    let dirs = dirs();
    mixed_source(&dirs.source);
    let options = options(&dirs);
    passes::compact(&options).unwrap();
    passes::swap_into_source(&options).unwrap();

    assert!(!options.destination_files().dat_path().exists());
    let needles = read_volume(&dirs.source, "pics");
    assert_eq!(needles.len(), 3);
    let index = load_from_idx(&options.source_files().idx_path()).unwrap();
    assert_eq!(index.len(), 3);
}

#[test]
fn swap_into_itself_is_rejected() {
    let dirs = dirs();
    mixed_source(&dirs.source);
    let options = PassOptions::new(&dirs.source, VID).collection("pics");
    assert!(passes::swap_into_source(&options).is_err());
}
