//! NTFS parser tests

mod common;

use common::{
    NTFS_CLUSTER, NTFS_SAMPLE_DELETED, NTFS_SAMPLE_FOUND, NTFS_SAMPLE_LABEL, NTFS_SERIAL, device,
};
use rstest::*;
use salvage::domain::entities::{CancellationToken, RecoveryCatalog, ScanProgress};
use salvage::domain::repositories::{FileSystemError, FileSystemParser, ScanControl};
use salvage::infrastructure::file_systems::NtfsParser;
use std::collections::HashMap;
use std::sync::Arc;

fn parse(image: Vec<u8>) -> (RecoveryCatalog, salvage::domain::entities::ScanOutcome) {
    let parser = NtfsParser::new(device("ntfs", image)).unwrap();
    let catalog = RecoveryCatalog::new();
    let outcome = parser.scan(&catalog, &ScanControl::new()).unwrap();
    catalog.seal();
    (catalog, outcome)
}

// ============================================================================
// Fixtures
// ============================================================================

#[fixture]
fn sample() -> Vec<u8> {
    common::sample_ntfs()
}

// ============================================================================
// Record classification
// ============================================================================

#[rstest]
fn test_counts_are_exact(sample: Vec<u8>) {
    let (catalog, outcome) = parse(sample);

    assert!(!outcome.is_cancelled());
    assert_eq!(outcome.processed(), 16);
    assert_eq!(catalog.total_found(), NTFS_SAMPLE_FOUND);
    assert_eq!(catalog.total_deleted(), NTFS_SAMPLE_DELETED);
    assert_eq!(catalog.discarded(), 0);

    let ids: Vec<u64> = catalog.snapshot().records.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec![0, 3, 5, 6, 7, 8, 9]);
}

#[rstest]
fn test_record_fields(sample: Vec<u8>) {
    let (catalog, _) = parse(sample);

    let report = catalog.get(6).unwrap();
    assert_eq!(report.name(), Some("report.docx"));
    assert_eq!(report.parent_id(), Some(5));
    assert_eq!(report.size(), 6000);
    assert!(!report.is_deleted());
    assert_eq!(report.extents().len(), 1);
    assert_eq!(report.extents()[0].offset, 40 * NTFS_CLUSTER);
    assert_eq!(report.extents()[0].length, 2 * NTFS_CLUSTER);
    assert_eq!(
        report.created().unwrap().timestamp(),
        common::UNIX_2021
    );
    assert_eq!(
        report.modified().unwrap().timestamp(),
        common::UNIX_2021 + 3600
    );

    let deleted = catalog.get(7).unwrap();
    assert!(deleted.is_deleted());
    assert_eq!(deleted.size(), 11);
    let locator = deleted.locator();
    assert_eq!(locator.byte_offset, common::mft_slot_offset(7) as u64);
    let extent = deleted.extents()[0];
    assert_eq!(extent.length, 11);
    assert!(extent.offset > locator.byte_offset);
    assert!(extent.end() <= locator.byte_offset + common::MFT_RECORD as u64);

    let photos = catalog.get(8).unwrap();
    assert!(photos.is_directory());
    assert_eq!(photos.size(), 0);
}

#[rstest]
fn test_paths_follow_parents(sample: Vec<u8>) {
    let (catalog, _) = parse(sample);
    assert_eq!(catalog.path_of(9).as_deref(), Some("/photos/beach.jpg"));
    assert_eq!(catalog.path_of(6).as_deref(), Some("/report.docx"));
    assert_eq!(catalog.path_of(5).as_deref(), Some("/"));
}

#[rstest]
fn test_volume_info(sample: Vec<u8>) {
    let parser = NtfsParser::new(device("ntfs", sample)).unwrap();
    let info = parser.volume_info().unwrap();

    assert_eq!(info.filesystem, "NTFS");
    assert_eq!(info.label.as_deref(), Some(NTFS_SAMPLE_LABEL));
    assert_eq!(info.uuid, Some(format!("{:016X}", NTFS_SERIAL)));
    assert_eq!(info.block_size, NTFS_CLUSTER);
    assert_eq!(info.declared_size, 1 << 20);
    assert_eq!(parser.slot_count(), 16);
}

// ============================================================================
// Corruption
// ============================================================================

#[rstest]
fn test_single_corrupt_record_is_discarded(mut sample: Vec<u8>) {
    common::corrupt_mft_record(&mut sample, 6);
    let (catalog, outcome) = parse(sample);

    assert!(!outcome.is_cancelled());
    assert_eq!(catalog.total_found(), NTFS_SAMPLE_FOUND - 1);
    assert_eq!(catalog.discarded(), 1);
    assert!(catalog.get(6).is_none());
}

#[rstest]
fn test_torn_write_is_discarded(mut sample: Vec<u8>) {
    // Break the update sequence number at the end of the first stride
    let tail = common::mft_slot_offset(8) + 510;
    sample[tail] ^= 0xFF;
    let (catalog, _) = parse(sample);

    assert_eq!(catalog.total_found(), NTFS_SAMPLE_FOUND - 1);
    assert_eq!(catalog.discarded(), 1);
    // beach.jpg loses its parent's name
    assert_eq!(catalog.path_of(9), None);
}

#[rstest]
fn test_mirror_used_when_mft_record_zero_is_bad(mut sample: Vec<u8>) {
    common::corrupt_mft_record(&mut sample, 0);
    let (catalog, _) = parse(sample);

    assert_eq!(catalog.total_found(), NTFS_SAMPLE_FOUND - 1);
    assert_eq!(catalog.discarded(), 1);
    assert!(catalog.get(9).is_some());
}

#[rstest]
// One sparse run of 2^56 - 1 clusters, then 16 clusters at LCN 4
#[case::huge_sparse_run(&[0x07, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x11, 0x10, 0x04, 0x00])]
// Two sparse runs of 2^51 clusters, then 16 clusters at LCN 4
#[case::stacked_sparse_runs(&[
    0x07, 0, 0, 0, 0, 0, 0, 0x08,
    0x07, 0, 0, 0, 0, 0, 0, 0x08,
    0x11, 0x10, 0x04, 0x00,
])]
fn test_overflowing_mft_runlist_falls_back(mut sample: Vec<u8>, #[case] runlist: &[u8]) {
    common::replace_mft_runlist(&mut sample, runlist);
    let (catalog, outcome) = parse(sample);

    assert!(!outcome.is_cancelled());
    assert_eq!(catalog.total_found(), NTFS_SAMPLE_FOUND);
    assert_eq!(catalog.total_deleted(), NTFS_SAMPLE_DELETED);
    assert_eq!(catalog.discarded(), 0);
    assert_eq!(catalog.path_of(9).as_deref(), Some("/photos/beach.jpg"));
}

// ============================================================================
// Root validation
// ============================================================================

#[rstest]
fn test_truncated_device_is_too_small(sample: Vec<u8>) {
    let truncated = sample[..512 * 1024].to_vec();
    assert!(matches!(
        NtfsParser::new(device("ntfs", truncated)),
        Err(FileSystemError::DeviceTooSmall { .. })
    ));
}

#[rstest]
fn test_bad_record_size_is_invalid_root(mut sample: Vec<u8>) {
    sample[0x40] = 0;
    assert!(matches!(
        NtfsParser::new(device("ntfs", sample)),
        Err(FileSystemError::InvalidRootBlock(_))
    ));
}

#[rstest]
fn test_mft_beyond_device_is_unreachable(mut sample: Vec<u8>) {
    common::put_u64(&mut sample, 0x30, 1 << 20);
    assert!(matches!(
        NtfsParser::new(device("ntfs", sample)),
        Err(FileSystemError::LocatorUnreachable { .. })
    ));
}

#[test]
fn test_device_smaller_than_boot_sector() {
    assert!(matches!(
        NtfsParser::new(device("ntfs", vec![0u8; 100])),
        Err(FileSystemError::DeviceTooSmall { .. })
    ));
}

// ============================================================================
// Passes over a larger MFT
// ============================================================================

#[test]
fn test_parse_is_idempotent() {
    let parser = NtfsParser::new(device("ntfs", common::ntfs_many_files(1500))).unwrap();
    let first = parser.parse().unwrap();
    let second = parser.parse().unwrap();

    assert_eq!(first.len(), second.len());
    let ids = |records: &[salvage::domain::entities::FileRecord]| -> Vec<(u64, bool)> {
        records.iter().map(|r| (r.id(), r.is_deleted())).collect()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn test_parallel_pass_matches_sequential() {
    let parser = NtfsParser::new(device("ntfs", common::ntfs_many_files(3000))).unwrap();

    let sequential = RecoveryCatalog::new();
    parser.scan(&sequential, &ScanControl::new()).unwrap();

    let parallel = RecoveryCatalog::new();
    let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    pool.install(|| parser.scan(&parallel, &ScanControl::new().with_parallel(true)))
        .unwrap();

    let order = |catalog: &RecoveryCatalog| -> Vec<u64> {
        catalog.snapshot().records.iter().map(|r| r.id()).collect()
    };
    assert_eq!(order(&sequential), order(&parallel));
    assert_eq!(sequential.total_deleted(), parallel.total_deleted());
    assert_eq!(sequential.total_found(), 2 + 3000 - 16);
}

#[test]
fn test_cancel_mid_pass_keeps_partial_catalog() {
    let parser = NtfsParser::new(device("ntfs", common::ntfs_many_files(3000))).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let control = ScanControl::new()
        .with_cancel(cancel)
        .with_progress(Box::new(move |progress: &ScanProgress| {
            if progress.slots_done >= 256 {
                trigger.cancel();
            }
        }));

    let catalog = RecoveryCatalog::new();
    let outcome = parser.scan(&catalog, &control).unwrap();

    assert!(outcome.is_cancelled());
    assert!(outcome.processed() < 3000);
    assert!(catalog.total_found() <= outcome.processed());
    assert!(catalog.total_found() > 0);
}

#[test]
fn test_cancel_before_start_yields_empty_catalog() {
    let parser = NtfsParser::new(device("ntfs", common::sample_ntfs())).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let catalog = RecoveryCatalog::new();
    let outcome = parser
        .scan(&catalog, &ScanControl::new().with_cancel(cancel))
        .unwrap();
    assert!(outcome.is_cancelled());
    assert_eq!(outcome.processed(), 0);
    assert!(catalog.is_empty());
}

#[test]
fn test_progress_reports_final_counts() {
    let parser = NtfsParser::new(device("ntfs", common::sample_ntfs())).unwrap();
    let last = Arc::new(parking_lot::Mutex::new(HashMap::new()));
    let sink = Arc::clone(&last);
    let control = ScanControl::new().with_progress(Box::new(move |progress: &ScanProgress| {
        let mut last = sink.lock();
        last.insert("done", progress.slots_done);
        last.insert("found", progress.found);
        last.insert("deleted", progress.deleted);
    }));

    parser.scan(&RecoveryCatalog::new(), &control).unwrap();
    let last = last.lock();
    assert_eq!(last["done"], 16);
    assert_eq!(last["found"], NTFS_SAMPLE_FOUND);
    assert_eq!(last["deleted"], NTFS_SAMPLE_DELETED);
}
