//! End-to-end recovery sessions over image files

mod common;

use rstest::*;
use salvage::application::dto::ScanOptions;
use salvage::application::{RecoveryError, RecoveryStage, RecoverySession};
use salvage::domain::entities::{CancellationToken, RecoveryCatalog};
use salvage::domain::repositories::{BlockDeviceError, FileSystemError, FileSystemType};
use std::io::Write;
use tempfile::NamedTempFile;

fn image_file(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

fn open(file: &NamedTempFile) -> Result<RecoverySession, RecoveryError> {
    RecoverySession::open(file.path().to_str().unwrap())
}

fn run(session: &RecoverySession, options: &ScanOptions) -> (RecoveryCatalog, salvage::application::dto::RecoveryReport) {
    let catalog = RecoveryCatalog::new();
    let report = session
        .run(&catalog, options, &CancellationToken::new(), None)
        .unwrap();
    (catalog, report)
}

// ============================================================================
// Full passes
// ============================================================================

#[rstest]
#[case::ntfs(common::sample_ntfs(), FileSystemType::Ntfs, common::NTFS_SAMPLE_FOUND, common::NTFS_SAMPLE_DELETED)]
#[case::ext(common::sample_ext(), FileSystemType::Ext, common::EXT_SAMPLE_FOUND, common::EXT_SAMPLE_DELETED)]
#[case::apfs(common::sample_apfs(), FileSystemType::Apfs, common::APFS_SAMPLE_FOUND, common::APFS_SAMPLE_DELETED)]
fn test_full_pass(
    #[case] image: Vec<u8>,
    #[case] filesystem: FileSystemType,
    #[case] found: u64,
    #[case] deleted: u64,
) {
    let file = image_file(&image);
    let session = open(&file).unwrap();
    assert_eq!(session.filesystem(), filesystem);
    assert_eq!(session.device_info().size, image.len() as u64);

    let (catalog, report) = run(&session, &ScanOptions::new().sequential());

    assert!(catalog.is_sealed());
    assert!(!report.is_cancelled());
    assert_eq!(report.filesystem, filesystem);
    assert_eq!(report.total_found, found);
    assert_eq!(report.total_deleted, deleted);
    assert_eq!(report.total_found, catalog.total_found());
    assert_eq!(report.discarded, 0);
    session.close().unwrap();
}

#[test]
fn test_parallel_options_match_sequential() {
    let file = image_file(&common::ntfs_many_files(2000));
    let session = open(&file).unwrap();

    let (sequential, _) = run(&session, &ScanOptions::new().sequential());
    let (parallel, report) = run(&session, &ScanOptions::new().with_threads(3));

    assert_eq!(report.total_found, sequential.total_found());
    let ids = |catalog: &RecoveryCatalog| -> Vec<u64> {
        catalog.snapshot().records.iter().map(|r| r.id()).collect()
    };
    assert_eq!(ids(&sequential), ids(&parallel));
}

#[test]
fn test_ext_magic_only_image() {
    let file = image_file(&common::ext_magic_only());
    let session = open(&file).unwrap();
    assert_eq!(session.filesystem(), FileSystemType::Ext);

    let (catalog, report) = run(&session, &ScanOptions::new());
    assert!(!report.is_cancelled());
    assert_eq!(report.total_found, 0);
    assert!(catalog.is_empty());
}

#[test]
fn test_cancelled_pass_is_not_an_error() {
    let file = image_file(&common::sample_ext());
    let session = open(&file).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let catalog = RecoveryCatalog::new();
    let report = session
        .run(&catalog, &ScanOptions::new().sequential(), &cancel, None)
        .unwrap();

    assert!(report.is_cancelled());
    assert!(catalog.is_sealed());
    assert!(report.summary().contains("cancelled"));
}

#[test]
fn test_catalog_cannot_be_reused() {
    let file = image_file(&common::sample_apfs());
    let session = open(&file).unwrap();
    let (catalog, _) = run(&session, &ScanOptions::new().sequential());

    let error = session
        .run(&catalog, &ScanOptions::new().sequential(), &CancellationToken::new(), None)
        .unwrap_err();
    assert_eq!(error.stage(), RecoveryStage::ParseRecords);
}

#[test]
fn test_report_serializes_to_json() {
    let file = image_file(&common::sample_ntfs());
    let session = open(&file).unwrap();
    let (_, report) = run(&session, &ScanOptions::new().sequential());

    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["total_found"], common::NTFS_SAMPLE_FOUND);
    assert_eq!(json["volume"]["label"], common::NTFS_SAMPLE_LABEL);
    assert!(json["duration"].is_f64());
}

// ============================================================================
// Stage-tagged failures
// ============================================================================

#[test]
fn test_missing_device_fails_at_open() {
    let error = RecoverySession::open("/nonexistent/salvage/image.bin")
        .err()
        .unwrap();
    assert_eq!(error.stage(), RecoveryStage::Open);
    assert!(matches!(
        error,
        RecoveryError::Open {
            source: BlockDeviceError::NotFound(_),
            ..
        }
    ));
    assert!(error.to_string().starts_with("[open]"));
}

#[rstest]
#[case::zeros(vec![0u8; 1 << 16], FileSystemType::Unknown)]
#[case::fat(common::fat_image(), FileSystemType::Fat)]
#[case::hfs(common::hfs_image(), FileSystemType::Hfs)]
fn test_unparseable_format_fails_at_detect(#[case] image: Vec<u8>, #[case] expected: FileSystemType) {
    let file = image_file(&image);
    match open(&file) {
        Err(RecoveryError::Detect { found, .. }) => assert_eq!(found, expected),
        Err(other) => panic!("expected a detect failure, got {}", other),
        Ok(_) => panic!("expected a detect failure"),
    }
}

#[test]
fn test_truncated_volume_fails_at_parse_root() {
    let image = common::sample_ntfs();
    let file = image_file(&image[..512 * 1024]);
    let session = open(&file).unwrap();

    let error = session
        .run(&RecoveryCatalog::new(), &ScanOptions::new().sequential(), &CancellationToken::new(), None)
        .unwrap_err();
    assert_eq!(error.stage(), RecoveryStage::ParseRoot);
    assert!(matches!(
        error,
        RecoveryError::ParseRoot {
            source: FileSystemError::DeviceTooSmall { .. },
            ..
        }
    ));
    assert!(matches!(session.volume_info(), Err(RecoveryError::ParseRoot { .. })));
}

#[test]
fn test_bare_apfs_volume_fails_at_parse_root() {
    let image = common::sample_apfs();
    let file = image_file(&image[2 * common::APFS_BLOCK..]);
    let session = open(&file).unwrap();
    assert_eq!(session.filesystem(), FileSystemType::Apfs);

    let error = session
        .run(&RecoveryCatalog::new(), &ScanOptions::new().sequential(), &CancellationToken::new(), None)
        .unwrap_err();
    assert!(matches!(
        error,
        RecoveryError::ParseRoot {
            source: FileSystemError::InvalidRootBlock(_),
            ..
        }
    ));
}
