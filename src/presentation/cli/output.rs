//! Table and JSON rendering of detection, volume and record results

use crate::application::dto::RecoveryReport;
use crate::domain::entities::{CatalogSnapshot, FileRecord, RecoveryCatalog, VolumeInfo};
use crate::domain::repositories::{DeviceInfo, FileSystemType};
use anyhow::Result;
use serde::Serialize;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn print_detection(device: &DeviceInfo, matches: &[FileSystemType]) {
    println!("Device:     {}", device.path);
    println!("Size:       {} bytes", device.size);
    match matches.first() {
        Some(first) => {
            println!("Filesystem: {}", first);
            if matches.len() > 1 {
                let others: Vec<&str> = matches[1..].iter().map(|t| t.name()).collect();
                println!("Also found: {}", others.join(", "));
            }
            if !first.has_parser() {
                println!("(no metadata parser for {}; scan is not available)", first);
            }
        }
        None => println!("Filesystem: {}", FileSystemType::Unknown),
    }
}

#[derive(Serialize)]
struct InfoDocument<'a> {
    device: &'a DeviceInfo,
    filesystem: FileSystemType,
    volume: &'a VolumeInfo,
}

pub fn print_volume(
    device: &DeviceInfo,
    filesystem: FileSystemType,
    volume: &VolumeInfo,
    json: bool,
) -> Result<()> {
    if json {
        let document = InfoDocument {
            device,
            filesystem,
            volume,
        };
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("Device:        {} ({} bytes)", device.path, device.size);
    println!("Filesystem:    {}", volume.filesystem);
    println!("Label:         {}", volume.label.as_deref().unwrap_or("-"));
    println!("UUID:          {}", volume.uuid.as_deref().unwrap_or("-"));
    println!("Block size:    {}", volume.block_size);
    println!("Declared size: {} bytes", volume.declared_size);
    if !volume.volumes.is_empty() {
        println!("Volumes:       {}", volume.volumes.join(", "));
    }
    for snapshot in &volume.snapshots {
        let created = snapshot
            .created
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "Snapshot:      {} (xid {}, {})",
            snapshot.name, snapshot.transaction_id, created
        );
    }
    if let Some(journal) = &volume.journal {
        match (journal.inode, &journal.uuid) {
            (Some(inode), _) => println!("Journal:       inode {}", inode),
            (None, Some(uuid)) => println!("Journal:       external device {}", uuid),
            (None, None) => println!("Journal:       present"),
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ScanDocument<'a> {
    report: &'a RecoveryReport,
    records: Vec<RecordRow<'a>>,
}

#[derive(Serialize)]
struct RecordRow<'a> {
    path: Option<String>,
    #[serde(flatten)]
    record: &'a FileRecord,
}

fn selected<'a>(
    snapshot: &'a CatalogSnapshot,
    deleted_only: bool,
) -> impl Iterator<Item = &'a FileRecord> {
    snapshot
        .records
        .iter()
        .filter(move |r| !deleted_only || r.is_deleted())
}

pub fn print_records(
    catalog: &RecoveryCatalog,
    report: &RecoveryReport,
    deleted_only: bool,
    json: bool,
) -> Result<()> {
    let snapshot = catalog.snapshot();

    if json {
        let records = selected(&snapshot, deleted_only)
            .map(|record| RecordRow {
                path: catalog.path_of(record.id()),
                record,
            })
            .collect();
        let document = ScanDocument { report, records };
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!(
        "{:>10} {:<3} {:>10} {:<19}  {}",
        "ID", "DEL", "SIZE", "MODIFIED", "PATH"
    );
    for record in selected(&snapshot, deleted_only) {
        let modified = record
            .modified()
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());
        let path = catalog
            .path_of(record.id())
            .unwrap_or_else(|| record.display_name());
        let suffix = if record.is_directory() { "/" } else { "" };
        println!(
            "{:>10} {:<3} {:>10} {:<19}  {}{}",
            record.id(),
            if record.is_deleted() { "yes" } else { "" },
            record.size_human(),
            modified,
            path,
            suffix
        );
    }
    println!();
    print_report(report);
    Ok(())
}

pub fn print_report(report: &RecoveryReport) {
    println!("{}", report.summary());
    if report.is_cancelled() {
        println!("Pass was cancelled; the listing above is partial.");
    }
}
