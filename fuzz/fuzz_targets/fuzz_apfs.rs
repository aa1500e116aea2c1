#![no_main]

use libfuzzer_sys::fuzz_target;
use salvage::domain::entities::RecoveryCatalog;
use salvage::domain::repositories::{FileSystemParser, ScanControl};
use salvage::infrastructure::block_device::MemoryBlockDevice;
use salvage::infrastructure::file_systems::ApfsParser;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let device = Arc::new(MemoryBlockDevice::new("fuzz", data.to_vec()));
    let Ok(parser) = ApfsParser::new(device) else {
        return;
    };
    let _ = parser.volume_info();

    let catalog = RecoveryCatalog::new();
    if parser.scan(&catalog, &ScanControl::new()).is_ok() {
        let snapshot = catalog.snapshot();
        assert_eq!(snapshot.total_found, snapshot.records.len() as u64);
        for record in &snapshot.records {
            let _ = catalog.path_of(record.id());
        }
    }
});
