#![no_main]

use libfuzzer_sys::fuzz_target;
use salvage::domain::services::FormatDetector;
use salvage::infrastructure::block_device::MemoryBlockDevice;

fuzz_target!(|data: &[u8]| {
    let device = MemoryBlockDevice::new("fuzz", data.to_vec());
    let detector = FormatDetector::new();
    let detected = detector.detect(&device);
    let all = detector.detect_all(&device);
    assert_eq!(all.first().copied().unwrap_or(detected), detected);
});
