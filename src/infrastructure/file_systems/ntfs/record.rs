//! MFT record decoding
//!
//! Applies update-sequence fixups and walks the attribute list of one
//! `FILE` record. Only the attributes the catalog needs are decoded.

use crate::infrastructure::file_systems::le::{LeBytes, utf16le_string};
use chrono::{DateTime, Utc};

/// MFT entry signature "FILE"
pub const FILE_SIGNATURE: [u8; 4] = *b"FILE";

/// Signature written over records that failed a multi-sector transfer
pub const BAAD_SIGNATURE: [u8; 4] = *b"BAAD";

/// Update sequence stride
pub const FIXUP_STRIDE: usize = 512;

const FLAG_IN_USE: u16 = 0x0001;
const FLAG_DIRECTORY: u16 = 0x0002;

const ATTR_STANDARD_INFORMATION: u32 = 0x10;
const ATTR_FILE_NAME: u32 = 0x30;
const ATTR_VOLUME_NAME: u32 = 0x60;
const ATTR_DATA: u32 = 0x80;
const ATTR_END: u32 = 0xFFFF_FFFF;

/// File reference numbers carry a 16-bit sequence in the top bits
const REFERENCE_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Seconds between 1601-01-01 and 1970-01-01
const FILETIME_EPOCH_DELTA: i64 = 11_644_473_600;

/// File name namespaces
const NAMESPACE_DOS: u8 = 2;

/// Converts a Windows FILETIME to UTC, `None` for zero
pub fn filetime_to_utc(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 {
        return None;
    }
    let secs = (filetime / 10_000_000) as i64 - FILETIME_EPOCH_DELTA;
    let nanos = ((filetime % 10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// One mapping pair of a non-resident runlist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRun {
    /// Starting cluster, `None` for a sparse run
    pub lcn: Option<u64>,
    pub clusters: u64,
}

/// Decodes a runlist (mapping pairs)
///
/// Stops at the terminating zero header, at the end of the buffer, or at a
/// malformed header; runs decoded so far are kept.
pub fn parse_data_runs(data: &[u8]) -> Vec<DataRun> {
    let mut runs = Vec::new();
    let mut pos = 0usize;
    let mut lcn: i64 = 0;

    while let Some(&header) = data.get(pos) {
        if header == 0 {
            break;
        }
        let length_size = (header & 0x0F) as usize;
        let offset_size = (header >> 4) as usize;
        if length_size == 0 || length_size > 8 || offset_size > 8 {
            break;
        }
        let Some(fields) = data.get(pos + 1..pos + 1 + length_size + offset_size) else {
            break;
        };

        let mut clusters = 0u64;
        for (i, &b) in fields[..length_size].iter().enumerate() {
            clusters |= (b as u64) << (8 * i);
        }

        let run_lcn = if offset_size == 0 {
            None
        } else {
            let mut delta = 0i64;
            for (i, &b) in fields[length_size..].iter().enumerate() {
                delta |= (b as i64) << (8 * i);
            }
            // Sign-extend the relative offset
            let shift = 64 - 8 * offset_size as u32;
            if shift < 64 {
                delta = (delta << shift) >> shift;
            }
            lcn = lcn.wrapping_add(delta);
            if lcn < 0 {
                break;
            }
            Some(lcn as u64)
        };

        runs.push(DataRun {
            lcn: run_lcn,
            clusters,
        });
        pos += 1 + length_size + offset_size;
    }

    runs
}

/// `$FILE_NAME` contents
#[derive(Debug, Clone)]
pub struct FileNameAttr {
    pub name: String,
    pub parent: u64,
    pub namespace: u8,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub real_size: u64,
}

impl FileNameAttr {
    /// Lower is better: Win32 and POSIX names beat 8.3 DOS aliases
    fn rank(&self) -> u8 {
        if self.namespace == NAMESPACE_DOS { 1 } else { 0 }
    }
}

/// Unnamed `$DATA` stream
#[derive(Debug, Clone)]
pub enum DataAttr {
    /// Content stored inside the record: offset within the record and length
    Resident { offset: usize, length: u64 },
    NonResident { real_size: u64, runs: Vec<DataRun> },
}

/// Decoded record contents
#[derive(Debug, Clone, Default)]
pub struct MftRecord {
    pub in_use: bool,
    pub is_directory: bool,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub has_standard_information: bool,
    pub file_name: Option<FileNameAttr>,
    pub data: Option<DataAttr>,
    pub volume_name: Option<String>,
}

/// Outcome of decoding one record slot
#[derive(Debug)]
pub enum RecordClass {
    /// All-zero or formatted-but-never-used slot
    Empty,
    Invalid(String),
    /// Extension record belonging to another base record
    Extension,
    Parsed(MftRecord),
}

/// Verifies and removes the update-sequence fixups in place
pub fn apply_fixups(raw: &mut [u8]) -> Result<(), String> {
    let view = LeBytes::new(raw);
    let usa_offset = view.u16(4).ok_or("truncated header")? as usize;
    let usa_count = view.u16(6).ok_or("truncated header")? as usize;

    let strides = raw.len() / FIXUP_STRIDE;
    if usa_count != strides + 1 {
        return Err(format!("update sequence count {} for {} strides", usa_count, strides));
    }
    if usa_offset % 2 != 0 || usa_offset < 0x28 || usa_offset + usa_count * 2 > FIXUP_STRIDE - 2 {
        return Err(format!("update sequence array at {:#x} out of bounds", usa_offset));
    }

    let usn = [raw[usa_offset], raw[usa_offset + 1]];
    for i in 1..usa_count {
        let tail = i * FIXUP_STRIDE - 2;
        if raw[tail..tail + 2] != usn {
            return Err(format!("torn write in stride {}", i));
        }
        let entry = usa_offset + i * 2;
        let original = [raw[entry], raw[entry + 1]];
        raw[tail..tail + 2].copy_from_slice(&original);
    }
    Ok(())
}

/// Decodes one MFT record in place
pub fn parse_record(raw: &mut [u8]) -> RecordClass {
    if raw.iter().all(|&b| b == 0) {
        return RecordClass::Empty;
    }
    if raw.get(0..4) == Some(&BAAD_SIGNATURE[..]) {
        return RecordClass::Invalid("BAAD record".to_string());
    }
    if raw.get(0..4) != Some(&FILE_SIGNATURE[..]) {
        return RecordClass::Invalid("missing FILE signature".to_string());
    }
    if let Err(reason) = apply_fixups(raw) {
        return RecordClass::Invalid(reason);
    }

    let view = LeBytes::new(raw);
    let (Some(first_attr), Some(flags), Some(used_size), Some(base_reference)) =
        (view.u16(0x14), view.u16(0x16), view.u32(0x18), view.u64(0x20))
    else {
        return RecordClass::Invalid("truncated header".to_string());
    };
    let first_attr = first_attr as usize;
    let used_size = used_size as usize;

    if used_size > raw.len() || first_attr < 0x2A || first_attr + 4 > used_size {
        return RecordClass::Invalid(format!(
            "attribute area {:#x}..{:#x} out of bounds",
            first_attr, used_size
        ));
    }
    if base_reference & REFERENCE_MASK != 0 {
        return RecordClass::Extension;
    }

    let mut record = MftRecord {
        in_use: flags & FLAG_IN_USE != 0,
        is_directory: flags & FLAG_DIRECTORY != 0,
        ..Default::default()
    };
    walk_attributes(LeBytes::new(&raw[..used_size]), first_attr, &mut record);

    if !record.in_use && !record.has_standard_information && record.file_name.is_none() {
        return RecordClass::Empty;
    }
    RecordClass::Parsed(record)
}

fn walk_attributes(view: LeBytes<'_>, first_attr: usize, record: &mut MftRecord) {
    let mut offset = first_attr;

    while let Some(attr_type) = view.u32(offset) {
        if attr_type == ATTR_END {
            break;
        }
        let Some(length) = view.u32(offset + 4).map(|l| l as usize) else {
            break;
        };
        if length < 16 || length % 8 != 0 || offset + length > view.len() {
            break;
        }
        let Some(attr) = view.bytes(offset, length).map(LeBytes::new) else {
            break;
        };

        let non_resident = attr.u8(8).unwrap_or(0) != 0;
        let name_length = attr.u8(9).unwrap_or(0);

        match attr_type {
            ATTR_STANDARD_INFORMATION if !non_resident => {
                if let Some(value) = resident_value(attr) {
                    record.has_standard_information = true;
                    record.created = value.u64(0).and_then(filetime_to_utc);
                    record.modified = value.u64(8).and_then(filetime_to_utc);
                }
            }
            ATTR_FILE_NAME if !non_resident => {
                if let Some(name) = resident_value(attr).and_then(decode_file_name) {
                    let better = record
                        .file_name
                        .as_ref()
                        .is_none_or(|current| name.rank() < current.rank());
                    if better {
                        record.file_name = Some(name);
                    }
                }
            }
            ATTR_VOLUME_NAME if !non_resident => {
                if let Some(value) = resident_value(attr) {
                    let name = utf16le_string(value.bytes(0, value.len()).unwrap_or_default());
                    if !name.is_empty() {
                        record.volume_name = Some(name);
                    }
                }
            }
            ATTR_DATA if name_length == 0 && record.data.is_none() => {
                record.data = decode_data(attr, offset, non_resident);
            }
            _ => {}
        }

        offset += length;
    }
}

fn resident_value(attr: LeBytes<'_>) -> Option<LeBytes<'_>> {
    let length = attr.u32(16)? as usize;
    let offset = attr.u16(20)? as usize;
    attr.bytes(offset, length).map(LeBytes::new)
}

fn decode_file_name(value: LeBytes<'_>) -> Option<FileNameAttr> {
    let parent = value.u64(0)? & REFERENCE_MASK;
    let name_chars = value.u8(64)? as usize;
    let namespace = value.u8(65)?;
    let name = utf16le_string(value.bytes(66, name_chars * 2)?);

    Some(FileNameAttr {
        name,
        parent,
        namespace,
        created: value.u64(8).and_then(filetime_to_utc),
        modified: value.u64(16).and_then(filetime_to_utc),
        real_size: value.u64(48).unwrap_or(0),
    })
}

fn decode_data(attr: LeBytes<'_>, attr_offset: usize, non_resident: bool) -> Option<DataAttr> {
    if !non_resident {
        let length = attr.u32(16)? as u64;
        let value_offset = attr.u16(20)? as usize;
        attr.bytes(value_offset, length as usize)?;
        return Some(DataAttr::Resident {
            offset: attr_offset + value_offset,
            length,
        });
    }

    // Only the first chunk of a stream carries the real size
    if attr.u64(16)? != 0 {
        return None;
    }
    let runlist_offset = attr.u16(32)? as usize;
    let real_size = attr.u64(48)?;
    let runs = parse_data_runs(attr.bytes(runlist_offset, attr.len().checked_sub(runlist_offset)?)?);

    Some(DataAttr::NonResident { real_size, runs })
}
