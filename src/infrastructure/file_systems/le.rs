//! Bounds-checked little-endian field decoding
//!
//! Every on-disk structure is decoded from an owned byte buffer through
//! these accessors; a field that would run past the buffer yields `None`.

use crate::domain::repositories::FileSystemError;
use byteorder::{ByteOrder, LittleEndian};

/// Read-only view over a metadata buffer
#[derive(Debug, Clone, Copy)]
pub struct LeBytes<'a> {
    data: &'a [u8],
}

impl<'a> LeBytes<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn bytes(&self, offset: usize, length: usize) -> Option<&'a [u8]> {
        self.data.get(offset..offset.checked_add(length)?)
    }

    pub fn u8(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    pub fn i8(&self, offset: usize) -> Option<i8> {
        self.u8(offset).map(|v| v as i8)
    }

    pub fn u16(&self, offset: usize) -> Option<u16> {
        self.bytes(offset, 2).map(LittleEndian::read_u16)
    }

    pub fn u32(&self, offset: usize) -> Option<u32> {
        self.bytes(offset, 4).map(LittleEndian::read_u32)
    }

    pub fn u64(&self, offset: usize) -> Option<u64> {
        self.bytes(offset, 8).map(LittleEndian::read_u64)
    }

    /// Returns true when every byte is zero
    pub fn is_zeroed(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    /// Sub-view starting at `offset`, or `None` past the end
    pub fn tail(&self, offset: usize) -> Option<LeBytes<'a>> {
        self.data.get(offset..).map(LeBytes::new)
    }
}

/// Converts a missing root-block field into `InvalidRootBlock`
pub fn root_field<T>(value: Option<T>, field: &str) -> Result<T, FileSystemError> {
    value.ok_or_else(|| FileSystemError::InvalidRootBlock(format!("{} is truncated", field)))
}

/// Decodes a NUL-padded byte string, returning `None` when empty
pub fn nul_padded_string(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text = String::from_utf8_lossy(&bytes[..end]).trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

/// Decodes UTF-16LE code units
pub fn utf16le_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(LittleEndian::read_u16).collect();
    String::from_utf16_lossy(&units)
}

/// Formats 16 bytes as a canonical UUID, `None` when all zero
pub fn uuid_string(bytes: &[u8]) -> Option<String> {
    if bytes.len() != 16 || bytes.iter().all(|&b| b == 0) {
        return None;
    }
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    Some(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}
