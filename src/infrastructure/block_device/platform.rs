//! Platform queries for device geometry
//!
//! Size and sector size come from the OS for raw devices and from file
//! metadata for image files.

use crate::domain::repositories::DeviceKind;
use std::fs::File;
use std::io;

/// Sector size reported for image files
pub const DEFAULT_SECTOR_SIZE: u64 = 512;

/// Size, sector size and kind of an open device
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub size: u64,
    pub sector_size: u64,
    pub kind: DeviceKind,
}

/// Rewrites user-facing drive identifiers into openable device paths
///
/// On Windows `C:`/`C:\` become `\\.\C:` and `PhysicalDrive0` becomes
/// `\\.\PhysicalDrive0`. Other platforms take paths as given.
pub fn normalize_device_path(path: &str) -> String {
    normalize_for(path, cfg!(windows))
}

pub(crate) fn normalize_for(path: &str, windows: bool) -> String {
    if !windows || path.starts_with(r"\\") {
        return path.to_string();
    }

    let trimmed = path.trim_end_matches(['\\', '/']);
    let bytes = trimmed.as_bytes();
    if bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return format!(r"\\.\{}", trimmed.to_ascii_uppercase());
    }
    if trimmed.to_ascii_lowercase().starts_with("physicaldrive") {
        return format!(r"\\.\{}", trimmed);
    }
    path.to_string()
}

/// Returns true when the path names a regular file (a disk image)
pub fn is_image_file(path: &str) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Queries size and sector size once, at open time
pub fn query_geometry(file: &File, path: &str) -> io::Result<Geometry> {
    if !path.starts_with(r"\\.\") {
        let metadata = file.metadata()?;
        if metadata.is_file() {
            return Ok(Geometry {
                size: metadata.len(),
                sector_size: DEFAULT_SECTOR_SIZE,
                kind: DeviceKind::ImageFile,
            });
        }
    }

    let (size, sector_size) = device_geometry(file)?;
    Ok(Geometry {
        size,
        sector_size: if sector_size == 0 { DEFAULT_SECTOR_SIZE } else { sector_size },
        kind: DeviceKind::BlockDevice,
    })
}

#[cfg(target_os = "linux")]
fn device_geometry(file: &File) -> io::Result<(u64, u64)> {
    use std::os::unix::io::AsRawFd;

    const BLKSSZGET: libc::c_ulong = 0x1268;
    const BLKGETSIZE64: libc::c_ulong = 0x80081272;

    let fd = file.as_raw_fd();

    let mut size: u64 = 0;
    if unsafe { libc::ioctl(fd, BLKGETSIZE64 as _, &mut size) } == -1 {
        return Err(io::Error::last_os_error());
    }

    let mut sector_size: libc::c_int = 0;
    if unsafe { libc::ioctl(fd, BLKSSZGET as _, &mut sector_size) } == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok((size, sector_size.max(0) as u64))
}

#[cfg(target_os = "macos")]
fn device_geometry(file: &File) -> io::Result<(u64, u64)> {
    use std::os::unix::io::AsRawFd;

    const DKIOCGETBLOCKSIZE: libc::c_ulong = 0x40046418;
    const DKIOCGETBLOCKCOUNT: libc::c_ulong = 0x40086419;

    let fd = file.as_raw_fd();

    let mut block_size: u32 = 0;
    if unsafe { libc::ioctl(fd, DKIOCGETBLOCKSIZE, &mut block_size) } == -1 {
        return Err(io::Error::last_os_error());
    }

    let mut block_count: u64 = 0;
    if unsafe { libc::ioctl(fd, DKIOCGETBLOCKCOUNT, &mut block_count) } == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok((block_count.saturating_mul(block_size as u64), block_size as u64))
}

#[cfg(windows)]
fn device_geometry(file: &File) -> io::Result<(u64, u64)> {
    use std::ffi::c_void;
    use std::mem::size_of;
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Foundation::HANDLE;
    use windows_sys::Win32::System::IO::DeviceIoControl;
    use windows_sys::Win32::System::Ioctl::{
        DISK_GEOMETRY, GET_LENGTH_INFORMATION, IOCTL_DISK_GET_DRIVE_GEOMETRY,
        IOCTL_DISK_GET_LENGTH_INFO,
    };

    let handle = file.as_raw_handle() as HANDLE;
    let mut returned: u32 = 0;

    let mut length: GET_LENGTH_INFORMATION = unsafe { std::mem::zeroed() };
    let ok = unsafe {
        DeviceIoControl(
            handle,
            IOCTL_DISK_GET_LENGTH_INFO,
            std::ptr::null(),
            0,
            &mut length as *mut _ as *mut c_void,
            size_of::<GET_LENGTH_INFORMATION>() as u32,
            &mut returned,
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }

    let mut geometry: DISK_GEOMETRY = unsafe { std::mem::zeroed() };
    let ok = unsafe {
        DeviceIoControl(
            handle,
            IOCTL_DISK_GET_DRIVE_GEOMETRY,
            std::ptr::null(),
            0,
            &mut geometry as *mut _ as *mut c_void,
            size_of::<DISK_GEOMETRY>() as u32,
            &mut returned,
            std::ptr::null_mut(),
        )
    };
    let sector_size = if ok == 0 { 0 } else { geometry.BytesPerSector as u64 };

    Ok((length.Length.max(0) as u64, sector_size))
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
fn device_geometry(file: &File) -> io::Result<(u64, u64)> {
    use std::io::{Seek, SeekFrom};

    let mut handle = file.try_clone()?;
    let size = handle.seek(SeekFrom::End(0))?;
    handle.seek(SeekFrom::Start(0))?;
    Ok((size, DEFAULT_SECTOR_SIZE))
}

/// Positional read that does not move a shared cursor
#[cfg(unix)]
pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

/// Hints sequential access to the page cache
#[cfg(target_os = "linux")]
pub fn advise_sequential(file: &File) {
    use rustix::fs::{Advice, fadvise};

    let _ = fadvise(file, 0, None, Advice::Sequential);
}

#[cfg(not(target_os = "linux"))]
pub fn advise_sequential(_file: &File) {}
