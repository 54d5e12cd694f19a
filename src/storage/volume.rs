//! Free/used/total figures for the volume holding a directory

use crate::storage::Capacity;
use std::io;
use std::path::Path;

#[cfg(unix)]
pub fn volume_capacity(path: &Path) -> io::Result<Capacity> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    let frsize = stat.f_frsize as u64;
    let blocks = stat.f_blocks as u64;
    let total = blocks * frsize;
    // Same split as `df`: used counts reserved blocks, free is what we may write
    let used = blocks.saturating_sub(stat.f_bfree as u64) * frsize;
    let free = stat.f_bavail as u64 * frsize;

    Ok(Capacity { total, used, free })
}

#[cfg(not(unix))]
pub fn volume_capacity(path: &Path) -> io::Result<Capacity> {
    use sysinfo::Disks;

    let path = path.canonicalize()?;
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no volume found for {:?}", path))
        })?;

    let total = disk.total_space();
    let free = disk.available_space();
    Ok(Capacity {
        total,
        used: total.saturating_sub(free),
        free,
    })
}

/// Sum of regular-file sizes directly inside `dir`
pub fn directory_usage(dir: &Path) -> io::Result<u64> {
    let mut used = 0u64;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            used += meta.len();
        }
    }
    Ok(used)
}
