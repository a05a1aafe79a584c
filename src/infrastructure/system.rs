//! Host probes: CPU count, memory budget and free disk space.

use std::path::Path;

/// Detect the number of logical CPU cores.
///
/// Falls back to 4 if detection fails.
#[must_use]
pub fn detect_cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}

/// Detect total system memory in bytes.
///
/// Reads `/proc/meminfo`; other platforms, or a parse failure, get 1 GiB.
#[cfg(target_os = "linux")]
#[must_use]
pub fn detect_total_memory() -> u64 {
    std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|content| parse_mem_total(&content))
        .unwrap_or(FALLBACK_MEMORY)
}

#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn detect_total_memory() -> u64 {
    FALLBACK_MEMORY
}

const FALLBACK_MEMORY: u64 = 1024 * 1024 * 1024;

/// Extracts `MemTotal` (reported in kB) from `/proc/meminfo` content.
fn parse_mem_total(content: &str) -> Option<u64> {
    let line = content.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kb = line.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    Some(kb * 1024)
}

/// Bytes available to unprivileged writers on the filesystem holding `path`.
///
/// # Errors
/// Returns the OS error if the filesystem cannot be queried.
#[cfg(unix)]
pub fn usable_space(path: &Path) -> std::io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // SAFETY: statvfs is plain old data; an all-zero value is valid.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat is a valid out-pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }

    #[allow(clippy::unnecessary_cast)]
    let available = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
    Ok(available)
}

/// Platforms without `statvfs` report unlimited space.
///
/// # Errors
/// Never fails.
#[cfg(not(unix))]
pub fn usable_space(_path: &Path) -> std::io::Result<u64> {
    Ok(u64::MAX)
}
