//! Output file names.
//!
//! A finished file is called `<YYYYMMDDhhmmss>_<sensor>-<probe>.<suffix>`.
//! The name is claimed up front by creating an empty placeholder; records
//! go to a hidden working file `.<name>` in the same directory, which is
//! renamed over the placeholder when the file is closed.

use fcap_utils::unix_time::compact_timestamp;
use std::fs::OpenOptions;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const SUFFIX_LEN: usize = 6;
const SUFFIX_SPACE: u64 = 36u64.pow(SUFFIX_LEN as u32);
const MAX_ATTEMPTS: u32 = 64;

static NEXT_SUFFIX: AtomicU64 = AtomicU64::new(0);

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = [b'0'; SUFFIX_LEN];
    for slot in out.iter_mut().rev() {
        *slot = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    out.iter().map(|&b| b as char).collect()
}

fn next_suffix() -> String {
    // Offset by pid; daemons sharing a directory start at different names.
    let seed = (std::process::id() as u64).wrapping_mul(7_919);
    base36(seed.wrapping_add(NEXT_SUFFIX.fetch_add(1, Ordering::Relaxed)) % SUFFIX_SPACE)
}

/// Name a file opened at `unix_secs` would get, minus the suffix.
pub fn stem(unix_secs: u64, sensor: &str, probe: &str) -> io::Result<String> {
    let stamp = compact_timestamp(unix_secs).map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
    Ok(format!("{stamp}_{sensor}-{probe}"))
}

/// Creates an empty, uniquely named placeholder in `dir` and returns its
/// path. Existing names are skipped.
pub fn create_placeholder(dir: &Path, stem: &str) -> io::Result<PathBuf> {
    for _ in 0..MAX_ATTEMPTS {
        let path = dir.join(format!("{stem}.{}", next_suffix()));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free name for {stem} in {dir:?}"),
    ))
}

/// The hidden working file that belongs to a placeholder.
pub fn working_path(placeholder: &Path) -> PathBuf {
    let name = placeholder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    placeholder.with_file_name(format!(".{name}"))
}
