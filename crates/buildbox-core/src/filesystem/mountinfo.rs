//! Reader for the kernel's per-process mount table.
//!
//! Device-id comparison cannot see a bind mount whose source lives on the
//! same filesystem as its mount point. For those, the live table in
//! `/proc/self/mountinfo` is authoritative.

use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

use buildbox_common::constants::MOUNTINFO_PATH;
use buildbox_common::error::{BoxError, Result};

/// Reads the mount points currently visible to this process.
///
/// # Errors
///
/// Returns an error if the mountinfo file cannot be read.
pub fn read_mount_points() -> Result<Vec<PathBuf>> {
    let path = Path::new(MOUNTINFO_PATH);
    let content = std::fs::read_to_string(path).map_err(|e| BoxError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parse_mount_points(&content))
}

/// Extracts the mount point column from mountinfo text.
///
/// Malformed lines are skipped.
#[must_use]
pub fn parse_mount_points(content: &str) -> Vec<PathBuf> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(|field| PathBuf::from(OsString::from_vec(unescape(field))))
        .collect()
}

/// Decodes the octal escapes (`\040`, `\011`, `\012`, `\134`) the kernel
/// uses for whitespace and backslashes in paths.
fn unescape(field: &str) -> Vec<u8> {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, digit| acc * 8 + u32::from(digit - b'0'));
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw
23 22 0:5 / /dev rw,nosuid shared:2 - devtmpfs udev rw
61 22 8:1 /home/alice /srv/box/home/alice rw,relatime shared:1 - ext4 /dev/sda1 rw
62 22 8:1 /data /mnt/my\\040disk rw - ext4 /dev/sda1 rw
garbage
";

    #[test]
    fn parses_mount_point_column() {
        let points = parse_mount_points(SAMPLE);
        assert_eq!(points.len(), 4);
        assert_eq!(points[0], Path::new("/"));
        assert_eq!(points[2], Path::new("/srv/box/home/alice"));
    }

    #[test]
    fn decodes_octal_escapes() {
        let points = parse_mount_points(SAMPLE);
        assert_eq!(points[3], Path::new("/mnt/my disk"));
        assert_eq!(unescape("a\\134b"), b"a\\b");
        assert_eq!(unescape("trailing\\04"), b"trailing\\04");
    }

    #[test]
    fn live_table_contains_root() {
        let points = read_mount_points().unwrap();
        assert!(points.iter().any(|p| p == Path::new("/")));
    }
}
