//! SQLite header detection for `.static` resources

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Header string every SQLite 3 database starts with
pub const SQLITE_MAGIC: [u8; 16] = *b"SQLite format 3\0";

/// Number of bytes inspected
pub const MAGIC_LEN: usize = SQLITE_MAGIC.len();

/// Check if data starts with the SQLite header
pub fn is_sqlite(data: &[u8]) -> bool {
    data.len() >= MAGIC_LEN && data[..MAGIC_LEN] == SQLITE_MAGIC
}

/// Check a file on disk; unreadable files are treated as non-matches
pub fn sniff_file(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut header = Vec::with_capacity(MAGIC_LEN);
    match file.take(MAGIC_LEN as u64).read_to_end(&mut header) {
        Ok(_) => is_sqlite(&header),
        Err(_) => false,
    }
}
