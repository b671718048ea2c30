//! Convenience wrappers around `std::fs` operations.
//!
//! These exist so call sites can stay terse while still reporting which
//! operation failed. All functions return plain `io::Result` values; layering
//! context onto errors is the caller's job.

use std::io;
use std::path::Path;

/// Read the entire file at `path` into a UTF-8 string.
pub fn read_to_string(path: &Path) -> io::Result<String> {
    std::fs::read_to_string(path)
}

/// Write `contents` to `path`, creating or truncating the file.
pub fn write(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    std::fs::write(path, contents)
}

/// Create `path` and all missing parent directories.
pub fn create_dir_all(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)
}

/// Remove the file at `path`, ignoring a missing file.
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_file_if_exists_tolerates_missing_files() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("missing.txt");
        assert!(remove_file_if_exists(&path).is_ok());

        write(&path, "x").unwrap();
        assert!(remove_file_if_exists(&path).is_ok());
        assert!(!path.exists());
    }
}
