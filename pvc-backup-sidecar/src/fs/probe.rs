//! Existence and kind checks for filesystem paths.

use std::io::ErrorKind;
use std::path::Path;

/// Checks whether `path` points to an existing directory.
///
/// A missing path is not an error; any other stat failure is.
pub fn is_dir(path: &Path) -> std::io::Result<bool> {
    match std::fs::metadata(path) {
        Ok(metadata) => Ok(metadata.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Checks whether `path` points to an existing regular file.
///
/// Returns an error if something other than a regular file is found.
pub fn file_exists(path: &Path) -> std::io::Result<bool> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(true),
        Ok(_) => Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("{} is not a file", path.display()),
        )),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
