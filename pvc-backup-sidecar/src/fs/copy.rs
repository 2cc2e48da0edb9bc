//! File copy used by WAL archive and restore.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Copies `src` to `dst`.
///
/// If both already refer to the same file nothing happens. Otherwise a hard
/// link is attempted first, falling back to copying the contents (which
/// replaces an existing destination). Missing parent directories of `dst`
/// are created.
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    let src_metadata = fs::metadata(src)?;
    if !src_metadata.is_file() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("non-regular source file {}", src.display()),
        ));
    }

    match fs::metadata(dst) {
        Ok(dst_metadata) => {
            if !dst_metadata.is_file() {
                return Err(io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("non-regular destination file {}", dst.display()),
                ));
            }
            if same_file(&src_metadata, &dst_metadata) {
                return Ok(());
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        Err(e) => return Err(e),
    }

    if fs::hard_link(src, dst).is_ok() {
        return Ok(());
    }

    copy_contents(src, dst)
}

fn copy_contents(src: &Path, dst: &Path) -> io::Result<()> {
    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, File::open(src)?);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, File::create(dst)?);

    io::copy(&mut reader, &mut writer)?;
    writer.flush()?;

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

#[cfg(unix)]
fn same_file(a: &fs::Metadata, b: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(_a: &fs::Metadata, _b: &fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_creates_parent_directories() -> io::Result<()> {
        let dir = TempDir::new()?;
        let src = dir.path().join("src");
        let dst = dir.path().join("a/b/c/dst");
        fs::write(&src, b"segment")?;

        copy_file(&src, &dst)?;

        assert_eq!(fs::read(&dst)?, b"segment");
        Ok(())
    }

    #[test]
    fn test_copy_is_idempotent() -> io::Result<()> {
        let dir = TempDir::new()?;
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::write(&src, b"segment")?;

        copy_file(&src, &dst)?;
        copy_file(&src, &dst)?;

        assert_eq!(fs::read(&dst)?, b"segment");
        Ok(())
    }

    #[test]
    fn test_copy_replaces_existing_destination() -> io::Result<()> {
        let dir = TempDir::new()?;
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::write(&src, b"new")?;
        fs::write(&dst, b"old")?;

        copy_file(&src, &dst)?;

        assert_eq!(fs::read(&dst)?, b"new");
        Ok(())
    }

    #[test]
    fn test_copy_rejects_directory_source() -> io::Result<()> {
        let dir = TempDir::new()?;
        let err = copy_file(dir.path(), &dir.path().join("dst")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        Ok(())
    }

    #[test]
    fn test_copy_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = copy_file(&dir.path().join("missing"), &dir.path().join("dst")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
