//! Wallet archive extraction

use super::cleanup::WorkDir;
use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

/// Name of the verbatim archive copy inside the working directory
pub const ARCHIVE_COPY: &str = "wallet.zip";

const WORKDIR_PREFIX: &str = "cloud_wallet";

/// Unpack `archive` into a fresh directory under the system temp dir.
pub fn extract(archive: &Path) -> Result<WorkDir> {
    extract_in(archive, &std::env::temp_dir())
}

/// Unpack `archive` into a fresh, uniquely named directory under `parent`.
///
/// The archive is first copied into the directory, then every entry is
/// written below it using the entry name as a relative path. Entries that
/// would land outside the directory are rejected. On any failure the
/// partially populated directory is removed before returning.
pub fn extract_in(archive: &Path, parent: &Path) -> Result<WorkDir> {
    let mut source = File::open(archive)
        .map_err(|e| Error::IoFailure(format!("Cannot read {}: {}", archive.display(), e)))?;

    let dir = tempfile::Builder::new()
        .prefix(WORKDIR_PREFIX)
        .tempdir_in(parent)
        .map_err(|e| {
            Error::IoFailure(format!("Cannot create working directory in {}: {}", parent.display(), e))
        })?;
    let workdir = WorkDir::new(dir.keep());
    debug!("Created wallet directory {}", workdir.path().display());

    let copy_path = workdir.path().join(ARCHIVE_COPY);
    {
        let mut copy = create_new(&copy_path)?;
        io::copy(&mut source, &mut copy)
            .map_err(|e| Error::IoFailure(format!("Cannot copy {}: {}", archive.display(), e)))?;
    }

    let reader = File::open(&copy_path)
        .map_err(|e| Error::IoFailure(format!("Cannot reopen {}: {}", copy_path.display(), e)))?;
    let mut zip = ZipArchive::new(BufReader::new(reader))?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let relative: PathBuf = entry.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
            Error::IoFailure(format!("Entry '{}' escapes the wallet directory", entry.name()))
        })?;
        let target = workdir.path().join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| Error::IoFailure(format!("Cannot create {}: {}", target.display(), e)))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::IoFailure(format!("Cannot create {}: {}", parent.display(), e)))?;
        }

        let mut out = create_new(&target)?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| Error::IoFailure(format!("Cannot write {}: {}", target.display(), e)))?;
        debug!("Extracted {}", relative.display());
    }

    Ok(workdir)
}

fn create_new(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| Error::IoFailure(format!("Cannot create {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, FileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, FileOptions::default()).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        let bytes = writer.finish().unwrap().into_inner();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_extract_preserves_relative_paths() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("Wallet_bench.zip");
        write_zip(
            &archive,
            &[
                ("tnsnames.ora", b"bench_high = (DESCRIPTION=)"),
                ("conf/", b""),
                ("conf/sqlnet.ora", b"WALLET_LOCATION = ?"),
            ],
        );

        let workdir = extract_in(&archive, scratch.path()).unwrap();
        let root = workdir.path().to_path_buf();

        assert!(root.file_name().unwrap().to_string_lossy().starts_with(WORKDIR_PREFIX));
        assert!(root.join(ARCHIVE_COPY).is_file());
        assert_eq!(fs::read(root.join("tnsnames.ora")).unwrap(), b"bench_high = (DESCRIPTION=)");
        assert!(root.join("conf/sqlnet.ora").is_file());

        workdir.close().unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_each_extraction_gets_its_own_directory() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("wallet.zip");
        write_zip(&archive, &[("ewallet.p12", b"p12")]);

        let first = extract_in(&archive, scratch.path()).unwrap();
        let second = extract_in(&archive, scratch.path()).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_missing_archive_is_io_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let result = extract_in(&scratch.path().join("absent.zip"), scratch.path());
        assert!(matches!(result, Err(Error::IoFailure(_))));
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_not_a_zip_is_io_failure_and_cleans_up() {
        let scratch = tempfile::tempdir().unwrap();
        let bogus = scratch.path().join("bogus.zip");
        fs::write(&bogus, b"definitely not a zip").unwrap();

        let result = extract_in(&bogus, scratch.path());
        assert!(matches!(result, Err(Error::IoFailure(_))));
        // only the source file remains
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_path_traversal_is_rejected() {
        let scratch = tempfile::tempdir().unwrap();
        let parent = scratch.path().join("tmp");
        fs::create_dir(&parent).unwrap();
        let archive = scratch.path().join("evil.zip");
        write_zip(&archive, &[("ok.txt", b"fine"), ("../escaped.txt", b"nope")]);

        let result = extract_in(&archive, &parent);
        assert!(matches!(result, Err(Error::IoFailure(_))));
        assert!(!scratch.path().join("escaped.txt").exists());
        assert_eq!(fs::read_dir(&parent).unwrap().count(), 0);
    }
}
