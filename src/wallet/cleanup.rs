//! Working directory ownership and teardown

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Remove `root` and everything below it.
///
/// Every entry is attempted even after a failure; the first error and the
/// number of failed entries are reported as a `CleanupFailure`.
pub fn recursive_delete(root: &Path) -> Result<()> {
    delete_with(root, &mut |path, kind| match kind {
        EntryKind::File => fs::remove_file(path),
        EntryKind::Dir => fs::remove_dir(path),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
}

type Remover<'a> = dyn FnMut(&Path, EntryKind) -> io::Result<()> + 'a;

fn delete_with(root: &Path, remove: &mut Remover<'_>) -> Result<()> {
    let mut report = DeleteReport::default();
    delete_tree(root, remove, &mut report);

    match report.first_error {
        None => {
            debug!("Removed {}", root.display());
            Ok(())
        }
        Some(first) => Err(Error::CleanupFailure(format!(
            "{} entr{} under {} could not be removed, first error: {}",
            report.failures,
            if report.failures == 1 { "y" } else { "ies" },
            root.display(),
            first
        ))),
    }
}

#[derive(Default)]
struct DeleteReport {
    failures: usize,
    first_error: Option<String>,
}

impl DeleteReport {
    fn record(&mut self, path: &Path, err: io::Error) {
        debug!("Failed to remove {}: {}", path.display(), err);
        self.failures += 1;
        if self.first_error.is_none() {
            self.first_error = Some(format!("{}: {}", path.display(), err));
        }
    }
}

fn delete_tree(path: &Path, remove: &mut Remover<'_>, report: &mut DeleteReport) {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => return report.record(path, e),
    };

    if !metadata.is_dir() {
        if let Err(e) = remove(path, EntryKind::File) {
            report.record(path, e);
        }
        return;
    }

    match fs::read_dir(path) {
        Ok(entries) => {
            for entry in entries {
                match entry {
                    Ok(entry) => delete_tree(&entry.path(), remove, report),
                    Err(e) => report.record(path, e),
                }
            }
        }
        Err(e) => report.record(path, e),
    }

    if let Err(e) = remove(path, EntryKind::Dir) {
        report.record(path, e);
    }
}

/// An ephemeral directory owned by the current run.
///
/// `close` performs the teardown and reports failures to the caller. A
/// `WorkDir` dropped without `close` still tears down, logging any failure.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    delete_on_exit: bool,
    released: bool,
}

impl WorkDir {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            delete_on_exit: true,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delete_on_exit(&self) -> bool {
        self.delete_on_exit
    }

    pub(crate) fn set_delete_on_exit(&mut self, delete_on_exit: bool) {
        self.delete_on_exit = delete_on_exit;
    }

    /// Tear the directory down now. Runs at most once.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        if self.delete_on_exit {
            recursive_delete(&self.path)
        } else {
            info!("Keeping wallet directory {}", self.path.display());
            Ok(())
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("Wallet directory teardown failed: {}", e);
        }
    }
}
