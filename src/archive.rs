//! Archive unpacking and root-artifact selection.
//!
//! An archive payload is buffered into memory, extracted into a fresh
//! scratch directory under the system temp dir, and classified while it is
//! walked. Three rules pick the root artifact, evaluated for every entry in
//! the archive's own entry-table order:
//!
//! 1. a directory whose name ends in [`BUNDLE_SUFFIX`] becomes a bundle root;
//! 2. a file whose name ends in [`EXECUTABLE_SUFFIX`] becomes an executable root;
//! 3. a file at the archive's top level becomes an executable root.
//!
//! The walk never stops early, so the last matching entry wins. A top-level
//! file listed after a bundle therefore replaces it as the root.

use crate::error::{Result, UpdateError};
use crate::platform::{self, BUNDLE_SUFFIX, EXECUTABLE_SUFFIX};
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// The single installable unit chosen from a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// A directory-shaped application bundle, relocated and opened as a unit.
    Bundle(PathBuf),
    /// A single executable file.
    Executable(PathBuf),
}

impl Artifact {
    /// Classify `path` by name: bundle-suffixed paths are bundles, anything
    /// else is an executable file.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if platform::is_bundle(&path) {
            Self::Bundle(path)
        } else {
            Self::Executable(path)
        }
    }

    /// Location of the artifact on disk.
    pub fn path(&self) -> &Path {
        match self {
            Self::Bundle(path) | Self::Executable(path) => path,
        }
    }

    /// Returns `true` for bundle artifacts.
    pub fn is_bundle(&self) -> bool {
        matches!(self, Self::Bundle(_))
    }
}

/// An extracted archive: the scratch directory and the chosen root artifact.
///
/// Dropping this removes the scratch directory. Call [`keep`](Self::keep) to
/// retain it on disk, e.g. for diagnosing a failed install.
#[derive(Debug)]
pub struct Unpacked {
    scratch: TempDir,
    root: Option<Artifact>,
}

impl Unpacked {
    /// Directory the archive was extracted into.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Root artifact, or `None` if no entry matched any rule.
    pub fn root(&self) -> Option<&Artifact> {
        self.root.as_ref()
    }

    /// Leave the scratch directory on disk and return its path.
    pub fn keep(self) -> PathBuf {
        self.scratch.keep()
    }
}

/// Buffer `reader` fully, then extract it into a new scratch directory.
///
/// On extraction failure the scratch directory is retained and its path
/// logged.
///
/// # Errors
///
/// Returns [`UpdateError::Archive`] if the stream cannot be read, the archive
/// cannot be indexed, or any entry fails to extract.
pub fn unpack(mut reader: impl Read) -> Result<Unpacked> {
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|e| UpdateError::Archive(format!("cannot read archive stream: {e}")))?;

    let scratch = tempfile::Builder::new()
        .prefix("selfupdate-")
        .tempdir()
        .map_err(|e| UpdateError::Archive(format!("cannot create scratch directory: {e}")))?;

    match extract_to(&data, scratch.path()) {
        Ok(root) => {
            tracing::debug!(
                scratch = %scratch.path().display(),
                root = ?root.as_ref().map(Artifact::path),
                "archive extracted"
            );
            Ok(Unpacked { scratch, root })
        }
        Err(e) => {
            let kept = scratch.keep();
            tracing::warn!(
                scratch = %kept.display(),
                "archive extraction failed, scratch retained"
            );
            Err(e)
        }
    }
}

/// Extract the archive in `data` under `dest`, returning the root artifact.
///
/// Relative structure and Unix permission bits are preserved. Directory
/// permissions are applied after every entry is written so that read-only
/// directories do not block their own contents.
///
/// # Errors
///
/// Returns [`UpdateError::Archive`] for malformed archives, entries whose
/// names escape `dest`, and any I/O failure while extracting.
pub fn extract_to(data: &[u8], dest: &Path) -> Result<Option<Artifact>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| UpdateError::Archive(format!("cannot index archive: {e}")))?;

    let mut root = None;
    let mut dir_modes = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| UpdateError::Archive(format!("cannot read entry #{index}: {e}")))?;

        let name = entry.name().to_owned();
        let relative = entry.enclosed_name().ok_or_else(|| {
            UpdateError::Archive(format!("entry {name:?} escapes the extraction directory"))
        })?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| {
                UpdateError::Archive(format!(
                    "cannot create directory {}: {e}",
                    out_path.display()
                ))
            })?;
            if let Some(mode) = entry.unix_mode() {
                dir_modes.push((out_path.clone(), mode));
            }
            if name.trim_end_matches('/').ends_with(BUNDLE_SUFFIX) {
                root = Some(Artifact::Bundle(out_path));
            }
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                UpdateError::Archive(format!("cannot create directory {}: {e}", parent.display()))
            })?;
        }

        let mut file = create_file(&out_path, entry.unix_mode())?;
        std::io::copy(&mut entry, &mut file).map_err(|e| {
            UpdateError::Archive(format!("cannot extract {}: {e}", out_path.display()))
        })?;
        drop(file);
        set_mode(&out_path, entry.unix_mode())?;

        if name.ends_with(EXECUTABLE_SUFFIX) {
            root = Some(Artifact::Executable(out_path.clone()));
        }
        if !name.contains('/') {
            root = Some(Artifact::Executable(out_path));
        }
    }

    for (path, mode) in dir_modes.into_iter().rev() {
        set_mode(&path, Some(mode))?;
    }

    Ok(root)
}

fn create_file(path: &Path, mode: Option<u32>) -> Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode & 0o777);
    }
    #[cfg(not(unix))]
    let _ = mode;

    options
        .open(path)
        .map_err(|e| UpdateError::Archive(format!("cannot create {}: {e}", path.display())))
}

/// Apply archived permission bits, bypassing the process umask.
fn set_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777)).map_err(|e| {
            UpdateError::Archive(format!("cannot set permissions on {}: {e}", path.display()))
        })?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}
