//! Installing a fetched payload over the current executable or bundle.
//!
//! Raw payloads are streamed into a sibling temp file next to the target and
//! renamed over it, so readers of the target only ever see the old or the new
//! image. Bundles are relocated next to their install location and swapped in
//! with directory renames. On every failure path the original is left intact.

use crate::archive::Artifact;
use crate::error::{Result, UpdateError};
use crate::platform;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Permission bits given to a newly created executable.
pub const DEFAULT_MODE: u32 = 0o755;

/// Per-cycle install options.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Path to install over. `None` resolves to the running executable.
    /// After a successful apply this names the installed artifact.
    pub target_path: Option<PathBuf>,
    /// Permission bits for the installed file. `None` keeps the existing
    /// target's bits, or [`DEFAULT_MODE`] when there is no existing target.
    pub target_mode: Option<u32>,
}

impl ApplyOptions {
    /// Options targeting an explicit path instead of the running executable.
    pub fn with_target(path: impl Into<PathBuf>) -> Self {
        Self {
            target_path: Some(path.into()),
            target_mode: None,
        }
    }

    fn resolve_target(&self) -> Result<PathBuf> {
        match &self.target_path {
            Some(path) => Ok(path.clone()),
            None => platform::current_exe_path().map_err(|e| {
                UpdateError::Apply(format!("cannot determine current executable path: {e}"))
            }),
        }
    }
}

/// Write `reader` to disk as the new executable.
///
/// The bytes go to a temp file in the target's directory, receive their
/// permission bits, are flushed to disk, and are then renamed over the target.
///
/// # Errors
///
/// Returns [`UpdateError::Apply`] if the target cannot be resolved, the stream
/// fails, or the replacement is refused (permissions, disk full, locked file).
pub fn apply(mut reader: impl Read, opts: &mut ApplyOptions) -> Result<()> {
    let target = opts.resolve_target()?;
    let dir = parent_dir(&target);
    let name = file_name(&target)?;
    let mode = install_mode(&target, opts.target_mode);

    let mut staged = tempfile::Builder::new()
        .prefix(&format!(".{name}.new-"))
        .tempfile_in(dir)
        .map_err(|e| {
            UpdateError::Apply(format!("cannot create temp file in {}: {e}", dir.display()))
        })?;

    std::io::copy(&mut reader, staged.as_file_mut()).map_err(|e| {
        UpdateError::Apply(format!(
            "cannot write new executable to {}: {e}",
            staged.path().display()
        ))
    })?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| UpdateError::Apply(format!("cannot flush new executable: {e}")))?;
    set_mode(staged.path(), mode)?;

    platform::replace_file(staged, &target).map_err(|e| {
        UpdateError::Apply(format!("cannot replace {}: {e}", target.display()))
    })?;
    clear_quarantine(&target);

    tracing::info!(target = %target.display(), "executable updated");
    opts.target_path = Some(target);
    Ok(())
}

/// Install the extracted bundle directory `bundle`.
///
/// The install location is, in order: an explicit bundle-suffixed
/// `target_path`; the bundle enclosing the running executable; or a sibling
/// of the running executable named after `bundle`. Any bundle already there
/// is replaced.
///
/// # Errors
///
/// Returns [`UpdateError::Apply`] if the bundle cannot be staged next to the
/// install location or the swap is refused.
pub fn apply_bundle(bundle: &Path, opts: &mut ApplyOptions) -> Result<()> {
    let target = bundle_target(bundle, opts)?;
    let parent = parent_dir(&target);
    let name = file_name(&target)?;
    let staging = parent.join(format!(".{name}.new-{}", std::process::id()));

    if staging.exists() {
        remove_path(&staging);
    }
    relocate(bundle, &staging)?;
    swap_dirs(&staging, &target)?;
    clear_quarantine(&target);

    tracing::info!(target = %target.display(), "bundle updated");
    opts.target_path = Some(target);
    Ok(())
}

/// Install an artifact chosen from an archive.
///
/// # Errors
///
/// Returns [`UpdateError::Apply`] if the artifact cannot be read or installed.
pub fn apply_artifact(artifact: &Artifact, opts: &mut ApplyOptions) -> Result<()> {
    match artifact {
        Artifact::Bundle(path) => apply_bundle(path, opts),
        Artifact::Executable(path) => {
            let file = fs::File::open(path).map_err(|e| {
                UpdateError::Apply(format!(
                    "failed to open extracted file {}: {e}",
                    path.display()
                ))
            })?;
            apply(file, opts)
        }
    }
}

fn bundle_target(bundle: &Path, opts: &ApplyOptions) -> Result<PathBuf> {
    if let Some(target) = &opts.target_path {
        if platform::is_bundle(target) {
            return Ok(target.clone());
        }
    }

    let exe = opts.resolve_target()?;
    if let Some(root) = platform::bundle_root(&exe) {
        return Ok(root);
    }

    let name = bundle.file_name().ok_or_else(|| {
        UpdateError::Apply(format!("bundle path {} has no name", bundle.display()))
    })?;
    Ok(parent_dir(&exe).join(name))
}

/// Move `from` to `to`, copying when they sit on different filesystems.
fn relocate(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            tracing::debug!(
                from = %from.display(),
                to = %to.display(),
                "copying bundle across filesystems"
            );
            if let Err(e) = copy_dir_all(from, to) {
                remove_path(to);
                return Err(UpdateError::Apply(format!(
                    "cannot stage bundle at {}: {e}",
                    to.display()
                )));
            }
            remove_path(from);
            Ok(())
        }
        Err(e) => Err(UpdateError::Apply(format!(
            "cannot stage bundle {} at {}: {e}",
            from.display(),
            to.display()
        ))),
    }
}

/// Replace `target` with `staging`, restoring the original if the final
/// rename fails.
fn swap_dirs(staging: &Path, target: &Path) -> Result<()> {
    if !target.exists() {
        return fs::rename(staging, target).map_err(|e| {
            remove_path(staging);
            UpdateError::Apply(format!("cannot install bundle at {}: {e}", target.display()))
        });
    }

    let old = parent_dir(target).join(format!(
        ".{}.old-{}",
        file_name(target)?,
        std::process::id()
    ));
    if old.exists() {
        remove_path(&old);
    }

    if let Err(e) = fs::rename(target, &old) {
        remove_path(staging);
        return Err(UpdateError::Apply(format!(
            "cannot move existing bundle {} aside: {e}",
            target.display()
        )));
    }

    if let Err(e) = fs::rename(staging, target) {
        if let Err(restore) = fs::rename(&old, target) {
            tracing::error!(
                old = %old.display(),
                target = %target.display(),
                "cannot restore previous bundle: {restore}"
            );
        }
        remove_path(staging);
        return Err(UpdateError::Apply(format!(
            "cannot install bundle at {}: {e}",
            target.display()
        )));
    }

    if let Err(e) = fs::remove_dir_all(&old) {
        tracing::warn!(path = %old.display(), "cannot remove previous bundle: {e}");
    }
    Ok(())
}

fn copy_dir_all(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_all(&src, &dst)?;
        } else if file_type.is_symlink() {
            copy_symlink(&src, &dst)?;
        } else {
            fs::copy(&src, &dst)?;
        }
    }
    fs::set_permissions(to, fs::metadata(from)?.permissions())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::copy(src, dst).map(drop)
}

fn remove_path(path: &Path) {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(e) = result {
        tracing::debug!(path = %path.display(), "cleanup failed: {e}");
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| UpdateError::Apply(format!("target {} has no file name", path.display())))
}

fn install_mode(target: &Path, requested: Option<u32>) -> u32 {
    if let Some(mode) = requested {
        return mode;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = fs::metadata(target) {
            let mode = meta.permissions().mode() & 0o7777;
            // The installed file must stay executable.
            if mode & 0o111 == 0 {
                return mode | 0o111;
            }
            return mode;
        }
    }
    #[cfg(not(unix))]
    let _ = target;
    DEFAULT_MODE
}

/// Set permission bits on Unix platforms.
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
            UpdateError::Apply(format!(
                "cannot set executable permission on {}: {e}",
                path.display()
            ))
        })?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}

/// Clear the macOS quarantine attribute so Gatekeeper does not block the
/// relaunch.
fn clear_quarantine(path: &Path) {
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("xattr")
            .arg("-cr")
            .arg(path)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
    }
    #[cfg(not(target_os = "macos"))]
    let _ = path;
}
