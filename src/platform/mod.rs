//! Platform conventions for self-replacement.
//!
//! Locates the real on-disk executable, recognises application bundles, and
//! provides the per-OS primitives for swapping a file into place and for
//! launching a bundle through the desktop's "open" mechanism. Unix-likes use
//! a single rename; Windows has to move the running image aside first.

use std::path::{Path, PathBuf};

#[cfg(not(windows))]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(not(windows))]
pub(crate) use unix::{open_command, replace_file};
#[cfg(windows)]
pub(crate) use windows::{open_command, replace_file};

/// Name suffix of a directory-shaped application bundle.
pub const BUNDLE_SUFFIX: &str = ".app";

/// Name suffix of a Windows executable.
pub const EXECUTABLE_SUFFIX: &str = ".exe";

/// Returns `true` if the engine can manage executables on this platform.
pub fn is_supported() -> bool {
    cfg!(any(unix, windows))
}

/// Returns the executable suffix for the current platform (`.exe` on Windows,
/// empty elsewhere).
pub fn exe_extension() -> &'static str {
    if cfg!(windows) { EXECUTABLE_SUFFIX } else { "" }
}

/// Returns the real on-disk path of the running executable, with symlinks
/// resolved where the filesystem allows it.
///
/// # Errors
///
/// Returns an error if the OS cannot report the executable path.
pub fn current_exe_path() -> std::io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(std::fs::canonicalize(&exe).unwrap_or(exe))
}

/// Returns `true` if the final component of `path` carries the bundle suffix.
pub fn is_bundle(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(BUNDLE_SUFFIX))
}

/// Returns the nearest ancestor of `path` (including itself) that is a bundle.
///
/// For `/Applications/Foo.app/Contents/MacOS/foo` this is `/Applications/Foo.app`.
pub fn bundle_root(path: &Path) -> Option<PathBuf> {
    path.ancestors().find(|p| is_bundle(p)).map(Path::to_path_buf)
}
