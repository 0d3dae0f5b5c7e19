//! Unix-like platforms: the running image keeps its inode, so a plain rename
//! over the target is atomic and safe.

use std::path::Path;
use std::process::Command;

/// Rename `staged` over `target`. A failed rename drops (and deletes) the
/// staged file and leaves `target` untouched.
pub(crate) fn replace_file(staged: tempfile::NamedTempFile, target: &Path) -> std::io::Result<()> {
    staged.persist(target).map(drop).map_err(|e| e.error)
}

/// Command that hands `path` to the desktop's default opener.
pub(crate) fn open_command(path: &Path) -> Command {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    let mut cmd = Command::new(opener);
    cmd.arg(path);
    cmd
}
