//! Windows: a running executable cannot be overwritten or deleted, but it can
//! be renamed. The old image is moved aside before the new one takes its name.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Move `target` aside, then rename `staged` into its place. If the second
/// step fails the original is renamed back.
pub(crate) fn replace_file(staged: tempfile::NamedTempFile, target: &Path) -> std::io::Result<()> {
    if !target.exists() {
        return staged.persist(target).map(drop).map_err(|e| e.error);
    }

    let old = aside_path(target);
    // A leftover from a previous cycle is no longer running.
    let _ = std::fs::remove_file(&old);
    std::fs::rename(target, &old)?;

    if let Err(e) = staged.persist(target) {
        if let Err(restore) = std::fs::rename(&old, target) {
            tracing::error!(
                old = %old.display(),
                target = %target.display(),
                "cannot restore previous executable: {restore}"
            );
        }
        return Err(e.error);
    }

    // Fails while the old image is still executing; the next cycle removes it.
    if let Err(e) = std::fs::remove_file(&old) {
        tracing::debug!(path = %old.display(), "old executable left aside: {e}");
    }
    Ok(())
}

fn aside_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.old"))
}

/// Command that hands `path` to the shell's `start` verb.
pub(crate) fn open_command(path: &Path) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", ""]).arg(path);
    cmd
}
