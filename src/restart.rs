//! Handing control to the freshly installed executable.
//!
//! A restart launches the successor and then settles what happens to the
//! current process:
//!
//! | launch  | exit handler | handoff                                  |
//! |---------|--------------|------------------------------------------|
//! | ok      | none         | [`Handoff::Exit`]: terminate with status 0 |
//! | ok      | set          | [`Handoff::Delegated`]: handler gets `None` |
//! | failed  | none         | [`Handoff::KeepRunning`]: error returned  |
//! | failed  | set          | [`Handoff::Delegated`]: handler gets the error |
//!
//! A failed launch never terminates the process on its own.

use crate::archive::Artifact;
use crate::error::{Result, UpdateError};
use crate::platform;
use std::path::Path;
use std::process::{Command, Stdio};

/// Callback replacing the default process-termination behaviour.
///
/// Receives `None` after a successful launch, or the launch error.
pub type ExitHandler = Box<dyn Fn(Option<&UpdateError>) + Send + Sync>;

/// Terminal transition taken once the successor launch has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// The current process exits with a success status.
    Exit,
    /// The exit handler decides how (or whether) the process ends.
    Delegated,
    /// The current process keeps running and the error is returned.
    KeepRunning,
}

impl Handoff {
    /// Select the transition for a launch outcome.
    pub fn select(launched: bool, has_exit_handler: bool) -> Self {
        match (launched, has_exit_handler) {
            (_, true) => Self::Delegated,
            (true, false) => Self::Exit,
            (false, false) => Self::KeepRunning,
        }
    }
}

/// Launch the successor for `artifact` and settle the current process.
///
/// Bundles are opened through the platform's "open" mechanism; executables
/// are started directly with the current arguments, environment, working
/// directory, and standard streams. `None` relaunches the real path of the
/// running executable.
///
/// Without an exit handler a successful launch terminates this process and
/// this function does not return.
///
/// # Errors
///
/// Returns [`UpdateError::Restart`] if the successor cannot be launched.
pub fn restart(artifact: Option<&Artifact>, exit_handler: Option<&ExitHandler>) -> Result<()> {
    let launched = launch(artifact);
    settle(launched, exit_handler, |code| std::process::exit(code))
}

/// Apply the [`Handoff`] for `launched`. `terminate` performs [`Handoff::Exit`].
pub(crate) fn settle(
    launched: Result<()>,
    exit_handler: Option<&ExitHandler>,
    terminate: impl FnOnce(i32),
) -> Result<()> {
    match Handoff::select(launched.is_ok(), exit_handler.is_some()) {
        Handoff::Delegated => {
            if let Some(handler) = exit_handler {
                handler(launched.as_ref().err());
            }
            launched
        }
        Handoff::Exit => {
            tracing::info!("successor launched, exiting");
            terminate(0);
            launched
        }
        Handoff::KeepRunning => {
            if let Err(e) = &launched {
                tracing::error!("restart failed, keeping current process: {e}");
            }
            launched
        }
    }
}

fn launch(artifact: Option<&Artifact>) -> Result<()> {
    match artifact {
        Some(Artifact::Bundle(path)) => open_bundle(path),
        Some(Artifact::Executable(path)) => spawn_successor(Some(path)),
        None => spawn_successor(None),
    }
}

/// Fire-and-forget: the opened bundle does not depend on this process.
fn open_bundle(path: &Path) -> Result<()> {
    let mut cmd = platform::open_command(path);
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let child = cmd.spawn().map_err(|e| {
        UpdateError::Restart(format!("cannot open bundle {}: {e}", path.display()))
    })?;
    tracing::info!(pid = child.id(), bundle = %path.display(), "bundle opened");
    Ok(())
}

fn spawn_successor(executable: Option<&Path>) -> Result<()> {
    let cwd = std::env::current_dir()
        .map_err(|e| UpdateError::Restart(format!("cannot determine working directory: {e}")))?;

    let executable = match executable {
        Some(path) => path.to_path_buf(),
        None => platform::current_exe_path().map_err(|e| {
            UpdateError::Restart(format!("cannot determine current executable path: {e}"))
        })?,
    };

    let mut args = std::env::args_os();
    let argv0 = args.next();

    let mut cmd = Command::new(&executable);
    cmd.args(args)
        .current_dir(&cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    #[cfg(unix)]
    if let Some(argv0) = argv0 {
        use std::os::unix::process::CommandExt;
        cmd.arg0(argv0);
    }
    #[cfg(not(unix))]
    let _ = argv0;

    let child = cmd.spawn().map_err(|e| {
        UpdateError::Restart(format!("cannot start {}: {e}", executable.display()))
    })?;
    tracing::info!(pid = child.id(), executable = %executable.display(), "successor started");
    Ok(())
}
