//! Update orchestration.
//!
//! [`Updater::check_now`] runs one full cycle (consent, fetch, unpack, apply,
//! restart) while holding the updater's guard, so concurrent callers queue up
//! behind each other instead of racing on the installed executable.

use crate::apply::{ApplyOptions, apply, apply_artifact};
use crate::archive::{Artifact, unpack};
use crate::error::{Result, UpdateError};
use crate::platform;
use crate::progress::{ProgressCallback, ProgressEvent, ProgressReader};
use crate::restart::{ExitHandler, restart};
use crate::source::Source;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Message passed to the upgrade consent callback.
pub const UPGRADE_MESSAGE: &str = "New version found";

/// Consent callback asked before fetching. Receives a human-readable message.
pub type UpgradeConfirm = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Callback asked before restarting.
pub type RestartConfirm = Box<dyn Fn() -> bool + Send + Sync>;

/// What happens to the extraction scratch directory of an archive payload.
///
/// A failed cycle always retains it for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScratchPolicy {
    /// Delete the scratch directory once the artifact is installed.
    #[default]
    RemoveOnSuccess,
    /// Leave the scratch directory on disk.
    Keep,
}

/// Immutable setup for an [`Updater`].
pub struct Config {
    /// Run one cycle in the background as soon as the updater is managed.
    pub fetch_on_start: bool,
    /// The payload is an archive rather than a raw executable.
    pub zip: bool,
    /// Where the payload comes from.
    pub source: Box<dyn Source>,
    /// Asked before fetching; `false` ends the cycle with no changes.
    pub upgrade_confirm: Option<UpgradeConfirm>,
    /// Asked before restarting. The answer is logged but does not gate the
    /// restart.
    pub restart_confirm: Option<RestartConfirm>,
    /// Replaces the default process termination after a restart attempt.
    pub exit_handler: Option<ExitHandler>,
    /// Install location. `None` resolves to the running executable.
    pub target: Option<PathBuf>,
    /// Scratch directory handling for archive payloads.
    pub scratch: ScratchPolicy,
    /// Receives progress events.
    pub progress: Option<ProgressCallback>,
    /// Draw an `indicatif` progress bar while downloading.
    pub progress_bar: bool,
}

impl Config {
    /// Configuration fetching from `source` with every option at its default.
    pub fn new(source: impl Source + 'static) -> Self {
        Self {
            fetch_on_start: false,
            zip: false,
            source: Box::new(source),
            upgrade_confirm: None,
            restart_confirm: None,
            exit_handler: None,
            target: None,
            scratch: ScratchPolicy::default(),
            progress: None,
            progress_bar: true,
        }
    }

    /// Run one cycle in the background at setup.
    #[must_use]
    pub fn with_fetch_on_start(mut self, fetch_on_start: bool) -> Self {
        self.fetch_on_start = fetch_on_start;
        self
    }

    /// Treat the payload as an archive.
    #[must_use]
    pub fn with_zip(mut self, zip: bool) -> Self {
        self.zip = zip;
        self
    }

    /// Ask for consent before fetching.
    #[must_use]
    pub fn with_upgrade_confirm(
        mut self,
        confirm: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.upgrade_confirm = Some(Box::new(confirm));
        self
    }

    /// Ask before restarting.
    #[must_use]
    pub fn with_restart_confirm(
        mut self,
        confirm: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.restart_confirm = Some(Box::new(confirm));
        self
    }

    /// Handle process exit after a restart attempt.
    #[must_use]
    pub fn with_exit_handler(
        mut self,
        handler: impl Fn(Option<&UpdateError>) + Send + Sync + 'static,
    ) -> Self {
        self.exit_handler = Some(Box::new(handler));
        self
    }

    /// Install over `target` instead of the running executable.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the scratch directory policy.
    #[must_use]
    pub fn with_scratch(mut self, scratch: ScratchPolicy) -> Self {
        self.scratch = scratch;
        self
    }

    /// Receive progress events.
    #[must_use]
    pub fn with_progress(
        mut self,
        callback: impl Fn(ProgressEvent) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Enable or disable the terminal progress bar.
    #[must_use]
    pub fn with_progress_bar(mut self, progress_bar: bool) -> Self {
        self.progress_bar = progress_bar;
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(cb) = &self.progress {
            cb(event);
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("fetch_on_start", &self.fetch_on_start)
            .field("zip", &self.zip)
            .field("upgrade_confirm", &self.upgrade_confirm.is_some())
            .field("restart_confirm", &self.restart_confirm.is_some())
            .field("exit_handler", &self.exit_handler.is_some())
            .field("target", &self.target)
            .field("scratch", &self.scratch)
            .field("progress_bar", &self.progress_bar)
            .finish_non_exhaustive()
    }
}

/// Result of a cycle that returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The upgrade consent callback declined; nothing changed.
    Declined,
    /// The artifact was installed and the restart handed to the exit handler.
    Installed(Artifact),
}

/// Manages the update cycle of one application.
pub struct Updater {
    config: Config,
    /// Cycle guard; holds the artifact installed by the last successful cycle.
    installed: Mutex<Option<Artifact>>,
}

impl Updater {
    /// Create an updater without starting any background work.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            installed: Mutex::new(None),
        }
    }

    /// Set up an updater for the running application.
    ///
    /// When `fetch_on_start` is set, one cycle runs on a background thread;
    /// its failure is logged and never affects the caller.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::NotSupported`] if this platform cannot be managed,
    /// or an I/O error if the background thread cannot be spawned.
    pub fn manage(config: Config) -> Result<Arc<Self>> {
        if !platform::is_supported() {
            return Err(UpdateError::NotSupported);
        }

        let updater = Arc::new(Self::new(config));
        if updater.config.fetch_on_start {
            let background = Arc::clone(&updater);
            std::thread::Builder::new()
                .name("selfupdate-fetch-on-start".to_owned())
                .spawn(move || {
                    if let Err(e) = background.check_now() {
                        tracing::error!("upgrade error: {e}");
                    }
                })?;
        }
        Ok(updater)
    }

    /// The configuration this updater was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Artifact installed by the most recent successful cycle.
    pub fn installed(&self) -> Option<Artifact> {
        self.lock().clone()
    }

    /// Run one update cycle now.
    ///
    /// Blocks while another cycle on this updater is in progress. Without an
    /// exit handler a successful cycle ends by terminating the process.
    ///
    /// # Errors
    ///
    /// Returns the first fetch, archive, apply, or restart error. Declined
    /// consent is not an error.
    pub fn check_now(&self) -> Result<CheckOutcome> {
        let mut installed = self.lock();

        if let Some(ask) = &self.config.upgrade_confirm {
            if !ask(UPGRADE_MESSAGE) {
                tracing::info!("the user didn't confirm the upgrade");
                return Ok(CheckOutcome::Declined);
            }
        }

        let payload = self.config.source.get()?;
        let length = payload.length();
        let reader = ProgressReader::new(
            payload,
            length,
            self.config.progress_bar,
            self.config.progress.as_ref(),
        );

        let artifact = if self.config.zip {
            self.apply_archive(reader)?
        } else {
            let mut opts = self.apply_options();
            apply(reader, &mut opts)?;
            installed_artifact(opts, false)?
        };
        self.config.emit(ProgressEvent::Installed {
            target: artifact.path().to_path_buf(),
        });
        *installed = Some(artifact.clone());

        if let Some(ask) = &self.config.restart_confirm {
            let confirmed = ask();
            tracing::info!(confirmed, "restart confirmation answered");
        }

        restart(Some(&artifact), self.config.exit_handler.as_ref())?;
        Ok(CheckOutcome::Installed(artifact))
    }

    /// Relaunch into the artifact installed by the last cycle, or the running
    /// executable if none was installed. Lets a host apply now and restart
    /// later.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Restart`] if the successor cannot be launched.
    pub fn restart(&self) -> Result<()> {
        let installed = self.lock();
        let fallback = self.config.target.clone().map(Artifact::from_path);
        restart(
            installed.as_ref().or(fallback.as_ref()),
            self.config.exit_handler.as_ref(),
        )
    }

    fn apply_archive(&self, reader: impl std::io::Read) -> Result<Artifact> {
        let unpacked = unpack(reader)?;
        let Some(root) = unpacked.root().cloned() else {
            let kept = unpacked.keep();
            tracing::warn!(
                scratch = %kept.display(),
                "archive has no root artifact, scratch retained"
            );
            return Err(UpdateError::Archive(
                "archive contains no root artifact to apply".to_owned(),
            ));
        };
        self.config.emit(ProgressEvent::Extracted {
            root: root.path().to_path_buf(),
        });

        let mut opts = self.apply_options();
        let bundle = root.is_bundle();
        match apply_artifact(&root, &mut opts).and_then(|()| installed_artifact(opts, bundle)) {
            Ok(artifact) => {
                if self.config.scratch == ScratchPolicy::Keep {
                    let kept = unpacked.keep();
                    tracing::debug!(scratch = %kept.display(), "scratch retained");
                }
                Ok(artifact)
            }
            Err(e) => {
                let kept = unpacked.keep();
                tracing::warn!(scratch = %kept.display(), "apply failed, scratch retained");
                Err(e)
            }
        }
    }

    fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            target_path: self.config.target.clone(),
            target_mode: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Artifact>> {
        self.installed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn installed_artifact(opts: ApplyOptions, bundle: bool) -> Result<Artifact> {
    opts.target_path
        .map(|path| {
            if bundle {
                Artifact::Bundle(path)
            } else {
                Artifact::Executable(path)
            }
        })
        .ok_or_else(|| UpdateError::Apply("apply finished without a target path".to_owned()))
}
