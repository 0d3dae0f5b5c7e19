//! Selfupdate: replace a running executable with a newer version and relaunch it.
//!
//! One update cycle flows through independent stages:
//! Source → (Archive unpack) → Apply → Restart
//!
//! # Architecture
//!
//! - **Source**: pluggable supplier of the payload stream (`HttpSource`,
//!   `FileSource`, or any closure)
//! - **Archive**: extracts zip payloads and picks the root artifact
//! - **Apply**: swaps the new executable or bundle into place atomically
//! - **Restart**: launches the successor and settles the current process
//! - **Updater**: serialises cycles and wires the stages together
//!
//! ```no_run
//! use selfupdate::{Config, HttpSource, Updater};
//!
//! let location = "https://dl.example.com/app-{{.OS}}-{{.Arch}}{{.Ext}}";
//! let config = Config::new(HttpSource::new(location))
//!     .with_upgrade_confirm(|msg| {
//!         eprintln!("{msg}");
//!         true
//!     });
//! let updater = Updater::manage(config)?;
//! updater.check_now()?;
//! # Ok::<(), selfupdate::UpdateError>(())
//! ```

pub mod apply;
pub mod archive;
pub mod error;
pub mod platform;
pub mod progress;
pub mod restart;
pub mod settings;
pub mod source;
pub mod updater;

pub use archive::{Artifact, Unpacked};
pub use error::{Result, UpdateError};
pub use progress::{ProgressCallback, ProgressEvent};
pub use restart::{ExitHandler, Handoff};
pub use settings::UpdateSettings;
pub use source::{FileSource, HttpSource, Payload, Platform, Source};
pub use updater::{CheckOutcome, Config, ScratchPolicy, Updater};
