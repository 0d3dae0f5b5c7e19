//! Run one self-update cycle for the executable described by a settings file.
//!
//! Usage: `selfupdate-check [CONFIG] [--yes]`
//!
//! Without `CONFIG` the default settings path is used. Unless `--yes` is
//! given, consent is asked on stdin before anything is fetched. Tracing goes
//! to stderr; set `RUST_LOG` to adjust verbosity.

use selfupdate::{CheckOutcome, Updater, UpdateSettings};
use std::io::{BufRead, Write};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config_path = None;
    let mut assume_yes = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--yes" | "-y" => assume_yes = true,
            "--help" | "-h" => {
                println!("usage: selfupdate-check [CONFIG] [--yes]");
                return Ok(());
            }
            _ => config_path = Some(PathBuf::from(arg)),
        }
    }
    let config_path = config_path.unwrap_or_else(UpdateSettings::default_config_path);

    let settings = UpdateSettings::from_file(&config_path).map_err(|e| {
        anyhow::anyhow!("cannot load settings from {}: {e}", config_path.display())
    })?;
    tracing::info!(url = %settings.url, zip = settings.zip, "settings loaded");

    let mut config = settings.into_config()?;
    // A one-shot command runs the cycle itself rather than in the background.
    config.fetch_on_start = false;
    if !assume_yes {
        config = config.with_upgrade_confirm(prompt);
    }

    let updater = Updater::manage(config)?;
    match updater.check_now() {
        Ok(CheckOutcome::Declined) => {
            tracing::info!("update declined");
            Ok(())
        }
        Ok(CheckOutcome::Installed(artifact)) => {
            tracing::info!(path = %artifact.path().display(), "update installed");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "update failed");
            Err(anyhow::anyhow!("selfupdate-check failed: {e}"))
        }
    }
}

fn prompt(message: &str) -> bool {
    eprint!("{message}. Install it? [y/N] ");
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes" | "Yes")
}
