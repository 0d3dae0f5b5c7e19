//! End-to-end update cycles against temp-dir install locations.
//!
//! Restarts are routed through an exit handler so the test process survives.
//! Cycles that actually launch a successor use `#!/bin/sh` scripts and only
//! run on Unix.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use selfupdate::apply::{ApplyOptions, apply_artifact};
use selfupdate::archive::unpack;
use selfupdate::{Artifact, Config, Payload, Result, UpdateError, Updater};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zip::write::SimpleFileOptions;

const OLD_SCRIPT: &str = "#!/bin/sh\necho old\n";
const NEW_SCRIPT: &str = "#!/bin/sh\nexit 0\n";
const BROKEN_SCRIPT: &str = "#!/nonexistent/sh\nexit 0\n";

fn zip_with(entries: &[(&str, Option<&str>)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o755);
    for (name, body) in entries {
        match body {
            None => zip.add_directory(*name, options).unwrap(),
            Some(body) => {
                zip.start_file(*name, options).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
        }
    }
    zip.finish().unwrap().into_inner()
}

fn bytes_source(bytes: Vec<u8>) -> impl Fn() -> Result<Payload> + Send + Sync + 'static {
    move || Ok(Payload::from_bytes(bytes.clone()))
}

#[cfg(unix)]
fn write_script(path: &Path, body: &str, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
}

type Calls = Arc<Mutex<Vec<Option<String>>>>;

fn recording_exit_handler() -> (impl Fn(Option<&UpdateError>) + Send + Sync + 'static, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let calls_clone = Arc::clone(&calls);
    let handler = move |err: Option<&UpdateError>| {
        calls_clone
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(err.map(ToString::to_string));
    };
    (handler, calls)
}

// ---------------------------------------------------------------------------
// Raw payloads
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn raw_cycle_installs_and_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool");
    write_script(&target, OLD_SCRIPT, 0o755);

    let (handler, calls) = recording_exit_handler();
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = Arc::clone(&events);

    let config = Config::new(bytes_source(NEW_SCRIPT.as_bytes().to_vec()))
        .with_target(&target)
        .with_progress_bar(false)
        .with_exit_handler(handler)
        .with_progress(move |event| events_clone.lock().unwrap().push(event));
    let updater = Updater::new(config);

    let outcome = updater.check_now().unwrap();
    assert_eq!(
        outcome,
        selfupdate::CheckOutcome::Installed(Artifact::Executable(target.clone()))
    );
    assert_eq!(std::fs::read_to_string(&target).unwrap(), NEW_SCRIPT);
    assert_eq!(*calls.lock().unwrap(), vec![None]);
    assert_eq!(
        updater.installed(),
        Some(Artifact::Executable(target.clone()))
    );
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        selfupdate::ProgressEvent::Installed { target: t } if t == &target
    )));
}

#[cfg(unix)]
#[test]
fn failed_restart_without_exit_handler_keeps_process_running() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool");
    write_script(&target, OLD_SCRIPT, 0o755);

    // The interpreter is missing: the swap succeeds but the successor cannot start.
    let config = Config::new(bytes_source(BROKEN_SCRIPT.as_bytes().to_vec()))
        .with_target(&target)
        .with_progress_bar(false);
    let updater = Updater::new(config);

    let err = updater.check_now().unwrap_err();
    assert!(matches!(err, UpdateError::Restart(_)), "got {err}");
    // Still here, and the new payload is in place.
    assert_eq!(std::fs::read_to_string(&target).unwrap(), BROKEN_SCRIPT);
}

#[cfg(unix)]
#[test]
fn restart_confirm_is_asked_but_does_not_gate() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool");
    write_script(&target, OLD_SCRIPT, 0o755);

    let asked = Arc::new(Mutex::new(0usize));
    let asked_clone = Arc::clone(&asked);
    let (handler, calls) = recording_exit_handler();

    let config = Config::new(bytes_source(NEW_SCRIPT.as_bytes().to_vec()))
        .with_target(&target)
        .with_progress_bar(false)
        .with_exit_handler(handler)
        .with_restart_confirm(move || {
            *asked_clone.lock().unwrap() += 1;
            false
        });
    Updater::new(config).check_now().unwrap();

    assert_eq!(*asked.lock().unwrap(), 1);
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[cfg(unix)]
#[test]
fn restart_later_uses_installed_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool");
    write_script(&target, OLD_SCRIPT, 0o755);

    let (handler, calls) = recording_exit_handler();
    let config = Config::new(bytes_source(NEW_SCRIPT.as_bytes().to_vec()))
        .with_target(&target)
        .with_progress_bar(false)
        .with_exit_handler(handler);
    let updater = Updater::new(config);

    updater.check_now().unwrap();
    updater.restart().unwrap();
    assert_eq!(*calls.lock().unwrap(), vec![None, None]);
}

#[test]
fn interrupted_download_keeps_original() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool");
    std::fs::write(&target, "original").unwrap();

    struct Broken;
    impl std::io::Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("connection dropped"))
        }
    }

    let source = || -> Result<Payload> { Ok(Payload::new(Broken, Some(1024))) };
    let (handler, calls) = recording_exit_handler();
    let config = Config::new(source)
        .with_target(&target)
        .with_progress_bar(false)
        .with_exit_handler(handler);

    let err = Updater::new(config).check_now().unwrap_err();
    assert!(matches!(err, UpdateError::Apply(_)));
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "original");
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

// ---------------------------------------------------------------------------
// Archive payloads
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn zip_cycle_installs_top_level_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool");
    write_script(&target, OLD_SCRIPT, 0o755);

    let archive = zip_with(&[
        ("docs/", None),
        ("docs/notes.md", Some("notes")),
        ("tool", Some(NEW_SCRIPT)),
    ]);
    let extracted = Arc::new(Mutex::new(None));
    let extracted_clone = Arc::clone(&extracted);
    let (handler, _calls) = recording_exit_handler();

    let config = Config::new(bytes_source(archive))
        .with_zip(true)
        .with_target(&target)
        .with_progress_bar(false)
        .with_exit_handler(handler)
        .with_progress(move |event| {
            if let selfupdate::ProgressEvent::Extracted { root } = event {
                *extracted_clone.lock().unwrap() = Some(root);
            }
        });
    Updater::new(config).check_now().unwrap();

    assert_eq!(std::fs::read_to_string(&target).unwrap(), NEW_SCRIPT);
    let root = extracted.lock().unwrap().clone().unwrap();
    assert!(root.ends_with("tool"));
    // Default policy removes the scratch directory after success.
    assert!(!root.parent().unwrap().exists());
}

#[cfg(unix)]
#[test]
fn zip_cycle_keeps_scratch_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool");
    write_script(&target, OLD_SCRIPT, 0o755);

    let archive = zip_with(&[("tool", Some(NEW_SCRIPT))]);
    let extracted = Arc::new(Mutex::new(None));
    let extracted_clone = Arc::clone(&extracted);
    let (handler, _calls) = recording_exit_handler();

    let config = Config::new(bytes_source(archive))
        .with_zip(true)
        .with_target(&target)
        .with_scratch(selfupdate::ScratchPolicy::Keep)
        .with_progress_bar(false)
        .with_exit_handler(handler)
        .with_progress(move |event| {
            if let selfupdate::ProgressEvent::Extracted { root } = event {
                *extracted_clone.lock().unwrap() = Some(root);
            }
        });
    Updater::new(config).check_now().unwrap();

    let root = extracted.lock().unwrap().clone().unwrap();
    let scratch = root.parent().unwrap().to_path_buf();
    assert!(scratch.is_dir());
    std::fs::remove_dir_all(scratch).unwrap();
}

#[test]
fn malformed_archive_fails_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool");
    std::fs::write(&target, "original").unwrap();

    let config = Config::new(bytes_source(b"PK not really".to_vec()))
        .with_zip(true)
        .with_target(&target)
        .with_progress_bar(false);
    let err = Updater::new(config).check_now().unwrap_err();
    assert!(matches!(err, UpdateError::Archive(_)));
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "original");
}

#[test]
fn bundle_archive_replaces_installed_bundle() {
    let install = tempfile::tempdir().unwrap();
    let target = install.path().join("MyApp.app");
    std::fs::create_dir_all(target.join("Contents/MacOS")).unwrap();
    std::fs::write(target.join("Contents/MacOS/myapp"), "old").unwrap();

    let archive = zip_with(&[
        ("MyApp.app/", None),
        ("MyApp.app/Contents/", None),
        ("MyApp.app/Contents/MacOS/", None),
        ("MyApp.app/Contents/MacOS/myapp", Some("new")),
    ]);

    let unpacked = unpack(archive.as_slice()).unwrap();
    let root = unpacked.root().cloned().unwrap();
    assert!(root.is_bundle());

    let mut opts = ApplyOptions::with_target(&target);
    apply_artifact(&root, &mut opts).unwrap();

    assert_eq!(opts.target_path.as_deref(), Some(target.as_path()));
    assert_eq!(
        std::fs::read_to_string(target.join("Contents/MacOS/myapp")).unwrap(),
        "new"
    );
}

#[test]
fn bundle_archive_cycle_records_installed_bundle() {
    let install = tempfile::tempdir().unwrap();
    let target = install.path().join("MyApp.app");
    std::fs::create_dir_all(target.join("Contents/MacOS")).unwrap();
    std::fs::write(target.join("Contents/MacOS/myapp"), "old").unwrap();

    let archive = zip_with(&[
        ("MyApp.app/", None),
        ("MyApp.app/Contents/", None),
        ("MyApp.app/Contents/MacOS/", None),
        ("MyApp.app/Contents/MacOS/myapp", Some("new")),
    ]);

    // The opener may be missing on the host; the handler sees that error.
    let (handler, calls) = recording_exit_handler();
    let config = Config::new(bytes_source(archive))
        .with_zip(true)
        .with_target(&target)
        .with_progress_bar(false)
        .with_exit_handler(handler);
    let updater = Updater::new(config);

    let outcome = updater.check_now();
    assert_eq!(updater.installed(), Some(Artifact::Bundle(target.clone())));
    if let Ok(outcome) = outcome {
        assert!(matches!(
            outcome,
            selfupdate::CheckOutcome::Installed(Artifact::Bundle(_))
        ));
    }
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(
        std::fs::read_to_string(target.join("Contents/MacOS/myapp")).unwrap(),
        "new"
    );
}

#[test]
fn windows_executable_archive_routes_to_raw_apply() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool.exe");
    std::fs::write(&target, "old").unwrap();

    let archive = zip_with(&[("tool.exe", Some("MZ-new"))]);
    let unpacked = unpack(archive.as_slice()).unwrap();
    let root = unpacked.root().cloned().unwrap();
    assert!(!root.is_bundle());

    let mut opts = ApplyOptions::with_target(&target);
    apply_artifact(&root, &mut opts).unwrap();
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "MZ-new");
}

// ---------------------------------------------------------------------------
// Concurrency and setup
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn concurrent_cycles_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool");
    write_script(&target, OLD_SCRIPT, 0o755);

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let source_log = Arc::clone(&log);
    let source = move || -> Result<Payload> {
        source_log.lock().unwrap().push("fetch");
        std::thread::sleep(Duration::from_millis(50));
        Ok(Payload::from_bytes(NEW_SCRIPT))
    };
    let exit_log = Arc::clone(&log);
    let config = Config::new(source)
        .with_target(&target)
        .with_progress_bar(false)
        .with_exit_handler(move |_| exit_log.lock().unwrap().push("restart"));
    let updater = Arc::new(Updater::new(config));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let updater = Arc::clone(&updater);
            std::thread::spawn(move || updater.check_now())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(
        *log.lock().unwrap(),
        vec!["fetch", "restart", "fetch", "restart"]
    );
}

#[test]
fn fetch_on_start_runs_in_background_and_only_logs_errors() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let source = move || -> Result<Payload> {
        let _ = tx.lock().unwrap().send(());
        Err(UpdateError::Fetch("failed to get content".into()))
    };

    let config = Config::new(source)
        .with_fetch_on_start(true)
        .with_progress_bar(false);
    let updater = Updater::manage(config).unwrap();

    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    // The failed background cycle recorded nothing.
    assert!(updater.installed().is_none());
}

#[test]
fn declined_upgrade_is_a_successful_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool");
    std::fs::write(&target, "original").unwrap();

    let config = Config::new(bytes_source(b"new".to_vec()))
        .with_target(&target)
        .with_upgrade_confirm(|_| false);
    let outcome = Updater::new(config).check_now().unwrap();
    assert_eq!(outcome, selfupdate::CheckOutcome::Declined);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "original");
}
