//! Location templating for cross-platform payload URLs.
//!
//! A location such as `https://host/myapp-{{.OS}}-{{.Arch}}{{.Ext}}` is
//! expanded against a [`Platform`] descriptor. Recognised fields:
//!
//! - `{{.OS}}`: the runtime OS name (`std::env::consts::OS`)
//! - `{{.Arch}}`: the runtime architecture name (`std::env::consts::ARCH`)
//! - `{{.Ext}}`: the executable suffix (`.exe` on Windows, empty elsewhere)
//! - `{{.Executable}}`: base name of the running executable, without `.exe`
//!
//! Invalid placeholder syntax or unknown fields leave the location unchanged.

use crate::platform::{EXECUTABLE_SUFFIX, current_exe_path, exe_extension};
use std::path::{Path, PathBuf};

/// Values substituted into a templated location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Operating system name (e.g. `"linux"`, `"macos"`, `"windows"`).
    pub os: String,
    /// Architecture name (e.g. `"x86_64"`, `"aarch64"`).
    pub arch: String,
    /// Executable suffix for the platform.
    pub ext: String,
    /// Base name of the running executable.
    pub executable: String,
}

impl Platform {
    /// Describe the platform this process is running on.
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            ext: exe_extension().to_owned(),
            executable: current_executable_name(),
        }
    }

    /// Expand every placeholder in `template`, or return it unchanged if any
    /// placeholder is malformed or names an unknown field.
    pub fn resolve(&self, template: &str) -> String {
        self.try_resolve(template)
            .unwrap_or_else(|| template.to_owned())
    }

    fn try_resolve(&self, template: &str) -> Option<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}")?;
            let field = after[..end].trim().strip_prefix('.')?;
            out.push_str(self.field(field)?);
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        Some(out)
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "OS" => Some(&self.os),
            "Arch" => Some(&self.arch),
            "Ext" => Some(&self.ext),
            "Executable" => Some(&self.executable),
            _ => None,
        }
    }
}

/// Expand `template` against the current platform.
pub fn resolve_template(template: &str) -> String {
    Platform::current().resolve(template)
}

fn current_executable_name() -> String {
    let path = current_exe_path()
        .ok()
        .or_else(|| std::env::args_os().next().map(PathBuf::from));
    let name = path
        .as_deref()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if cfg!(windows) {
        name.strip_suffix(EXECUTABLE_SUFFIX)
            .map(str::to_owned)
            .unwrap_or(name)
    } else {
        name
    }
}
