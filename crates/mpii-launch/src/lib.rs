//! Launch plan for running a program under the interceptor.
//!
//! The launcher never touches MPI. It appends the shim to `LD_PRELOAD`,
//! exports the settings as `MPII_*` variables and replaces itself with the
//! target program.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use mpii_core::config::{
    ENV_ABORT_ON_VIOLATION, ENV_CHECK_CONCURRENCY, ENV_DISABLE_THREAD_SAFETY,
    ENV_FORCE_THREAD_SAFETY, ENV_LOG_FORMAT, ENV_MPI_ABI, ENV_VERBOSE,
};
use mpii_core::{AbiSelection, LogFormat, Settings};
use thiserror::Error;

/// File name of the preloaded shim.
pub const LIBRARY_FILE: &str = "libmpi_interceptor.so";
pub const ENV_LD_PRELOAD: &str = "LD_PRELOAD";

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no target program given")]
    MissingTarget,
    #[error("cannot locate the launcher executable: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("could not exec {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// `<dir of the launcher>/libmpi_interceptor.so`.
pub fn default_library_path() -> Result<PathBuf, LaunchError> {
    let exe = std::env::current_exe().map_err(LaunchError::CurrentExe)?;
    Ok(exe
        .parent()
        .map_or_else(|| PathBuf::from(LIBRARY_FILE), |dir| dir.join(LIBRARY_FILE)))
}

/// Keep an existing preload list and append the shim to it.
#[must_use]
pub fn compose_preload(existing: Option<&OsStr>, library: &Path) -> OsString {
    let mut preload = OsString::new();
    if let Some(existing) = existing.filter(|v| !v.is_empty()) {
        preload.push(existing);
        preload.push(":");
    }
    preload.push(library.as_os_str());
    preload
}

/// Everything needed to start the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub settings: Settings,
    pub ld_preload: OsString,
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl LaunchPlan {
    pub fn new(
        settings: Settings,
        library: &Path,
        existing_preload: Option<&OsStr>,
        command: Vec<OsString>,
    ) -> Result<Self, LaunchError> {
        let mut command = command.into_iter();
        let program = command.next().ok_or(LaunchError::MissingTarget)?;
        Ok(Self {
            settings: settings.normalized(),
            ld_preload: compose_preload(existing_preload, library),
            program,
            args: command.collect(),
        })
    }

    /// Variables exported to the target, `LD_PRELOAD` first.
    #[must_use]
    pub fn environment(&self) -> Vec<(&'static str, OsString)> {
        let mut env = vec![(ENV_LD_PRELOAD, self.ld_preload.clone())];
        env.extend(
            self.settings
                .env_pairs()
                .into_iter()
                .map(|(key, value)| (key, OsString::from(value))),
        );
        env
    }

    /// The `--show` line: a shell command that reproduces the launch.
    #[must_use]
    pub fn show_line(&self) -> String {
        let s = &self.settings;
        let mut line = format!(
            "{ENV_LD_PRELOAD}={} {ENV_VERBOSE}={} {ENV_FORCE_THREAD_SAFETY}={} {ENV_DISABLE_THREAD_SAFETY}={} {ENV_CHECK_CONCURRENCY}={} {ENV_ABORT_ON_VIOLATION}={}",
            self.ld_preload.to_string_lossy(),
            s.verbose,
            u8::from(s.force_thread_safety),
            u8::from(s.disable_thread_safety),
            u8::from(s.check_concurrency),
            u8::from(s.abort_on_violation),
        );
        if s.log_format != LogFormat::default() {
            line.push_str(&format!(" {ENV_LOG_FORMAT}={}", s.log_format.as_str()));
        }
        if s.abi != AbiSelection::default() {
            line.push_str(&format!(" {ENV_MPI_ABI}={}", s.abi.as_str()));
        }
        for word in std::iter::once(&self.program).chain(&self.args) {
            line.push(' ');
            line.push_str(&word.to_string_lossy());
        }
        line
    }

    /// The target command with the interceptor environment applied.
    #[must_use]
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).envs(self.environment());
        command
    }

    /// Replace the current process with the target. Only returns on failure.
    #[cfg(unix)]
    pub fn exec(&self) -> LaunchError {
        use std::os::unix::process::CommandExt;
        LaunchError::Exec {
            program: self.program.to_string_lossy().into_owned(),
            source: self.command().exec(),
        }
    }
}
