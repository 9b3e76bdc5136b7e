//! CLI entrypoint: run an MPI program with the interceptor preloaded.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use mpii_core::{AbiSelection, LogFormat, Settings};
use mpii_launch::{ENV_LD_PRELOAD, LaunchError, LaunchPlan, default_library_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for LogFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AbiArg {
    Auto,
    Mpich,
    #[value(name = "openmpi")]
    OpenMpi,
}

impl From<AbiArg> for AbiSelection {
    fn from(arg: AbiArg) -> Self {
        match arg {
            AbiArg::Auto => Self::Auto,
            AbiArg::Mpich => Self::Mpich,
            AbiArg::OpenMpi => Self::OpenMpi,
        }
    }
}

/// Make MPI calls of a multithreaded program thread-safe, or check them.
#[derive(Debug, Parser)]
#[command(name = "mpi-interceptor")]
#[command(about = "Run an MPI program with the MPI interceptor preloaded")]
struct Cli {
    /// Produce verbose output (repeat for per-call traces).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Force the use of thread-safety (even if MPI already supports it).
    #[arg(short, long)]
    force: bool,
    /// Disable the use of thread-safety.
    #[arg(short, long)]
    disable: bool,
    /// Show the LD_PRELOAD command to run the application with instrumentation.
    #[arg(short, long)]
    show: bool,
    /// Check if the application performs concurrent MPI calls.
    #[arg(short, long)]
    check: bool,
    /// Abort if the concurrency check fails.
    #[arg(short = 'C', long)]
    check_abort: bool,
    /// Diagnostic format.
    #[arg(long, value_enum, default_value_t = FormatArg::Text)]
    log_format: FormatArg,
    /// MPI binary interface.
    #[arg(long, value_enum, default_value_t = AbiArg::Auto)]
    abi: AbiArg,
    /// Interceptor library to preload (default: next to this executable).
    #[arg(long)]
    library: Option<PathBuf>,
    /// Target application and its options.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<OsString>,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            verbose: self.verbose,
            force_thread_safety: self.force,
            disable_thread_safety: self.disable,
            check_concurrency: self.check,
            abort_on_violation: self.check_abort,
            log_format: self.log_format.into(),
            abi: self.abi.into(),
        }
        .normalized()
    }
}

fn run(cli: Cli) -> Result<ExitCode, LaunchError> {
    let library = match &cli.library {
        Some(path) => path.clone(),
        None => default_library_path()?,
    };
    let existing = std::env::var_os(ENV_LD_PRELOAD);
    let plan = LaunchPlan::new(cli.settings(), &library, existing.as_deref(), cli.command)?;

    if cli.show {
        println!("{}", plan.show_line());
        return Ok(ExitCode::SUCCESS);
    }
    Err(plan.exec())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("mpi-interceptor: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_and_abi_are_typed_by_clap() {
        let cli = Cli::try_parse_from([
            "mpi-interceptor",
            "--abi",
            "openmpi",
            "--log-format",
            "json",
            "app",
        ])
        .unwrap();
        let settings = cli.settings();
        assert_eq!(settings.abi, AbiSelection::OpenMpi);
        assert_eq!(settings.log_format, LogFormat::Json);

        let defaults = Cli::try_parse_from(["mpi-interceptor", "app"]).unwrap().settings();
        assert_eq!(defaults.abi, AbiSelection::Auto);
        assert_eq!(defaults.log_format, LogFormat::Text);
    }

    #[test]
    fn unknown_abi_is_rejected() {
        let err = Cli::try_parse_from(["mpi-interceptor", "--abi", "lam", "app"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
