//! Interceptor configuration.
//!
//! Settings travel from the launcher to the instrumented process through the
//! environment:
//! - `MPII_VERBOSE`: diagnostic level, 0 (silent) and up.
//! - `MPII_FORCE_THREAD_SAFETY`: serialize every MPI call even if the library
//!   claims `MPI_THREAD_MULTIPLE`.
//! - `MPII_DISABLE_THREAD_SAFETY`: never serialize.
//! - `MPII_CHECK_CONCURRENCY`: run the concurrency monitor.
//! - `MPII_ABORT_ON_CONCURRENCY_CHECK_FAILURE`: abort on the first violation
//!   (implies `MPII_CHECK_CONCURRENCY`).
//! - `MPII_LOG_FORMAT`: `text` (default) or `json`.
//! - `MPII_MPI_ABI`: `auto` (default), `mpich` or `openmpi`.

pub const ENV_VERBOSE: &str = "MPII_VERBOSE";
pub const ENV_FORCE_THREAD_SAFETY: &str = "MPII_FORCE_THREAD_SAFETY";
pub const ENV_DISABLE_THREAD_SAFETY: &str = "MPII_DISABLE_THREAD_SAFETY";
pub const ENV_CHECK_CONCURRENCY: &str = "MPII_CHECK_CONCURRENCY";
pub const ENV_ABORT_ON_VIOLATION: &str = "MPII_ABORT_ON_CONCURRENCY_CHECK_FAILURE";
pub const ENV_LOG_FORMAT: &str = "MPII_LOG_FORMAT";
pub const ENV_MPI_ABI: &str = "MPII_MPI_ABI";

/// Output layout for diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parse from string (case-insensitive). Unknown values fall back to text.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "jsonl" | "structured" => Self::Json,
            _ => Self::Text,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

/// Which MPI ABI the native library follows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiSelection {
    /// Probe the loaded library at initialization.
    #[default]
    Auto,
    /// MPICH-derived ABI (MPICH, Intel MPI, MVAPICH).
    Mpich,
    /// Open MPI ABI.
    OpenMpi,
}

impl AbiSelection {
    /// Parse from string (case-insensitive). Unknown values mean `Auto`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "mpich" | "intel" | "impi" | "mvapich" => Self::Mpich,
            "openmpi" | "open-mpi" | "ompi" => Self::OpenMpi,
            _ => Self::Auto,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Mpich => "mpich",
            Self::OpenMpi => "openmpi",
        }
    }
}

/// How the serialization decision is made once the library reports its
/// thread support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializationPolicy {
    /// Always serialize.
    Forced,
    /// Never serialize.
    Disabled,
    /// Serialize unless the library provides `MPI_THREAD_MULTIPLE`.
    Auto,
}

impl SerializationPolicy {
    /// Final decision given whether the library is natively multi-thread safe.
    #[must_use]
    pub const fn should_serialize(self, library_thread_multiple: bool) -> bool {
        match self {
            Self::Forced => true,
            Self::Disabled => false,
            Self::Auto => !library_thread_multiple,
        }
    }
}

/// Interceptor settings, fixed for the lifetime of the process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub verbose: u8,
    pub force_thread_safety: bool,
    pub disable_thread_safety: bool,
    pub check_concurrency: bool,
    pub abort_on_violation: bool,
    pub log_format: LogFormat,
    pub abi: AbiSelection,
}

impl Settings {
    /// Read settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).is_some_and(|v| parse_flag(&v));
        Self {
            verbose: lookup(ENV_VERBOSE).map_or(0, |v| parse_level(&v)),
            force_thread_safety: flag(ENV_FORCE_THREAD_SAFETY),
            disable_thread_safety: flag(ENV_DISABLE_THREAD_SAFETY),
            check_concurrency: flag(ENV_CHECK_CONCURRENCY),
            abort_on_violation: flag(ENV_ABORT_ON_VIOLATION),
            log_format: lookup(ENV_LOG_FORMAT)
                .map(|v| LogFormat::from_str_loose(&v))
                .unwrap_or_default(),
            abi: lookup(ENV_MPI_ABI)
                .map(|v| AbiSelection::from_str_loose(&v))
                .unwrap_or_default(),
        }
        .normalized()
    }

    /// Apply implied options: aborting on a violation requires checking.
    #[must_use]
    pub const fn normalized(mut self) -> Self {
        if self.abort_on_violation {
            self.check_concurrency = true;
        }
        self
    }

    #[must_use]
    pub const fn serialization_policy(&self) -> SerializationPolicy {
        if self.force_thread_safety {
            SerializationPolicy::Forced
        } else if self.disable_thread_safety {
            SerializationPolicy::Disabled
        } else {
            SerializationPolicy::Auto
        }
    }

    /// Environment variables that reproduce these settings in a child process.
    #[must_use]
    pub fn env_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_VERBOSE, self.verbose.to_string()),
            (ENV_CHECK_CONCURRENCY, u8::from(self.check_concurrency).to_string()),
            (ENV_FORCE_THREAD_SAFETY, u8::from(self.force_thread_safety).to_string()),
            (
                ENV_DISABLE_THREAD_SAFETY,
                u8::from(self.disable_thread_safety).to_string(),
            ),
            (ENV_ABORT_ON_VIOLATION, u8::from(self.abort_on_violation).to_string()),
            (ENV_LOG_FORMAT, self.log_format.as_str().to_string()),
            (ENV_MPI_ABI, self.abi.as_str().to_string()),
        ]
    }
}

fn parse_flag(raw: &str) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        other => other.parse::<u32>().is_ok_and(|n| n > 0),
    }
}

fn parse_level(raw: &str) -> u8 {
    raw.trim()
        .parse::<u32>()
        .map_or(0, |n| u8::try_from(n).unwrap_or(u8::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let settings = Settings::from_lookup(|_| None);
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.serialization_policy(), SerializationPolicy::Auto);
    }

    #[test]
    fn flags_parse_loosely() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" yes "));
        assert!(parse_flag("on"));
        assert!(parse_flag("7"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("no"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("bogus"));
    }

    #[test]
    fn verbosity_clamps_and_defaults() {
        assert_eq!(parse_level("2"), 2);
        assert_eq!(parse_level("1000"), u8::MAX);
        assert_eq!(parse_level("-1"), 0);
        assert_eq!(parse_level("loud"), 0);
    }

    #[test]
    fn abort_implies_check() {
        let settings = Settings::from_lookup(lookup_from(&[(ENV_ABORT_ON_VIOLATION, "1")]));
        assert!(settings.abort_on_violation);
        assert!(settings.check_concurrency);
    }

    #[test]
    fn force_wins_over_disable() {
        let settings = Settings::from_lookup(lookup_from(&[
            (ENV_FORCE_THREAD_SAFETY, "1"),
            (ENV_DISABLE_THREAD_SAFETY, "1"),
        ]));
        assert_eq!(settings.serialization_policy(), SerializationPolicy::Forced);

        let settings = Settings::from_lookup(lookup_from(&[(ENV_DISABLE_THREAD_SAFETY, "1")]));
        assert_eq!(settings.serialization_policy(), SerializationPolicy::Disabled);
    }

    #[test]
    fn policy_decisions() {
        assert!(SerializationPolicy::Forced.should_serialize(true));
        assert!(SerializationPolicy::Forced.should_serialize(false));
        assert!(!SerializationPolicy::Disabled.should_serialize(false));
        assert!(!SerializationPolicy::Auto.should_serialize(true));
        assert!(SerializationPolicy::Auto.should_serialize(false));
    }

    #[test]
    fn env_pairs_reproduce_settings() {
        let exported = Settings {
            verbose: 2,
            force_thread_safety: true,
            disable_thread_safety: false,
            check_concurrency: true,
            abort_on_violation: false,
            log_format: LogFormat::Json,
            abi: AbiSelection::OpenMpi,
        };
        let pairs = exported.env_pairs();
        let lookup = move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(Settings::from_lookup(lookup), exported);
    }

    #[test]
    fn abi_and_format_parsers() {
        assert_eq!(AbiSelection::from_str_loose("OpenMPI"), AbiSelection::OpenMpi);
        assert_eq!(AbiSelection::from_str_loose("impi"), AbiSelection::Mpich);
        assert_eq!(AbiSelection::from_str_loose("whatever"), AbiSelection::Auto);
        assert_eq!(LogFormat::from_str_loose("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_loose("plain"), LogFormat::Text);
    }
}
