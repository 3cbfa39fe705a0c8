#![forbid(unsafe_code)]

//! Registry configuration.
//!
//! Defaults suit a shell whose application object emits `"shutdown"`.
//! Environment overrides:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `LIFELINE_SHUTDOWN_SIGNAL` | Signal the shutdown hook listens for |
//! | `LIFELINE_REPORT_LEAKS` | `1`/`true`/`yes`/`on` logs owners still tracked at shutdown at `warn` |

/// Default application shutdown signal.
pub const DEFAULT_SHUTDOWN_SIGNAL: &str = "shutdown";

#[inline]
fn env_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Configuration for [`crate::ScopeRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Signal on the application object that triggers global shutdown.
    pub shutdown_signal: String,
    /// Log owners that were never torn down before shutdown at `warn`
    /// instead of `debug`.
    pub report_leaks: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            shutdown_signal: DEFAULT_SHUTDOWN_SIGNAL.to_owned(),
            report_leaks: false,
        }
    }
}

impl RegistryConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through a custom environment lookup.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(signal) = get_env("LIFELINE_SHUTDOWN_SIGNAL") {
            let signal = signal.trim();
            if !signal.is_empty() {
                config.shutdown_signal = signal.to_owned();
            }
        }
        if let Some(value) = get_env("LIFELINE_REPORT_LEAKS") {
            config.report_leaks = env_flag(&value);
        }
        config
    }

    #[must_use]
    pub fn with_shutdown_signal(mut self, signal: impl Into<String>) -> Self {
        self.shutdown_signal = signal.into();
        self
    }

    #[must_use]
    pub fn with_report_leaks(mut self, enabled: bool) -> Self {
        self.report_leaks = enabled;
        self
    }
}
