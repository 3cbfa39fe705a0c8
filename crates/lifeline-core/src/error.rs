#![forbid(unsafe_code)]

//! Error taxonomy for subscription bookkeeping.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unsupported flags | `SWAPPED` or an unknown bit | [`ScopeError`] returned before any side effect |
//! | Inactive handle | Target already dropped the handler | Skipped silently |
//! | Fired one-shot timer | Source already gone | Cancel skipped silently |
//! | Unknown owner / tracked object / timer name | Nothing recorded | No-op |
//!
//! Only the first row is an error. The rest are the expected outcome of
//! cascading teardown and are resolved by correcting local state.

/// Programmer error raised while creating a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// Swapped argument order was requested. Use a forwarding closure.
    SwappedArguments { signal: String },
    /// Flag bits outside the supported set.
    UnsupportedFlags { signal: String, bits: u32 },
}

impl ScopeError {
    /// Signal whose subscription was rejected.
    #[must_use]
    pub fn signal(&self) -> &str {
        match self {
            Self::SwappedArguments { signal } | Self::UnsupportedFlags { signal, .. } => signal,
        }
    }
}

impl std::fmt::Display for ScopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SwappedArguments { signal } => write!(
                f,
                "swapped argument order is not supported for '{signal}'; wrap the callback instead"
            ),
            Self::UnsupportedFlags { signal, bits } => {
                write!(f, "unsupported connect flags {bits:#x} for '{signal}'")
            }
        }
    }
}

impl std::error::Error for ScopeError {}
