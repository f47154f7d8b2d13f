// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Process-wide runtime configuration read from environment variables.

use std::env;

/// Environment variable naming a soft cap on concurrently running
/// `background` threads. Unset or unparsable means "no cap" (`None`):
/// the `background` operator spawns one OS thread per call and does not
/// pool them, so this value is informational only — a host embedding the
/// runtime in a constrained environment can read it back via
/// [`RuntimeConfig::background_thread_limit`] and enforce it itself.
const VELLUM_WORKER_THREADS: &str = "VELLUM_WORKER_THREADS";

/// Environment variable naming the `tracing` filter directive applied by
/// [`crate::logging::init`].
const VELLUM_LOG: &str = "VELLUM_LOG";

/// The default filter directive when `VELLUM_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "warn";

/// Configuration read once from the process environment at
/// [`crate::Program::create`] time.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    background_thread_limit: Option<usize>,
    log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Reads `VELLUM_WORKER_THREADS` and `VELLUM_LOG` from the process
    /// environment, falling back to documented defaults for anything unset
    /// or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let background_thread_limit = env::var(VELLUM_WORKER_THREADS).ok().and_then(|v| v.parse::<usize>().ok()).filter(|n| *n > 0);
        let log_filter = env::var(VELLUM_LOG).unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
        Self { background_thread_limit, log_filter }
    }

    #[must_use]
    pub fn background_thread_limit(&self) -> Option<usize> {
        self.background_thread_limit
    }

    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_filter_when_env_unset() {
        let config = RuntimeConfig { background_thread_limit: None, log_filter: DEFAULT_LOG_FILTER.to_string() };
        assert_eq!(config.log_filter(), "warn");
        assert!(config.background_thread_limit().is_none());
    }
}
