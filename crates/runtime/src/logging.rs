// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Process-wide `tracing` initialization, following the same
//! `tracing_subscriber::fmt()` + `EnvFilter` shape used throughout this
//! workspace's own internals (every primitive in `vellum-sync` and the
//! evaluator's exception sink already emit `tracing` events; this is the
//! subscriber a host installs to actually see them).

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a global `tracing` subscriber writing to stderr, filtered by
/// `filter` (a standard `EnvFilter` directive string, e.g. `"warn"` or
/// `"vellum_sync=debug,warn"`).
///
/// Idempotent: subsequent calls after the first are no-ops, since
/// `tracing::subscriber::set_global_default` can only succeed once per
/// process and a host embedding multiple [`crate::Program`]s should be free
/// to call this once per program without tripping over that.
pub fn init(filter: &str) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init("warn");
        init("debug");
    }
}
