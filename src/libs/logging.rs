//! Tracing subscriber setup for binaries and tests that embed rollcall.

use super::messages::macros::is_debug_mode;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "rollcall=info";
const DEBUG_FILTER: &str = "rollcall=debug";

/// Installs a formatted subscriber filtered by `RUST_LOG`, or by a crate-level
/// default chosen from [`is_debug_mode`].
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if is_debug_mode() {
            EnvFilter::new(DEBUG_FILTER)
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });

    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}
