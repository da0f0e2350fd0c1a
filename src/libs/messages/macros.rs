//! Macros that turn [`Message`](super::Message) values into tracing events.
//!
//! The persistence layer never prints; every message is routed through
//! `tracing` so the embedding application decides where it goes. The level
//! prefixes mirror the ones used in user-facing status text.
//!
//! ```rust
//! use rollcall::{msg_info, msg_warning};
//! use rollcall::libs::messages::Message;
//!
//! msg_info!(Message::RetryRequested);
//! msg_warning!(Message::RemoteNotConfigured);
//! ```

use std::sync::OnceLock;

static DEBUG_MODE: OnceLock<bool> = OnceLock::new();

/// Whether verbose diagnostics were requested through `ROLLCALL_DEBUG` or `RUST_LOG`.
///
/// Checked once and cached for the life of the process.
#[doc(hidden)]
pub fn is_debug_mode() -> bool {
    *DEBUG_MODE.get_or_init(|| std::env::var("ROLLCALL_DEBUG").is_ok() || std::env::var("RUST_LOG").is_ok())
}

#[macro_export]
macro_rules! msg_info {
    ($msg:expr) => {
        tracing::info!("{}", $msg)
    };
}

#[macro_export]
macro_rules! msg_success {
    ($msg:expr) => {
        tracing::info!("✅ {}", $msg)
    };
}

#[macro_export]
macro_rules! msg_warning {
    ($msg:expr) => {
        tracing::warn!("⚠️ {}", $msg)
    };
}

#[macro_export]
macro_rules! msg_error {
    ($msg:expr) => {
        tracing::error!("❌ {}", $msg)
    };
}

/// Debug-only event; skipped entirely unless debug mode is on.
#[macro_export]
macro_rules! msg_debug {
    ($msg:expr) => {
        if $crate::libs::messages::macros::is_debug_mode() {
            tracing::debug!("🔍 {}", $msg);
        }
    };
}
