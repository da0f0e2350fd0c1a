//! # Rollcall - resilient persistence for class attendance
//!
//! Teachers, classes, students and daily attendance marks, stored in a remote
//! backend-as-a-service when it can be reached and in an on-device SQLite store
//! when it cannot.
//!
//! ## Features
//!
//! - **Dual backend**: every call is routed by the current connection mode;
//!   connectivity failures fall back to the local store instead of failing
//! - **Idempotent attendance**: one record per student and day, serialized per key
//! - **Aggregated views**: per-day roster marks and per-range daily counts
//! - **Diagnostics**: layered network / internet / configuration / service checks
//! - **Auth**: session restore with bounded startup timers and local accounts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rollcall::libs::{config::Config, context::AppContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     rollcall::libs::logging::init();
//!     let app = AppContext::bootstrap(Config::read()?)?;
//!     app.session.initialize().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod db;
pub mod libs;
