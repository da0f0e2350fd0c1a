//! Core of the attendance persistence layer.
//!
//! - **Routing**: [`store`] (entity contract and the remote/local facade) and
//!   [`connection`] (reachability, mode and diagnostics)
//! - **Views**: [`aggregator`] over the active store
//! - **Auth**: [`session`] state machine
//! - **Ambient**: [`config`], [`data_storage`], [`error`], [`logging`], [`messages`]
//!
//! [`context::AppContext`] builds all of the above from a configuration.

pub mod aggregator;
pub mod config;
pub mod connection;
pub mod context;
pub mod data_storage;
pub mod error;
pub mod logging;
pub mod messages;
pub mod models;
pub mod session;
pub mod store;
