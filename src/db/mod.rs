//! On-device persistence.
//!
//! Everything here sits on a single SQLite file holding JSON documents keyed by
//! collection name. It is the store of record while the remote service is
//! unreachable, and the home of device-local accounts.
//!
//! ```rust,no_run
//! use rollcall::db::{db::Db, local_store::LocalStore};
//!
//! let store = LocalStore::new(Db::new()?);
//! # Ok::<(), anyhow::Error>(())
//! ```

/// SQLite connection and the collection document table.
pub mod db;

/// Device-local accounts and the remembered sign-in.
pub mod local_auth;

/// Entity CRUD over collection documents.
pub mod local_store;
