//! Clients for the remote backend-as-a-service.
//!
//! - [`client`]: shared HTTP plumbing, auth headers and error mapping
//! - [`rest`]: table CRUD implementing [`EntityStore`](crate::libs::store::EntityStore)
//! - [`auth`]: identity provider contract and the remote implementation

pub mod auth;
pub mod client;
pub mod rest;

pub use auth::{AuthSession, Identity, IdentityProvider, RemoteAuth};
pub use client::{RemoteClient, RemoteConfig};
pub use rest::RemoteStore;
