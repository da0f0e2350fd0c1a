//! Identity provider contract and its remote implementation.
//!
//! The remote provider talks to the service's password-grant auth endpoints
//! and keeps the last session in a small JSON file in the data directory, so a
//! restart can restore it without asking for credentials again.

use super::client::{RemoteClient, service_error};
use crate::libs::data_storage::DataStorage;
use crate::libs::error::StoreError;
use crate::libs::messages::Message;
use crate::{msg_debug, msg_warning};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use uuid::Uuid;

pub const SESSION_FILE: &str = ".remote_session";

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub identity: Identity,
    /// Bearer token for remote calls; `None` for local sessions.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl AuthSession {
    pub fn local(identity: Identity) -> Self {
        Self {
            identity,
            access_token: None,
            refresh_token: None,
        }
    }
}

/// Authentication backend used by the session manager.
///
/// Credential rejections are reported as [`StoreError::Service`]; transport
/// problems use the connectivity variants so callers can tell them apart.
#[allow(async_fn_in_trait)]
pub trait IdentityProvider {
    fn provider_name(&self) -> &'static str;

    /// Session restored from persistent storage, if still valid.
    async fn current_session(&self) -> Result<Option<AuthSession>, StoreError>;

    /// Registers an identity. The session is `None` when the provider requires
    /// the address to be confirmed before the first sign-in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<(Identity, Option<AuthSession>), StoreError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, StoreError>;

    async fn sign_out(&self) -> Result<(), StoreError>;

    async fn update_password(&self, password: &str) -> Result<(), StoreError>;
}

#[derive(Deserialize)]
struct UserPayload {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct TokenPayload {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: UserPayload,
}

impl UserPayload {
    fn into_identity(self, fallback_email: &str) -> Identity {
        Identity {
            id: self.id,
            email: self.email.unwrap_or_else(|| fallback_email.to_string()),
        }
    }
}

impl TokenPayload {
    fn into_session(self, fallback_email: &str) -> AuthSession {
        AuthSession {
            identity: self.user.into_identity(fallback_email),
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token,
        }
    }
}

pub struct RemoteAuth {
    client: RemoteClient,
    session_file: PathBuf,
}

impl RemoteAuth {
    /// Caches the session in `session_file`.
    pub fn new(client: RemoteClient, session_file: impl Into<PathBuf>) -> Self {
        Self {
            client,
            session_file: session_file.into(),
        }
    }

    /// Caches the session in the data directory managed by `storage`.
    pub fn with_storage(client: RemoteClient, storage: &DataStorage) -> anyhow::Result<Self> {
        Ok(Self::new(client, storage.get_path(SESSION_FILE)?))
    }

    fn read_session(&self) -> Option<AuthSession> {
        let data = fs::read_to_string(&self.session_file).ok()?;
        match serde_json::from_str(&data) {
            Ok(session) => Some(session),
            Err(err) => {
                msg_warning!(Message::SessionCacheCorrupt(err.to_string()));
                self.delete_session();
                None
            }
        }
    }

    fn write_session(&self, session: &AuthSession) {
        let result = serde_json::to_string(session)
            .map_err(std::io::Error::from)
            .and_then(|data| {
                let mut file = fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&self.session_file)?;
                file.write_all(data.as_bytes())
            });
        if let Err(err) = result {
            msg_warning!(Message::SessionCacheWriteFailed(err.to_string()));
        }
    }

    fn delete_session(&self) {
        // Missing file is fine.
        let _ = fs::remove_file(&self.session_file);
    }

    fn adopt(&self, session: &AuthSession) {
        self.client.set_access_token(session.access_token.clone());
        self.write_session(session);
    }

    fn forget(&self) {
        self.client.set_access_token(None);
        self.delete_session();
    }
}

impl IdentityProvider for RemoteAuth {
    fn provider_name(&self) -> &'static str {
        "remote"
    }

    async fn current_session(&self) -> Result<Option<AuthSession>, StoreError> {
        let Some(session) = self.read_session() else {
            return Ok(None);
        };
        let Some(token) = session.access_token.as_deref() else {
            self.forget();
            return Ok(None);
        };

        let request = self.client.request_with_token(Method::GET, "auth/v1/user", token);
        match self.client.send_json::<UserPayload>(request).await {
            Ok(user) => {
                let restored = AuthSession {
                    identity: user.into_identity(&session.identity.email),
                    ..session
                };
                self.adopt(&restored);
                Ok(Some(restored))
            }
            Err(StoreError::Service { status, .. }) if status == 401 || status == 403 => {
                msg_debug!(Message::AuthSessionExpired);
                self.forget();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<(Identity, Option<AuthSession>), StoreError> {
        let request = self
            .client
            .request(Method::POST, "auth/v1/signup")
            .json(&json!({ "email": email, "password": password }));
        let body: Value = self.client.send_json(request).await?;

        // With confirmation disabled the body is a session, otherwise a bare user.
        if body.get("access_token").is_some() {
            let session = serde_json::from_value::<TokenPayload>(body)?.into_session(email);
            self.adopt(&session);
            return Ok((session.identity.clone(), Some(session)));
        }

        let user: UserPayload = serde_json::from_value(body.get("user").cloned().unwrap_or(body))?;
        Ok((user.into_identity(email), None))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, StoreError> {
        let request = self
            .client
            .request(Method::POST, "auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let session = self.client.send_json::<TokenPayload>(request).await?.into_session(email);
        self.adopt(&session);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        let token = self.client.access_token();
        self.forget();

        let Some(token) = token else {
            return Ok(());
        };
        let request = self.client.request_with_token(Method::POST, "auth/v1/logout", &token);
        match self.client.send(request).await {
            Ok(_) => Ok(()),
            // The token is already gone on the remote side.
            Err(StoreError::Service { status, .. }) if status == 401 || status == 404 => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn update_password(&self, password: &str) -> Result<(), StoreError> {
        if self.client.access_token().is_none() {
            return Err(service_error(StatusCode::UNAUTHORIZED, &Message::NotSignedIn.to_string()));
        }
        let request = self
            .client
            .request(Method::PUT, "auth/v1/user")
            .json(&json!({ "password": password }));
        self.client.send(request).await?;
        Ok(())
    }
}
