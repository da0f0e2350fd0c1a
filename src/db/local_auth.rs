//! Device-local accounts used while the remote service is out of reach.
//!
//! Passwords are stored as SHA-256 digests; this is an offline convenience
//! store, not a credential vault.

use super::db::Db;
use crate::api::auth::{AuthSession, Identity, IdentityProvider};
use crate::libs::error::StoreError;
use crate::libs::messages::Message;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

pub const USERS: &str = "users";
pub const CURRENT_USER: &str = "current_user";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalAccount {
    pub id: Uuid,
    pub email: String,
    pub password_digest: String,
    pub created_at: DateTime<Utc>,
}

impl LocalAccount {
    fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            email: self.email.clone(),
        }
    }
}

fn digest(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

fn rejected(message: Message) -> StoreError {
    StoreError::Service {
        status: 400,
        code: None,
        message: message.to_string(),
    }
}

#[derive(Clone)]
pub struct LocalAuth {
    db: Db,
    write_lock: Arc<Mutex<()>>,
}

impl LocalAuth {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn accounts(&self) -> Result<Vec<LocalAccount>, StoreError> {
        self.db.read_collection(USERS)
    }

    fn remember(&self, session: &AuthSession) -> Result<(), StoreError> {
        self.db.write_value(CURRENT_USER, session)
    }
}

impl IdentityProvider for LocalAuth {
    fn provider_name(&self) -> &'static str {
        "local"
    }

    async fn current_session(&self) -> Result<Option<AuthSession>, StoreError> {
        let Some(session) = self.db.read_value::<AuthSession>(CURRENT_USER)? else {
            return Ok(None);
        };
        // The account may have been removed since the session was stored.
        let known = self.accounts()?.iter().any(|a| a.id == session.identity.id);
        if !known {
            self.db.remove(CURRENT_USER)?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Local accounts need no confirmation, so sign-up also signs in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<(Identity, Option<AuthSession>), StoreError> {
        let account = {
            let _guard = self.write_lock.lock();
            let mut accounts = self.accounts()?;
            if accounts.iter().any(|a| a.email == email) {
                return Err(rejected(Message::AccountAlreadyExists));
            }
            let account = LocalAccount {
                id: Uuid::new_v4(),
                email: email.to_string(),
                password_digest: digest(password),
                created_at: Utc::now(),
            };
            accounts.push(account.clone());
            self.db.write_collection(USERS, &accounts)?;
            account
        };

        let session = AuthSession::local(account.identity());
        self.remember(&session)?;
        Ok((account.identity(), Some(session)))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, StoreError> {
        let password_digest = digest(password);
        let account = self
            .accounts()?
            .into_iter()
            .find(|a| a.email == email && a.password_digest == password_digest)
            .ok_or_else(|| rejected(Message::InvalidLoginCredentials))?;

        let session = AuthSession::local(account.identity());
        self.remember(&session)?;
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        self.db.remove(CURRENT_USER)
    }

    async fn update_password(&self, password: &str) -> Result<(), StoreError> {
        let session = self
            .db
            .read_value::<AuthSession>(CURRENT_USER)?
            .ok_or_else(|| rejected(Message::NotSignedIn))?;

        let _guard = self.write_lock.lock();
        let mut accounts = self.accounts()?;
        let account = accounts
            .iter_mut()
            .find(|a| a.id == session.identity.id)
            .ok_or_else(|| StoreError::not_found("account", session.identity.id))?;
        account.password_digest = digest(password);
        self.db.write_collection(USERS, &accounts)
    }
}
