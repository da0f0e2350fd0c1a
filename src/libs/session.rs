//! Authentication state machine on top of the identity providers and the store.
//!
//! ```text
//! UNINITIALIZED ─initialize─▶ CHECKING ─▶ READY(session) | READY(no session) | DEGRADED
//! ```
//!
//! Startup resolution is bounded by two timers. When the soft timer fires the
//! state is published as degraded while the remote check keeps running; if it
//! finishes before the hard timer, its result replaces the degraded state. The
//! hard timer abandons the check together with the profile load that follows
//! it, forces local fallback and settles on the device-local session.
//!
//! Operations pick the remote provider in [`Mode::Remote`] and the device-local
//! one otherwise. A remote auth call that fails on connectivity demotes the
//! mode and reports [`FailureReason::Network`]; it is not retried locally, since
//! that would silently create a second, unrelated account.

use crate::api::auth::{AuthSession, Identity, IdentityProvider, RemoteAuth};
use crate::api::rest::RemoteStore;
use crate::db::local_auth::LocalAuth;
use crate::libs::config::SessionConfig;
use crate::libs::connection::{ConnectionManager, Mode, Reachability};
use crate::libs::error::{Failure, FailureReason, StoreError};
use crate::libs::messages::Message;
use crate::libs::models::Teacher;
use crate::libs::store::{normalize_email, required, DataStore, EntityStore};
use crate::{msg_debug, msg_error, msg_info, msg_success, msg_warning};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Uninitialized,
    Checking,
    Ready { session: Option<AuthSession> },
    /// Remote session state is unknown; `session` is the device-local one, if any.
    Degraded { session: Option<AuthSession> },
}

impl AuthState {
    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            AuthState::Ready { session } | AuthState::Degraded { session } => session.as_ref(),
            _ => None,
        }
    }

    /// Whether startup resolution has produced a decision.
    pub fn is_settled(&self) -> bool {
        matches!(self, AuthState::Ready { .. } | AuthState::Degraded { .. })
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Uninitialized => f.write_str("UNINITIALIZED"),
            AuthState::Checking => f.write_str("CHECKING"),
            AuthState::Ready { session: Some(_) } => f.write_str("READY(session)"),
            AuthState::Ready { session: None } => f.write_str("READY(no-session)"),
            AuthState::Degraded { .. } => f.write_str("DEGRADED"),
        }
    }
}

/// Result of a sign-up that got past identity creation.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// Identity and profile exist and the user is signed in.
    SignedIn(Teacher),
    /// Identity and profile exist, but the address must be confirmed before signing in.
    ConfirmationRequired(Teacher),
    /// The identity was created but its profile was not. Nobody is signed in.
    PartialFailure { identity: Identity, failure: Failure },
}

/// Receives every state published after it was created.
pub struct Subscription {
    receiver: Option<watch::Receiver<AuthState>>,
}

impl Subscription {
    /// Waits for the next state. `None` once cancelled or when the manager is gone.
    pub async fn changed(&mut self) -> Option<AuthState> {
        let receiver = self.receiver.as_mut()?;
        receiver.changed().await.ok()?;
        Some(receiver.borrow_and_update().clone())
    }

    pub fn current(&self) -> Option<AuthState> {
        self.receiver.as_ref().map(|r| r.borrow().clone())
    }

    pub fn cancel(&mut self) {
        if self.receiver.take().is_some() {
            msg_debug!(Message::SubscriptionCancelled);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver.is_none()
    }
}

/// Whichever identity provider a call was routed to.
enum Provider<'a, I> {
    Remote(&'a I),
    Local(&'a LocalAuth),
}

impl<I> Provider<'_, I> {
    fn is_remote(&self) -> bool {
        matches!(self, Provider::Remote(_))
    }
}

macro_rules! delegate {
    ($self:ident . $method:ident ( $($arg:expr),* )) => {
        match $self {
            Provider::Remote(auth) => auth.$method($($arg),*).await,
            Provider::Local(auth) => auth.$method($($arg),*).await,
        }
    };
}

impl<I: IdentityProvider> IdentityProvider for Provider<'_, I> {
    fn provider_name(&self) -> &'static str {
        match self {
            Provider::Remote(auth) => auth.provider_name(),
            Provider::Local(auth) => auth.provider_name(),
        }
    }

    async fn current_session(&self) -> Result<Option<AuthSession>, StoreError> {
        delegate!(self.current_session())
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<(Identity, Option<AuthSession>), StoreError> {
        delegate!(self.sign_up(email, password))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, StoreError> {
        delegate!(self.sign_in(email, password))
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        delegate!(self.sign_out())
    }

    async fn update_password(&self, password: &str) -> Result<(), StoreError> {
        delegate!(self.update_password(password))
    }
}

pub struct AuthSessionManager<I = RemoteAuth, R = RemoteStore> {
    config: SessionConfig,
    connection: Arc<ConnectionManager>,
    remote: Option<I>,
    local: LocalAuth,
    store: Arc<DataStore<R>>,
    state: watch::Sender<AuthState>,
    teacher: Mutex<Option<Teacher>>,
}

impl<I: IdentityProvider, R: EntityStore> AuthSessionManager<I, R> {
    pub fn new(
        config: SessionConfig,
        connection: Arc<ConnectionManager>,
        remote: Option<I>,
        local: LocalAuth,
        store: Arc<DataStore<R>>,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Uninitialized);
        Self {
            config,
            connection,
            remote,
            local,
            store,
            state,
            teacher: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().session().map(|s| s.identity.clone())
    }

    /// Profile of the signed-in teacher.
    pub fn teacher(&self) -> Option<Teacher> {
        self.teacher.lock().clone()
    }

    pub fn remote(&self) -> Option<&I> {
        self.remote.as_ref()
    }

    pub fn store(&self) -> &Arc<DataStore<R>> {
        &self.store
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: Some(self.state.subscribe()),
        }
    }

    /// Resolves the startup session. Always settles on `Ready` or `Degraded`.
    pub async fn initialize(&self) -> AuthState {
        msg_info!(Message::AuthInitializing);
        self.publish(AuthState::Checking);

        if self.remote.is_none() || !self.connection.is_remote_configured() {
            return self.settle_degraded().await;
        }

        let soft = tokio::time::sleep(Duration::from_millis(self.config.soft_timeout_ms));
        let hard = tokio::time::sleep(Duration::from_millis(self.config.hard_timeout_ms));
        // Profile loading is part of the race: nothing after the hard timer may end in READY.
        let resolve = async {
            let result = self.resolve_remote_session().await;
            self.settle(result).await
        };
        tokio::pin!(soft, hard, resolve);

        let mut soft_fired = false;
        loop {
            tokio::select! {
                state = &mut resolve => return state,
                _ = &mut soft, if !soft_fired => {
                    soft_fired = true;
                    msg_warning!(Message::AuthSoftTimeout(self.config.soft_timeout_ms));
                    let session = self.local_session().await;
                    self.publish(AuthState::Degraded { session });
                }
                _ = &mut hard => {
                    msg_warning!(Message::AuthHardTimeout(self.config.hard_timeout_ms));
                    self.connection.degrade(&Message::AuthHardTimeout(self.config.hard_timeout_ms));
                    return self.settle_degraded().await;
                }
            }
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<SignUpOutcome, Failure> {
        let email = normalize_email(email).map_err(Failure::from)?;
        required("password", password).map_err(Failure::from)?;
        let name = required("name", name).map_err(Failure::from)?;
        msg_debug!(Message::SignUpStarted(email.clone()));

        let provider = self.provider();
        if self.store.teacher_by_email(&email).await?.is_some() {
            msg_warning!(Message::SignUpDuplicate(email.clone()));
            return Err(Failure::new(FailureReason::ServiceError, Message::SignUpDuplicate(email).to_string()));
        }
        // The lookup may have demoted the mode.
        if provider.is_remote() && self.connection.mode() != Mode::Remote {
            return Err(Failure::new(
                FailureReason::Network,
                Message::SignUpInterrupted(email).to_string(),
            ));
        }

        let (identity, session) = provider
            .sign_up(&email, password)
            .await
            .map_err(|err| self.auth_failure(&provider, err))?;

        let teacher = match self.store.create_teacher(&email, &name).await {
            Ok(teacher) => teacher,
            Err(err) => {
                let failure = Failure::from(err);
                msg_warning!(Message::SignUpPartialFailure(email, failure.message.clone()));
                if session.is_some() {
                    self.discard_session(&provider).await;
                }
                self.clear();
                return Ok(SignUpOutcome::PartialFailure { identity, failure });
            }
        };

        match session {
            Some(session) => {
                self.adopt(session, teacher.clone());
                msg_success!(Message::SignedUp(email));
                Ok(SignUpOutcome::SignedIn(teacher))
            }
            None => {
                msg_info!(Message::SignUpConfirmationRequired(email));
                Ok(SignUpOutcome::ConfirmationRequired(teacher))
            }
        }
    }

    /// Authenticates and makes sure a profile exists for the identity.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Teacher, Failure> {
        let email = normalize_email(email).map_err(Failure::from)?;
        required("password", password).map_err(Failure::from)?;
        msg_debug!(Message::SignInStarted(email.clone()));

        let provider = self.provider();
        let session = provider.sign_in(&email, password).await.map_err(|err| match err {
            StoreError::Service {
                status: 400 | 401 | 403 | 422,
                message,
                ..
            } => Failure::new(FailureReason::InvalidCredentials, message),
            other => self.auth_failure(&provider, other),
        })?;

        match self.ensure_profile(&session.identity.email).await {
            Ok(teacher) => {
                self.adopt(session, teacher.clone());
                msg_success!(Message::SignedIn(email));
                Ok(teacher)
            }
            Err(failure) => {
                self.discard_session(&provider).await;
                self.clear();
                Err(failure)
            }
        }
    }

    /// Clears the in-memory identity and profile. Stored entities are untouched.
    pub async fn sign_out(&self) -> Result<(), Failure> {
        let remote_session = self.state().session().is_some_and(|s| s.access_token.is_some());
        let local = self.local.sign_out().await.map_err(Failure::from);
        let remote = match &self.remote {
            Some(remote) if remote_session => {
                let provider = Provider::Remote(remote);
                provider.sign_out().await.map_err(|err| self.auth_failure(&provider, err))
            }
            _ => Ok(()),
        };
        self.clear();

        match local.and(remote) {
            Ok(()) => {
                msg_info!(Message::SignedOut);
                Ok(())
            }
            Err(failure) => {
                msg_error!(Message::SignOutFailed(failure.to_string()));
                Err(failure)
            }
        }
    }

    pub async fn update_password(&self, password: &str) -> Result<(), Failure> {
        required("password", password).map_err(Failure::from)?;
        let session = self.current_session()?;

        let provider = match (&self.remote, session.access_token.is_some()) {
            (Some(remote), true) => Provider::Remote(remote),
            _ => Provider::Local(&self.local),
        };
        provider
            .update_password(password)
            .await
            .map_err(|err| self.auth_failure(&provider, err))?;
        msg_success!(Message::PasswordUpdated);
        Ok(())
    }

    pub async fn update_profile_name(&self, name: &str) -> Result<Teacher, Failure> {
        self.current_session()?;
        let teacher_id = self
            .teacher()
            .map(|t| t.id)
            .ok_or_else(|| Failure::new(FailureReason::ProfileMissing, Message::NotSignedIn.to_string()))?;

        let teacher = self.store.update_teacher_name(teacher_id, name).await?;
        *self.teacher.lock() = Some(teacher.clone());
        msg_info!(Message::ProfileRenamed(teacher.name.clone()));
        Ok(teacher)
    }

    fn provider(&self) -> Provider<'_, I> {
        match (self.connection.mode(), &self.remote) {
            (Mode::Remote, Some(remote)) => Provider::Remote(remote),
            _ => Provider::Local(&self.local),
        }
    }

    fn current_session(&self) -> Result<AuthSession, Failure> {
        self.state()
            .session()
            .cloned()
            .ok_or_else(|| Failure::new(FailureReason::InvalidCredentials, Message::NotSignedIn.to_string()))
    }

    fn auth_failure(&self, provider: &Provider<'_, I>, err: StoreError) -> Failure {
        if provider.is_remote() && err.is_connectivity() {
            self.connection.degrade(&err);
        }
        Failure::from(err)
    }

    /// Best-effort sign-out after a half-finished sign-up or sign-in.
    async fn discard_session(&self, provider: &Provider<'_, I>) {
        if let Err(err) = provider.sign_out().await {
            msg_warning!(Message::SignOutFailed(err.to_string()));
        }
    }

    async fn ensure_profile(&self, email: &str) -> Result<Teacher, Failure> {
        let failed = |err: StoreError| {
            msg_warning!(Message::ProfileUnavailable(email.to_string(), err.to_string()));
            Failure::new(FailureReason::ProfileMissing, err.to_string())
        };

        if let Some(teacher) = self.store.teacher_by_email(email).await.map_err(failed)? {
            return Ok(teacher);
        }
        let name = email.split('@').next().unwrap_or(email);
        let teacher = self.store.create_teacher(email, name).await.map_err(failed)?;
        msg_info!(Message::ProfileCreatedOnSignIn(email.to_string()));
        Ok(teacher)
    }

    async fn resolve_remote_session(&self) -> Result<Option<AuthSession>, StoreError> {
        let Some(remote) = &self.remote else {
            return Ok(None);
        };

        let attempts = 1 + self.config.check_retries;
        let timeout = self.connection.config().probe_timeout();
        let mut outcome = Reachability::Unreachable;
        for attempt in 1..=attempts {
            // Later attempts go through retry so a success can lift an earlier demotion.
            outcome = if attempt == 1 {
                self.connection.check_reachability(timeout).await
            } else {
                self.connection.retry().await
            };
            msg_debug!(Message::AuthCheckAttempt(attempt, attempts, outcome.to_string()));
            if outcome == Reachability::Reachable {
                break;
            }
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
            }
        }

        match outcome {
            Reachability::Reachable => remote.current_session().await,
            Reachability::Offline => Err(StoreError::Offline),
            Reachability::Timeout => Err(StoreError::Timeout(timeout)),
            Reachability::Unreachable => Err(StoreError::Unreachable(outcome.to_string())),
        }
    }

    async fn settle(&self, result: Result<Option<AuthSession>, StoreError>) -> AuthState {
        match result {
            Ok(Some(session)) => match self.ensure_profile(&session.identity.email).await {
                Ok(teacher) => {
                    msg_info!(Message::AuthSessionRestored(session.identity.email.clone()));
                    self.adopt(session, teacher);
                }
                Err(_) => self.clear(),
            },
            Ok(None) => self.clear(),
            Err(err) if err.is_connectivity() => {
                self.connection.degrade(&err);
                return self.settle_degraded().await;
            }
            Err(err) => {
                msg_warning!(Message::AuthSessionExpired);
                msg_debug!(err);
                self.clear();
            }
        }
        self.state()
    }

    async fn settle_degraded(&self) -> AuthState {
        let session = self.local_session().await;
        let teacher = match &session {
            Some(session) => self.ensure_profile(&session.identity.email).await.ok(),
            None => None,
        };
        *self.teacher.lock() = teacher;
        let state = AuthState::Degraded { session };
        self.publish(state.clone());
        state
    }

    async fn local_session(&self) -> Option<AuthSession> {
        match self.local.current_session().await {
            Ok(session) => session,
            Err(err) => {
                msg_warning!(Message::SessionCacheCorrupt(err.to_string()));
                None
            }
        }
    }

    fn adopt(&self, session: AuthSession, teacher: Teacher) {
        *self.teacher.lock() = Some(teacher);
        let state = match self.connection.mode() {
            Mode::Remote => AuthState::Ready { session: Some(session) },
            Mode::LocalFallback => AuthState::Degraded { session: Some(session) },
        };
        self.publish(state);
    }

    fn clear(&self) {
        *self.teacher.lock() = None;
        let state = match self.connection.mode() {
            Mode::Remote => AuthState::Ready { session: None },
            Mode::LocalFallback => AuthState::Degraded { session: None },
        };
        self.publish(state);
    }

    fn publish(&self, state: AuthState) {
        msg_debug!(Message::AuthStateChanged(state.to_string()));
        self.state.send_replace(state);
    }
}
