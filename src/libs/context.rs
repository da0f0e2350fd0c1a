//! Wires the persistence layer together from a [`Config`].
//!
//! ```rust,no_run
//! use rollcall::libs::config::Config;
//! use rollcall::libs::context::AppContext;
//!
//! # async fn run() -> anyhow::Result<()> {
//! rollcall::libs::logging::init();
//! let context = AppContext::bootstrap(Config::read()?)?;
//! let state = context.session.initialize().await;
//! println!("{}", state);
//! # Ok(())
//! # }
//! ```

use crate::api::auth::RemoteAuth;
use crate::api::client::RemoteClient;
use crate::api::rest::RemoteStore;
use crate::db::db::{Db, DB_FILE_NAME};
use crate::db::local_auth::LocalAuth;
use crate::db::local_store::LocalStore;
use crate::libs::aggregator::AttendanceAggregator;
use crate::libs::config::Config;
use crate::libs::connection::ConnectionManager;
use crate::libs::data_storage::DataStorage;
use crate::libs::session::AuthSessionManager;
use crate::libs::store::DataStore;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Shared handles to every component; cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    pub connection: Arc<ConnectionManager>,
    pub store: Arc<DataStore>,
    pub aggregator: Arc<AttendanceAggregator>,
    pub session: Arc<AuthSessionManager>,
}

impl AppContext {
    /// Uses the default data directory.
    pub fn bootstrap(config: Config) -> Result<Self> {
        Self::bootstrap_in(config, &DataStorage::new())
    }

    pub fn bootstrap_in(config: Config, storage: &DataStorage) -> Result<Self> {
        let db_path = storage.get_path(DB_FILE_NAME)?;
        let db = Db::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?;

        let connection = Arc::new(ConnectionManager::new(&config.connection, config.remote.as_ref()));

        // Both remote clients share one access token.
        let client = config
            .remote
            .as_ref()
            .map(|remote| RemoteClient::new(remote, config.connection.request_timeout()));
        let remote_store = client.clone().map(RemoteStore::new);
        let remote_auth = client
            .map(|client| RemoteAuth::with_storage(client, storage))
            .transpose()?;

        let store = Arc::new(DataStore::new(connection.clone(), remote_store, LocalStore::new(db.clone())));
        let aggregator = Arc::new(AttendanceAggregator::new(store.clone()));
        let session = Arc::new(AuthSessionManager::new(
            config.session.clone(),
            connection.clone(),
            remote_auth,
            LocalAuth::new(db),
            store.clone(),
        ));

        Ok(Self {
            connection,
            store,
            aggregator,
            session,
        })
    }
}
