//! Connection orchestration for the single tabular model connection.
//!
//! The connector owns the connection state, serializes connects behind one
//! mutex, and runs every driver call on the [`WorkerPool`] with its own scoped
//! [`Session`].

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use pbi_store::models::{Row, TableDescriptor};
use pbi_store::schema::top_n_query;
use tokio::sync::{MutexGuard, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::driver::{ConnectionDescriptor, Driver, DriverError, Session};
use crate::pool::{PoolError, WorkerPool};
use crate::sanitize::sanitize;

mod catalog;

#[derive(Debug)]
pub enum ConnectorError {
    NotConnected,
    DriverUnavailable(String),
    Connection(String),
    Discovery(String),
    Schema(String),
    Query(String),
    Pool(PoolError),
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => f.write_str("Not connected to Power BI"),
            Self::DriverUnavailable(reason) => {
                write!(f, "analytical driver not available: {reason}")
            }
            Self::Connection(message) => write!(f, "Connection failed: {message}"),
            Self::Discovery(message) => write!(f, "Failed to discover tables: {message}"),
            Self::Schema(message) => write!(f, "Failed to get schema for {message}"),
            Self::Query(message) => write!(f, "DAX query failed: {message}"),
            Self::Pool(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConnectorError {}

impl From<PoolError> for ConnectorError {
    fn from(err: PoolError) -> Self {
        Self::Pool(err)
    }
}

/// Snapshot of the connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    descriptor: Option<Arc<ConnectionDescriptor>>,
    connected: bool,
    generation: u64,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    #[must_use]
    pub fn descriptor(&self) -> Option<&ConnectionDescriptor> {
        self.descriptor.as_deref()
    }

    /// Incremented by every connect attempt.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Owns the connection to one tabular model.
pub struct Connector {
    driver: Driver,
    pool: WorkerPool,
    state: RwLock<ConnectionState>,
    connect_lock: tokio::sync::Mutex<()>,
    tables: OnceCell<Arc<Vec<String>>>,
    schemas: RwLock<HashMap<String, Arc<TableDescriptor>>>,
    primer: Mutex<Option<JoinHandle<()>>>,
}

impl Connector {
    #[must_use]
    pub fn new(driver: Driver, pool: WorkerPool) -> Self {
        Self {
            driver,
            pool,
            state: RwLock::new(ConnectionState::default()),
            connect_lock: tokio::sync::Mutex::new(()),
            tables: OnceCell::new(),
            schemas: RwLock::new(HashMap::new()),
            primer: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    #[must_use]
    pub const fn driver(&self) -> &Driver {
        &self.driver
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state().generation()
    }

    /// Probes the model and records the outcome.
    ///
    /// Concurrent calls wait on the connect mutex and then run in turn; the last
    /// one to finish decides the state. Returns the new connection generation.
    ///
    /// # Errors
    /// Returns `ConnectorError::DriverUnavailable` when no driver is loaded and
    /// `ConnectorError::Connection` with the driver's message when the probe fails.
    pub async fn connect(&self, descriptor: ConnectionDescriptor) -> Result<u64, ConnectorError> {
        let guard = self.connect_lock.lock().await;
        let client = self
            .driver
            .client()
            .map_err(|reason| ConnectorError::DriverUnavailable(reason.to_string()))?;

        let descriptor = Arc::new(descriptor);
        let probe = descriptor.clone();
        let outcome = self
            .pool
            .run(move || Session::open(client.as_ref(), &probe).map(drop))
            .await
            .map_err(ConnectorError::from)
            .and_then(|probed| probed.map_err(|err| ConnectorError::Connection(err.to_string())));

        match outcome {
            Ok(()) => {
                let generation = self.transition(&guard, Some(descriptor.clone()));
                info!(
                    catalog = descriptor.catalog(),
                    generation, "connected to Power BI dataset"
                );
                Ok(generation)
            }
            Err(err) => {
                let generation = self.transition(&guard, None);
                error!(generation, %err, "connection attempt failed");
                Err(err)
            }
        }
    }

    /// The only place connection state changes. Requires the connect guard.
    fn transition(
        &self,
        _guard: &MutexGuard<'_, ()>,
        descriptor: Option<Arc<ConnectionDescriptor>>,
    ) -> u64 {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.generation += 1;
        state.connected = descriptor.is_some();
        state.descriptor = descriptor;
        state.generation
    }

    /// Keeps the handle of the background task priming the current connection.
    ///
    /// A previous task is detached, not aborted; it finishes on its own.
    pub fn track_primer(&self, handle: JoinHandle<()>) {
        let mut slot = self.primer.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|previous| !previous.is_finished()) {
            debug!("detaching priming task of a superseded connection");
        }
        *slot = Some(handle);
    }

    /// Returns true while a tracked priming task is still running.
    #[must_use]
    pub fn is_priming(&self) -> bool {
        self.primer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Executes a query after sanitizing it and returns the rows.
    ///
    /// # Errors
    /// Returns `NotConnected` before a successful connect and `Query` when the
    /// driver rejects the query.
    pub async fn execute_query(&self, query: &str) -> Result<Vec<Row>, ConnectorError> {
        self.run_query(sanitize(query)).await
    }

    /// Fetches the first `rows` rows of `table`.
    ///
    /// The generated query is already quoted and is sent as is.
    ///
    /// # Errors
    /// Same as [`Connector::execute_query`].
    pub async fn sample_data(&self, table: &str, rows: usize) -> Result<Vec<Row>, ConnectorError> {
        self.run_query(top_n_query(table, rows)).await
    }

    async fn run_query(&self, query: String) -> Result<Vec<Row>, ConnectorError> {
        info!(query = %query, "executing DAX query");
        let result = self
            .with_session(move |session| session.execute(&query))
            .await?
            .map_err(|err| {
                error!(%err, "DAX query failed");
                ConnectorError::Query(err.to_string())
            })?;
        let rows = result.into_rows();
        info!(rows = rows.len(), "query returned rows");
        Ok(rows)
    }

    fn require_connected(&self) -> Result<Arc<ConnectionDescriptor>, ConnectorError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match (&state.descriptor, state.connected) {
            (Some(descriptor), true) => Ok(descriptor.clone()),
            _ => Err(ConnectorError::NotConnected),
        }
    }

    /// Opens a scoped session on a worker and runs `job` with it.
    ///
    /// The outer result carries precondition and pool failures; the inner one is
    /// the driver's own outcome, including a failure to open the session.
    async fn with_session<T, F>(&self, job: F) -> Result<Result<T, DriverError>, ConnectorError>
    where
        F: FnOnce(&mut Session) -> Result<T, DriverError> + Send + 'static,
        T: Send + 'static,
    {
        let descriptor = self.require_connected()?;
        let client = self
            .driver
            .client()
            .map_err(|reason| ConnectorError::DriverUnavailable(reason.to_string()))?;
        let outcome = self
            .pool
            .run(move || {
                let mut session = Session::open(client.as_ref(), &descriptor)?;
                job(&mut session)
            })
            .await?;
        Ok(outcome)
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("driver", &self.driver)
            .field("pool", &self.pool)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
