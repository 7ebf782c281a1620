//! Blocking analytical driver boundary.
//!
//! The driver is an external collaborator: every call blocks and may fail.
//! Callers never share a session; each unit of work opens a [`Session`] which is
//! closed when it goes out of scope.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use pbi_store::models::{CellValue, ColumnInfo, Row};

pub mod memory;

pub use memory::{MemoryClient, MemoryModel, ModelLoadError};

/// Credentials and target for one tabular model.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    endpoint: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    catalog: String,
}

impl ConnectionDescriptor {
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        catalog: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            catalog: catalog.into(),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    /// Builds the MSOLAP provider string handed to the driver.
    #[must_use]
    pub fn provider_string(&self) -> String {
        format!(
            "Provider=MSOLAP;Data Source={};Initial Catalog={};User ID=app:{}@{};Password={};",
            self.endpoint, self.catalog, self.client_id, self.tenant_id, self.client_secret
        )
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("endpoint", &self.endpoint)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("catalog", &self.catalog)
            .finish()
    }
}

/// Failure reported by the driver. The message is passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    message: String,
}

impl DriverError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for DriverError {}

/// One entry of the driver's table schema rowset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaTableRow {
    pub name: String,
    pub schema: Option<String>,
}

/// Tabular result of a query: column metadata plus positional rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<CellValue>>,
}

impl QueryResult {
    #[must_use]
    pub fn first_value(&self) -> Option<&CellValue> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Pairs each row with the column names.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        let Self { columns, rows } = self;
        rows.into_iter()
            .map(|values| {
                columns
                    .iter()
                    .map(|column| column.name.clone())
                    .zip(values)
                    .collect()
            })
            .collect()
    }
}

/// Factory for transient driver sessions.
pub trait DataClient: Send + Sync {
    /// Opens a session against the model described by `descriptor`.
    ///
    /// # Errors
    /// Returns `DriverError` when the model cannot be reached or rejects the credentials.
    fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn DataSession>, DriverError>;
}

/// A single open driver handle. Not shared across callers.
pub trait DataSession: Send {
    /// Reads the table schema rowset.
    ///
    /// # Errors
    /// Returns `DriverError` if the rowset cannot be read.
    fn schema_tables(&mut self) -> Result<Vec<SchemaTableRow>, DriverError>;

    /// Executes a DAX or DMV query.
    ///
    /// # Errors
    /// Returns `DriverError` if the query is rejected or fails.
    fn execute(&mut self, query: &str) -> Result<QueryResult, DriverError>;

    fn close(&mut self) {}
}

/// Scoped session: closed on every exit path when dropped.
pub struct Session {
    inner: Box<dyn DataSession>,
}

impl Session {
    /// Opens a session through `client`.
    ///
    /// # Errors
    /// Returns the driver's error when the open fails.
    pub fn open(
        client: &dyn DataClient,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Self, DriverError> {
        Ok(Self {
            inner: client.open(descriptor)?,
        })
    }

    /// # Errors
    /// Returns the driver's error.
    pub fn schema_tables(&mut self) -> Result<Vec<SchemaTableRow>, DriverError> {
        self.inner.schema_tables()
    }

    /// # Errors
    /// Returns the driver's error.
    pub fn execute(&mut self, query: &str) -> Result<QueryResult, DriverError> {
        self.inner.execute(query)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// The driver as seen by the connector: loaded, or unavailable in this environment.
#[derive(Clone)]
pub enum Driver {
    Loaded(Arc<dyn DataClient>),
    Unavailable(String),
}

impl Driver {
    #[must_use]
    pub fn loaded(client: Arc<dyn DataClient>) -> Self {
        Self::Loaded(client)
    }

    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// Returns the client, or the reason it could not be loaded.
    ///
    /// # Errors
    /// Returns the unavailability reason.
    pub fn client(&self) -> Result<Arc<dyn DataClient>, &str> {
        match self {
            Self::Loaded(client) => Ok(client.clone()),
            Self::Unavailable(reason) => Err(reason),
        }
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded(_) => f.write_str("Driver::Loaded"),
            Self::Unavailable(reason) => write!(f, "Driver::Unavailable({reason})"),
        }
    }
}
