use std::sync::{Arc, PoisonError};

use pbi_store::models::{CellValue, MeasureInfo, TableDescriptor, TableKind};
use pbi_store::schema::{PROBE_ROWS, is_user_table, measures_query, table_id_query, top_n_query};
use tracing::{debug, info, warn};

use super::{Connector, ConnectorError};
use crate::driver::{DriverError, Session};

impl Connector {
    /// Lists the user-facing tables of the model.
    ///
    /// The first successful discovery is kept for the life of the process; later
    /// calls return the same list without touching the driver, even after a
    /// reconnect. Concurrent first calls share a single discovery.
    ///
    /// # Errors
    /// Returns `NotConnected` before a successful connect and `Discovery` when the
    /// schema rowset cannot be read.
    pub async fn discover_tables(&self) -> Result<Arc<Vec<String>>, ConnectorError> {
        self.require_connected()?;
        let tables = self
            .tables
            .get_or_try_init(|| async {
                let rows = self
                    .with_session(|session| session.schema_tables())
                    .await?
                    .map_err(|err| ConnectorError::Discovery(err.to_string()))?;
                let tables: Vec<String> = rows
                    .into_iter()
                    .filter(|row| is_user_table(&row.name, row.schema.as_deref()))
                    .map(|row| row.name)
                    .collect();
                info!(count = tables.len(), "discovered tables");
                Ok::<_, ConnectorError>(Arc::new(tables))
            })
            .await?;
        Ok(tables.clone())
    }

    /// Describes one table.
    ///
    /// Data tables are recognized by a top-1 probe. When the probe fails the table
    /// is treated as a measure container and its measures are listed. Driver
    /// failures past the probe produce an `error` descriptor instead of an error.
    /// Successful descriptors are cached per table name.
    ///
    /// # Errors
    /// Returns only precondition failures: `NotConnected`, `DriverUnavailable`, or
    /// a worker pool error.
    pub async fn table_schema(&self, table: &str) -> Result<Arc<TableDescriptor>, ConnectorError> {
        self.require_connected()?;
        if let Some(cached) = self.cached_schema(table) {
            return Ok(cached);
        }

        let name = table.to_string();
        let described = self
            .with_session(move |session| Ok(describe_table(session, &name)))
            .await?;
        let descriptor = described.unwrap_or_else(|err| {
            let err = ConnectorError::Schema(format!("table '{table}': {err}"));
            warn!(table, %err, "failed to open session for schema lookup");
            TableDescriptor::error(table, err.to_string())
        });

        if descriptor.kind == TableKind::Error {
            return Ok(Arc::new(descriptor));
        }
        let mut schemas = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
        let cached = schemas
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(descriptor));
        Ok(cached.clone())
    }

    fn cached_schema(&self, table: &str) -> Option<Arc<TableDescriptor>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
    }
}

fn describe_table(session: &mut Session, table: &str) -> TableDescriptor {
    match session.execute(&top_n_query(table, PROBE_ROWS)) {
        Ok(result) => TableDescriptor::data_table(table, result.columns),
        Err(probe_err) => {
            debug!(table, %probe_err, "probe failed; looking up measures");
            match lookup_measures(session, table) {
                Ok(Some(measures)) => TableDescriptor::measure_table(table, measures),
                Ok(None) => TableDescriptor::unknown(table),
                Err(err) => {
                    let err = ConnectorError::Schema(format!("table '{table}': {err}"));
                    warn!(table, %err, "measure lookup failed");
                    TableDescriptor::error(table, err.to_string())
                }
            }
        }
    }
}

fn lookup_measures(
    session: &mut Session,
    table: &str,
) -> Result<Option<Vec<MeasureInfo>>, DriverError> {
    let ids = session.execute(&table_id_query(table))?;
    let Some(table_id) = ids.first_value().and_then(parse_table_id) else {
        return Ok(None);
    };
    let listing = session.execute(&measures_query(table_id))?;
    let measures = listing
        .rows
        .into_iter()
        .map(|row| {
            let mut cells = row.into_iter();
            MeasureInfo {
                name: cell_text(cells.next()),
                expression: cell_text(cells.next()),
            }
        })
        .collect();
    Ok(Some(measures))
}

fn parse_table_id(value: &CellValue) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
}

fn cell_text(value: Option<CellValue>) -> String {
    match value {
        None | Some(CellValue::Null) => String::new(),
        Some(CellValue::Text(text) | CellValue::Other(text)) => text,
        Some(other) => other.to_string(),
    }
}
