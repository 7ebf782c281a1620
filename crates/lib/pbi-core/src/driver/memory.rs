//! In-memory tabular driver backed by a JSON model description.
//!
//! Understands the query shapes the connector emits: `EVALUATE TOPN(n, 'T')`,
//! `EVALUATE 'T'`, and the `TMSCHEMA_TABLES` / `TMSCHEMA_MEASURES` lookups.
//! Measure-only tables have no columns and fail the `TOPN` probe, as they do on
//! the service.

use std::error::Error;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use chrono::{NaiveDate, NaiveDateTime};
use pbi_store::models::{CellValue, ColumnInfo};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::{
    ConnectionDescriptor, DataClient, DataSession, DriverError, QueryResult, SchemaTableRow,
};

static TOPN_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*EVALUATE\s+TOPN\s*\(\s*(\d+)\s*,\s*(?:'((?:[^']|'')*)'|([A-Za-z_][A-Za-z0-9_]*))\s*\)\s*$")
        .expect("valid TOPN pattern")
});
static EVALUATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*EVALUATE\s+(?:'((?:[^']|'')*)'|([A-Za-z_][A-Za-z0-9_]*))\s*$")
        .expect("valid EVALUATE pattern")
});
static TABLE_ID_LOOKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*SELECT\s+\[ID\]\s+FROM\s+\$SYSTEM\.TMSCHEMA_TABLES\s+WHERE\s+\[Name\]\s*=\s*'((?:[^']|'')*)'\s*$")
        .expect("valid table id pattern")
});
static MEASURE_LOOKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*SELECT\s+\[Name\]\s*,\s*\[Expression\]\s+FROM\s+\$SYSTEM\.TMSCHEMA_MEASURES\s+WHERE\s+\[TableID\]\s*=\s*(\d+)(?:\s+ORDER\s+BY\s+\[Name\])?\s*$")
        .expect("valid measure pattern")
});

#[derive(Debug)]
pub enum ModelLoadError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for ModelLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read model file: {err}"),
            Self::Json(err) => write!(f, "failed to parse model file: {err}"),
            Self::Invalid(message) => write!(f, "invalid model: {message}"),
        }
    }
}

impl Error for ModelLoadError {}

impl From<std::io::Error> for ModelLoadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ModelLoadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

#[derive(Debug, Deserialize)]
struct ModelFile {
    #[serde(default)]
    catalog: Option<String>,
    tables: Vec<TableFile>,
}

#[derive(Debug, Deserialize)]
struct TableFile {
    name: String,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    columns: Vec<ColumnFile>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
    #[serde(default)]
    measures: Vec<MeasureFile>,
}

#[derive(Debug, Deserialize)]
struct ColumnFile {
    name: String,
    #[serde(default = "default_data_type")]
    data_type: String,
}

#[derive(Debug, Deserialize)]
struct MeasureFile {
    name: String,
    expression: String,
}

fn default_data_type() -> String {
    "string".to_string()
}

#[derive(Debug, Clone)]
struct MemoryTable {
    id: i64,
    name: String,
    schema: Option<String>,
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<CellValue>>,
    measures: Vec<(String, String)>,
}

/// A decoded tabular model.
#[derive(Debug, Clone, Default)]
pub struct MemoryModel {
    catalog: Option<String>,
    tables: Vec<MemoryTable>,
}

impl MemoryModel {
    /// Loads a model from a JSON file on disk.
    ///
    /// # Errors
    /// Returns `ModelLoadError` if the file cannot be read or decoded.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Decodes a model from JSON text.
    ///
    /// # Errors
    /// Returns `ModelLoadError` on malformed JSON, ragged rows, or unparseable cells.
    pub fn from_json(text: &str) -> Result<Self, ModelLoadError> {
        let file: ModelFile = serde_json::from_str(text)?;
        let mut tables = Vec::with_capacity(file.tables.len());
        for (index, table) in file.tables.into_iter().enumerate() {
            let id = i64::try_from(index + 1)
                .map_err(|_| ModelLoadError::Invalid("too many tables".to_string()))?;
            tables.push(decode_table(id, table)?);
        }
        Ok(Self {
            catalog: file.catalog,
            tables,
        })
    }

    #[must_use]
    pub fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.iter().find(|table| table.name == name)
    }

    fn execute(&self, query: &str) -> Result<QueryResult, DriverError> {
        if let Some(captures) = TOPN_QUERY.captures(query) {
            let limit = captures[1]
                .parse::<usize>()
                .map_err(|err| DriverError::new(format!("invalid TOPN count: {err}")))?;
            let name = table_reference(captures.get(2), captures.get(3));
            return self.evaluate(&name, Some(limit));
        }
        if let Some(captures) = EVALUATE_TABLE.captures(query) {
            let name = table_reference(captures.get(1), captures.get(2));
            return self.evaluate(&name, None);
        }
        if let Some(captures) = TABLE_ID_LOOKUP.captures(query) {
            let name = captures[1].replace("''", "'");
            let rows = self
                .table(&name)
                .map(|table| vec![vec![CellValue::Integer(table.id)]])
                .unwrap_or_default();
            return Ok(QueryResult {
                columns: vec![ColumnInfo::new("ID", "int64")],
                rows,
            });
        }
        if let Some(captures) = MEASURE_LOOKUP.captures(query) {
            let id = captures[1]
                .parse::<i64>()
                .map_err(|err| DriverError::new(format!("invalid table id: {err}")))?;
            let mut measures: Vec<(String, String)> = self
                .tables
                .iter()
                .find(|table| table.id == id)
                .map(|table| table.measures.clone())
                .unwrap_or_default();
            measures.sort_by(|left, right| left.0.cmp(&right.0));
            return Ok(QueryResult {
                columns: vec![
                    ColumnInfo::new("Name", "string"),
                    ColumnInfo::new("Expression", "string"),
                ],
                rows: measures
                    .into_iter()
                    .map(|(name, expression)| {
                        vec![CellValue::Text(name), CellValue::Text(expression)]
                    })
                    .collect(),
            });
        }
        Err(DriverError::new(format!(
            "Query (1, 1) The syntax for '{}' is incorrect.",
            query.trim()
        )))
    }

    fn evaluate(&self, name: &str, limit: Option<usize>) -> Result<QueryResult, DriverError> {
        let table = self.table(name).ok_or_else(|| {
            DriverError::new(format!("Failed to resolve name '{name}'. It is not a valid table."))
        })?;
        if table.columns.is_empty() {
            return Err(DriverError::new(format!(
                "The table '{name}' does not contain any columns."
            )));
        }
        let columns = table
            .columns
            .iter()
            .map(|column| {
                ColumnInfo::new(
                    format!("{}[{}]", table.name, column.name),
                    &column.data_type,
                )
            })
            .collect();
        let rows = table
            .rows
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(QueryResult { columns, rows })
    }
}

fn table_reference(quoted: Option<regex::Match<'_>>, bare: Option<regex::Match<'_>>) -> String {
    quoted
        .map(|found| found.as_str().replace("''", "'"))
        .or_else(|| bare.map(|found| found.as_str().to_string()))
        .unwrap_or_default()
}

fn decode_table(id: i64, table: TableFile) -> Result<MemoryTable, ModelLoadError> {
    let columns: Vec<ColumnInfo> = table
        .columns
        .into_iter()
        .map(|column| ColumnInfo::new(column.name, column.data_type))
        .collect();
    let mut rows = Vec::with_capacity(table.rows.len());
    for (index, raw) in table.rows.into_iter().enumerate() {
        if raw.len() != columns.len() {
            return Err(ModelLoadError::Invalid(format!(
                "table '{}' row {index} has {} cells, expected {}",
                table.name,
                raw.len(),
                columns.len()
            )));
        }
        let mut row = Vec::with_capacity(raw.len());
        for (column, value) in columns.iter().zip(raw) {
            let cell = decode_cell(&column.data_type, value).map_err(|message| {
                ModelLoadError::Invalid(format!(
                    "table '{}' row {index} column '{}': {message}",
                    table.name, column.name
                ))
            })?;
            row.push(cell);
        }
        rows.push(row);
    }
    Ok(MemoryTable {
        id,
        name: table.name,
        schema: table.schema,
        columns,
        rows,
        measures: table
            .measures
            .into_iter()
            .map(|measure| (measure.name, measure.expression))
            .collect(),
    })
}

fn decode_cell(data_type: &str, value: Value) -> Result<CellValue, String> {
    if value.is_null() {
        return Ok(CellValue::Null);
    }
    let cell = match (data_type.to_ascii_lowercase().as_str(), value) {
        ("boolean" | "bool", Value::Bool(flag)) => CellValue::Bool(flag),
        ("int64" | "integer", Value::Number(number)) => {
            CellValue::Integer(number.as_i64().ok_or("expected an integer")?)
        }
        ("double" | "float", Value::Number(number)) => {
            CellValue::Float(number.as_f64().ok_or("expected a number")?)
        }
        ("decimal" | "currency", Value::Number(number)) => CellValue::Decimal(
            Decimal::from_str(&number.to_string()).map_err(|err| err.to_string())?,
        ),
        ("decimal" | "currency", Value::String(text)) => {
            CellValue::Decimal(Decimal::from_str(&text).map_err(|err| err.to_string())?)
        }
        ("date", Value::String(text)) => CellValue::Date(
            NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|err| err.to_string())?,
        ),
        ("datetime", Value::String(text)) => CellValue::DateTime(
            NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S")
                .map_err(|err| err.to_string())?,
        ),
        ("string", Value::String(text)) => CellValue::Text(text),
        (_, other) => CellValue::Other(other.to_string()),
    };
    Ok(cell)
}

#[derive(Debug, Default)]
struct SessionCounters {
    opened: AtomicUsize,
    open: AtomicUsize,
}

/// Driver client serving a [`MemoryModel`].
#[derive(Debug, Clone)]
pub struct MemoryClient {
    model: Arc<RwLock<Arc<MemoryModel>>>,
    counters: Arc<SessionCounters>,
}

impl MemoryClient {
    #[must_use]
    pub fn new(model: MemoryModel) -> Self {
        Self {
            model: Arc::new(RwLock::new(Arc::new(model))),
            counters: Arc::new(SessionCounters::default()),
        }
    }

    /// Swaps the served model; sessions opened afterwards see the new one.
    pub fn replace_model(&self, model: MemoryModel) {
        let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(model);
    }

    /// Total sessions opened over the client's lifetime.
    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Sessions currently open.
    #[must_use]
    pub fn sessions_open(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Arc<MemoryModel> {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DataClient for MemoryClient {
    fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn DataSession>, DriverError> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let model = self.snapshot();
        if let Some(catalog) = model.catalog() {
            if catalog != descriptor.catalog() {
                return Err(DriverError::new(format!(
                    "Either the database '{}' does not exist, or you do not have permissions to access it.",
                    descriptor.catalog()
                )));
            }
        }
        self.counters.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            model,
            counters: self.counters.clone(),
            closed: false,
        }))
    }
}

struct MemorySession {
    model: Arc<MemoryModel>,
    counters: Arc<SessionCounters>,
    closed: bool,
}

impl DataSession for MemorySession {
    fn schema_tables(&mut self) -> Result<Vec<SchemaTableRow>, DriverError> {
        Ok(self
            .model
            .tables
            .iter()
            .map(|table| SchemaTableRow {
                name: table.name.clone(),
                schema: table.schema.clone(),
            })
            .collect())
    }

    fn execute(&mut self, query: &str) -> Result<QueryResult, DriverError> {
        self.model.execute(query)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
