//! Catalog constants and query builders for the tabular model.

/// Table-name prefixes that mark engine-generated tables.
pub const RESERVED_TABLE_PREFIXES: &[&str] = &["$", "DateTableTemplate_"];

/// Schema namespace holding the engine's own metadata rowsets.
pub const SYSTEM_SCHEMA: &str = "$SYSTEM";

pub const DMV_TABLES: &str = "$SYSTEM.TMSCHEMA_TABLES";
pub const DMV_MEASURES: &str = "$SYSTEM.TMSCHEMA_MEASURES";

/// Rows fetched when probing a table for its columns.
pub const PROBE_ROWS: usize = 1;

/// Returns true when a schema-rowset entry names a user-facing table.
///
/// Matching is exact and case-sensitive.
#[must_use]
pub fn is_user_table(name: &str, schema: Option<&str>) -> bool {
    if schema == Some(SYSTEM_SCHEMA) {
        return false;
    }
    !RESERVED_TABLE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Quotes a table name as a DAX table reference.
#[must_use]
pub fn quote_table(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

#[must_use]
pub fn top_n_query(table: &str, rows: usize) -> String {
    format!("EVALUATE TOPN({rows}, {})", quote_table(table))
}

#[must_use]
pub fn table_id_query(table: &str) -> String {
    format!(
        "SELECT [ID] FROM {DMV_TABLES} WHERE [Name] = '{}'",
        table.replace('\'', "''")
    )
}

#[must_use]
pub fn measures_query(table_id: i64) -> String {
    format!(
        "SELECT [Name], [Expression] FROM {DMV_MEASURES} WHERE [TableID] = {table_id} ORDER BY [Name]"
    )
}
