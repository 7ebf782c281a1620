use std::path::PathBuf;
use std::sync::Arc;

use pbi_core::connector::{Connector, ConnectorError};
use pbi_core::driver::{
    ConnectionDescriptor, DataClient, DataSession, Driver, DriverError, MemoryClient, MemoryModel,
    QueryResult, SchemaTableRow,
};
use pbi_core::pool::WorkerPool;
use pbi_core::primer::{AnalysisSlot, ContextPrimer, PRIMED_TABLE_LIMIT, SAMPLE_ROWS};
use pbi_store::models::TableKind;
use pbi_store::schema::top_n_query;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join("contoso.json")
}

fn load_model() -> MemoryModel {
    let path = fixture_path();
    MemoryModel::from_path(&path).unwrap_or_else(|err| {
        let path_display = path.display();
        panic!("failed to load model fixture at {path_display}: {err}")
    })
}

fn descriptor() -> ConnectionDescriptor {
    ConnectionDescriptor::new(
        "powerbi://api.powerbi.com/v1.0/myorg/Contoso",
        "tenant",
        "client",
        "secret",
        "Contoso Sales",
    )
}

fn build_connector(workers: usize) -> (Arc<MemoryClient>, Arc<Connector>) {
    let client = Arc::new(MemoryClient::new(load_model()));
    let connector = Arc::new(Connector::new(
        Driver::loaded(client.clone()),
        WorkerPool::new(workers),
    ));
    (client, connector)
}

#[tokio::test]
async fn discovery_filters_reserved_tables_and_is_memoized() {
    let (client, connector) = build_connector(2);
    connector.connect(descriptor()).await.expect("connects");

    let first = connector.discover_tables().await.expect("discovers");
    assert_eq!(*first, vec!["Sales", "Product", "Key Measures"]);

    client.replace_model(
        MemoryModel::from_json(r#"{"tables": [{"name": "Inventory"}]}"#).expect("model parses"),
    );
    let opened = client.sessions_opened();
    let second = connector.discover_tables().await.expect("discovers");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(client.sessions_opened(), opened);
}

#[tokio::test]
async fn measure_containers_are_described_by_their_measures() {
    let (_client, connector) = build_connector(2);
    connector.connect(descriptor()).await.expect("connects");

    let schema = connector
        .table_schema("Key Measures")
        .await
        .expect("schema lookup never raises");
    assert_eq!(schema.kind, TableKind::MeasureTable);
    let names: Vec<&str> = schema.measures.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Order Count", "Total Sales"]);

    let again = connector.table_schema("Key Measures").await.expect("cached");
    assert!(Arc::ptr_eq(&schema, &again));
}

#[tokio::test]
async fn not_connected_operations_make_no_driver_calls() {
    let (client, connector) = build_connector(2);

    assert!(matches!(
        connector.discover_tables().await,
        Err(ConnectorError::NotConnected)
    ));
    assert!(matches!(
        connector.table_schema("Sales").await,
        Err(ConnectorError::NotConnected)
    ));
    assert!(matches!(
        connector.execute_query("EVALUATE 'Sales'").await,
        Err(ConnectorError::NotConnected)
    ));
    assert!(matches!(
        connector.sample_data("Sales", 3).await,
        Err(ConnectorError::NotConnected)
    ));
    assert_eq!(client.sessions_opened(), 0);
}

#[tokio::test]
async fn every_connect_attempt_advances_the_generation() {
    let (_client, connector) = build_connector(1);
    assert_eq!(connector.generation(), 0);

    let first = connector.connect(descriptor()).await.expect("connects");
    assert_eq!(first, 1);

    let wrong = ConnectionDescriptor::new("powerbi://x", "t", "c", "s", "Elsewhere");
    let err = connector.connect(wrong).await.expect_err("catalog mismatch");
    assert!(matches!(err, ConnectorError::Connection(_)));
    assert_eq!(connector.generation(), 2);
    assert!(!connector.is_connected());
    assert!(connector.state().descriptor().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_release_every_session() {
    let (client, connector) = build_connector(2);
    connector.connect(descriptor()).await.expect("connects");

    let mut handles = Vec::new();
    for rows in 1..=8 {
        let connector = connector.clone();
        handles.push(tokio::spawn(async move {
            connector.sample_data("Sales", rows).await
        }));
    }
    for handle in handles {
        handle.await.expect("task joins").expect("query runs");
    }

    let failed = connector.execute_query("EVALUATE 'Missing'").await;
    assert!(matches!(failed, Err(ConnectorError::Query(_))));
    assert_eq!(client.sessions_open(), 0);
}

#[tokio::test]
async fn primer_from_a_superseded_connection_is_discarded() {
    let (_client, connector) = build_connector(2);
    let slot = AnalysisSlot::new();

    let stale_generation = connector.connect(descriptor()).await.expect("connects");
    slot.reset(stale_generation);
    let stale = ContextPrimer::new(connector.clone(), slot.clone(), stale_generation);

    let fresh_generation = connector.connect(descriptor()).await.expect("reconnects");
    slot.reset(fresh_generation);

    assert!(!stale.run().await);
    assert!(slot.current().is_none());

    let fresh = ContextPrimer::new(connector.clone(), slot.clone(), fresh_generation);
    assert!(fresh.run().await);
    let context = slot.current().expect("fresh context installed");
    assert_eq!(context.tables.len(), 3);
    assert_eq!(
        context.schemas.get("Sales").map(|schema| schema.kind),
        Some(TableKind::DataTable)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connects_settle_on_the_last_attempt() {
    let (client, connector) = build_connector(4);

    let mut handles = Vec::new();
    for attempt in 0..16 {
        let connector = connector.clone();
        let target = if attempt % 2 == 0 {
            descriptor()
        } else {
            ConnectionDescriptor::new("powerbi://x", "t", "c", "s", "Nope")
        };
        handles.push(tokio::spawn(async move { connector.connect(target).await.ok() }));
    }
    let mut succeeded = Vec::new();
    for handle in handles {
        if let Some(generation) = handle.await.expect("task joins") {
            succeeded.push(generation);
        }
    }

    succeeded.sort_unstable();
    succeeded.dedup();
    assert_eq!(succeeded.len(), 8);
    assert_eq!(connector.generation(), 16);

    let state = connector.state();
    assert_eq!(state.is_connected(), state.descriptor().is_some());
    assert_eq!(state.is_connected(), succeeded.contains(&16));
    assert_eq!(client.sessions_open(), 0);
}

#[tokio::test]
async fn schema_failures_become_error_descriptors_and_are_not_cached() {
    let (client, connector) = build_connector(2);
    connector.connect(descriptor()).await.expect("connects");

    client.replace_model(
        MemoryModel::from_json(r#"{"catalog": "Fabrikam", "tables": []}"#).expect("model parses"),
    );
    let failed = connector
        .table_schema("Sales")
        .await
        .expect("schema lookup never raises");
    assert_eq!(failed.kind, TableKind::Error);
    let message = failed.error.as_deref().expect("error message attached");
    assert!(message.starts_with("Failed to get schema for table 'Sales'"));
    assert!(message.contains("'Contoso Sales' does not exist"));

    client.replace_model(load_model());
    let recovered = connector.table_schema("Sales").await.expect("schema");
    assert_eq!(recovered.kind, TableKind::DataTable);
    assert_eq!(client.sessions_open(), 0);
}

#[tokio::test]
async fn sample_queries_keep_table_names_verbatim() {
    let model = MemoryModel::from_json(
        r#"{"tables": [{
            "name": "Sales  Old",
            "columns": [{"name": "Region"}],
            "rows": [["West"], ["East"]]
        }]}"#,
    )
    .expect("model parses");
    let client = Arc::new(MemoryClient::new(model));
    let connector = Connector::new(Driver::loaded(client), WorkerPool::new(1));
    connector.connect(descriptor()).await.expect("connects");

    let schema = connector.table_schema("Sales  Old").await.expect("schema");
    assert_eq!(schema.kind, TableKind::DataTable);
    let rows = connector
        .sample_data("Sales  Old", 1)
        .await
        .expect("sample uses the quoted name as is");
    assert_eq!(rows.len(), 1);
}

/// Serves a model but fails the priming sample of one table.
struct FailingSampleClient {
    inner: MemoryClient,
    sample_query: String,
}

struct FailingSampleSession {
    inner: Box<dyn DataSession>,
    sample_query: String,
}

impl DataClient for FailingSampleClient {
    fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn DataSession>, DriverError> {
        Ok(Box::new(FailingSampleSession {
            inner: self.inner.open(descriptor)?,
            sample_query: self.sample_query.clone(),
        }))
    }
}

impl DataSession for FailingSampleSession {
    fn schema_tables(&mut self) -> Result<Vec<SchemaTableRow>, DriverError> {
        self.inner.schema_tables()
    }

    fn execute(&mut self, query: &str) -> Result<QueryResult, DriverError> {
        if query == self.sample_query {
            return Err(DriverError::new("The operation was cancelled because of a timeout."));
        }
        self.inner.execute(query)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

#[tokio::test]
async fn primer_skips_failed_samples_and_stops_at_the_table_limit() {
    let names = ["Region", "Broken", "Customer", "Store", "Channel", "Promotion", "Currency"];
    let tables: Vec<String> = names
        .iter()
        .map(|name| {
            format!(r#"{{"name": "{name}", "columns": [{{"name": "Key"}}], "rows": [["a"], ["b"]]}}"#)
        })
        .collect();
    let model = MemoryModel::from_json(&format!(r#"{{"tables": [{}]}}"#, tables.join(", ")))
        .expect("model parses");
    let memory = MemoryClient::new(model);
    let client = Arc::new(FailingSampleClient {
        inner: memory.clone(),
        sample_query: top_n_query("Broken", SAMPLE_ROWS),
    });
    let connector = Arc::new(Connector::new(Driver::loaded(client), WorkerPool::new(2)));
    let slot = AnalysisSlot::new();

    let generation = connector.connect(descriptor()).await.expect("connects");
    slot.reset(generation);
    assert!(ContextPrimer::new(connector.clone(), slot.clone(), generation).run().await);

    let context = slot.current().expect("context installed");
    assert_eq!(context.tables, names);
    assert_eq!(context.schemas.len(), PRIMED_TABLE_LIMIT);
    assert!(context.schemas.contains_key("Broken"));
    assert!(!context.schemas.contains_key("Promotion"));
    assert!(!context.samples.contains_key("Broken"));
    for table in ["Region", "Customer", "Store", "Channel"] {
        assert_eq!(context.samples.get(table).map(Vec::len), Some(2), "{table}");
    }
    assert_eq!(memory.sessions_open(), 0);
}
