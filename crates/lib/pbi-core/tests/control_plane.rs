use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pbi_core::analyst::{Analyst, AnalystError};
use pbi_core::connector::Connector;
use pbi_core::control::{ConnectArgs, CredentialDefaults, PbiControlPlane, ToolName};
use pbi_core::driver::{Driver, MemoryClient, MemoryModel};
use pbi_core::pool::WorkerPool;
use pbi_store::models::{AnalysisContext, Row};

const ENDPOINT: &str = "powerbi://api.powerbi.com/v1.0/myorg/Contoso";
const CATALOG: &str = "Contoso Sales";
const NOT_CONNECTED: &str = "Not connected to Power BI. Please connect first using 'connect'.";

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

#[derive(Default)]
struct ScriptedAnalyst {
    query: String,
    fail_generation: bool,
    interpreted_rows: Mutex<Option<usize>>,
}

impl ScriptedAnalyst {
    fn answering(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Self::default()
        }
    }
}

impl Analyst for ScriptedAnalyst {
    fn generate_query(
        &self,
        _question: &str,
        context: &AnalysisContext,
    ) -> Result<String, AnalystError> {
        if self.fail_generation {
            return Err(AnalystError::EmptyResponse);
        }
        assert!(!context.tables.is_empty(), "context should be primed");
        Ok(self.query.clone())
    }

    fn interpret_results(
        &self,
        _question: &str,
        rows: &[Row],
        _query: &str,
    ) -> Result<String, AnalystError> {
        *self.interpreted_rows.lock().expect("lock") = Some(rows.len());
        Ok(format!("{} orders matched.", rows.len()))
    }

    fn suggest_questions(&self, _context: &AnalysisContext) -> Result<Vec<String>, AnalystError> {
        Ok(vec![
            "Which region sells the most?".to_string(),
            "How many orders were placed in January?".to_string(),
        ])
    }
}

struct Harness {
    client: Arc<MemoryClient>,
    control: PbiControlPlane,
}

fn harness(analyst: Option<Arc<dyn Analyst>>) -> Harness {
    harness_with_defaults(analyst, CredentialDefaults::default())
}

fn harness_with_defaults(
    analyst: Option<Arc<dyn Analyst>>,
    defaults: CredentialDefaults,
) -> Harness {
    let client = Arc::new(MemoryClient::new(load_model()));
    let connector = Arc::new(Connector::new(Driver::loaded(client.clone()), WorkerPool::new(2)));
    let control = PbiControlPlane::new(connector, defaults);
    let control = match analyst {
        Some(analyst) => control.with_analyst(analyst),
        None => control,
    };
    Harness { client, control }
}

fn connect_args(catalog: &str) -> ConnectArgs {
    ConnectArgs::new(ENDPOINT, catalog).with_credentials("tenant", "client", "secret")
}

async fn wait_for_context(control: &PbiControlPlane) -> Arc<AnalysisContext> {
    for _ in 0..200 {
        if let Some(context) = control.analysis().current() {
            return context;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("analysis context was never installed");
}

#[tokio::test]
async fn connect_then_list_tables_without_waiting() {
    let Harness { control, .. } = harness(None);

    let connected = control.connect(connect_args(CATALOG)).await;
    assert_eq!(
        connected.text,
        "Successfully connected to Power BI dataset 'Contoso Sales'."
    );

    let tables = control.list_tables().await;
    assert_eq!(
        tables.text,
        "Available tables:\n- Sales\n- Product\n- Key Measures"
    );
}

#[tokio::test]
async fn operations_before_connect_never_reach_the_driver() {
    let analyst: Arc<dyn Analyst> = Arc::new(ScriptedAnalyst::answering("EVALUATE 'Sales'"));
    let Harness { client, control } = harness(Some(analyst));

    assert_eq!(control.list_tables().await.text, NOT_CONNECTED);
    assert_eq!(control.get_table_info(Some("Sales")).await.text, NOT_CONNECTED);
    assert_eq!(control.execute_query(Some("EVALUATE 'Sales'")).await.text, NOT_CONNECTED);
    assert_eq!(control.ask_question(Some("Total sales?")).await.text, NOT_CONNECTED);
    assert_eq!(control.suggest_questions().await.text, NOT_CONNECTED);

    assert_eq!(client.sessions_opened(), 0);
}

#[tokio::test]
async fn failed_connect_reports_driver_message_and_stays_disconnected() {
    let Harness { control, .. } = harness(None);

    let result = control.connect(connect_args("Fabrikam")).await;
    assert_eq!(
        result.text,
        "Connection failed: Either the database 'Fabrikam' does not exist, or you do not have permissions to access it."
    );
    assert!(!control.connector().is_connected());
    assert_eq!(control.list_tables().await.text, NOT_CONNECTED);
}

#[tokio::test]
async fn connect_validates_arguments_and_uses_default_credentials() {
    let Harness { control, .. } = harness(None);

    let missing = control.connect(ConnectArgs::default()).await;
    assert_eq!(missing.text, "Please provide endpoint and catalog.");

    let no_credentials = control.connect(ConnectArgs::new(ENDPOINT, CATALOG)).await;
    assert!(
        no_credentials.text.starts_with("Missing credentials."),
        "unexpected reply: {}",
        no_credentials.text
    );
    assert!(!control.connector().is_connected());

    let defaults = CredentialDefaults {
        tenant_id: Some("tenant".to_string()),
        client_id: Some("client".to_string()),
        client_secret: Some("secret".to_string()),
    };
    let Harness { control, .. } = harness_with_defaults(None, defaults);
    let connected = control.connect(ConnectArgs::new(ENDPOINT, CATALOG)).await;
    assert_eq!(
        connected.text,
        "Successfully connected to Power BI dataset 'Contoso Sales'."
    );
}

#[tokio::test]
async fn table_info_describes_data_and_measure_tables() {
    let Harness { control, .. } = harness(None);
    control.connect(connect_args(CATALOG)).await;

    let sales = control.get_table_info(Some("Sales")).await.text;
    assert!(
        sales.starts_with(
            "Table: Sales\nType: Data Table\nColumns: Sales[OrderId], Sales[Region], Sales[OrderDate], Sales[Amount]\n\nSample data:\n"
        ),
        "unexpected reply: {sales}"
    );
    assert!(sales.contains("\"Sales[OrderDate]\": \"2024-01-03\""));
    assert!(sales.contains("\"Sales[Amount]\": 120.5"));

    let measures = control.get_table_info(Some("Key Measures")).await.text;
    assert_eq!(
        measures,
        "Table: Key Measures\nType: Measure Table\nMeasures:\n\n- Order Count:\n  DAX: COUNTROWS(Sales)\n\n- Total Sales:\n  DAX: SUM(Sales[Amount])\n"
    );

    let ghost = control.get_table_info(Some("Ghost")).await.text;
    assert_eq!(ghost, "Table: Ghost\nType: unknown");

    let blank = control.get_table_info(Some("  ")).await.text;
    assert_eq!(blank, "Please provide a table name.");
}

#[tokio::test]
async fn execute_query_sanitizes_and_serializes_rows() {
    let Harness { client, control } = harness(None);
    control.connect(connect_args(CATALOG)).await;

    let reply = control
        .execute_query(Some("EVALUATE <code>TOPN(2, 'Product')</code>"))
        .await
        .text;
    let rows: serde_json::Value = serde_json::from_str(&reply).expect("reply is JSON");
    assert_eq!(rows.as_array().map(Vec::len), Some(2));
    assert_eq!(rows[1]["Product[Name]"], "Touring Helmet");
    assert_eq!(rows[1]["Product[Discontinued]"], true);

    let failed = control.execute_query(Some("EVALUATE NOPE(")).await.text;
    assert!(
        failed.starts_with("Error executing execute_query: DAX query failed: "),
        "unexpected reply: {failed}"
    );

    assert_eq!(control.execute_query(None).await.text, "Please provide a query.");
    assert_eq!(client.sessions_open(), 0);
}

#[tokio::test]
async fn language_tools_report_not_configured_without_an_analyst() {
    let Harness { control, .. } = harness(None);
    control.connect(connect_args(CATALOG)).await;

    assert!(!control.capabilities().natural_language);
    assert_eq!(
        control.advertised_tools(),
        vec![
            ToolName::Connect,
            ToolName::ListTables,
            ToolName::GetTableInfo,
            ToolName::ExecuteQuery,
        ]
    );
    assert_eq!(
        control.ask_question(Some("Total sales?")).await.text,
        "OpenAI API key not configured."
    );
    assert_eq!(
        control.suggest_questions().await.text,
        "OpenAI API key not configured."
    );
}

#[tokio::test]
async fn ask_question_before_priming_reports_analyzer_not_ready() {
    let analyst: Arc<dyn Analyst> = Arc::new(ScriptedAnalyst::answering("EVALUATE 'Sales'"));
    let Harness { control, .. } = harness(Some(analyst));

    let connected = control.connect(connect_args(CATALOG)).await;
    assert_eq!(
        connected.text,
        "Successfully connected to Power BI dataset 'Contoso Sales'. Discovering tables..."
    );

    // The current-thread runtime has not polled the primer yet.
    assert!(control.connector().is_priming());
    assert_eq!(
        control.ask_question(Some("Total sales?")).await.text,
        "Data analyzer not initialized. Please wait for tables to be discovered."
    );
}

#[tokio::test]
async fn ask_question_runs_all_three_stages() {
    let scripted = Arc::new(ScriptedAnalyst::answering(
        "EVALUATE <b>TOPN(3, 'Sales')</b>",
    ));
    let analyst: Arc<dyn Analyst> = scripted.clone();
    let Harness { client, control } = harness(Some(analyst));
    control.connect(connect_args(CATALOG)).await;

    let context = wait_for_context(&control).await;
    assert_eq!(context.tables, vec!["Sales", "Product", "Key Measures"]);
    assert_eq!(context.samples.get("Sales").map(Vec::len), Some(3));
    assert!(context.schemas.contains_key("Key Measures"));
    assert!(!context.samples.contains_key("Key Measures"));

    let reply = control.ask_question(Some("How many orders?")).await.text;
    assert_eq!(
        reply,
        "Question: How many orders?\n\nDAX Query:\nEVALUATE TOPN(3, 'Sales')\n\nAnswer:\n3 orders matched."
    );
    assert_eq!(*scripted.interpreted_rows.lock().expect("lock"), Some(3));

    let suggestions = control.suggest_questions().await.text;
    assert_eq!(
        suggestions,
        "Here are some questions you might want to ask:\n\n1. Which region sells the most?\n2. How many orders were placed in January?\n"
    );
    assert_eq!(client.sessions_open(), 0);
}

#[tokio::test]
async fn analyst_failures_become_error_text() {
    let analyst: Arc<dyn Analyst> = Arc::new(ScriptedAnalyst {
        fail_generation: true,
        ..ScriptedAnalyst::default()
    });
    let Harness { control, .. } = harness(Some(analyst));
    control.connect(connect_args(CATALOG)).await;
    wait_for_context(&control).await;

    assert_eq!(
        control.ask_question(Some("Anything?")).await.text,
        "Error executing ask_question: language model returned no choices"
    );
    assert_eq!(
        control.ask_question(None).await.text,
        "Please provide a question."
    );
}

#[tokio::test]
async fn unavailable_driver_fails_connect() {
    let connector = Arc::new(Connector::new(
        Driver::unavailable("ADOMD.NET client library not found"),
        WorkerPool::new(1),
    ));
    let control = PbiControlPlane::new(connector, CredentialDefaults::default());

    let result = control.connect(connect_args(CATALOG)).await;
    assert_eq!(
        result.text,
        "Connection failed: analytical driver not available: ADOMD.NET client library not found"
    );
}
