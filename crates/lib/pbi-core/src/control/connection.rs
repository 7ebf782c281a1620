use std::fmt;

use tracing::{info, warn};

use super::{PbiControlPlane, ToolCallResult, non_blank};
use crate::connector::ConnectorError;
use crate::driver::ConnectionDescriptor;
use crate::primer::ContextPrimer;

const MISSING_TARGET: &str = "Please provide endpoint and catalog.";
const MISSING_CREDENTIALS: &str = "Missing credentials. Provide tenant_id, client_id, and client_secret either in the action arguments or via DEFAULT_* values in the environment.";

/// Process-wide credentials used when a connect call omits them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialDefaults {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl fmt::Debug for CredentialDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialDefaults")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Arguments of the connect operation.
#[derive(Debug, Clone, Default)]
pub struct ConnectArgs {
    pub endpoint: Option<String>,
    pub catalog: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl ConnectArgs {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, catalog: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            catalog: Some(catalog.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }
}

fn pick(explicit: Option<&String>, fallback: Option<&String>) -> Option<String> {
    non_blank(explicit.map(String::as_str))
        .or_else(|| non_blank(fallback.map(String::as_str)))
        .map(str::to_string)
}

impl PbiControlPlane {
    /// Connects to a dataset and, when the language model is configured,
    /// starts priming the analysis context in the background.
    pub async fn connect(&self, args: ConnectArgs) -> ToolCallResult {
        let (Some(endpoint), Some(catalog)) = (
            non_blank(args.endpoint.as_deref()),
            non_blank(args.catalog.as_deref()),
        ) else {
            return ToolCallResult::from(MISSING_TARGET);
        };

        let defaults = &self.defaults;
        let (Some(tenant_id), Some(client_id), Some(client_secret)) = (
            pick(args.tenant_id.as_ref(), defaults.tenant_id.as_ref()),
            pick(args.client_id.as_ref(), defaults.client_id.as_ref()),
            pick(args.client_secret.as_ref(), defaults.client_secret.as_ref()),
        ) else {
            warn!("connect called without complete credentials");
            return ToolCallResult::from(MISSING_CREDENTIALS);
        };

        let descriptor =
            ConnectionDescriptor::new(endpoint, tenant_id, client_id, client_secret, catalog);
        match self.connector.connect(descriptor).await {
            Ok(generation) => {
                self.analysis.reset(generation);
                let mut text = format!("Successfully connected to Power BI dataset '{catalog}'.");
                if self.capabilities().natural_language {
                    let primer = ContextPrimer::new(
                        self.connector.clone(),
                        self.analysis.clone(),
                        generation,
                    );
                    self.connector.track_primer(primer.spawn());
                    text.push_str(" Discovering tables...");
                } else {
                    info!("language model not configured; skipping context priming");
                }
                ToolCallResult::from(text)
            }
            Err(err) => {
                self.analysis.reset(self.connector.generation());
                match err {
                    ConnectorError::Connection(_) => ToolCallResult::from(err.to_string()),
                    other => ToolCallResult::from(format!("Connection failed: {other}")),
                }
            }
        }
    }
}
