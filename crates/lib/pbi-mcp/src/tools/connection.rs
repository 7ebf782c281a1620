use pbi_core::control::ConnectArgs;
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::{PbiMcp, helpers};

/// Parameters for connecting to a Power BI dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ConnectParams {
    /// Power BI XMLA endpoint URL.
    #[serde(default, alias = "xmla_endpoint")]
    pub endpoint: Option<String>,
    /// Dataset (catalog) name.
    #[serde(default, alias = "initial_catalog")]
    pub catalog: Option<String>,
    /// Azure AD tenant id. Falls back to `DEFAULT_TENANT_ID`.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Service principal client id. Falls back to `DEFAULT_CLIENT_ID`.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Service principal secret. Falls back to `DEFAULT_CLIENT_SECRET`.
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl From<ConnectParams> for ConnectArgs {
    fn from(params: ConnectParams) -> Self {
        Self {
            endpoint: params.endpoint,
            catalog: params.catalog,
            tenant_id: params.tenant_id,
            client_id: params.client_id,
            client_secret: params.client_secret,
        }
    }
}

#[tool_router(router = tool_router_connection, vis = "pub")]
impl PbiMcp {
    #[tool(description = "Connect to a Power BI dataset using its XMLA endpoint.")]
    async fn connect(
        &self,
        Parameters(params): Parameters<ConnectParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let reply = self.control.connect(params.into()).await;
        Ok(helpers::text_result(reply))
    }
}
