use clap::{Parser, builder::BoolishValueParser};
use pbi_core::analyst::OpenAiConfig;
use pbi_core::analyst::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use pbi_core::control::CredentialDefaults;
use pbi_core::pool::DEFAULT_WORKERS;
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_MCP_HTTP_ADDR: &str = "0.0.0.0:8000";

#[derive(Parser, Debug)]
#[command(name = "pbi-mcpd", version, about = "Power BI MCP daemon.")]
struct CliArgs {
    #[arg(long, env = "DEFAULT_TENANT_ID")]
    default_tenant_id: Option<String>,

    #[arg(long, env = "DEFAULT_CLIENT_ID")]
    default_client_id: Option<String>,

    #[arg(long, env = "DEFAULT_CLIENT_SECRET", hide_env_values = true)]
    default_client_secret: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    openai_model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    openai_base_url: String,

    #[arg(long, env = "PBI_WORKER_THREADS", default_value_t = DEFAULT_WORKERS)]
    worker_threads: usize,

    #[arg(
        long = "stdio",
        env = "PBI_ENABLE_STDIO",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    enable_stdio: bool,

    #[arg(long, env = "PBI_MCP_HTTP_ADDR", default_value = DEFAULT_MCP_HTTP_ADDR)]
    mcp_http_addr: SocketAddr,

    #[arg(long, env = "PBI_MODEL_FILE")]
    model_file: Option<PathBuf>,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Debug, Clone)]
pub struct PbiConfig {
    pub credential_defaults: CredentialDefaults,
    pub openai: Option<OpenAiConfig>,
    pub worker_threads: usize,
    pub enable_stdio: bool,
    pub mcp_http_addr: SocketAddr,
    pub model_file: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidSetting { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
        }
    }
}

impl Error for ConfigError {}

impl PbiConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl TryFrom<CliArgs> for PbiConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.worker_threads == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "PBI_WORKER_THREADS",
                value: args.worker_threads.to_string(),
            });
        }
        if args.openai_model.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "OPENAI_MODEL",
                value: args.openai_model,
            });
        }
        if !args.openai_base_url.starts_with("http://")
            && !args.openai_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidSetting {
                name: "OPENAI_BASE_URL",
                value: args.openai_base_url,
            });
        }

        let openai = present(args.openai_api_key).map(|api_key| {
            OpenAiConfig::new(api_key)
                .with_model(args.openai_model.trim())
                .with_base_url(args.openai_base_url.trim_end_matches('/'))
        });
        let model_file = args
            .model_file
            .filter(|path| !path.as_os_str().is_empty());

        Ok(Self {
            credential_defaults: CredentialDefaults {
                tenant_id: present(args.default_tenant_id),
                client_id: present(args.default_client_id),
                client_secret: present(args.default_client_secret),
            },
            openai,
            worker_threads: args.worker_threads,
            enable_stdio: args.enable_stdio,
            mcp_http_addr: args.mcp_http_addr,
            model_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs {
            default_tenant_id: None,
            default_client_id: None,
            default_client_secret: None,
            openai_api_key: None,
            openai_model: DEFAULT_MODEL.to_string(),
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            worker_threads: DEFAULT_WORKERS,
            enable_stdio: false,
            mcp_http_addr: DEFAULT_MCP_HTTP_ADDR.parse().expect("valid MCP addr"),
            model_file: None,
        }
    }

    #[test]
    fn blank_values_are_treated_as_unset() {
        let mut args = base_args();
        args.default_tenant_id = Some("  ".to_string());
        args.default_client_id = Some("client".to_string());
        args.openai_api_key = Some(String::new());
        args.model_file = Some(PathBuf::new());

        let config = PbiConfig::try_from(args).expect("config should parse");

        assert!(config.credential_defaults.tenant_id.is_none());
        assert_eq!(
            config.credential_defaults.client_id.as_deref(),
            Some("client")
        );
        assert!(config.openai.is_none());
        assert!(config.model_file.is_none());
    }

    #[test]
    fn api_key_enables_the_analyst() {
        let mut args = base_args();
        args.openai_api_key = Some("sk-test".to_string());
        args.openai_base_url = "https://llm.internal/v1/".to_string();

        let config = PbiConfig::try_from(args).expect("config should parse");

        let openai = config.openai.expect("analyst configured");
        assert_eq!(openai.model, DEFAULT_MODEL);
        assert_eq!(openai.base_url, "https://llm.internal/v1");
    }

    #[test]
    fn rejects_zero_workers() {
        let mut args = base_args();
        args.worker_threads = 0;

        assert!(matches!(
            PbiConfig::try_from(args),
            Err(ConfigError::InvalidSetting {
                name: "PBI_WORKER_THREADS",
                ..
            })
        ));
    }

    #[test]
    fn rejects_base_url_without_scheme() {
        let mut args = base_args();
        args.openai_base_url = "api.openai.com/v1".to_string();

        assert!(PbiConfig::try_from(args).is_err());
    }
}
