use std::sync::Arc;

use pbi_core::analyst::OpenAiAnalyst;
use pbi_core::connector::Connector;
use pbi_core::control::PbiControlPlane;
use pbi_core::driver::{Driver, MemoryClient, MemoryModel, ModelLoadError};
use pbi_core::pool::WorkerPool;
use tracing::{info, warn};

use crate::config::PbiConfig;

const NO_DRIVER: &str =
    "no analytical driver is installed; set PBI_MODEL_FILE to serve a tabular model file";

/// Builds the control plane described by `config`.
pub fn build_control_plane(config: &PbiConfig) -> Result<PbiControlPlane, ModelLoadError> {
    let driver = build_driver(config)?;
    let pool = WorkerPool::new(config.worker_threads);
    let connector = Arc::new(Connector::new(driver, pool));
    let control = PbiControlPlane::new(connector, config.credential_defaults.clone());

    match &config.openai {
        Some(openai) => {
            info!(model = %openai.model, "natural-language tools enabled");
            Ok(control.with_analyst(Arc::new(OpenAiAnalyst::new(openai.clone()))))
        }
        None => {
            warn!("OpenAI API key not provided; natural-language tools disabled");
            Ok(control)
        }
    }
}

fn build_driver(config: &PbiConfig) -> Result<Driver, ModelLoadError> {
    let Some(path) = &config.model_file else {
        warn!("{NO_DRIVER}");
        return Ok(Driver::unavailable(NO_DRIVER));
    };
    let model = MemoryModel::from_path(path)?;
    info!(
        path = %path.display(),
        catalog = model.catalog().unwrap_or("<any>"),
        "serving tabular model from file"
    );
    Ok(Driver::loaded(Arc::new(MemoryClient::new(model))))
}
