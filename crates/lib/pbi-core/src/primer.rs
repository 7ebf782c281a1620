//! Background priming of the analysis context after a connect.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use pbi_store::models::{AnalysisContext, TableKind};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connector::Connector;

/// Tables primed per connect.
pub const PRIMED_TABLE_LIMIT: usize = 5;

/// Sample rows fetched per primed data table.
pub const SAMPLE_ROWS: usize = 3;

#[derive(Debug, Default)]
struct SlotState {
    generation: u64,
    context: Option<Arc<AnalysisContext>>,
}

/// Holds the installed analysis context, tagged with the connection generation
/// it was built for.
#[derive(Debug, Clone, Default)]
pub struct AnalysisSlot {
    inner: Arc<RwLock<SlotState>>,
}

impl AnalysisSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the context and accepts installs for `generation` only.
    ///
    /// Generations older than the current one are ignored.
    pub fn reset(&self, generation: u64) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if generation < state.generation {
            return;
        }
        state.generation = generation;
        state.context = None;
    }

    /// Installs `context` if it was built for the current generation.
    ///
    /// Returns false when the context is stale and was discarded.
    pub fn install(&self, generation: u64, context: AnalysisContext) -> bool {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if state.generation != generation {
            return false;
        }
        state.context = Some(Arc::new(context));
        true
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<AnalysisContext>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .context
            .clone()
    }
}

/// One-shot task that builds an [`AnalysisContext`] for a connection generation.
pub struct ContextPrimer {
    connector: Arc<Connector>,
    slot: AnalysisSlot,
    generation: u64,
}

impl ContextPrimer {
    #[must_use]
    pub const fn new(connector: Arc<Connector>, slot: AnalysisSlot, generation: u64) -> Self {
        Self {
            connector,
            slot,
            generation,
        }
    }

    /// Starts priming in the background. Nothing awaits the returned handle.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let _ = self.run().await;
        })
    }

    /// Builds the context and installs it. Returns whether it was installed.
    pub async fn run(self) -> bool {
        let context = self.collect().await;
        let table_count = context.tables.len();
        if self.slot.install(self.generation, context) {
            info!(
                tables = table_count,
                generation = self.generation,
                "analysis context prepared"
            );
            true
        } else {
            debug!(
                generation = self.generation,
                "discarding analysis context from a superseded connection"
            );
            false
        }
    }

    async fn collect(&self) -> AnalysisContext {
        let tables = match self.connector.discover_tables().await {
            Ok(tables) => tables,
            Err(err) => {
                error!(%err, "failed to prepare analysis context");
                return AnalysisContext::default();
            }
        };

        let mut schemas = BTreeMap::new();
        let mut samples = BTreeMap::new();
        for table in tables.iter().take(PRIMED_TABLE_LIMIT) {
            let schema = match self.connector.table_schema(table).await {
                Ok(schema) => schema,
                Err(err) => {
                    warn!(table = %table, %err, "failed to get schema; skipping table");
                    continue;
                }
            };
            if schema.kind == TableKind::DataTable {
                match self.connector.sample_data(table, SAMPLE_ROWS).await {
                    Ok(rows) => {
                        samples.insert(table.clone(), rows);
                    }
                    Err(err) => {
                        warn!(table = %table, %err, "failed to sample table");
                    }
                }
            }
            schemas.insert(table.clone(), (*schema).clone());
        }

        AnalysisContext {
            tables: tables.to_vec(),
            schemas,
            samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_generation_is_discarded() {
        let slot = AnalysisSlot::new();
        slot.reset(2);

        let stale = AnalysisContext {
            tables: vec!["Old".to_string()],
            ..AnalysisContext::default()
        };
        assert!(!slot.install(1, stale));
        assert!(slot.current().is_none());

        let fresh = AnalysisContext {
            tables: vec!["New".to_string()],
            ..AnalysisContext::default()
        };
        assert!(slot.install(2, fresh));
        let installed = slot.current().expect("context installed");
        assert_eq!(installed.tables, vec!["New".to_string()]);
    }

    #[test]
    fn reset_clears_previous_context() {
        let slot = AnalysisSlot::new();
        assert!(slot.install(0, AnalysisContext::default()));
        slot.reset(1);
        assert!(slot.current().is_none());
    }

    #[test]
    fn reset_never_moves_backwards() {
        let slot = AnalysisSlot::new();
        slot.reset(3);
        slot.reset(2);
        assert!(!slot.install(2, AnalysisContext::default()));
        assert!(slot.install(3, AnalysisContext::default()));
    }
}
