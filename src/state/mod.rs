// Batch state tracking.
//
// BatchState is the transient outcome map the scheduler aggregates into and
// the manifest merger reads from. It never outlives one run; the only thing
// persisted from it is the resumable unfinished-layers manifest.

use crate::errors::PipelineError;
use crate::models::LayerOutput;
use camino::Utf8Path;
use indexmap::IndexMap;

/// File name of the resumable manifest written on aggregate failure.
pub const UNFINISHED_LAYERS_FILE: &str = "unfinished_layers.json";

/// Processing outcome of one layer within the current batch.
#[derive(Debug, Clone)]
pub enum LayerOutcome {
    /// Not yet finished (or the run ended before it completed).
    Pending,
    Succeeded(LayerOutput),
    Failed,
}

impl LayerOutcome {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, LayerOutcome::Succeeded(_))
    }
}

/// Per-layer outcome map for one batch run.
///
/// Layers are registered up front in input order; the scheduler marks them
/// as they finish. Anything not marked succeeded by the end of aggregation
/// counts as unfinished.
#[derive(Debug, Default)]
pub struct BatchState {
    outcomes: IndexMap<String, LayerOutcome>,
}

impl BatchState {
    /// Register every layer of the batch as pending.
    pub fn new<I, S>(layer_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outcomes: layer_names
                .into_iter()
                .map(|name| (name.into(), LayerOutcome::Pending))
                .collect(),
        }
    }

    pub fn mark_succeeded(&mut self, layer: &str, output: LayerOutput) {
        self.outcomes
            .insert(layer.to_string(), LayerOutcome::Succeeded(output));
    }

    pub fn mark_failed(&mut self, layer: &str) {
        self.outcomes
            .insert(layer.to_string(), LayerOutcome::Failed);
    }

    pub fn outcome(&self, layer: &str) -> Option<&LayerOutcome> {
        self.outcomes.get(layer)
    }

    /// The [`LayerOutput`] of a layer, if it succeeded.
    pub fn output(&self, layer: &str) -> Option<&LayerOutput> {
        match self.outcomes.get(layer) {
            Some(LayerOutcome::Succeeded(output)) => Some(output),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LayerOutcome)> {
        self.outcomes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when any registered layer is not marked succeeded.
    pub fn has_failures(&self) -> bool {
        self.outcomes.values().any(|o| !o.is_succeeded())
    }

    /// Layers not marked succeeded, in registration order, as the
    /// `{"<layer>": false}` map the resumable manifest persists.
    pub fn unfinished(&self) -> IndexMap<String, bool> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_succeeded())
            .map(|(name, _)| (name.clone(), false))
            .collect()
    }

    /// Write the resumable manifest. Consumable as `--resume` input to the
    /// next run.
    pub async fn write_unfinished(&self, path: &Utf8Path) -> Result<(), PipelineError> {
        let body = serde_json::to_string_pretty(&self.unfinished())?;
        tokio::fs::write(path, body)
            .await
            .map_err(|source| PipelineError::ManifestIo {
                path: path.to_path_buf(),
                source,
            })
    }
}
