// region-tiler - batch conversion of region-boundary shapefiles into
// vector tile layers and region-mapping metadata.
//
// This is the library crate containing the pipeline stages, services and
// data structures. The binary crate (main.rs) provides the CLI entry
// point.

pub mod config;
pub mod errors;
pub mod geo;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{load_batch_config, load_resume_manifest};
pub use errors::PipelineError;
pub use models::{BatchConfig, LayerConfig, LayerOutput};
pub use state::{BatchState, LayerOutcome};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
