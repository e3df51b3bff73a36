//! region-tiler - batch conversion of region-boundary shapefiles into
//! vector tile layers and region-mapping metadata.
//!
//! # Overview
//!
//! Given a JSON batch configuration, each listed layer is pushed through
//! the same pipeline: web mercator reprojection (ogr2ogr), property
//! extraction, region-id and region-mapping file emission, tile
//! generation (tippecanoe) and a merge into the shared tileset manifest.
//! Layers run concurrently up to the configured limit; one layer failing
//! never stops its siblings.
//!
//! # Execution Flow
//!
//! 1. Initialize logging -> logs/region-tiler.<date>
//! 2. Load and validate the batch configuration
//! 3. Optionally restrict the batch to a resume manifest's layers
//! 4. Run the batch on the tokio runtime
//! 5. On any failure: write `unfinished_layers.json` and exit nonzero
//! 6. Merge results into the master regionMapping.json
//!
//! # Exit Status
//!
//! `0` when every scheduled layer succeeded, `1` otherwise. The merged
//! outputs written before a failure remain valid either way.

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use region_tiler::{APP_NAME, VERSION};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "region-tiler", version, about = "Convert region shapefiles into vector tile layers and region mapping files")]
struct Cli {
    /// Batch configuration file (JSON)
    config: Utf8PathBuf,

    /// Resume manifest from a previous failed run; only its layers are
    /// re-processed
    #[arg(long)]
    resume: Option<Utf8PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match region_tiler::logging::setup_logging("logs", "region-tiler", cli.debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    match run(cli) {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the batch had failures.
fn run(cli: Cli) -> Result<bool> {
    let config = region_tiler::load_batch_config(&cli.config)?;

    let resume = cli
        .resume
        .as_ref()
        .map(region_tiler::load_resume_manifest)
        .transpose()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("region-tiler-worker")
        .build()?;

    let failed = runtime.block_on(region_tiler::pipeline::run(config, resume))?;

    if failed {
        tracing::error!("Batch finished with failures");
    } else {
        tracing::info!("Batch finished successfully");
    }
    Ok(failed)
}
