//! Per-layer stage pipeline and batch orchestration.
//!
//! Each layer runs the same ordered stage list against an explicit
//! [`LayerContext`]: reproject -> extract columns & determine name property
//! -> persist region-id files -> persist the regionMapping entry file ->
//! generate tiles -> merge the tileset manifest entry. Stages take the
//! context and hand it back enriched, so each one is testable on its own
//! and the sequential composition in [`run_layer`] stays flat.
//!
//! Stage failures carry the layer name and stage tag ([`LayerFailure`])
//! and abort the remaining stages of that layer only; sibling layers are
//! unaffected. No stage is retried automatically.

pub mod scheduler;

use crate::errors::PipelineError;
use crate::geo;
use crate::models::{
    BatchConfig, LayerConfig, LayerOutput, RegionIdFile, RegionMappingEntry, RegionMappingFile,
    SERVER_TYPE_MVT, StepFlags, TileSourceEntry,
};
use crate::services::manifest::TilesetManifest;
use crate::services::{determine_name_property, extract_columns, gdal, tippecanoe};
use crate::state::UNFINISHED_LAYERS_FILE;
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// File name of the shared tileset manifest.
pub const TILESET_MANIFEST_FILE: &str = "config.json";

/// File name of the merged master region mapping.
pub const REGION_MAPPING_OUT_FILE: &str = "regionMapping_out.json";

/// The stages of one layer pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reproject,
    Extract,
    RegionIds,
    RegionMapping,
    Tiles,
    Manifest,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Reproject => "reproject",
            Stage::Extract => "extract",
            Stage::RegionIds => "region-ids",
            Stage::RegionMapping => "region-mapping",
            Stage::Tiles => "tiles",
            Stage::Manifest => "manifest",
        };
        f.write_str(name)
    }
}

/// A stage failure attributed to its layer.
#[derive(Debug, Error)]
#[error("layer {layer} failed at {stage} stage: {source}")]
pub struct LayerFailure {
    pub layer: String,
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

/// Run-wide settings shared by every layer pipeline.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub data_dir: Utf8PathBuf,
    pub shapefile_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub steps: StepFlags,
}

impl From<&BatchConfig> for RunSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            shapefile_dir: config.shapefile_dir.clone(),
            output_dir: config.output_dir.clone(),
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            steps: config.steps,
        }
    }
}

/// All file locations one layer pipeline touches.
#[derive(Debug, Clone)]
pub struct LayerPaths {
    /// Source shapefile (resolved against the shapefile directory).
    pub source: Utf8PathBuf,
    /// Per-layer working directory under the data directory.
    pub layer_dir: Utf8PathBuf,
    /// Reprojected shapefile inside the layer directory.
    pub reprojected: Utf8PathBuf,
    pub geojson: Utf8PathBuf,
    pub mbtiles: Utf8PathBuf,
}

impl LayerPaths {
    pub fn new(settings: &RunSettings, layer: &LayerConfig) -> Self {
        let name = &layer.layer_name;
        let layer_dir = settings.data_dir.join(name);
        Self {
            source: settings.shapefile_dir.join(&layer.shapefile),
            reprojected: layer_dir.join(format!("{name}.shp")),
            geojson: layer_dir.join(format!("{name}.geojson")),
            mbtiles: layer_dir.join(format!("{name}.mbtiles")),
            layer_dir,
        }
    }
}

/// Mutable per-layer state threaded through the stages.
pub struct LayerContext {
    pub layer: LayerConfig,
    pub settings: Arc<RunSettings>,
    pub manifest: Arc<TilesetManifest>,
    pub paths: LayerPaths,

    /// WGS84 bounding box, set by the extract stage.
    pub bbox: Option<[f64; 4]>,
    /// Display-name property: explicit config or heuristic result.
    pub name_prop: Option<String>,
    /// Property -> value series, set by the extract stage.
    pub series: IndexMap<String, Vec<Value>>,
    pub missing_values: usize,
    /// Fresh regionMapping entries, set by the region-mapping stage.
    pub entries: IndexMap<String, RegionMappingEntry>,
    /// Manifest descriptor, set by the tiles stage.
    pub tile_source: Option<TileSourceEntry>,
}

impl LayerContext {
    pub fn new(
        layer: LayerConfig,
        settings: Arc<RunSettings>,
        manifest: Arc<TilesetManifest>,
    ) -> Self {
        let paths = LayerPaths::new(&settings, &layer);
        Self {
            layer,
            settings,
            manifest,
            paths,
            bbox: None,
            name_prop: None,
            series: IndexMap::new(),
            missing_values: 0,
            entries: IndexMap::new(),
            tile_source: None,
        }
    }
}

/// Run the full stage list for one layer.
pub async fn run_layer(mut ctx: LayerContext) -> Result<LayerOutput, LayerFailure> {
    let layer = ctx.layer.layer_name.clone();
    let fail = |stage: Stage| {
        let layer = layer.clone();
        move |source| LayerFailure {
            layer,
            stage,
            source,
        }
    };

    ctx = stage_reproject(ctx).await.map_err(fail(Stage::Reproject))?;
    ctx = stage_extract(ctx).await.map_err(fail(Stage::Extract))?;
    ctx = stage_region_ids(ctx).await.map_err(fail(Stage::RegionIds))?;
    ctx = stage_region_mapping(ctx)
        .await
        .map_err(fail(Stage::RegionMapping))?;
    ctx = stage_tiles(ctx).await.map_err(fail(Stage::Tiles))?;
    ctx = stage_manifest(ctx).await.map_err(fail(Stage::Manifest))?;

    tracing::info!("Layer {} finished processing", layer);
    Ok(LayerOutput {
        layer_name: layer,
        region_mapping: ctx.entries,
        tile_source: ctx.tile_source,
        missing_values: ctx.missing_values,
    })
}

/// Stage 1: reproject the source shapefile into web mercator, synthesizing
/// a FID column when configured. Fatal for the layer on failure; later
/// stages would otherwise read a corrupt reprojected file.
async fn stage_reproject(ctx: LayerContext) -> Result<LayerContext, PipelineError> {
    if !ctx.settings.steps.reprojection {
        return Ok(ctx);
    }
    tracing::info!(
        "Converting {} to web mercator projection",
        ctx.layer.layer_name
    );
    gdal::reproject_shapefile(
        &ctx.paths.source,
        &ctx.paths.layer_dir,
        &ctx.layer.layer_name,
        ctx.layer.add_fid,
    )
    .await?;
    Ok(ctx)
}

/// Stage 2: extract the requested columns and settle the display-name
/// property.
async fn stage_extract(mut ctx: LayerContext) -> Result<LayerContext, PipelineError> {
    if !ctx.settings.steps.config {
        return Ok(ctx);
    }

    let path = ctx.paths.reprojected.clone();
    let properties = ctx.layer.requested_properties();
    let extracted = tokio::task::spawn_blocking(move || extract_columns(&path, &properties))
        .await
        .map_err(|e| PipelineError::TaskJoin(e.to_string()))??;

    if extracted.missing_values > 0 {
        // Lenient by design: holes stay in the series, but loudly.
        tracing::warn!(
            "Layer {}: {} requested property values missing across features",
            ctx.layer.layer_name,
            extracted.missing_values
        );
    }

    ctx.name_prop = ctx
        .layer
        .name_prop
        .clone()
        .or_else(|| determine_name_property(&extracted.first_feature_properties));
    ctx.bbox = Some(geo::mercator_bbox_to_wgs84(extracted.bbox));
    ctx.series = extracted.series_by_property;
    ctx.missing_values = extracted.missing_values;
    Ok(ctx)
}

/// Stage 3: one region-id file per extracted property. Existing files for
/// the same layer/property key are overwritten, so re-runs are safe.
async fn stage_region_ids(ctx: LayerContext) -> Result<LayerContext, PipelineError> {
    if !ctx.settings.steps.config {
        return Ok(ctx);
    }
    for (property, values) in &ctx.series {
        let file = RegionIdFile {
            layer: ctx.layer.layer_name.clone(),
            property: property.clone(),
            values: values.clone(),
        };
        let path = ctx
            .settings
            .output_dir
            .join(RegionIdFile::file_name(&ctx.layer.layer_name, property));
        write_json(&path, &file).await?;
        tracing::debug!("Wrote region-id file {}", path);
    }
    Ok(ctx)
}

/// Stage 4: the regionMapping entry file for this layer. Written before
/// tile generation so the metadata survives a later tiling failure.
async fn stage_region_mapping(mut ctx: LayerContext) -> Result<LayerContext, PipelineError> {
    if !ctx.settings.steps.config {
        return Ok(ctx);
    }
    let Some(bbox) = ctx.bbox else {
        return Ok(ctx);
    };

    let layer = &ctx.layer;
    let mut entries = IndexMap::new();
    for (key, entry) in &layer.region_mapping_entries {
        entries.insert(
            key.clone(),
            RegionMappingEntry {
                layer_name: layer.layer_name.clone(),
                server: layer.server.clone(),
                server_type: SERVER_TYPE_MVT.to_string(),
                server_subdomains: layer.server_subdomains.clone(),
                server_min_zoom: ctx.settings.min_zoom,
                server_max_native_zoom: layer
                    .generate_tiles_to
                    .unwrap_or(ctx.settings.max_zoom),
                server_max_zoom: ctx.settings.max_zoom,
                bbox,
                unique_id_prop: layer.unique_id_property().to_string(),
                region_prop: entry.region_prop.clone(),
                disambig_prop: entry.disambig_prop.clone(),
                disambig_region_id: entry.disambig_region_id.clone(),
                aliases: entry.aliases.clone(),
                name_prop: ctx.name_prop.clone(),
                description: entry.description.clone(),
                region_ids_file: RegionIdFile::file_name(&layer.layer_name, &entry.region_prop),
                region_disambig_ids_file: entry
                    .disambig_prop
                    .as_ref()
                    .map(|p| RegionIdFile::file_name(&layer.layer_name, p)),
            },
        );
    }

    let path = ctx
        .settings
        .output_dir
        .join(format!("regionMapping-{}.json", layer.layer_name));
    let file = RegionMappingFile {
        region_wms_map: entries.clone(),
    };
    write_json(&path, &file).await?;
    tracing::info!("Wrote region mapping file {}", path);

    ctx.entries = entries;
    Ok(ctx)
}

/// Stage 5: GeoJSON conversion plus tippecanoe. Skipped entirely for
/// metadata-only layers. A pre-existing GeoJSON conversion is reused.
async fn stage_tiles(mut ctx: LayerContext) -> Result<LayerContext, PipelineError> {
    let Some(max_zoom) = ctx.layer.generate_tiles_to else {
        return Ok(ctx);
    };
    if !ctx.settings.steps.tile_generation {
        return Ok(ctx);
    }

    tracing::info!("Running tile generation for {}", ctx.layer.layer_name);
    gdal::convert_to_geojson(&ctx.paths.reprojected, &ctx.paths.geojson).await?;
    tippecanoe::generate_tiles(
        &ctx.layer.layer_name,
        max_zoom,
        &ctx.paths.geojson,
        &ctx.paths.mbtiles,
    )
    .await?;
    tracing::info!("Tile generation finished for {}", ctx.layer.layer_name);

    let mbtiles = absolute_path(&ctx.paths.mbtiles)?;
    ctx.tile_source = Some(TileSourceEntry::new(
        mbtiles.as_str(),
        ctx.settings.min_zoom,
        max_zoom,
    ));
    Ok(ctx)
}

/// Stage 6: merge this layer's route into the shared tileset manifest.
/// The store serializes concurrent read-modify-write cycles internally.
async fn stage_manifest(ctx: LayerContext) -> Result<LayerContext, PipelineError> {
    if !ctx.settings.steps.config {
        return Ok(ctx);
    }
    if let Some(source) = &ctx.tile_source {
        ctx.manifest.upsert(&ctx.layer.layer_name, source).await?;
    }
    Ok(ctx)
}

async fn write_json<T: serde::Serialize>(
    path: &Utf8Path,
    value: &T,
) -> Result<(), PipelineError> {
    let body = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, body)
        .await
        .map_err(|source| PipelineError::OutputIo {
            path: path.to_path_buf(),
            source,
        })
}

fn absolute_path(path: &Utf8Path) -> Result<Utf8PathBuf, PipelineError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|source| PipelineError::OutputIo {
        path: path.to_path_buf(),
        source,
    })?;
    Utf8PathBuf::from_path_buf(cwd.join(path)).map_err(|p| PipelineError::OutputIo {
        path: path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("non UTF-8 path: {}", p.display()),
        ),
    })
}

/// Run a whole batch: schedule every layer, write the resumable manifest
/// on aggregate failure and merge results into the master region mapping.
///
/// Returns whether the batch had failures (the process exit signal).
pub async fn run(
    config: BatchConfig,
    resume: Option<IndexMap<String, bool>>,
) -> anyhow::Result<bool> {
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("Failed to create data directory {}", config.data_dir))?;
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", config.output_dir))?;

    let mut layers = config.layers.clone();
    if let Some(filter) = resume {
        layers.retain(|l| filter.contains_key(&l.layer_name));
        tracing::info!("Resuming {} unfinished layers", layers.len());
    }

    let settings = Arc::new(RunSettings::from(&config));
    let manifest = Arc::new(TilesetManifest::new(
        config.output_dir.join(TILESET_MANIFEST_FILE),
    ));

    let layer_settings = settings.clone();
    let layer_manifest = manifest.clone();
    let result = scheduler::run_batch(layers, config.concurrency, move |layer| {
        run_layer(LayerContext::new(
            layer,
            layer_settings.clone(),
            layer_manifest.clone(),
        ))
    })
    .await;

    if result.failed {
        tracing::error!("Ending processing early due to errors");
        let path = config.output_dir.join(UNFINISHED_LAYERS_FILE);
        // Best-effort: a failed write must not mask the batch failure.
        match result.state.write_unfinished(&path).await {
            Ok(()) => tracing::info!("Wrote resumable manifest to {}", path),
            Err(e) => tracing::error!("Failed to write resumable manifest {}: {}", path, e),
        }
    }

    if let Some(master_path) = &config.region_mapping {
        let mut master = crate::services::load_master(master_path)
            .await
            .with_context(|| format!("Failed to load master region mapping {master_path}"))?;
        crate::services::merge_region_mapping(&mut master, &result.state);
        let out = config.output_dir.join(REGION_MAPPING_OUT_FILE);
        crate::services::save_master(&master, &out)
            .await
            .with_context(|| format!("Failed to write merged region mapping {out}"))?;
        tracing::info!("Wrote merged region mapping to {}", out);
    }

    Ok(result.failed)
}
