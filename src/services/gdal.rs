// ogr2ogr invocation: reprojection into web mercator and conversion of the
// reprojected shapefile to GeoJSON for the tiler.
//
// Both operations shell out to the GDAL `ogr2ogr` binary; argument
// construction is split from execution so commands can be unit tested
// without GDAL installed.

use crate::errors::PipelineError;
use crate::geo::MERCATOR_LAT_LIMIT;
use camino::Utf8Path;
use tokio::process::Command;

const OGR2OGR: &str = "ogr2ogr";

/// Build the ogr2ogr argument list that reprojects a source shapefile into
/// EPSG:3857, clipped to the web mercator latitude band.
///
/// The output layer is pinned to `layer_name` via `-nln`, so the
/// reprojected file is `<layer_dir>/<layer_name>.shp` even when the
/// source file's stem differs from the layer name.
///
/// When `add_fid` is set, an SQL selection clause injects a sequential FID
/// column ahead of the source columns; the assigned values follow feature
/// read order, which is what keeps them aligned with the extracted value
/// series. SQL tables in a shapefile datasource are named after the
/// source file, not the configured layer.
pub fn reprojection_args(
    source: &Utf8Path,
    layer_dir: &Utf8Path,
    layer_name: &str,
    add_fid: bool,
) -> Vec<String> {
    let mut args = vec![
        "-t_srs".to_string(),
        "EPSG:3857".to_string(),
        "-clipsrc".to_string(),
        "-180".to_string(),
        format!("-{MERCATOR_LAT_LIMIT}"),
        "180".to_string(),
        format!("{MERCATOR_LAT_LIMIT}"),
        "-overwrite".to_string(),
        "-f".to_string(),
        "ESRI Shapefile".to_string(),
        "-nln".to_string(),
        layer_name.to_string(),
        layer_dir.to_string(),
        source.to_string(),
    ];
    if add_fid {
        let table = source.file_stem().unwrap_or(layer_name);
        args.push("-sql".to_string());
        args.push(format!("select FID,* from {table}"));
    }
    args
}

/// Build the ogr2ogr argument list converting a shapefile to GeoJSON.
pub fn geojson_args(shapefile: &Utf8Path, geojson: &Utf8Path) -> Vec<String> {
    vec![
        "-f".to_string(),
        "GeoJSON".to_string(),
        geojson.to_string(),
        shapefile.to_string(),
    ]
}

/// Predicate for the GeoJSON driver's "output already exists" failure.
///
/// ogr2ogr surfaces a pre-existing output file as an ordinary error on
/// stderr; a previous conversion is perfectly reusable, so this one
/// condition is recovered. The match is on message wording and therefore
/// brittle against GDAL changes, which is why it lives behind this single
/// named predicate.
pub fn is_already_exists_error(stderr: &str) -> bool {
    stderr.contains("already exists")
}

/// Reproject `source` into `layer_dir` as an ESRI shapefile named after the
/// layer. Fatal for the layer on any failure.
pub async fn reproject_shapefile(
    source: &Utf8Path,
    layer_dir: &Utf8Path,
    layer_name: &str,
    add_fid: bool,
) -> Result<(), PipelineError> {
    let args = reprojection_args(source, layer_dir, layer_name, add_fid);
    run_ogr2ogr(&args).await
}

/// Convert the reprojected shapefile to GeoJSON for the tiler.
///
/// A driver-reported "already exists" condition is treated as success:
/// the existing conversion is reused. Every other failure propagates.
pub async fn convert_to_geojson(
    shapefile: &Utf8Path,
    geojson: &Utf8Path,
) -> Result<(), PipelineError> {
    let args = geojson_args(shapefile, geojson);
    match run_ogr2ogr(&args).await {
        Err(PipelineError::AlreadyExists { .. }) => {
            tracing::info!("GeoJSON {} already exists, reusing it", geojson);
            Ok(())
        }
        other => other,
    }
}

async fn run_ogr2ogr(args: &[String]) -> Result<(), PipelineError> {
    tracing::debug!("Executing: {} {}", OGR2OGR, args.join(" "));

    let output = Command::new(OGR2OGR)
        .args(args)
        .output()
        .await
        .map_err(|source| PipelineError::Spawn {
            tool: OGR2OGR,
            source,
        })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if is_already_exists_error(&stderr) {
        return Err(PipelineError::AlreadyExists { tool: OGR2OGR });
    }
    Err(PipelineError::Tool {
        tool: OGR2OGR,
        status: output.status.code().unwrap_or(-1),
        stderr,
    })
}
