// tippecanoe invocation: GeoJSON in, mbtiles archive out.

use crate::errors::PipelineError;
use camino::Utf8Path;
use tokio::process::Command;

const TIPPECANOE: &str = "tippecanoe";

/// Tile detail parameter for a given zoom ceiling.
///
/// tippecanoe requires zoom + detail <= 32; pinning detail to the remainder
/// keeps full precision at the generated ceiling while staying inside the
/// tool's numeric range. Zooms above 32 are rejected at config validation;
/// here they saturate to zero detail rather than underflow.
pub fn detail_for_zoom(max_zoom: u8) -> u8 {
    32u8.saturating_sub(max_zoom)
}

/// Build the tippecanoe argument list for one layer.
pub fn tippecanoe_args(
    layer_name: &str,
    max_zoom: u8,
    geojson: &Utf8Path,
    mbtiles: &Utf8Path,
) -> Vec<String> {
    vec![
        "-q".to_string(),
        "-f".to_string(),
        "-P".to_string(),
        "-l".to_string(),
        layer_name.to_string(),
        "-z".to_string(),
        max_zoom.to_string(),
        "-d".to_string(),
        detail_for_zoom(max_zoom).to_string(),
        "-o".to_string(),
        mbtiles.to_string(),
        geojson.to_string(),
    ]
}

/// Generate the tile archive for a layer.
pub async fn generate_tiles(
    layer_name: &str,
    max_zoom: u8,
    geojson: &Utf8Path,
    mbtiles: &Utf8Path,
) -> Result<(), PipelineError> {
    let args = tippecanoe_args(layer_name, max_zoom, geojson, mbtiles);
    tracing::debug!("Executing: {} {}", TIPPECANOE, args.join(" "));

    let output = Command::new(TIPPECANOE)
        .args(&args)
        .output()
        .await
        .map_err(|source| PipelineError::Spawn {
            tool: TIPPECANOE,
            source,
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(PipelineError::Tool {
            tool: TIPPECANOE,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
