use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serving mode tag for vector tile layers.
pub const SERVER_TYPE_MVT: &str = "MVT";

/// Legacy raster fallback serving mode, used for layers that did not
/// complete in this batch.
pub const SERVER_TYPE_WMS: &str = "WMS";

/// Cache header attached to every tileset manifest entry.
pub const TILE_CACHE_CONTROL: &str = "public,max-age=86400";

/// One region-id file: the full value series for a single property of a
/// layer, index-aligned with the synthesized feature identifiers.
///
/// Persisted as `region_map-<layer>_<property>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionIdFile {
    pub layer: String,
    pub property: String,
    pub values: Vec<Value>,
}

impl RegionIdFile {
    /// File name for a layer/property pair, e.g.
    /// `region_map-okcounties_county.json`.
    pub fn file_name(layer: &str, property: &str) -> String {
        format!("region_map-{layer}_{property}.json")
    }
}

/// Metadata record enabling a client to render a layer and match its
/// regions against external data.
///
/// One of these is emitted per mapping-entry key into
/// `regionMapping-<layer>.json`, and merged into the master manifest for
/// layers that succeed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegionMappingEntry {
    pub layer_name: String,

    /// Tile URL template.
    pub server: String,

    pub server_type: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_subdomains: Vec<String>,

    pub server_min_zoom: u8,

    /// Highest zoom with generated tiles; the server overzooms beyond it.
    pub server_max_native_zoom: u8,

    pub server_max_zoom: u8,

    /// `[west, south, east, north]` in WGS84 degrees.
    pub bbox: [f64; 4],

    pub unique_id_prop: String,

    pub region_prop: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disambig_prop: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disambig_region_id: Option<String>,

    #[serde(default)]
    pub aliases: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prop: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Region-id file for `region_prop`.
    pub region_ids_file: String,

    /// Region-id file for `disambig_prop`; present exactly when
    /// `disambig_prop` is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_disambig_ids_file: Option<String>,
}

/// Shape of `regionMapping-<layer>.json` and of the master
/// regionMapping.json's typed subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionMappingFile {
    #[serde(rename = "regionWmsMap")]
    pub region_wms_map: IndexMap<String, RegionMappingEntry>,
}

/// One tile-source descriptor in the shared tileset manifest, keyed by
/// route (`/<layer>`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TileSourceEntry {
    /// `mbtiles://<absolute path>` archive location.
    pub source: String,

    #[serde(rename = "minZ")]
    pub min_z: u8,

    #[serde(rename = "maxZ")]
    pub max_z: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<IndexMap<String, String>>,
}

impl TileSourceEntry {
    pub fn new(mbtiles_path: &str, min_z: u8, max_z: u8) -> Self {
        let mut headers = IndexMap::new();
        headers.insert("Cache-Control".to_string(), TILE_CACHE_CONTROL.to_string());
        Self {
            source: format!("mbtiles://{mbtiles_path}"),
            min_z,
            max_z,
            headers: Some(headers),
        }
    }
}

/// Everything a successfully processed layer hands back to the batch:
/// the fresh regionMapping entries, the manifest descriptor (when tiles
/// were generated) and the missing-property observation count.
#[derive(Debug, Clone)]
pub struct LayerOutput {
    pub layer_name: String,
    pub region_mapping: IndexMap<String, RegionMappingEntry>,
    pub tile_source: Option<TileSourceEntry>,
    /// Number of requested property values that were absent across all
    /// features. Nulls are tolerated in the series, but the count is
    /// surfaced so sparse layers are visible in the logs.
    pub missing_values: usize,
}
