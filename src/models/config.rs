use camino::Utf8PathBuf;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cross-field configuration constraint violations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate layer name: {layer}")]
    DuplicateLayer { layer: String },

    #[error("layer {layer} has no regionMappingEntries")]
    NoMappingEntries { layer: String },

    #[error("layer {layer}: generateTilesTo must be between 1 and 32, got {zoom}")]
    ZoomOutOfRange { layer: String, zoom: u8 },

    #[error("layer {layer} entry {entry}: disambigProp and disambigRegionId must be set together")]
    UnpairedDisambig { layer: String, entry: String },

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Synthesized identifier column injected by the reprojection stage when a
/// layer has no natural unique id property.
pub const DEFAULT_UNIQUE_ID_PROP: &str = "FID";

/// Batch configuration loaded from the JSON file passed on the command line.
///
/// Contains run-wide settings plus one [`LayerConfig`] per layer to process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    /// Directory holding one subdirectory per layer with the reprojected
    /// shapefile, GeoJSON and mbtiles artifacts.
    #[serde(default = "default_data_dir")]
    pub data_dir: Utf8PathBuf,

    /// Directory the per-layer `shapefile` paths are resolved against.
    #[serde(default = "default_shapefile_dir")]
    pub shapefile_dir: Utf8PathBuf,

    /// Directory for region-id files, regionMapping files and the shared
    /// tileset manifest.
    #[serde(default = "default_output_dir")]
    pub output_dir: Utf8PathBuf,

    /// Master regionMapping.json to merge batch results into. Optional;
    /// without it the final merge step is skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_mapping: Option<Utf8PathBuf>,

    /// Maximum number of layer pipelines running at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Minimum zoom advertised in regionMapping entries and the manifest.
    #[serde(default)]
    pub min_zoom: u8,

    /// Maximum zoom advertised to clients (tiles above the generated
    /// ceiling are overzoomed by the server).
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,

    /// Static stage toggles, mostly useful when re-running part of a batch.
    #[serde(default)]
    pub steps: StepFlags,

    pub layers: Vec<LayerConfig>,
}

fn default_data_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("data")
}

fn default_shapefile_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("geoserver_shapefiles")
}

fn default_output_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("output_files")
}

fn default_concurrency() -> usize {
    3
}

fn default_max_zoom() -> u8 {
    20
}

/// Static per-stage enable flags.
///
/// These gate whole stages of every layer pipeline, matching the manual
/// workflow of re-running only tile generation or only config emission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFlags {
    #[serde(default = "default_true")]
    pub reprojection: bool,

    #[serde(default = "default_true")]
    pub tile_generation: bool,

    /// Covers column extraction and every config/metadata output.
    #[serde(default = "default_true")]
    pub config: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StepFlags {
    fn default() -> Self {
        Self {
            reprojection: true,
            tile_generation: true,
            config: true,
        }
    }
}

/// Configuration for one layer, one entry of the batch file's `layers` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    /// Unique layer key; also the route key (`/<layerName>`) in the tileset
    /// manifest and the stem of every per-layer output file.
    pub layer_name: String,

    /// Source shapefile, resolved against the batch `shapefileDir` when
    /// relative.
    pub shapefile: Utf8PathBuf,

    /// Zoom ceiling for tile generation. Absent means metadata only, no
    /// tiles and no manifest entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_tiles_to: Option<u8>,

    /// Synthesize a sequential FID column during reprojection. Required
    /// when the shapefile has no property that uniquely identifies every
    /// feature.
    #[serde(rename = "addFID", default)]
    pub add_fid: bool,

    /// Explicit unique-id property. Defaults to the synthesized FID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id_prop: Option<String>,

    /// Explicit display-name property. When set, the name heuristic is
    /// skipped entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prop: Option<String>,

    /// Tile URL template clients fetch from, e.g.
    /// `http://vector-tiles.example.com/<layer>/{z}/{x}/{y}.pbf`.
    pub server: String,

    #[serde(default)]
    pub server_subdomains: Vec<String>,

    /// Mapping-entry key -> region matching metadata. Order is preserved
    /// into the emitted regionMapping file.
    pub region_mapping_entries: IndexMap<String, RegionMappingEntryConfig>,
}

impl LayerConfig {
    /// The property used as the stable per-feature join key.
    pub fn unique_id_property(&self) -> &str {
        self.unique_id_prop
            .as_deref()
            .unwrap_or(DEFAULT_UNIQUE_ID_PROP)
    }

    /// Union of region and disambiguation properties across all mapping
    /// entries, in first-declared order. This is exactly the set of columns
    /// the extraction stage pulls from the shapefile.
    pub fn requested_properties(&self) -> IndexSet<String> {
        let mut props = IndexSet::new();
        for entry in self.region_mapping_entries.values() {
            props.insert(entry.region_prop.clone());
            if let Some(disambig) = &entry.disambig_prop {
                props.insert(disambig.clone());
            }
        }
        props
    }
}

/// One region mapping entry as configured (the emitted counterpart is
/// [`crate::models::RegionMappingEntry`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionMappingEntryConfig {
    /// Feature attribute matched against external tabular data.
    pub region_prop: String,

    /// Secondary attribute resolving ambiguous region matches (e.g. state
    /// for duplicated county names).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disambig_prop: Option<String>,

    /// The regionMapping definition the disambiguation property values
    /// come from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disambig_region_id: Option<String>,

    #[serde(default)]
    pub aliases: Vec<String>,

    #[serde(default)]
    pub description: String,
}

impl BatchConfig {
    /// Validate cross-field constraints the schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = IndexSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.layer_name.as_str()) {
                return Err(ConfigError::DuplicateLayer {
                    layer: layer.layer_name.clone(),
                });
            }
            if layer.region_mapping_entries.is_empty() {
                return Err(ConfigError::NoMappingEntries {
                    layer: layer.layer_name.clone(),
                });
            }
            if let Some(max_zoom) = layer.generate_tiles_to {
                // tippecanoe requires zoom + detail <= 32
                if max_zoom == 0 || max_zoom > 32 {
                    return Err(ConfigError::ZoomOutOfRange {
                        layer: layer.layer_name.clone(),
                        zoom: max_zoom,
                    });
                }
            }
            for (key, entry) in &layer.region_mapping_entries {
                if entry.disambig_prop.is_some() != entry.disambig_region_id.is_some() {
                    return Err(ConfigError::UnpairedDisambig {
                        layer: layer.layer_name.clone(),
                        entry: key.clone(),
                    });
                }
            }
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn okcounties_json() -> &'static str {
        r#"{
            "layers": [{
                "layerName": "okcounties",
                "shapefile": "okcounties.shp",
                "generateTilesTo": 10,
                "addFID": true,
                "server": "http://127.0.0.1:8000/okcounties/{z}/{x}/{y}.pbf",
                "serverSubdomains": [],
                "regionMappingEntries": {
                    "okcounty": {
                        "regionProp": "county",
                        "aliases": ["okcounty"],
                        "description": "Oklahoma Counties"
                    },
                    "okcounty_name": {
                        "regionProp": "name",
                        "aliases": ["okcounty_name"],
                        "description": "Oklahoma Counties"
                    }
                }
            }]
        }"#
    }

    #[test]
    fn test_parse_batch_config_defaults() {
        let config: BatchConfig = serde_json::from_str(okcounties_json()).unwrap();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.min_zoom, 0);
        assert_eq!(config.max_zoom, 20);
        assert!(config.steps.reprojection);
        assert!(config.steps.tile_generation);
        assert!(config.steps.config);
        assert_eq!(config.data_dir, Utf8PathBuf::from("data"));
        config.validate().unwrap();
    }

    #[test]
    fn test_layer_config_fields() {
        let config: BatchConfig = serde_json::from_str(okcounties_json()).unwrap();
        let layer = &config.layers[0];
        assert_eq!(layer.layer_name, "okcounties");
        assert!(layer.add_fid);
        assert_eq!(layer.generate_tiles_to, Some(10));
        assert_eq!(layer.unique_id_property(), "FID");
        assert_eq!(layer.region_mapping_entries.len(), 2);
    }

    #[test]
    fn test_requested_properties_union_preserves_order() {
        let config: BatchConfig = serde_json::from_str(okcounties_json()).unwrap();
        let props: Vec<_> = config.layers[0]
            .requested_properties()
            .into_iter()
            .collect();
        assert_eq!(props, vec!["county".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_validate_rejects_duplicate_layers() {
        let mut config: BatchConfig = serde_json::from_str(okcounties_json()).unwrap();
        let dup = config.layers[0].clone();
        config.layers.push(dup);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateLayer { .. }));
        assert!(err.to_string().contains("okcounties"));
    }

    #[test]
    fn test_validate_rejects_lone_disambig_prop() {
        let mut config: BatchConfig = serde_json::from_str(okcounties_json()).unwrap();
        config.layers[0]
            .region_mapping_entries
            .get_index_mut(0)
            .unwrap()
            .1
            .disambig_prop = Some("state".to_string());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnpairedDisambig { .. }));
        assert!(err.to_string().contains("disambigRegionId"));
    }

    #[test]
    fn test_validate_rejects_excessive_zoom() {
        let mut config: BatchConfig = serde_json::from_str(okcounties_json()).unwrap();
        config.layers[0].generate_tiles_to = Some(33);
        assert!(config.validate().is_err());
    }
}
