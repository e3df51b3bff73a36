// Shared manifest handling.
//
// Two manifests outlive any single layer pipeline:
//
// - the tileset manifest (`config.json`) mapping route keys to tile-source
//   descriptors, updated by every layer that generates tiles;
// - the master regionMapping.json, merged once after the batch completes.
//
// The tileset manifest is the only resource multiple concurrent layer
// pipelines mutate, so every read-modify-write cycle holds an exclusive
// async lock.

use crate::errors::PipelineError;
use crate::models::{SERVER_TYPE_WMS, TileSourceEntry};
use crate::state::BatchState;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

/// Prefix carried by layer names in master regionMapping entries.
const LAYER_NAME_PREFIX: &str = "region_map:";

/// Single-writer store for the shared tileset manifest.
///
/// Each update reads the file (a missing file is an empty manifest, never
/// an error), overwrites one route key and writes the whole map back.
/// Entries belonging to other layers are preserved as raw JSON so repeated
/// runs never clobber them.
pub struct TilesetManifest {
    path: Utf8PathBuf,
    lock: Mutex<()>,
}

impl TilesetManifest {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Set or overwrite the route entry for one layer.
    pub async fn upsert(
        &self,
        layer_name: &str,
        entry: &TileSourceEntry,
    ) -> Result<(), PipelineError> {
        let _guard = self.lock.lock().await;

        let mut manifest = self.read_unlocked().await?;
        manifest.insert(format!("/{layer_name}"), serde_json::to_value(entry)?);

        let body = serde_json::to_string_pretty(&manifest)?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|source| PipelineError::ManifestIo {
                path: self.path.clone(),
                source,
            })?;
        tracing::info!("Updated tileset manifest entry /{}", layer_name);
        Ok(())
    }

    async fn read_unlocked(&self) -> Result<IndexMap<String, Value>, PipelineError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(body) => Ok(serde_json::from_str(&body)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(IndexMap::new()),
            Err(source) => Err(PipelineError::ManifestIo {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Master regionMapping.json: the typed `regionWmsMap` plus any top-level
/// fields the pipeline does not produce, carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterRegionMapping {
    #[serde(rename = "regionWmsMap")]
    pub region_wms_map: IndexMap<String, Value>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Layer owning a master entry: its `layerName` with the `region_map:`
/// prefix stripped.
pub fn owning_layer(entry: &Value) -> Option<&str> {
    entry
        .get("layerName")
        .and_then(Value::as_str)
        .map(|name| name.strip_prefix(LAYER_NAME_PREFIX).unwrap_or(name))
}

/// Merge a finished batch into the master region mapping.
///
/// For every `regionWmsMap` entry with an identifiable owning layer:
/// - layer succeeded in this run: overwrite the entry's fields with the
///   fresh [`crate::models::RegionMappingEntry`] values, preserving any
///   master fields the pipeline does not produce;
/// - layer did not complete in this run (failed, unfinished, or not part
///   of the batch at all): force `serverType` to the legacy WMS fallback
///   and leave everything else untouched, keeping the old data-driven
///   entry usable while current tiles are unavailable.
///
/// Merging the same successful result twice is a no-op the second time.
pub fn merge_region_mapping(master: &mut MasterRegionMapping, state: &BatchState) {
    for (key, entry) in master.region_wms_map.iter_mut() {
        let Some(layer) = owning_layer(entry) else {
            continue;
        };
        let layer = layer.to_string();
        match state.outcome(&layer) {
            Some(outcome) if outcome.is_succeeded() => {
                let Some(fresh) = state.output(&layer).and_then(|o| o.region_mapping.get(key))
                else {
                    continue;
                };
                let fresh = match serde_json::to_value(fresh) {
                    Ok(Value::Object(map)) => map,
                    _ => continue,
                };
                if let Value::Object(existing) = entry {
                    for (field, value) in fresh {
                        existing.insert(field, value);
                    }
                } else {
                    *entry = Value::Object(fresh);
                }
            }
            _ => {
                if let Value::Object(existing) = entry {
                    existing.insert(
                        "serverType".to_string(),
                        Value::String(SERVER_TYPE_WMS.to_string()),
                    );
                }
            }
        }
    }
}

/// Load the master regionMapping.json.
pub async fn load_master(path: &Utf8Path) -> Result<MasterRegionMapping, PipelineError> {
    let body =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PipelineError::ManifestIo {
                path: path.to_path_buf(),
                source,
            })?;
    Ok(serde_json::from_str(&body)?)
}

/// Write the merged master to `regionMapping_out.json`.
pub async fn save_master(
    master: &MasterRegionMapping,
    path: &Utf8Path,
) -> Result<(), PipelineError> {
    let body = serde_json::to_string_pretty(master)?;
    tokio::fs::write(path, body)
        .await
        .map_err(|source| PipelineError::ManifestIo {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LayerOutput, RegionIdFile, RegionMappingEntry, SERVER_TYPE_MVT};
    use serde_json::json;
    use tempfile::TempDir;

    fn manifest_path(tmp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().join("config.json")).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_creates_manifest_when_missing() {
        let tmp = TempDir::new().unwrap();
        let manifest = TilesetManifest::new(manifest_path(&tmp));

        let entry = TileSourceEntry::new("/data/ok/ok.mbtiles", 0, 10);
        manifest.upsert("okcounties", &entry).await.unwrap();

        let body = std::fs::read_to_string(manifest.path()).unwrap();
        let parsed: IndexMap<String, Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["/okcounties"]["minZ"], 0);
        assert_eq!(parsed["/okcounties"]["maxZ"], 10);
    }

    #[tokio::test]
    async fn test_upsert_preserves_other_layers() {
        let tmp = TempDir::new().unwrap();
        let manifest = TilesetManifest::new(manifest_path(&tmp));

        manifest
            .upsert("alpha", &TileSourceEntry::new("/a.mbtiles", 0, 8))
            .await
            .unwrap();
        manifest
            .upsert("beta", &TileSourceEntry::new("/b.mbtiles", 0, 12))
            .await
            .unwrap();

        let body = std::fs::read_to_string(manifest.path()).unwrap();
        let parsed: IndexMap<String, Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["/alpha"]["maxZ"], 8);
        assert_eq!(parsed["/beta"]["maxZ"], 12);
    }

    #[tokio::test]
    async fn test_upsert_twice_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let manifest = TilesetManifest::new(manifest_path(&tmp));
        let entry = TileSourceEntry::new("/data/ok/ok.mbtiles", 0, 10);

        manifest.upsert("okcounties", &entry).await.unwrap();
        let first = std::fs::read_to_string(manifest.path()).unwrap();
        manifest.upsert("okcounties", &entry).await.unwrap();
        let second = std::fs::read_to_string(manifest.path()).unwrap();

        assert_eq!(first, second);
    }

    fn fresh_entry(layer: &str, key: &str) -> RegionMappingEntry {
        RegionMappingEntry {
            layer_name: layer.to_string(),
            server: format!("http://tiles.example.com/{layer}/{{z}}/{{x}}/{{y}}.pbf"),
            server_type: SERVER_TYPE_MVT.to_string(),
            server_subdomains: Vec::new(),
            server_min_zoom: 0,
            server_max_native_zoom: 10,
            server_max_zoom: 20,
            bbox: [96.8, -43.7, 159.1, -9.1],
            unique_id_prop: "FID".to_string(),
            region_prop: "county".to_string(),
            disambig_prop: None,
            disambig_region_id: None,
            aliases: vec![key.to_string()],
            name_prop: None,
            description: String::new(),
            region_ids_file: RegionIdFile::file_name(layer, "county"),
            region_disambig_ids_file: None,
        }
    }

    fn master_with(entries: &[(&str, &str)]) -> MasterRegionMapping {
        let mut region_wms_map = IndexMap::new();
        for (key, layer) in entries {
            region_wms_map.insert(
                key.to_string(),
                json!({
                    "layerName": format!("region_map:{layer}"),
                    "server": "http://geoserver.example.com/wms",
                    "serverType": "WMS",
                    "customField": "preserved"
                }),
            );
        }
        MasterRegionMapping {
            region_wms_map,
            extra: IndexMap::new(),
        }
    }

    #[test]
    fn test_merge_overwrites_succeeded_and_preserves_unknown_fields() {
        let mut master = master_with(&[("okcounty", "okcounties")]);
        let mut state = BatchState::new(["okcounties"]);
        let mut region_mapping = IndexMap::new();
        region_mapping.insert("okcounty".to_string(), fresh_entry("okcounties", "okcounty"));
        state.mark_succeeded(
            "okcounties",
            LayerOutput {
                layer_name: "okcounties".to_string(),
                region_mapping,
                tile_source: None,
                missing_values: 0,
            },
        );

        merge_region_mapping(&mut master, &state);

        let entry = &master.region_wms_map["okcounty"];
        assert_eq!(entry["serverType"], "MVT");
        assert_eq!(entry["regionProp"], "county");
        // Master-only fields survive the overwrite
        assert_eq!(entry["customField"], "preserved");
    }

    #[test]
    fn test_merge_falls_back_to_wms_for_failed_layers() {
        let mut master = master_with(&[("okcounty", "okcounties")]);
        let mut state = BatchState::new(["okcounties"]);
        state.mark_failed("okcounties");

        merge_region_mapping(&mut master, &state);

        let entry = &master.region_wms_map["okcounty"];
        assert_eq!(entry["serverType"], "WMS");
        assert_eq!(entry["server"], "http://geoserver.example.com/wms");
    }

    #[test]
    fn test_merge_falls_back_to_wms_for_layers_outside_the_batch() {
        // A stale MVT entry from an earlier run: its layer did not
        // complete in this run either, so it must revert to WMS
        let mut master = master_with(&[("other_key", "other_layer")]);
        if let Value::Object(entry) = &mut master.region_wms_map["other_key"] {
            entry.insert("serverType".to_string(), Value::String("MVT".to_string()));
        }
        let state = BatchState::new(["okcounties"]);

        merge_region_mapping(&mut master, &state);

        let entry = &master.region_wms_map["other_key"];
        assert_eq!(entry["serverType"], "WMS");
        // Only the serving mode is forced; the rest of the entry survives
        assert_eq!(entry["server"], "http://geoserver.example.com/wms");
        assert_eq!(entry["customField"], "preserved");
    }

    #[test]
    fn test_merge_twice_is_idempotent() {
        let mut master = master_with(&[("okcounty", "okcounties")]);
        let mut state = BatchState::new(["okcounties"]);
        let mut region_mapping = IndexMap::new();
        region_mapping.insert("okcounty".to_string(), fresh_entry("okcounties", "okcounty"));
        state.mark_succeeded(
            "okcounties",
            LayerOutput {
                layer_name: "okcounties".to_string(),
                region_mapping,
                tile_source: None,
                missing_values: 0,
            },
        );

        merge_region_mapping(&mut master, &state);
        let once = master.region_wms_map.clone();
        merge_region_mapping(&mut master, &state);
        assert_eq!(master.region_wms_map, once);
    }
}
