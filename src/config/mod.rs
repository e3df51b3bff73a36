use crate::models::BatchConfig;
use anyhow::{Context, Result};
use camino::Utf8Path;
use indexmap::IndexMap;
use std::fs;

/// Load and validate a batch configuration file.
///
/// # Arguments
/// * `path` - Path to the JSON configuration (e.g., "okcounties.json")
///
/// # Returns
/// The validated BatchConfig
pub fn load_batch_config<P: AsRef<Utf8Path>>(path: P) -> Result<BatchConfig> {
    let path = path.as_ref();

    let file_contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch config: {}", path))?;

    let config: BatchConfig = serde_json::from_str(&file_contents)
        .with_context(|| format!("Failed to parse batch config: {}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid batch config: {}", path))?;

    tracing::info!(
        "Loaded batch config from {} ({} layers)",
        path,
        config.layers.len()
    );
    Ok(config)
}

/// Load a resumable manifest written by a previous failed run.
///
/// The file maps layer names to `false`; only the keys matter. Layers
/// present in the manifest are re-run, everything else is skipped.
pub fn load_resume_manifest<P: AsRef<Utf8Path>>(path: P) -> Result<IndexMap<String, bool>> {
    let path = path.as_ref();

    let file_contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read resume manifest: {}", path))?;

    let manifest: IndexMap<String, bool> = serde_json::from_str(&file_contents)
        .with_context(|| format!("Failed to parse resume manifest: {}", path))?;

    tracing::info!(
        "Loaded resume manifest from {} ({} unfinished layers)",
        path,
        manifest.len()
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, body: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_batch_config() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(
            &tmp,
            "batch.json",
            r#"{
                "regionMapping": "regionMapping.json",
                "layers": [
                    {
                        "layerName": "okcounties",
                        "shapefile": "okcounties.shp",
                        "generateTilesTo": 10,
                        "addFID": true,
                        "server": "http://127.0.0.1:8000/okcounties/{z}/{x}/{y}.pbf",
                        "regionMappingEntries": {
                            "okcounty": { "regionProp": "county" }
                        }
                    }
                ]
            }"#,
        );

        let config = load_batch_config(&path).unwrap();
        assert_eq!(config.layers.len(), 1);
        assert_eq!(config.layers[0].layer_name, "okcounties");
        assert_eq!(config.concurrency, 3);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(
            &tmp,
            "batch.json",
            r#"{
                "layers": [
                    {
                        "layerName": "dup",
                        "shapefile": "a.shp",
                        "server": "s",
                        "regionMappingEntries": { "k": { "regionProp": "p" } }
                    },
                    {
                        "layerName": "dup",
                        "shapefile": "b.shp",
                        "server": "s",
                        "regionMappingEntries": { "k": { "regionProp": "p" } }
                    }
                ]
            }"#,
        );

        assert!(load_batch_config(&path).is_err());
    }

    #[test]
    fn test_missing_config_file_errors() {
        assert!(load_batch_config("/nonexistent/batch.json").is_err());
    }

    #[test]
    fn test_load_resume_manifest() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(
            &tmp,
            "unfinished_layers.json",
            r#"{ "okcounties": false, "fedelectorates": false }"#,
        );

        let manifest = load_resume_manifest(&path).unwrap();
        assert_eq!(manifest.len(), 2);
        assert!(manifest.contains_key("okcounties"));
    }
}
