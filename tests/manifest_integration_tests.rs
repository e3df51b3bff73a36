// Tileset manifest behavior under concurrent writers.
//
// Many layer pipelines finish tile generation at roughly the same time
// and each one rewrites the shared config.json. The store serializes
// those read-modify-write cycles; no entry may be lost.

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use region_tiler::models::TileSourceEntry;
use region_tiler::services::TilesetManifest;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_concurrent_upserts_lose_no_entries() {
    let tmp = TempDir::new().unwrap();
    let path = Utf8PathBuf::from_path_buf(tmp.path().join("config.json")).unwrap();
    let manifest = Arc::new(TilesetManifest::new(path.clone()));

    let mut handles = Vec::new();
    for i in 0..16 {
        let manifest = Arc::clone(&manifest);
        handles.push(tokio::spawn(async move {
            let entry = TileSourceEntry::new(&format!("/data/layer{i}/layer{i}.mbtiles"), 0, 12);
            manifest.upsert(&format!("layer{i}"), &entry).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let parsed: IndexMap<String, Value> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed.len(), 16);
    for i in 0..16 {
        let entry = &parsed[&format!("/layer{i}")];
        assert_eq!(
            entry["source"],
            format!("mbtiles:///data/layer{i}/layer{i}.mbtiles")
        );
        assert_eq!(entry["minZ"], 0);
        assert_eq!(entry["maxZ"], 12);
    }
}

#[tokio::test]
async fn test_repeated_runs_keep_existing_routes() {
    let tmp = TempDir::new().unwrap();
    let path = Utf8PathBuf::from_path_buf(tmp.path().join("config.json")).unwrap();

    // First run writes two layers
    {
        let manifest = TilesetManifest::new(path.clone());
        manifest
            .upsert("alpha", &TileSourceEntry::new("/a.mbtiles", 0, 8))
            .await
            .unwrap();
        manifest
            .upsert("beta", &TileSourceEntry::new("/b.mbtiles", 0, 8))
            .await
            .unwrap();
    }

    // A later run re-processes only alpha at a deeper zoom
    {
        let manifest = TilesetManifest::new(path.clone());
        manifest
            .upsert("alpha", &TileSourceEntry::new("/a.mbtiles", 0, 12))
            .await
            .unwrap();
    }

    let parsed: IndexMap<String, Value> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed["/alpha"]["maxZ"], 12);
    assert_eq!(parsed["/beta"]["maxZ"], 8);
}
