//! Services module - framework-agnostic building blocks of the layer
//! pipeline.
//!
//! Each file covers one concern and has no dependency on the scheduler or
//! CLI layers, keeping every piece testable in isolation:
//!
//! - [`gdal`]: ogr2ogr invocations (web mercator reprojection with optional
//!   FID synthesis, GeoJSON conversion) and the named predicate that
//!   recognises the driver's "already exists" condition.
//! - [`tippecanoe`]: tile archive generation with the zoom/detail pairing
//!   the tool's numeric range requires.
//! - [`extraction`]: the single forward pass over a reprojected shapefile
//!   that accumulates index-aligned property value series.
//! - [`naming`]: the display-name property heuristic.
//! - [`manifest`]: the lock-serialized tileset manifest store and the
//!   master regionMapping merger.
//!
//! Subprocess execution is async via tokio; shapefile reading is
//! synchronous library I/O that callers run on a blocking task.

pub mod extraction;
pub mod gdal;
pub mod manifest;
pub mod naming;
pub mod tippecanoe;

pub use extraction::{ExtractedColumns, extract_columns};
pub use manifest::{
    MasterRegionMapping, TilesetManifest, load_master, merge_region_mapping, save_master,
};
pub use naming::determine_name_property;
