//! Data models for the region tiling pipeline.
//!
//! This module contains the serde-backed structures flowing through the
//! pipeline:
//! - [`BatchConfig`] / [`LayerConfig`]: the JSON configuration driving a run
//! - [`StepFlags`]: static stage toggles
//! - [`RegionIdFile`], [`RegionMappingEntry`], [`TileSourceEntry`]: the
//!   persisted per-layer outputs
//! - [`LayerOutput`]: the in-memory result a finished layer reports back
//!
//! Order-preserving maps use `IndexMap` so emitted JSON keeps the key order
//! of the configuration that produced it.

pub mod config;
pub mod outputs;

pub use config::{
    BatchConfig, ConfigError, DEFAULT_UNIQUE_ID_PROP, LayerConfig, RegionMappingEntryConfig,
    StepFlags,
};
pub use outputs::{
    LayerOutput, RegionIdFile, RegionMappingEntry, RegionMappingFile, SERVER_TYPE_MVT,
    SERVER_TYPE_WMS, TILE_CACHE_CONTROL, TileSourceEntry,
};
