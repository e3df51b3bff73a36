use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised by individual pipeline stages.
///
/// The taxonomy mirrors the failure modes of the external collaborators:
/// the shapefile reader, the GDAL/tippecanoe subprocesses, and the shared
/// manifest files.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The vector file could not be opened or a read failed mid-stream.
    #[error("failed to read vector file {path}: {message}")]
    Read { path: Utf8PathBuf, message: String },

    /// An external tool exited with a non-zero status.
    #[error("{tool} exited with status {status}: {stderr}")]
    Tool {
        tool: &'static str,
        status: i32,
        stderr: String,
    },

    /// The conversion tool reported that its output already exists.
    ///
    /// This is expected on re-runs and is recovered as success-equivalent
    /// by the tile generation stage. Any other conversion failure surfaces
    /// as [`PipelineError::Tool`].
    #[error("{tool} reported that the output already exists")]
    AlreadyExists { tool: &'static str },

    /// A shared manifest file could not be read or written.
    #[error("manifest I/O failed for {path}")]
    ManifestIo {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A per-layer output file could not be written.
    #[error("failed to write {path}")]
    OutputIo {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Spawning an external tool failed before it produced an exit status.
    #[error("failed to spawn {tool}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking extraction task was cancelled or panicked.
    #[error("extraction task failed: {0}")]
    TaskJoin(String),
}
