use std::path::PathBuf;

use crate::digest::LayerDigest;

/// error type for layerpick operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no image reference given (pass one on the command line or set `image` in the config)")]
    MissingImage,

    #[error("invalid image reference: {0}")]
    InvalidImageRef(String),

    #[error("invalid layer digest: {0}")]
    InvalidDigest(String),

    #[error("failed to run {program}: {source}")]
    RuntimeSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} {action} failed (exit {}): {}", exit_label(.code), .stderr.trim())]
    Runtime {
        program: String,
        action: &'static str,
        code: Option<i32>,
        stderr: String,
    },

    #[error("image {0} has no filesystem layers")]
    NoLayers(String),

    #[error("image metadata lists {digests} layers but the archive manifest lists {entries}")]
    LayerCountMismatch { digests: usize, entries: usize },

    #[error("manifest.json not found in image archive {0}")]
    ManifestMissing(PathBuf),

    #[error("image archive {archive} has no manifest entries")]
    EmptyManifest { archive: PathBuf },

    #[error("no image tagged {image} in image archive {archive}")]
    ImageNotInArchive { image: String, archive: PathBuf },

    #[error("entry {entry} not found in image archive {archive}")]
    EntryNotFound { archive: PathBuf, entry: String },

    #[error("layer {expected} content hashes to {actual}")]
    DigestMismatch {
        expected: LayerDigest,
        actual: String,
    },

    #[error("layer {0} appears again after failing earlier in this image")]
    RepeatedLayerFailure(LayerDigest),

    #[error("invalid target pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("invalid layer error policy: {0} (expected fail or skip)")]
    InvalidLayerErrorPolicy(String),

    #[error("working directory {0} is locked by another run")]
    LockContention(PathBuf),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
