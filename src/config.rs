use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};

/// default config file looked up in the current directory
pub const DEFAULT_CONFIG_FILE: &str = "layerpick.toml";

/// default target pattern: anything below a `registry` directory
pub const DEFAULT_TARGET: &str = "**/registry/*";

/// tool configuration, usually stored in layerpick.toml
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// image to pull and extract
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// flat directory receiving extracted files
    pub output_dir: PathBuf,
    /// scratch space for the image archive and per-layer archives
    pub work_dir: PathBuf,
    /// glob matched against layer entry paths
    pub target: String,
    /// container runtime binary
    pub runtime: String,
    /// number of layers staged concurrently
    pub jobs: usize,
    /// recompute sha256 layer digests while extracting
    pub verify_digests: bool,
    /// what to do when a layer fails for a reason other than "not found"
    pub on_layer_error: LayerErrorPolicy,
    pub concat: ConcatConfig,
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// load config from file, falling back to defaults when it is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(Error::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image: None,
            output_dir: PathBuf::from("registry"),
            work_dir: PathBuf::from("."),
            target: DEFAULT_TARGET.to_string(),
            runtime: "docker".to_string(),
            jobs: 1,
            verify_digests: true,
            on_layer_error: LayerErrorPolicy::default(),
            concat: ConcatConfig::default(),
        }
    }
}

/// settings for printing config files
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcatConfig {
    /// directory whose files are concatenated
    pub dir: PathBuf,
    /// file extensions to include, without the dot
    pub extensions: Vec<String>,
}

impl Default for ConcatConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            extensions: vec!["yml".to_string(), "yaml".to_string()],
        }
    }
}

/// handling of per-layer failures that are not a plain "target absent"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerErrorPolicy {
    /// abort the run with the layer's error
    #[default]
    Fail,
    /// log, record in the report and continue with the next layer
    Skip,
}

impl FromStr for LayerErrorPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(LayerErrorPolicy::Fail),
            "skip" => Ok(LayerErrorPolicy::Skip),
            _ => Err(Error::InvalidLayerErrorPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for LayerErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerErrorPolicy::Fail => f.write_str("fail"),
            LayerErrorPolicy::Skip => f.write_str("skip"),
        }
    }
}
