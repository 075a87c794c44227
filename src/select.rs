//! target subdirectory matching and path flattening

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::{Error, Result};

/// prefix of overlay whiteout markers inside layer archives
pub const WHITEOUT_PREFIX: &str = ".wh.";

// `*` crosses `/`, like tar --wildcards
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// selects layer entries below the target subdirectory
#[derive(Clone, Debug)]
pub struct Selector {
    pattern: Pattern,
}

impl Selector {
    pub fn new(pattern: &str) -> Result<Self> {
        let normalized = pattern.trim_start_matches("./").trim_start_matches('/');
        let pattern = Pattern::new(normalized).map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { pattern })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// whether a layer entry path falls under the target
    pub fn matches(&self, entry_path: &Path) -> bool {
        let normalized = normalize(entry_path);
        match normalized.to_str() {
            Some(s) => self.pattern.matches_with(s, MATCH_OPTIONS),
            None => false,
        }
    }

    /// output file name for a matching entry: its final path segment
    ///
    /// None for whiteout markers and for paths without a usable name.
    pub fn flatten(&self, entry_path: &Path) -> Option<OsString> {
        let name = entry_path.file_name()?;
        if name.to_string_lossy().starts_with(WHITEOUT_PREFIX) {
            return None;
        }
        Some(name.to_os_string())
    }
}

/// drop `.`, root and prefix components so `./a/b` and `/a/b` read as `a/b`
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_) | Component::ParentDir))
        .collect()
}
