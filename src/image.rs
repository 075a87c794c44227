use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// tag assumed when a reference carries none
pub const DEFAULT_TAG: &str = "latest";

/// a container image reference: name plus tag or digest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    name: String,
    reference: Reference,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Reference {
    Tag(String),
    Digest(String),
}

impl ImageRef {
    /// parse `name[:tag]` or `name@algo:hex`
    ///
    /// a colon before the last `/` belongs to a registry port, not a tag.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(Error::InvalidImageRef(s.to_string()));
        }

        if let Some((name, digest)) = s.split_once('@') {
            if name.is_empty() || !digest.contains(':') {
                return Err(Error::InvalidImageRef(s.to_string()));
            }
            return Ok(Self {
                name: name.to_string(),
                reference: Reference::Digest(digest.to_string()),
            });
        }

        let last_slash = s.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match s[last_slash..].rfind(':') {
            Some(i) => (&s[..last_slash + i], &s[last_slash + i + 1..]),
            None => (s, DEFAULT_TAG),
        };

        if name.is_empty() || name.ends_with('/') || tag.is_empty() {
            return Err(Error::InvalidImageRef(s.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            reference: Reference::Tag(tag.to_string()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// tag, or None for digest references
    pub fn tag(&self) -> Option<&str> {
        match &self.reference {
            Reference::Tag(tag) => Some(tag),
            Reference::Digest(_) => None,
        }
    }

    /// file-name-safe stem, e.g. `ghcr.io/acme/noske:1.0` -> `noske-1.0`
    pub fn file_stem(&self) -> String {
        let base = self.name.rsplit('/').next().unwrap_or(&self.name);
        let suffix = match &self.reference {
            Reference::Tag(tag) => tag.as_str(),
            Reference::Digest(digest) => {
                let hex = digest.split_once(':').map_or(digest.as_str(), |(_, h)| h);
                &hex[..hex.len().min(12)]
            }
        };
        format!("{}-{}", base, suffix)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl FromStr for ImageRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Reference::Tag(tag) => write!(f, "{}:{}", self.name, tag),
            Reference::Digest(digest) => write!(f, "{}@{}", self.name, digest),
        }
    }
}
