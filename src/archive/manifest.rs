use serde::Deserialize;

use crate::digest::LayerDigest;
use crate::error::Result;
use crate::image::ImageRef;

/// one image in a saved archive's manifest.json
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    /// archive entry holding the image config json
    #[serde(rename = "Config")]
    pub config: String,
    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Option<Vec<String>>,
    /// archive entries of the layer tarballs, base layer first
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}

impl ManifestEntry {
    fn is_tagged(&self, image: &ImageRef) -> bool {
        let wanted = image.to_string();
        self.repo_tags
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|tag| *tag == wanted || tag.ends_with(&format!("/{}", wanted)))
    }
}

pub fn parse_manifest(data: &[u8]) -> Result<Vec<ManifestEntry>> {
    Ok(serde_json::from_slice(data)?)
}

/// pick the entry tagged with `image`, or the first one when no image is asked for
pub fn select_entry(entries: Vec<ManifestEntry>, image: Option<&ImageRef>) -> Option<ManifestEntry> {
    match image {
        Some(image) => entries.into_iter().find(|e| e.is_tagged(image)),
        None => entries.into_iter().next(),
    }
}

/// the parts of an image config this crate reads
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    pub rootfs: RootFs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RootFs {
    /// uncompressed layer digests, base layer first
    #[serde(default)]
    pub diff_ids: Vec<LayerDigest>,
}

pub fn parse_image_config(data: &[u8]) -> Result<ImageConfig> {
    Ok(serde_json::from_slice(data)?)
}
