//! reading `docker save` / `podman save` image archives

#[cfg(test)]
pub(crate) mod fixture;
mod layer;
mod manifest;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use tar::Archive;

use crate::digest::LayerDigest;
use crate::error::{Error, IoResultExt, Result};
use crate::image::ImageRef;

pub use layer::{open_layer, stage_matching, Compression};
pub use manifest::{
    parse_image_config, parse_manifest, select_entry, ImageConfig, ManifestEntry, RootFs,
};

const MANIFEST: &str = "manifest.json";

/// a saved image archive on disk
#[derive(Debug, Clone)]
pub struct ImageArchive {
    path: PathBuf,
}

impl ImageArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// manifest entry tagged with `image`, or the first image when `None`
    pub fn manifest(&self, image: Option<&ImageRef>) -> Result<ManifestEntry> {
        let data = match self.read_entry(MANIFEST) {
            Err(Error::EntryNotFound { .. }) => {
                return Err(Error::ManifestMissing(self.path.clone()))
            }
            other => other?,
        };
        let entries = parse_manifest(&data)?;
        if entries.is_empty() {
            return Err(Error::EmptyManifest {
                archive: self.path.clone(),
            });
        }
        select_entry(entries, image).ok_or_else(|| Error::ImageNotInArchive {
            image: image.map(ToString::to_string).unwrap_or_default(),
            archive: self.path.clone(),
        })
    }

    /// reference of the archive's first image: its first tag, or the
    /// archive's file name when it carries none
    pub fn first_image(&self) -> Result<ImageRef> {
        let manifest = self.manifest(None)?;
        match manifest.repo_tags.as_deref().and_then(|tags| tags.first()) {
            Some(tag) => ImageRef::parse(tag),
            None => {
                let stem = self.path.file_stem().unwrap_or_default().to_string_lossy();
                ImageRef::parse(&stem)
            }
        }
    }

    /// layer entry names in manifest order, base layer first
    pub fn layer_entries(&self, image: Option<&ImageRef>) -> Result<Vec<String>> {
        Ok(self.manifest(image)?.layers)
    }

    /// uncompressed layer digests from the image config
    pub fn diff_ids(&self, image: Option<&ImageRef>) -> Result<Vec<LayerDigest>> {
        let manifest = self.manifest(image)?;
        let config = parse_image_config(&self.read_entry(&manifest.config)?)?;
        Ok(config.rootfs.diff_ids)
    }

    /// read one entry fully into memory
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.with_entry(name, |entry| {
            entry.read_to_end(&mut data).with_path(&self.path)?;
            Ok(())
        })?;
        Ok(data)
    }

    /// copy one entry to `dest`, returning the bytes written
    pub fn copy_entry(&self, name: &str, dest: &Path) -> Result<u64> {
        self.with_entry(name, |entry| {
            let mut out = File::create(dest).with_path(dest)?;
            io::copy(entry, &mut out).with_path(dest)
        })
    }

    fn with_entry<T>(&self, name: &str, f: impl FnOnce(&mut dyn Read) -> Result<T>) -> Result<T> {
        let wanted = normalize_entry_name(Path::new(name));
        let file = File::open(&self.path).with_path(&self.path)?;
        let mut archive = Archive::new(file);

        for entry in archive.entries().with_path(&self.path)? {
            let mut entry = entry.with_path(&self.path)?;
            let path = entry.path().with_path(&self.path)?;
            if normalize_entry_name(&path) == wanted {
                return f(&mut entry);
            }
        }

        Err(Error::EntryNotFound {
            archive: self.path.clone(),
            entry: name.to_string(),
        })
    }
}

fn normalize_entry_name(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir | Component::RootDir))
        .collect()
}
