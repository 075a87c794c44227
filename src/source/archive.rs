use std::path::{Path, PathBuf};

use crate::archive::ImageArchive;
use crate::digest::LayerDigest;
use crate::error::{IoResultExt, Result};
use crate::image::ImageRef;
use crate::source::ImageSource;

/// an image already saved to disk
///
/// pulling only checks that the archive holds the image and saving copies
/// the archive, so the extractor's cleanup never touches the caller's file.
#[derive(Debug, Clone)]
pub struct SavedArchive {
    archive: ImageArchive,
    by_tag: bool,
}

impl SavedArchive {
    /// read the image tagged with the reference the extractor asks for
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            archive: ImageArchive::new(path),
            by_tag: true,
        }
    }

    /// read the archive's first image, whatever reference is asked for
    pub fn first_image(path: impl Into<PathBuf>) -> Self {
        Self {
            archive: ImageArchive::new(path),
            by_tag: false,
        }
    }

    pub fn path(&self) -> &Path {
        self.archive.path()
    }

    pub fn archive(&self) -> &ImageArchive {
        &self.archive
    }

    fn selection<'a>(&self, image: &'a ImageRef) -> Option<&'a ImageRef> {
        self.by_tag.then_some(image)
    }
}

impl ImageSource for SavedArchive {
    fn pull(&self, image: &ImageRef) -> Result<()> {
        let path = self.path();
        std::fs::metadata(path).with_path(path)?;
        self.archive.manifest(self.selection(image))?;
        tracing::info!(image = %image, archive = %path.display(), "using saved image archive");
        Ok(())
    }

    fn save(&self, _image: &ImageRef, dest: &Path) -> Result<()> {
        std::fs::copy(self.path(), dest).with_path(dest)?;
        Ok(())
    }

    fn layer_digests(&self, image: &ImageRef) -> Result<Vec<LayerDigest>> {
        self.archive.diff_ids(self.selection(image))
    }

    fn layer_entries(&self, archive: &ImageArchive, image: &ImageRef) -> Result<Vec<String>> {
        archive.layer_entries(self.selection(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fixture::{layer_tar, write_image_archive};
    use crate::Error;
    use tempfile::tempdir;

    #[test]
    fn test_saved_archive_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image.tar");
        let digests = write_image_archive(
            &path,
            "noske:latest",
            &[layer_tar(&[("corpora/registry/a", b"a")])],
        );
        let source = SavedArchive::new(&path);
        let image = ImageRef::parse("noske").unwrap();

        source.pull(&image).unwrap();
        assert_eq!(source.layer_digests(&image).unwrap(), digests);

        let copy = dir.path().join("copy.tar");
        source.save(&image, &copy).unwrap();
        assert_eq!(std::fs::read(&copy).unwrap(), std::fs::read(&path).unwrap());
    }

    #[test]
    fn test_pull_rejects_image_not_in_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image.tar");
        write_image_archive(&path, "noske:latest", &[layer_tar(&[("a", b"a")])]);
        let wrong = ImageRef::parse("wrongname:9").unwrap();

        assert!(matches!(
            SavedArchive::new(&path).pull(&wrong),
            Err(Error::ImageNotInArchive { .. })
        ));
        assert!(matches!(
            SavedArchive::new(&path).layer_digests(&wrong),
            Err(Error::ImageNotInArchive { .. })
        ));
    }

    #[test]
    fn test_first_image_ignores_requested_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image.tar");
        let digests = write_image_archive(&path, "noske:latest", &[layer_tar(&[("a", b"a")])]);
        let source = SavedArchive::first_image(&path);
        let image = source.archive().first_image().unwrap();
        assert_eq!(image.to_string(), "noske:latest");

        let other = ImageRef::parse("anything").unwrap();
        source.pull(&other).unwrap();
        assert_eq!(source.layer_digests(&other).unwrap(), digests);
    }

    #[test]
    fn test_missing_archive_fails_pull() {
        let dir = tempdir().unwrap();
        let source = SavedArchive::new(dir.path().join("absent.tar"));
        let image = ImageRef::parse("noske").unwrap();
        assert!(matches!(source.pull(&image), Err(Error::Io { .. })));
    }
}
