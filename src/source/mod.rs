//! where images come from: a container runtime or a saved archive

mod archive;
mod runtime;

use std::path::Path;

use crate::archive::ImageArchive;
use crate::digest::LayerDigest;
use crate::error::Result;
use crate::image::ImageRef;

pub use archive::SavedArchive;
pub use runtime::RuntimeCli;

/// the three external operations the extractor needs
pub trait ImageSource {
    /// make the image available locally
    fn pull(&self, image: &ImageRef) -> Result<()>;

    /// write the image (all layers plus metadata) as one archive at `dest`
    fn save(&self, image: &ImageRef, dest: &Path) -> Result<()>;

    /// filesystem layer digests, base layer first
    fn layer_digests(&self, image: &ImageRef) -> Result<Vec<LayerDigest>>;

    /// layer tarball entries of `image` in the archive written by `save`,
    /// base layer first
    ///
    /// a runtime saves exactly the image asked for, so by default the
    /// archive's only image is read whatever name it was tagged with.
    fn layer_entries(&self, archive: &ImageArchive, _image: &ImageRef) -> Result<Vec<String>> {
        archive.layer_entries(None)
    }
}

impl<S: ImageSource + ?Sized> ImageSource for &S {
    fn pull(&self, image: &ImageRef) -> Result<()> {
        (**self).pull(image)
    }

    fn save(&self, image: &ImageRef, dest: &Path) -> Result<()> {
        (**self).save(image, dest)
    }

    fn layer_digests(&self, image: &ImageRef) -> Result<Vec<LayerDigest>> {
        (**self).layer_digests(image)
    }

    fn layer_entries(&self, archive: &ImageArchive, image: &ImageRef) -> Result<Vec<String>> {
        (**self).layer_entries(archive, image)
    }
}
