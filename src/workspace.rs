use std::fs::File;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};

use crate::digest::LayerDigest;
use crate::error::{Error, IoResultExt, Result};
use crate::image::ImageRef;

const LOCK_FILE: &str = ".layerpick.lock";

/// the directories one extraction run works in
pub struct Workspace {
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl Workspace {
    /// create both directories (and parents) if missing
    pub fn prepare(work_dir: &Path, output_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(output_dir).with_path(output_dir)?;
        std::fs::create_dir_all(work_dir).with_path(work_dir)?;

        Ok(Self {
            work_dir: work_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// path for the saved image archive; unique per call
    pub fn image_archive_path(&self, image: &ImageRef) -> PathBuf {
        self.work_dir.join(format!(
            "{}-{}.tar",
            image.file_stem(),
            uuid::Uuid::new_v4().simple()
        ))
    }

    /// flat path a layer archive is copied to: the digest value, no prefix
    pub fn layer_archive_path(&self, digest: &LayerDigest) -> PathBuf {
        self.work_dir.join(digest.encoded())
    }

    /// directory a layer's matching files are staged in before being applied
    pub fn staging_path(&self, digest: &LayerDigest) -> PathBuf {
        self.work_dir.join(format!("{}.staged", digest.encoded()))
    }

    /// path to lock file
    pub fn lock_path(&self) -> PathBuf {
        self.work_dir.join(LOCK_FILE)
    }

    /// acquire exclusive lock on the working directory
    /// returns a guard that releases the lock on drop
    pub fn lock(&self) -> Result<WorkspaceLock> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        let flock = Flock::lock(file, FlockArg::LockExclusiveNonblock)
            .map_err(|_| Error::LockContention(self.work_dir.clone()))?;

        Ok(WorkspaceLock { flock })
    }
}

/// guard that holds the working directory lock until dropped
pub struct WorkspaceLock {
    #[allow(dead_code)]
    flock: Flock<File>,
}

/// a scratch file or directory removed when the guard drops
/// (removal failures are logged, not returned)
pub struct Scratch {
    path: PathBuf,
}

impl Scratch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let result = match std::fs::symlink_metadata(&self.path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&self.path),
            Ok(_) => std::fs::remove_file(&self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scratch path");
        }
    }
}
