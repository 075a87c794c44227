use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::digest::{DigestReader, LayerDigest};
use crate::error::{Error, IoResultExt, Result};
use crate::select::Selector;

use super::normalize_entry_name;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

/// compression of a layer blob, detected from its leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    pub fn detect(head: &[u8]) -> Self {
        if head.starts_with(GZIP_MAGIC) {
            Compression::Gzip
        } else if head.starts_with(ZSTD_MAGIC) {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Compression::None => "tar",
            Compression::Gzip => "tar+gzip",
            Compression::Zstd => "tar+zstd",
        })
    }
}

/// open a layer archive, returning a reader over the uncompressed tar stream
pub fn open_layer(path: &Path) -> Result<(Compression, Box<dyn Read + Send>)> {
    let file = File::open(path).with_path(path)?;
    let mut reader = BufReader::new(file);
    let compression = Compression::detect(reader.fill_buf().with_path(path)?);

    let stream: Box<dyn Read + Send> = match compression {
        Compression::None => Box::new(reader),
        Compression::Gzip => Box::new(GzDecoder::new(reader)),
        Compression::Zstd => {
            Box::new(zstd::stream::read::Decoder::with_buffer(reader).with_path(path)?)
        }
    };
    Ok((compression, stream))
}

/// copy every regular file of a layer that `selector` matches into
/// `staging_dir`, flattened to its base name
///
/// returns the staged names in first-seen order; a later entry with the
/// same name overwrites the earlier one. a matching hardlink gets the bytes
/// of its target, read again from the layer when the target itself is not
/// selected. with `verify` set, the whole uncompressed stream is hashed and
/// compared to the digest afterwards.
pub fn stage_matching(
    layer_path: &Path,
    selector: &Selector,
    staging_dir: &Path,
    verify: Option<&LayerDigest>,
) -> Result<Vec<OsString>> {
    let (compression, stream) = open_layer(layer_path)?;
    tracing::trace!(layer = %layer_path.display(), %compression, "reading layer");

    let mut archive = Archive::new(DigestReader::new(stream));
    let mut staged = Staging::new(staging_dir);
    // hardlinks whose target was not staged: (target entry, staged name)
    let mut pending: Vec<(PathBuf, OsString)> = Vec::new();

    for entry in archive.entries().with_path(layer_path)? {
        let mut entry = entry.with_path(layer_path)?;
        let kind = entry.header().entry_type();
        if !matches!(
            kind,
            EntryType::Regular | EntryType::Continuous | EntryType::Link
        ) {
            continue;
        }

        let entry_path = entry.path().with_path(layer_path)?.into_owned();
        if !selector.matches(&entry_path) {
            continue;
        }
        let Some(name) = selector.flatten(&entry_path) else {
            tracing::debug!(entry = %entry_path.display(), "skipping unflattenable entry");
            continue;
        };
        pending.retain(|(_, n)| *n != name);

        if kind != EntryType::Link {
            staged.write(&name, &entry_path, &mut entry)?;
            continue;
        }

        let target = match entry.link_name().with_path(layer_path)? {
            Some(target) => normalize_entry_name(&target),
            None => {
                tracing::warn!(entry = %entry_path.display(), "hardlink without target, skipped");
                continue;
            }
        };
        match staged.source_name(&target) {
            Some(source) => staged.duplicate(&source, &name, &entry_path)?,
            None => pending.push((target, name)),
        }
    }

    if let Some(expected) = verify.filter(|d| d.is_verifiable()) {
        let (actual, _) = archive.into_inner().finish().with_path(layer_path)?;
        if actual != expected.encoded() {
            return Err(Error::DigestMismatch {
                expected: expected.clone(),
                actual: format!("sha256:{}", actual),
            });
        }
    }

    if !pending.is_empty() {
        resolve_links(layer_path, &mut staged, pending)?;
    }
    Ok(staged.names)
}

/// second pass over the layer for hardlinks to unselected files
fn resolve_links(
    layer_path: &Path,
    staged: &mut Staging<'_>,
    mut pending: Vec<(PathBuf, OsString)>,
) -> Result<()> {
    let (_, stream) = open_layer(layer_path)?;
    let mut archive = Archive::new(stream);

    for entry in archive.entries().with_path(layer_path)? {
        let mut entry = entry.with_path(layer_path)?;
        if !matches!(
            entry.header().entry_type(),
            EntryType::Regular | EntryType::Continuous
        ) {
            continue;
        }
        let entry_path = normalize_entry_name(&entry.path().with_path(layer_path)?);
        let names: Vec<OsString> = pending
            .iter()
            .filter(|(target, _)| *target == entry_path)
            .map(|(_, name)| name.clone())
            .collect();
        let Some((first, rest)) = names.split_first() else {
            continue;
        };

        staged.write(first, &entry_path, &mut entry)?;
        for name in rest {
            staged.duplicate(first, name, &entry_path)?;
        }
        pending.retain(|(target, _)| *target != entry_path);
        if pending.is_empty() {
            return Ok(());
        }
    }

    for (target, name) in pending {
        tracing::warn!(
            name = %name.to_string_lossy(),
            target = %target.display(),
            "hardlink target not found in layer, skipped"
        );
    }
    Ok(())
}

/// files staged from one layer, with the entry each one currently holds
struct Staging<'a> {
    dir: &'a Path,
    names: Vec<OsString>,
    sources: HashMap<OsString, PathBuf>,
}

impl<'a> Staging<'a> {
    fn new(dir: &'a Path) -> Self {
        Self {
            dir,
            names: Vec::new(),
            sources: HashMap::new(),
        }
    }

    fn write(&mut self, name: &OsString, entry_path: &Path, data: &mut dyn Read) -> Result<()> {
        let dest = self.prepare(name)?;
        let mut out = File::create(&dest).with_path(&dest)?;
        io::copy(data, &mut out).with_path(&dest)?;
        self.record(name, entry_path);
        Ok(())
    }

    fn duplicate(&mut self, source: &OsString, name: &OsString, entry_path: &Path) -> Result<()> {
        if source != name {
            let dest = self.prepare(name)?;
            fs::copy(self.dir.join(source), &dest).with_path(&dest)?;
        }
        let origin = self.sources.get(source).cloned();
        self.record(name, origin.as_deref().unwrap_or(entry_path));
        Ok(())
    }

    /// staged name currently holding the bytes of layer entry `target`
    fn source_name(&self, target: &Path) -> Option<OsString> {
        self.sources
            .iter()
            .find(|(_, origin)| origin.as_path() == target)
            .map(|(name, _)| name.clone())
    }

    fn prepare(&self, name: &OsString) -> Result<PathBuf> {
        if self.names.is_empty() {
            fs::create_dir_all(self.dir).with_path(self.dir)?;
        }
        Ok(self.dir.join(name))
    }

    fn record(&mut self, name: &OsString, entry_path: &Path) {
        self.sources
            .insert(name.clone(), normalize_entry_name(entry_path));
        if !self.names.contains(name) {
            self.names.push(name.clone());
        }
    }
}
