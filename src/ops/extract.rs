//! pull an image and flatten its target subdirectory into a local directory

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use nix::libc;
use rayon::prelude::*;

use crate::archive::{stage_matching, ImageArchive};
use crate::config::{Config, LayerErrorPolicy, DEFAULT_TARGET};
use crate::digest::LayerDigest;
use crate::error::{Error, IoResultExt, Result};
use crate::image::ImageRef;
use crate::select::Selector;
use crate::source::ImageSource;
use crate::workspace::{Scratch, Workspace};

/// Options controlling one extraction run.
#[derive(Clone, Debug)]
pub struct ExtractOptions {
    /// Directory receiving the flattened files; created, never cleared
    pub output_dir: PathBuf,
    /// Scratch directory for the image archive and per-layer archives
    pub work_dir: PathBuf,
    /// Glob selecting layer entries (see [`Selector`])
    pub target: String,
    /// Layers staged concurrently; 1 means strictly sequential
    pub jobs: usize,
    /// Recompute sha256 layer digests while reading layers
    pub verify_digests: bool,
    /// What to do with per-layer failures other than "target absent"
    pub on_layer_error: LayerErrorPolicy,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ExtractOptions {
    fn from(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            work_dir: config.work_dir.clone(),
            target: if config.target.is_empty() {
                DEFAULT_TARGET.to_string()
            } else {
                config.target.clone()
            },
            jobs: config.jobs.max(1),
            verify_digests: config.verify_digests,
            on_layer_error: config.on_layer_error,
        }
    }
}

/// What a single layer contributed.
#[derive(Debug)]
pub enum LayerOutcome {
    /// this many distinct files were written to the output directory
    Found(usize),
    /// the layer holds nothing under the target
    NotFound,
    /// the layer could not be processed (kept only under [`LayerErrorPolicy::Skip`])
    Failed(Error),
}

#[derive(Debug)]
pub struct LayerReport {
    pub digest: LayerDigest,
    pub outcome: LayerOutcome,
}

/// Result of a completed extraction run.
#[derive(Debug)]
pub struct ExtractReport {
    pub image: ImageRef,
    /// one entry per layer, in manifest order
    pub layers: Vec<LayerReport>,
    /// files written, counting overwrites of the same name
    pub files_written: usize,
}

impl ExtractReport {
    pub fn layers_found(&self) -> usize {
        self.layers
            .iter()
            .filter(|l| matches!(l.outcome, LayerOutcome::Found(_)))
            .count()
    }

    pub fn layers_failed(&self) -> usize {
        self.layers
            .iter()
            .filter(|l| matches!(l.outcome, LayerOutcome::Failed(_)))
            .count()
    }
}

/// Extract every file under the target subdirectory of `image`'s layers
/// into `opts.output_dir`, flattened to base names.
///
/// Layers are applied in manifest order, so when two layers carry the same
/// name the later one wins. Pull, save and an image without layers are
/// fatal; a layer without the target is not.
pub fn extract<S: ImageSource + ?Sized>(
    source: &S,
    image: &ImageRef,
    opts: &ExtractOptions,
) -> Result<ExtractReport> {
    let selector = Selector::new(&opts.target)?;
    let ws = Workspace::prepare(&opts.work_dir, &opts.output_dir)?;
    let _lock = ws.lock()?;

    source.pull(image)?;

    let image_archive = Scratch::new(ws.image_archive_path(image));
    source.save(image, image_archive.path())?;
    let archive = ImageArchive::new(image_archive.path());

    let digests = source.layer_digests(image)?;
    if digests.is_empty() {
        return Err(Error::NoLayers(image.to_string()));
    }
    let entries = source.layer_entries(&archive, image)?;
    if entries.len() != digests.len() {
        return Err(Error::LayerCountMismatch {
            digests: digests.len(),
            entries: entries.len(),
        });
    }

    let jobs: Vec<LayerJob> = digests
        .into_iter()
        .zip(entries)
        .map(|(digest, entry)| LayerJob { digest, entry })
        .collect();
    tracing::info!(image = %image, layers = jobs.len(), target = %selector.pattern(), "extracting");

    let ctx = StageContext {
        ws: &ws,
        archive: &archive,
        selector: &selector,
        verify: opts.verify_digests,
    };
    let mut reports = Vec::with_capacity(jobs.len());
    if opts.jobs > 1 && jobs.len() > 1 {
        run_parallel(&ctx, &jobs, opts.jobs, opts.on_layer_error, &mut reports)?;
    } else {
        run_sequential(&ctx, &jobs, opts.on_layer_error, &mut reports)?;
    }

    let files_written = reports
        .iter()
        .map(|r| match r.outcome {
            LayerOutcome::Found(n) => n,
            _ => 0,
        })
        .sum();
    let report = ExtractReport {
        image: image.clone(),
        layers: reports,
        files_written,
    };
    tracing::info!(
        image = %image,
        layers = report.layers.len(),
        contributing = report.layers_found(),
        failed = report.layers_failed(),
        files = report.files_written,
        output = %ws.output_dir().display(),
        "extraction finished"
    );
    Ok(report)
}

struct LayerJob {
    digest: LayerDigest,
    /// layer tarball's entry name inside the image archive
    entry: String,
}

struct StageContext<'a> {
    ws: &'a Workspace,
    archive: &'a ImageArchive,
    selector: &'a Selector,
    verify: bool,
}

/// a layer's matching files, waiting in the working directory
struct Staged {
    dir: Scratch,
    files: Vec<OsString>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Apply {
    /// rename out of staging (staging is discarded right after)
    Move,
    /// copy, leaving staging intact for a repeated digest
    Copy,
}

fn run_sequential(
    ctx: &StageContext<'_>,
    jobs: &[LayerJob],
    policy: LayerErrorPolicy,
    reports: &mut Vec<LayerReport>,
) -> Result<()> {
    for job in jobs {
        let result =
            stage_layer(ctx, job).and_then(|staged| apply_staged(&staged, ctx.ws.output_dir(), Apply::Move));
        settle(reports, job, result, policy)?;
    }
    Ok(())
}

/// stage distinct layers on a bounded pool, then apply in manifest order
fn run_parallel(
    ctx: &StageContext<'_>,
    jobs: &[LayerJob],
    workers: usize,
    policy: LayerErrorPolicy,
    reports: &mut Vec<LayerReport>,
) -> Result<()> {
    // identical layers share one scratch name, so stage each digest once
    let mut unique: Vec<&LayerJob> = Vec::new();
    let mut slots = Vec::with_capacity(jobs.len());
    for job in jobs {
        let slot = match unique.iter().position(|u| u.digest == job.digest) {
            Some(slot) => slot,
            None => {
                unique.push(job);
                unique.len() - 1
            }
        };
        slots.push(slot);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("layerpick-stage-{}", i))
        .build()?;
    tracing::debug!(workers, layers = unique.len(), "staging layers in parallel");

    let mut staged: Vec<std::result::Result<Staged, Option<Error>>> = pool.install(|| {
        unique
            .par_iter()
            .map(|job| stage_layer(ctx, job).map_err(Some))
            .collect()
    });

    for (job, slot) in jobs.iter().zip(slots) {
        let result = match &mut staged[slot] {
            Ok(layer) => apply_staged(layer, ctx.ws.output_dir(), Apply::Copy),
            Err(err) => Err(err
                .take()
                .unwrap_or_else(|| Error::RepeatedLayerFailure(job.digest.clone()))),
        };
        settle(reports, job, result, policy)?;
    }
    Ok(())
}

/// copy the layer out of the image archive and stage its matching files
///
/// the per-layer archive is removed before returning, whatever the outcome.
fn stage_layer(ctx: &StageContext<'_>, job: &LayerJob) -> Result<Staged> {
    let layer_file = Scratch::new(ctx.ws.layer_archive_path(&job.digest));
    let size = ctx.archive.copy_entry(&job.entry, layer_file.path())?;
    tracing::debug!(digest = %job.digest.short(), size, "copied layer archive");

    let dir = Scratch::new(ctx.ws.staging_path(&job.digest));
    let verify = if ctx.verify { Some(&job.digest) } else { None };
    let files = stage_matching(layer_file.path(), ctx.selector, dir.path(), verify)?;

    Ok(Staged { dir, files })
}

/// place staged files into the output directory, returning how many
fn apply_staged(staged: &Staged, output_dir: &Path, mode: Apply) -> Result<usize> {
    for name in &staged.files {
        place(&staged.dir.path().join(name), &output_dir.join(name), mode)?;
    }
    Ok(staged.files.len())
}

fn place(src: &Path, dest: &Path, mode: Apply) -> Result<()> {
    if mode == Apply::Move {
        match fs::rename(src, dest) {
            Ok(()) => return Ok(()),
            Err(e) => {
                // fall back to copy on cross-device renames; otherwise bubble up
                if e.raw_os_error() != Some(libc::EXDEV) {
                    return Err(Error::Io {
                        path: dest.to_path_buf(),
                        source: e,
                    });
                }
            }
        }
    }

    fs::copy(src, dest).with_path(dest)?;
    Ok(())
}

/// turn a layer's result into its report entry, applying the error policy
fn settle(
    reports: &mut Vec<LayerReport>,
    job: &LayerJob,
    result: Result<usize>,
    policy: LayerErrorPolicy,
) -> Result<()> {
    let outcome = match result {
        Ok(0) => {
            tracing::debug!(digest = %job.digest.short(), "target not in layer");
            LayerOutcome::NotFound
        }
        Ok(files) => {
            tracing::info!(digest = %job.digest.short(), files, "layer contributed files");
            LayerOutcome::Found(files)
        }
        Err(err) => match policy {
            LayerErrorPolicy::Fail => return Err(err),
            LayerErrorPolicy::Skip => {
                tracing::warn!(digest = %job.digest, error = %err, "skipping layer");
                LayerOutcome::Failed(err)
            }
        },
    };

    reports.push(LayerReport {
        digest: job.digest.clone(),
        outcome,
    });
    Ok(())
}
