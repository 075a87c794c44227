//! layerpick CLI - flatten one directory out of a container image's layers

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use layerpick::archive::ImageArchive;
use layerpick::ops::{concat, extract, ExtractOptions, LayerOutcome};
use layerpick::source::{ImageSource, RuntimeCli, SavedArchive};
use layerpick::{Config, Error, ImageRef, IoResultExt, LayerErrorPolicy, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "layerpick")]
#[command(about = "flatten one directory out of a container image's layers")]
#[command(version)]
struct Cli {
    /// config file (defaults to ./layerpick.toml when present)
    #[arg(short, long, env = "LAYERPICK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// pull an image and copy its target files into a flat directory
    Extract {
        /// image reference (name[:tag]); overrides `image` in the config.
        /// with --archive and no image, the archive's first image is used
        image: Option<String>,

        /// output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// working directory for temporary archives
        #[arg(short, long)]
        work_dir: Option<PathBuf>,

        /// glob selecting layer entries to copy
        #[arg(short, long)]
        target: Option<String>,

        /// container runtime binary (docker, podman)
        #[arg(long)]
        runtime: Option<String>,

        /// read an already saved image archive instead of pulling
        #[arg(long, conflicts_with = "runtime")]
        archive: Option<PathBuf>,

        /// layers staged concurrently
        #[arg(short, long)]
        jobs: Option<usize>,

        /// skip sha256 verification of layer contents
        #[arg(long)]
        no_verify: bool,

        /// per-layer failures: fail, skip
        #[arg(long)]
        on_layer_error: Option<String>,
    },

    /// list the layer digests of an image, base layer first
    Layers {
        /// image reference; optional with --archive
        image: Option<String>,

        /// container runtime binary (docker, podman)
        #[arg(long)]
        runtime: Option<String>,

        /// read an already saved image archive
        #[arg(long, conflicts_with = "runtime")]
        archive: Option<PathBuf>,
    },

    /// print every yml/yaml file of a directory back to back
    Cat {
        /// directory to read (defaults to concat.dir from the config)
        dir: Option<PathBuf>,

        /// also write the combined text to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// file extension to include (repeatable)
        #[arg(short = 'e', long = "ext")]
        extensions: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> layerpick::Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(Path::new(DEFAULT_CONFIG_FILE)),
    }
}

fn resolve_image(arg: Option<String>, config: &Config) -> layerpick::Result<ImageRef> {
    arg.or_else(|| config.image.clone())
        .ok_or(Error::MissingImage)
        .and_then(|s| ImageRef::parse(&s))
}

/// image and where it comes from: a saved archive (whose first image stands
/// in when no reference is given) or the configured runtime
fn extract_source(
    image: Option<String>,
    archive: Option<PathBuf>,
    config: &Config,
) -> layerpick::Result<(ImageRef, Box<dyn ImageSource>)> {
    match (archive, image.or_else(|| config.image.clone())) {
        (Some(path), Some(image)) => {
            let source: Box<dyn ImageSource> = Box::new(SavedArchive::new(path));
            Ok((ImageRef::parse(&image)?, source))
        }
        (Some(path), None) => {
            let saved = SavedArchive::first_image(path);
            let image = saved.archive().first_image()?;
            let source: Box<dyn ImageSource> = Box::new(saved);
            Ok((image, source))
        }
        (None, image) => {
            let source: Box<dyn ImageSource> = Box::new(RuntimeCli::new(config.runtime.clone()));
            Ok((resolve_image(image, config)?, source))
        }
    }
}

fn run(cli: Cli) -> layerpick::Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract {
            image,
            output,
            work_dir,
            target,
            runtime,
            archive,
            jobs,
            no_verify,
            on_layer_error,
        } => {
            if let Some(output) = output {
                config.output_dir = output;
            }
            if let Some(work_dir) = work_dir {
                config.work_dir = work_dir;
            }
            if let Some(target) = target {
                config.target = target;
            }
            if let Some(runtime) = runtime {
                config.runtime = runtime;
            }
            if let Some(jobs) = jobs {
                config.jobs = jobs;
            }
            if no_verify {
                config.verify_digests = false;
            }
            if let Some(policy) = on_layer_error {
                config.on_layer_error = policy.parse::<LayerErrorPolicy>()?;
            }

            let (image, source) = extract_source(image, archive, &config)?;
            let report = extract(source.as_ref(), &image, &ExtractOptions::from(&config))?;

            for layer in &report.layers {
                if let LayerOutcome::Failed(err) = &layer.outcome {
                    eprintln!("warning: layer {} skipped: {}", layer.digest, err);
                }
            }
            println!(
                "extracted {} files from {} of {} layers of {} into {}",
                report.files_written,
                report.layers_found(),
                report.layers.len(),
                report.image,
                config.output_dir.display()
            );
        }

        Commands::Layers {
            image,
            runtime,
            archive,
        } => {
            let digests = match (archive, image) {
                (Some(path), None) if config.image.is_none() => {
                    ImageArchive::new(path).diff_ids(None)?
                }
                (Some(path), image) => {
                    let image = resolve_image(image, &config)?;
                    SavedArchive::new(path).layer_digests(&image)?
                }
                (None, image) => {
                    let image = resolve_image(image, &config)?;
                    let runtime = runtime.unwrap_or_else(|| config.runtime.clone());
                    RuntimeCli::new(runtime).layer_digests(&image)?
                }
            };

            for digest in digests {
                println!("{}", digest);
            }
        }

        Commands::Cat {
            dir,
            output,
            extensions,
        } => {
            let dir = dir.unwrap_or_else(|| config.concat.dir.clone());
            let extensions = if extensions.is_empty() {
                config.concat.extensions.clone()
            } else {
                extensions
            };

            let report = match output {
                Some(output) => {
                    let mut combined = Vec::new();
                    let report = concat(&dir, &extensions, &mut combined)?;
                    io::stdout().write_all(&combined).with_path("<stdout>")?;
                    std::fs::write(&output, &combined).with_path(&output)?;
                    report
                }
                None => {
                    let stdout = io::stdout();
                    let mut lock = stdout.lock();
                    concat(&dir, &extensions, &mut lock)?
                }
            };
            if report.files.is_empty() {
                tracing::warn!(dir = %dir.display(), ?extensions, "no matching files");
            }
        }
    }

    Ok(())
}
