//! layerpick - flatten one directory out of a container image's layers
//!
//! pulls an image through a container runtime, saves it as an archive, and
//! walks its filesystem layers base-first, copying every file found under a
//! target subdirectory into one flat output directory.
//!
//! # Core concepts
//!
//! - **Image source**: where the image comes from ([`source::RuntimeCli`] or
//!   [`source::SavedArchive`])
//! - **Layer digest**: `algorithm:hex` content hash of one uncompressed layer
//! - **Target**: glob selecting layer entries, `**/registry/*` by default
//! - **Flattening**: only the final path segment of a matching entry is kept;
//!   a later layer overwrites an earlier one with the same name
//!
//! # Example usage
//!
//! ```no_run
//! use layerpick::{ops, source::RuntimeCli, ImageRef};
//!
//! let image = ImageRef::parse("acdh/noske:latest").unwrap();
//! let report = ops::extract(&RuntimeCli::docker(), &image, &ops::ExtractOptions::default()).unwrap();
//! println!("{} files", report.files_written);
//! ```

mod config;
mod digest;
mod error;
mod image;
mod workspace;

pub mod archive;
pub mod ops;
pub mod select;
pub mod source;

pub use config::{ConcatConfig, Config, LayerErrorPolicy, DEFAULT_CONFIG_FILE, DEFAULT_TARGET};
pub use digest::{DigestReader, LayerDigest};
pub use error::{Error, IoResultExt, Result};
pub use image::ImageRef;
pub use workspace::{Scratch, Workspace, WorkspaceLock};
