use std::path::Path;
use std::process::{Command, Output};

use crate::digest::LayerDigest;
use crate::error::{Error, Result};
use crate::image::ImageRef;
use crate::source::ImageSource;

/// a docker-compatible runtime driven through its command line
#[derive(Debug, Clone)]
pub struct RuntimeCli {
    program: String,
}

impl RuntimeCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn docker() -> Self {
        Self::new("docker")
    }

    fn run(&self, action: &'static str, args: &[&str]) -> Result<Output> {
        tracing::debug!(program = %self.program, ?args, "running container runtime");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| Error::RuntimeSpawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(Error::Runtime {
                program: self.program.clone(),
                action,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

impl Default for RuntimeCli {
    fn default() -> Self {
        Self::docker()
    }
}

impl ImageSource for RuntimeCli {
    fn pull(&self, image: &ImageRef) -> Result<()> {
        let reference = image.to_string();
        tracing::info!(image = %reference, program = %self.program, "pulling image");
        self.run("pull", &["pull", reference.as_str()])?;
        Ok(())
    }

    fn save(&self, image: &ImageRef, dest: &Path) -> Result<()> {
        let reference = image.to_string();
        let dest = dest.to_string_lossy();
        tracing::info!(image = %reference, archive = %dest, "saving image archive");
        self.run("save", &["save", "-o", dest.as_ref(), reference.as_str()])?;
        Ok(())
    }

    fn layer_digests(&self, image: &ImageRef) -> Result<Vec<LayerDigest>> {
        let reference = image.to_string();
        let output = self.run(
            "inspect",
            &["image", "inspect", "--format", "{{json .RootFS.Layers}}", reference.as_str()],
        )?;
        parse_layer_list(&output.stdout)
    }
}

/// parse the `{{json .RootFS.Layers}}` output; `null` means no layers
fn parse_layer_list(stdout: &[u8]) -> Result<Vec<LayerDigest>> {
    let layers: Option<Vec<LayerDigest>> = serde_json::from_slice(stdout)?;
    Ok(layers.unwrap_or_default())
}
