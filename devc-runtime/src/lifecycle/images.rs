//! Image queries and the build/pull passthroughs.

use std::path::Path;

use devc_core::error::{DevcError, Result};

use super::LifecycleManager;

/// A container carrying the managed label, as listed by `ps -a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedContainer {
    pub id: String,
    pub name: String,
    pub status: String,
}

impl LifecycleManager {
    /// Whether an image is already present locally.
    pub fn image_exists(&self, image: &str) -> Result<bool> {
        let stdout = self
            .cli
            .command()
            .subcommand("images")
            .arg("-q")
            .arg(image)
            .run_checked()?;
        Ok(!stdout.trim().is_empty())
    }

    /// Pull an image, streaming progress into the log.
    pub fn pull_image(&self, image: &str) -> Result<()> {
        self.cli
            .command()
            .subcommand("pull")
            .arg(image)
            .stream()
            .map_err(|e| DevcError::Runtime(format!("failed to pull image '{}': {}", image, e)))
    }

    /// Build an image from a dockerfile, streaming progress into the log.
    pub fn build_image(&self, dockerfile: &Path, context: &Path, tag: &str) -> Result<()> {
        self.cli
            .command()
            .subcommand("build")
            .arg("-f")
            .arg(dockerfile.to_string_lossy().into_owned())
            .arg("-t")
            .arg(tag)
            .arg(context.to_string_lossy().into_owned())
            .stream()
            .map_err(|e| DevcError::Runtime(format!("failed to build image '{}': {}", tag, e)))
    }

    /// Containers this tool created, found via the managed label.
    pub fn list_managed(&self) -> Result<Vec<ManagedContainer>> {
        let stdout = self
            .cli
            .command()
            .subcommand("ps")
            .arg("-a")
            .arg("--filter")
            .arg(format!("label={}", super::MANAGED_LABEL))
            .arg("--format")
            .arg("{{.ID}}\t{{.Names}}\t{{.Status}}")
            .run_checked()?;

        let mut containers = Vec::new();
        for line in stdout.lines() {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() >= 3 {
                containers.push(ManagedContainer {
                    id: parts[0].to_string(),
                    name: parts[1].to_string(),
                    status: parts[2].to_string(),
                });
            }
        }
        Ok(containers)
    }
}
