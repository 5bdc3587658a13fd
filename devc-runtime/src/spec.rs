//! The declarative container spec consumed by the lifecycle manager.
//!
//! Built by config-loading collaborators (typically from a project JSON
//! file) and treated as immutable for the duration of one operation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Input descriptor for one development container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSpec {
    /// Human-supplied project name; sanitized before it reaches the runtime.
    pub name: String,
    /// Project root; hashed into the container name for uniqueness.
    pub base_path: PathBuf,
    pub image: Option<String>,
    pub dockerfile: Option<PathBuf>,
    pub workspace_folder: String,
    pub workspace_mount: Option<WorkspaceMount>,
    /// Insertion order is irrelevant to semantics but kept so assembled
    /// command lines are reproducible.
    pub environment: IndexMap<String, String>,
    /// Port-forward specs in the `devc-ports` grammar.
    pub ports: Vec<String>,
    pub mounts: Vec<Mount>,
    pub remote_user: Option<String>,
    pub privileged: bool,
    pub init: bool,
}

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_path: PathBuf::from("."),
            image: None,
            dockerfile: None,
            workspace_folder: "/workspace".to_string(),
            workspace_mount: None,
            environment: IndexMap::new(),
            ports: Vec::new(),
            mounts: Vec::new(),
            remote_user: None,
            privileged: false,
            init: false,
        }
    }
}

/// The primary project mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMount {
    pub source: PathBuf,
    pub target: String,
    #[serde(default)]
    pub consistency: Option<String>,
}

impl WorkspaceMount {
    pub fn to_mount_arg(&self) -> String {
        let mut arg = format!(
            "type=bind,source={},target={}",
            self.source.display(),
            self.target
        );
        if let Some(consistency) = &self.consistency {
            arg.push_str(&format!(",consistency={}", consistency));
        }
        arg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Bind,
    Volume,
    Tmpfs,
}

impl MountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountKind::Bind => "bind",
            MountKind::Volume => "volume",
            MountKind::Tmpfs => "tmpfs",
        }
    }
}

fn default_mount_kind() -> MountKind {
    MountKind::Bind
}

/// An additional mount beyond the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    #[serde(rename = "type", default = "default_mount_kind")]
    pub kind: MountKind,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub readonly: bool,
}

impl Mount {
    pub fn to_mount_arg(&self) -> String {
        let mut arg = format!(
            "type={},source={},target={}",
            self.kind.as_str(),
            self.source,
            self.target
        );
        if self.readonly {
            arg.push_str(",readonly");
        }
        arg
    }
}
