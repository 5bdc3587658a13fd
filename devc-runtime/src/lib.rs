//! Runtime-CLI provider layer.
//!
//! Drives a local Docker/Podman-compatible CLI to create and manage
//! per-project development containers: command construction, container
//! identity, status and shell caches, and the lifecycle manager that ties
//! them to the port allocator.

pub mod cli;
pub mod identity;
pub mod lifecycle;
pub mod shell;
pub mod spec;
pub mod status;

// Re-export the surface collaborators consume.
pub use cli::{RuntimeCli, RuntimeCommand, DEFAULT_RUNTIME_BINARY};
pub use lifecycle::{
    build_create_args, image_reference, ExecCommand, ExecOpts, LifecycleManager, ManagedContainer,
    ReadinessOpts, MANAGED_LABEL,
};
pub use shell::{ShellCache, FALLBACK_SHELL, SHELL_PREFERENCE};
pub use spec::{ContainerSpec, Mount, MountKind, WorkspaceMount};
pub use status::{ContainerInfo, ContainerStatus, PortBinding, StatusCache};
