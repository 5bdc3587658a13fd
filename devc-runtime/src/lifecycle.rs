//! Container lifecycle management against the runtime CLI.
//!
//! The manager drives containers it created (and only those) through
//! `absent → created → running → stopped → removed`. It does not enforce the
//! state machine centrally; each operation queries current state where the
//! distinction matters, and idempotent operations treat "already in the
//! target state" as success.

mod execution;
mod images;
mod interaction;
mod readiness;

pub use images::ManagedContainer;
pub use interaction::{ExecCommand, ExecOpts};
pub use readiness::ReadinessOpts;

// Standard library
use std::sync::Arc;

// External crates
use tracing::debug;

use devc_core::error::{DevcError, Result};
use devc_core::runner::{AsyncHandle, StreamHandlers};
use devc_ports::{PortAllocator, PortMapping};

// Internal imports
use crate::cli::RuntimeCli;
use crate::identity;
use crate::shell::ShellCache;
use crate::spec::ContainerSpec;
use crate::status::{parse_inspect_output, ContainerInfo, ContainerStatus, StatusCache};

/// Label marking containers this tool owns.
pub const MANAGED_LABEL: &str = "devc.managed=true";
const PROJECT_LABEL_KEY: &str = "devc.project";

/// Orchestrates container lifecycle operations.
///
/// The caches and the port table are injected so call sites share one set of
/// process-wide state, and tests construct fresh state per case.
pub struct LifecycleManager {
    cli: RuntimeCli,
    ports: Arc<PortAllocator>,
    shells: Arc<ShellCache>,
    statuses: Arc<StatusCache>,
}

impl LifecycleManager {
    pub fn new(
        cli: RuntimeCli,
        ports: Arc<PortAllocator>,
        shells: Arc<ShellCache>,
        statuses: Arc<StatusCache>,
    ) -> Self {
        Self {
            cli,
            ports,
            shells,
            statuses,
        }
    }

    /// Convenience constructor with fresh state objects.
    pub fn with_runtime(cli: RuntimeCli) -> Self {
        Self::new(
            cli,
            Arc::new(PortAllocator::default()),
            Arc::new(ShellCache::new()),
            Arc::new(StatusCache::new()),
        )
    }

    pub fn runtime(&self) -> &RuntimeCli {
        &self.cli
    }

    pub fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }

    pub fn shells(&self) -> &Arc<ShellCache> {
        &self.shells
    }

    pub fn statuses(&self) -> &Arc<StatusCache> {
        &self.statuses
    }

    /// The container name a spec resolves to. Also used as the project id
    /// for port allocations.
    pub fn container_name_for(&self, spec: &ContainerSpec) -> String {
        identity::generate_name(spec)
    }

    /// Create a container from a spec, returning the new container id.
    ///
    /// Ports are resolved before the command line is assembled, since the
    /// chosen host ports appear literally in it. On failure the error
    /// carries the runtime's stderr and any ports this call allocated are
    /// released.
    pub fn create(&self, spec: &ContainerSpec) -> Result<String> {
        self.cli.check_daemon()?;
        let name = identity::generate_name(spec);
        let mappings = self.resolve_spec_ports(spec, &name)?;
        let args = build_create_args(spec, &name, &mappings)?;

        let result = self.cli.command().args(args).run();
        if !result.success {
            self.ports.release_project(&name);
            return Err(DevcError::Runtime(format!(
                "failed to create container '{}': {}",
                name,
                result.stderr.trim()
            )));
        }

        let container_id = result.stdout.trim().to_string();
        self.statuses.record(&container_id, ContainerStatus::Created);
        debug!(container = %name, id = %container_id, "created container");
        Ok(container_id)
    }

    /// Async variant of [`create`](Self::create).
    ///
    /// Port allocation and command assembly happen before this returns;
    /// only the runtime invocation itself runs in the background.
    pub fn create_async<F>(&self, spec: &ContainerSpec, on_done: F) -> Result<AsyncHandle>
    where
        F: FnOnce(Result<String>) + Send + 'static,
    {
        self.cli.check_daemon()?;
        let name = identity::generate_name(spec);
        let mappings = self.resolve_spec_ports(spec, &name)?;
        let args = build_create_args(spec, &name, &mappings)?;

        let ports = Arc::clone(&self.ports);
        let statuses = Arc::clone(&self.statuses);
        let handle = self
            .cli
            .command()
            .args(args)
            .run_async(StreamHandlers::none(), move |result| {
                if result.success {
                    let container_id = result.stdout.trim().to_string();
                    statuses.record(&container_id, ContainerStatus::Created);
                    on_done(Ok(container_id));
                } else {
                    ports.release_project(&name);
                    on_done(Err(DevcError::Runtime(format!(
                        "failed to create container '{}': {}",
                        name,
                        result.stderr.trim()
                    ))));
                }
            });
        Ok(handle)
    }

    fn resolve_spec_ports(&self, spec: &ContainerSpec, name: &str) -> Result<Vec<PortMapping>> {
        let resolution = self.ports.resolve(&spec.ports, name);
        if !resolution.is_complete() {
            // A partial create is useless; give back what this pass took.
            self.ports.release_project(name);
            let reasons: Vec<String> = resolution
                .failures
                .iter()
                .map(|failure| format!("{}: {}", failure.spec, failure.reason))
                .collect();
            return Err(DevcError::Port(reasons.join("; ")));
        }
        Ok(resolution.mappings)
    }

    /// Query the runtime for a container's lifecycle state.
    ///
    /// An absent container is a normal, expected case and comes back as
    /// `None`, never as an error.
    pub fn get_status(&self, container_id: &str) -> Option<ContainerStatus> {
        let result = self
            .cli
            .command()
            .subcommand("inspect")
            .arg("--format")
            .arg("{{.State.Status}}")
            .arg(container_id)
            .run();

        if !result.success || result.stdout.trim().is_empty() {
            self.statuses.forget(container_id);
            return None;
        }

        let status = ContainerStatus::parse(result.stdout.trim());
        self.statuses.record(container_id, status);
        Some(status)
    }

    /// Full inspect with parsed state and port bindings. `None` for an
    /// absent container.
    pub fn get_info(&self, container_id: &str) -> Result<Option<ContainerInfo>> {
        let result = self
            .cli
            .command()
            .subcommand("inspect")
            .arg(container_id)
            .run();
        if !result.success {
            return Ok(None);
        }

        let info = parse_inspect_output(&result.stdout)?;
        if let Some(info) = &info {
            self.statuses.record(container_id, info.status);
        }
        Ok(info)
    }
}

/// Assemble the full `create` argument list from a spec. Pure, so command
/// shape is testable without a runtime on the machine.
pub fn build_create_args(
    spec: &ContainerSpec,
    name: &str,
    mappings: &[PortMapping],
) -> Result<Vec<String>> {
    let image = image_reference(spec)?;

    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        name.to_string(),
        "--label".to_string(),
        MANAGED_LABEL.to_string(),
        "--label".to_string(),
        format!("{}={}", PROJECT_LABEL_KEY, spec.name),
    ];

    if let Some(mount) = &spec.workspace_mount {
        args.push("--mount".to_string());
        args.push(mount.to_mount_arg());
    }
    for mount in &spec.mounts {
        args.push("--mount".to_string());
        args.push(mount.to_mount_arg());
    }
    for (key, value) in &spec.environment {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    for mapping in mappings {
        args.push("-p".to_string());
        args.push(mapping.publish_arg());
    }
    if let Some(user) = &spec.remote_user {
        args.push("-u".to_string());
        args.push(user.clone());
    }
    args.push("-w".to_string());
    args.push(spec.workspace_folder.clone());
    if spec.privileged {
        args.push("--privileged".to_string());
    }
    if spec.init {
        args.push("--init".to_string());
    }

    args.push(image);
    Ok(args)
}

/// The image the container runs: an explicit reference, or the local tag a
/// dockerfile build produces.
pub fn image_reference(spec: &ContainerSpec) -> Result<String> {
    if let Some(image) = &spec.image {
        return Ok(image.clone());
    }
    if spec.dockerfile.is_some() {
        return Ok(format!(
            "devc-{}:latest",
            identity::sanitize_project_name(&spec.name)
        ));
    }
    Err(DevcError::Config(
        "container spec must declare an image or a dockerfile".to_string(),
    ))
}

/// Writes a shell script standing in for the runtime binary, so lifecycle
/// behavior can be exercised against scripted stdout/stderr/exit codes
/// without a container engine on the machine.
#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use crate::cli::RuntimeCli;

    pub fn stub_runtime(dir: &Path, script_body: &str) -> RuntimeCli {
        let path = dir.join("stub-runtime");
        fs::write(&path, format!("#!/bin/sh\n{}\n", script_body)).expect("write stub");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod stub");
        RuntimeCli::new(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devc_ports::{AllocationKind, Protocol};
    use std::path::PathBuf;

    fn base_spec() -> ContainerSpec {
        ContainerSpec {
            name: "web-app".to_string(),
            base_path: PathBuf::from("/home/dev/web-app"),
            image: Some("ubuntu:24.04".to_string()),
            ..Default::default()
        }
    }

    fn fixed_mapping(host: u16, container: u16) -> PortMapping {
        PortMapping {
            host_port: host,
            container_port: container,
            protocol: Protocol::Tcp,
            allocation: AllocationKind::Fixed,
        }
    }

    #[test]
    fn create_args_carry_name_labels_and_image() {
        let spec = base_spec();
        let name = identity::generate_name(&spec);
        let args = build_create_args(&spec, &name, &[]).unwrap();

        assert_eq!(args[0], "create");
        assert!(args.windows(2).any(|w| w[0] == "--name" && w[1] == name));
        assert!(args.contains(&MANAGED_LABEL.to_string()));
        assert_eq!(args.last().unwrap(), "ubuntu:24.04");
    }

    #[test]
    fn create_args_include_ports_env_and_flags() {
        let mut spec = base_spec();
        spec.environment
            .insert("NODE_ENV".to_string(), "development".to_string());
        spec.environment.insert("TERM".to_string(), "xterm".to_string());
        spec.remote_user = Some("dev".to_string());
        spec.privileged = true;
        spec.init = true;

        let args = build_create_args(
            &spec,
            "web-app-1a2b3c4d-devcontainer",
            &[fixed_mapping(10001, 3000)],
        )
        .unwrap();

        assert!(args
            .windows(2)
            .any(|w| w[0] == "-e" && w[1] == "NODE_ENV=development"));
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "10001:3000"));
        assert!(args.windows(2).any(|w| w[0] == "-u" && w[1] == "dev"));
        assert!(args.windows(2).any(|w| w[0] == "-w" && w[1] == "/workspace"));
        assert!(args.contains(&"--privileged".to_string()));
        assert!(args.contains(&"--init".to_string()));
    }

    #[test]
    fn create_args_are_deterministic_for_identical_specs() {
        let mut spec = base_spec();
        spec.environment.insert("B".to_string(), "2".to_string());
        spec.environment.insert("A".to_string(), "1".to_string());
        let name = identity::generate_name(&spec);

        let first = build_create_args(&spec, &name, &[]).unwrap();
        let second = build_create_args(&spec.clone(), &name, &[]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn image_reference_prefers_explicit_image() {
        assert_eq!(image_reference(&base_spec()).unwrap(), "ubuntu:24.04");

        let mut dockerfile_spec = base_spec();
        dockerfile_spec.image = None;
        dockerfile_spec.dockerfile = Some(PathBuf::from("Dockerfile"));
        assert_eq!(
            image_reference(&dockerfile_spec).unwrap(),
            "devc-web-app:latest"
        );

        let mut bare = base_spec();
        bare.image = None;
        assert!(image_reference(&bare).is_err());
    }

    #[test]
    fn create_surfaces_port_resolution_failures() {
        // `true` exits 0 for any args, so the daemon check passes and the
        // port failure is what surfaces.
        let manager = LifecycleManager::with_runtime(RuntimeCli::new("true"));
        for port in 9100..=9101 {
            assert!(manager.ports().allocate(port, "other", "test"));
        }

        let mut spec = base_spec();
        spec.ports = vec!["range:9100-9101:80".to_string()];
        let err = manager.create(&spec).unwrap_err();
        assert!(matches!(err, DevcError::Port(_)));
    }

    #[test]
    fn create_fails_early_without_a_runtime() {
        let manager =
            LifecycleManager::with_runtime(RuntimeCli::new("devc-test-no-such-runtime"));
        let err = manager.create(&base_spec()).unwrap_err();
        assert!(matches!(err, DevcError::Dependency(_)));
        // Nothing was allocated before the failure.
        assert_eq!(manager.ports().stats().total_allocated, 0);
    }

    #[test]
    fn get_status_on_missing_container_is_none() {
        let manager =
            LifecycleManager::with_runtime(RuntimeCli::new("devc-test-no-such-runtime"));
        assert_eq!(manager.get_status("missing-id"), None);
    }
}
