//! `devc`: stand up and drive per-project development containers.
//!
//! Thin application layer over `devc-runtime`: loads a container spec from a
//! JSON file, derives the project's container name, and dispatches to the
//! lifecycle manager. All orchestration semantics live in the library
//! crates.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use devc_runtime::{
    image_reference, ContainerSpec, ExecCommand, ExecOpts, LifecycleManager, RuntimeCli,
    DEFAULT_RUNTIME_BINARY,
};

#[derive(Parser)]
#[command(name = "devc")]
#[command(about = "Per-project development containers over a local runtime CLI")]
#[command(version)]
struct Args {
    /// Runtime binary to drive (docker or a podman-compatible CLI)
    #[arg(long, global = true, default_value = DEFAULT_RUNTIME_BINARY)]
    runtime: String,

    /// Container spec file
    #[arg(long, global = true, default_value = "devcontainer.json")]
    spec: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the container (building or pulling its image first), start
    /// it, and wait until it accepts exec calls
    Up {
        /// Skip the readiness wait
        #[arg(long)]
        no_wait: bool,
    },
    /// Start the project container
    Start,
    /// Stop the project container
    Stop {
        /// Grace period in seconds before the runtime force-kills
        #[arg(short = 't', long)]
        timeout: Option<u64>,
    },
    /// Force-kill the project container
    Kill,
    /// Remove the container and release its ports
    Down {
        /// Remove even if running
        #[arg(short, long)]
        force: bool,
    },
    /// Run a command inside the container
    Exec {
        /// Treat the command as a shell script string
        #[arg(long)]
        script: bool,
        /// User to run as (defaults to the spec's remote_user)
        #[arg(short, long)]
        user: Option<String>,
        /// Working directory inside the container
        #[arg(short, long)]
        workdir: Option<String>,
        /// Command and arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Show the container's lifecycle status
    Status,
    /// Show recent container logs
    Logs {
        /// Number of lines from the end
        #[arg(long, default_value_t = 50)]
        tail: u32,
    },
    /// Resolve the spec's port forwards and print them (dry run)
    Ports,
    /// List containers managed by this tool
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let runtime = RuntimeCli::detect(args.runtime)?;
    let manager = LifecycleManager::with_runtime(runtime);

    let spec = load_spec(&args.spec)?;
    let name = manager.container_name_for(&spec);

    match args.command {
        Command::Up { no_wait } => up(&manager, &spec, &name, no_wait),
        Command::Start => {
            manager.start(&name)?;
            info!("started {}", name);
            Ok(())
        }
        Command::Stop { timeout } => {
            manager.stop(&name, timeout)?;
            info!("stopped {}", name);
            Ok(())
        }
        Command::Kill => {
            manager.kill(&name)?;
            info!("killed {}", name);
            Ok(())
        }
        Command::Down { force } => {
            manager.remove(&name, force)?;
            let released = manager.ports().release_project(&name);
            info!("removed {} (released {} ports)", name, released);
            Ok(())
        }
        Command::Exec {
            script,
            user,
            workdir,
            command,
        } => exec(&manager, &spec, &name, script, user, workdir, command),
        Command::Status => {
            match manager.get_status(&name) {
                Some(status) => println!("{}", status),
                None => println!("absent"),
            }
            Ok(())
        }
        Command::Logs { tail } => {
            print!("{}", manager.logs(&name, Some(tail))?);
            Ok(())
        }
        Command::Ports => ports(&manager, &spec, &name),
        Command::List => {
            for container in manager.list_managed()? {
                println!("{}\t{}\t{}", container.id, container.name, container.status);
            }
            Ok(())
        }
    }
}

fn load_spec(path: &Path) -> Result<ContainerSpec> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read spec file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid container spec in {}", path.display()))
}

fn up(manager: &LifecycleManager, spec: &ContainerSpec, name: &str, no_wait: bool) -> Result<()> {
    let image = image_reference(spec)?;
    if !manager.image_exists(&image).unwrap_or(false) {
        match &spec.dockerfile {
            Some(dockerfile) => {
                info!("building image {}", image);
                manager.build_image(dockerfile, &spec.base_path, &image)?;
            }
            None => {
                info!("pulling image {}", image);
                manager.pull_image(&image)?;
            }
        }
    }

    let container_id = manager.create(spec)?;
    manager.start(&container_id)?;

    if !no_wait && !manager.wait_until_ready(&container_id, 30) {
        anyhow::bail!(
            "container '{}' started but never became ready for exec",
            name
        );
    }

    println!("{}", container_id);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn exec(
    manager: &LifecycleManager,
    spec: &ContainerSpec,
    name: &str,
    script: bool,
    user: Option<String>,
    workdir: Option<String>,
    command: Vec<String>,
) -> Result<()> {
    let exec_command = if script {
        ExecCommand::Script(command.join(" "))
    } else {
        ExecCommand::Argv(command)
    };
    let opts = ExecOpts {
        user: user.or_else(|| spec.remote_user.clone()),
        workdir: workdir.or_else(|| Some(spec.workspace_folder.clone())),
        ..Default::default()
    };

    let result = manager.exec(name, &exec_command, &opts);
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    if !result.success {
        std::process::exit(if result.exit_code > 0 {
            result.exit_code
        } else {
            1
        });
    }
    Ok(())
}

fn ports(manager: &LifecycleManager, spec: &ContainerSpec, name: &str) -> Result<()> {
    let resolution = manager.ports().resolve(&spec.ports, name);
    for mapping in &resolution.mappings {
        println!(
            "{} -> {} ({})",
            mapping.host_port, mapping.container_port, mapping.protocol
        );
    }
    for failure in &resolution.failures {
        eprintln!("{}: {}", failure.spec, failure.reason);
    }

    // Dry run: give the trial allocations back.
    manager.ports().release_project(name);

    if !resolution.is_complete() {
        std::process::exit(1);
    }
    Ok(())
}
