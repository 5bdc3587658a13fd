//! Container lifecycle status, inspect parsing, and the status cache.

// Standard library
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

// External crates
use serde_json::Value;

use devc_core::error::Result;

/// Normalized container lifecycle state.
///
/// The runtime's richer vocabulary (`exited`, `dead`, `paused`, …) is folded
/// into this five-state model; anything unrecognized is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Unknown,
    Created,
    Running,
    Stopped,
    Removed,
}

impl ContainerStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "exited" | "dead" => ContainerStatus::Stopped,
            "removing" => ContainerStatus::Removed,
            _ => ContainerStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Unknown => "unknown",
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Removed => "removed",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known status per container id.
///
/// Never authoritative: the runtime CLI is the source of truth and this
/// cache must tolerate staleness. It is mutated by lifecycle operations and
/// explicit status queries, and exists only for the life of the process.
#[derive(Debug, Default)]
pub struct StatusCache {
    entries: Mutex<HashMap<String, ContainerStatus>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, container_id: &str) -> Option<ContainerStatus> {
        self.lock().get(container_id).copied()
    }

    pub fn record(&self, container_id: &str, status: ContainerStatus) {
        self.lock().insert(container_id.to_string(), status);
    }

    pub fn forget(&self, container_id: &str) {
        self.lock().remove(container_id);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ContainerStatus>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// One published port as reported by a full inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub container_port: u16,
    pub protocol: String,
    pub host_port: Option<u16>,
}

/// Structured metadata from a full inspect.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub status: ContainerStatus,
    pub port_bindings: Vec<PortBinding>,
}

/// Parse `inspect` output into structured metadata.
///
/// The runtime returns a JSON array; zero elements means the container does
/// not exist, which is a normal case reported as `None`.
pub fn parse_inspect_output(raw: &str) -> Result<Option<ContainerInfo>> {
    let value: Value = serde_json::from_str(raw)?;
    let Some(entry) = value.as_array().and_then(|items| items.first()) else {
        return Ok(None);
    };

    let id = entry["Id"].as_str().unwrap_or_default().to_string();
    let name = entry["Name"]
        .as_str()
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_string();
    let status = entry["State"]["Status"]
        .as_str()
        .map(ContainerStatus::parse)
        .unwrap_or(ContainerStatus::Unknown);

    let mut port_bindings = Vec::new();
    if let Some(ports) = entry["NetworkSettings"]["Ports"].as_object() {
        for (port_spec, bindings) in ports {
            let Some((port_str, protocol)) = port_spec.split_once('/') else {
                continue;
            };
            let Ok(container_port) = port_str.parse::<u16>() else {
                continue;
            };
            let host_port = bindings
                .as_array()
                .and_then(|list| list.first())
                .and_then(|binding| binding["HostPort"].as_str())
                .and_then(|port| port.parse::<u16>().ok());
            port_bindings.push(PortBinding {
                container_port,
                protocol: protocol.to_string(),
                host_port,
            });
        }
    }

    Ok(Some(ContainerInfo {
        id,
        name,
        status,
        port_bindings,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_normalization() {
        assert_eq!(ContainerStatus::parse("running"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::parse("created"), ContainerStatus::Created);
        assert_eq!(ContainerStatus::parse("exited"), ContainerStatus::Stopped);
        assert_eq!(ContainerStatus::parse("dead"), ContainerStatus::Stopped);
        assert_eq!(ContainerStatus::parse("paused"), ContainerStatus::Unknown);
        assert_eq!(ContainerStatus::parse("  running "), ContainerStatus::Running);
    }

    #[test]
    fn cache_round_trip() {
        let cache = StatusCache::new();
        assert_eq!(cache.get("abc"), None);

        cache.record("abc", ContainerStatus::Running);
        assert_eq!(cache.get("abc"), Some(ContainerStatus::Running));

        cache.record("abc", ContainerStatus::Stopped);
        assert_eq!(cache.get("abc"), Some(ContainerStatus::Stopped));

        cache.forget("abc");
        assert_eq!(cache.get("abc"), None);
    }

    #[test]
    fn empty_inspect_array_means_absent() {
        assert!(parse_inspect_output("[]").unwrap().is_none());
    }

    #[test]
    fn invalid_inspect_json_is_an_error() {
        assert!(parse_inspect_output("not json").is_err());
    }

    #[test]
    fn inspect_parse_extracts_state_and_bindings() {
        let raw = r#"[{
            "Id": "abc123",
            "Name": "/web-app-1a2b3c4d-devcontainer",
            "State": { "Status": "running" },
            "NetworkSettings": {
                "Ports": {
                    "3000/tcp": [ { "HostIp": "0.0.0.0", "HostPort": "10001" } ],
                    "9229/tcp": null
                }
            }
        }]"#;

        let info = parse_inspect_output(raw).unwrap().expect("container info");
        assert_eq!(info.id, "abc123");
        assert_eq!(info.name, "web-app-1a2b3c4d-devcontainer");
        assert_eq!(info.status, ContainerStatus::Running);
        assert!(info.port_bindings.contains(&PortBinding {
            container_port: 3000,
            protocol: "tcp".to_string(),
            host_port: Some(10001),
        }));
        assert!(info.port_bindings.contains(&PortBinding {
            container_port: 9229,
            protocol: "tcp".to_string(),
            host_port: None,
        }));
    }
}
