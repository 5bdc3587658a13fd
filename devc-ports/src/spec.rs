//! The port-forward spec grammar.
//!
//! A forward request is written as one of:
//!   `"3000"`            fixed, host == container
//!   `"8080:80"`         fixed, explicit host:container
//!   `"auto:3000"`       auto-assign a host port from the default range
//!   `"range:9000-9005:3000"`  auto-assign from a caller-supplied range
//! with an optional `/udp` suffix selecting the protocol.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::range::PortRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed forward request, before any host port has been chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSpec {
    Fixed {
        host: u16,
        container: u16,
        protocol: Protocol,
    },
    Auto {
        container: u16,
        protocol: Protocol,
    },
    Range {
        range: PortRange,
        container: u16,
        protocol: Protocol,
    },
}

impl PortSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let (body, protocol) = split_protocol(raw)?;

        if let Some(rest) = body.strip_prefix("auto:") {
            return Ok(PortSpec::Auto {
                container: parse_port(rest)?,
                protocol,
            });
        }

        if let Some(rest) = body.strip_prefix("range:") {
            let Some((range_str, container_str)) = rest.rsplit_once(':') else {
                anyhow::bail!(
                    "invalid range spec '{}': expected range:START-END:CONTAINER",
                    raw
                );
            };
            return Ok(PortSpec::Range {
                range: PortRange::parse(range_str)?,
                container: parse_port(container_str)?,
                protocol,
            });
        }

        if let Some((host_str, container_str)) = body.split_once(':') {
            return Ok(PortSpec::Fixed {
                host: parse_port(host_str)?,
                container: parse_port(container_str)?,
                protocol,
            });
        }

        let port = parse_port(body)?;
        Ok(PortSpec::Fixed {
            host: port,
            container: port,
            protocol,
        })
    }

    pub fn container_port(&self) -> u16 {
        match self {
            PortSpec::Fixed { container, .. }
            | PortSpec::Auto { container, .. }
            | PortSpec::Range { container, .. } => *container,
        }
    }
}

fn split_protocol(raw: &str) -> Result<(&str, Protocol)> {
    match raw.rsplit_once('/') {
        None => Ok((raw, Protocol::Tcp)),
        Some((body, "tcp")) => Ok((body, Protocol::Tcp)),
        Some((body, "udp")) => Ok((body, Protocol::Udp)),
        Some((_, other)) => anyhow::bail!("unknown protocol '{}' in port spec '{}'", other, raw),
    }
}

fn parse_port(value: &str) -> Result<u16> {
    let port: u16 = value
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid port number: '{}'", value))?;
    if port == 0 {
        anyhow::bail!("port must be between 1 and 65535");
    }
    Ok(port)
}

/// How the host side of a mapping was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum AllocationKind {
    Fixed,
    Auto,
    Range { start: u16, end: u16 },
}

/// A fully resolved host→container forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
    #[serde(flatten)]
    pub allocation: AllocationKind,
}

impl PortMapping {
    /// The value handed to the runtime's `-p` flag. TCP is the runtime's
    /// default and is left implicit.
    pub fn publish_arg(&self) -> String {
        match self.protocol {
            Protocol::Tcp => format!("{}:{}", self.host_port, self.container_port),
            Protocol::Udp => format!("{}:{}/udp", self.host_port, self.container_port),
        }
    }
}
