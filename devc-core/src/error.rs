pub use anyhow::bail;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevcError {
    Config(String),
    Runtime(String),
    Io(#[from] std::io::Error),
    Command(String),
    Dependency(String),
    Port(String),
    Internal(String),
    Serialization(String),
    Timeout(String),
    DaemonNotRunning,
    DaemonPermission,
    Other(#[from] anyhow::Error),
}

impl Display for DevcError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            DevcError::Config(s) => write!(f, "Configuration error: {}", s),
            DevcError::Runtime(s) => write!(f, "Runtime error: {}", s),
            DevcError::Io(e) => write!(f, "I/O error: {}", e),
            DevcError::Command(s) => write!(f, "Command failed: {}", s),
            DevcError::Dependency(s) => write!(f, "Dependency not found: {}", s),
            DevcError::Port(s) => write!(f, "Port error: {}", s),
            DevcError::Internal(s) => write!(f, "Internal error: {}", s),
            DevcError::Serialization(s) => write!(f, "Serialization error: {}", s),
            DevcError::Timeout(s) => write!(f, "Timed out: {}", s),
            DevcError::DaemonNotRunning => {
                write!(f, "Container runtime daemon is not running\n\n")?;
                write!(f, "Fix:\n")?;
                write!(f, "  • Start Docker Desktop, or\n")?;
                write!(f, "  • Run: sudo systemctl start docker\n")?;
                write!(f, "  • Verify: docker ps")
            }
            DevcError::DaemonPermission => {
                write!(f, "Permission denied accessing the container runtime\n\n")?;
                write!(f, "Fix:\n")?;
                write!(f, "  • Add user to docker group: sudo usermod -aG docker $USER\n")?;
                write!(f, "  • Log out and back in\n")?;
                write!(f, "  • Verify: docker ps")
            }
            DevcError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl From<serde_json::Error> for DevcError {
    fn from(err: serde_json::Error) -> Self {
        DevcError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DevcError>;
