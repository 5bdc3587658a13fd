//! Stable, unique container naming.
//!
//! A container's name is derived from the project name plus a short hash of
//! the project root, so the same project always maps to the same container
//! and two checkouts with the same name never collide.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::Path;

use crate::spec::ContainerSpec;

const NAME_SUFFIX: &str = "-devcontainer";
const HASH_HEX_CHARS: usize = 8;
const DEFAULT_PROJECT_NAME: &str = "project";

/// Derive the container name for a spec.
///
/// Deterministic: identical (name, base_path) pairs always produce the same
/// name, and differing base_paths with the same project name produce
/// different names.
pub fn generate_name(spec: &ContainerSpec) -> String {
    format!(
        "{}-{}{}",
        sanitize_project_name(&spec.name),
        short_path_hash(&spec.base_path),
        NAME_SUFFIX
    )
}

/// Reduce a human-supplied name to the runtime's safe alphabet: lowercase
/// alphanumerics, dash, underscore. Runs of anything else collapse to a
/// single dash.
pub fn sanitize_project_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for ch in name.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            sanitized.push(ch);
        } else if !sanitized.ends_with('-') {
            sanitized.push('-');
        }
    }

    let sanitized = sanitized.trim_matches('-');
    if sanitized.is_empty() {
        DEFAULT_PROJECT_NAME.to_string()
    } else {
        sanitized.to_string()
    }
}

/// First 8 hex chars of the SHA-256 of the absolute project path.
pub fn short_path_hash(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
    let mut hash = String::with_capacity(HASH_HEX_CHARS);
    for byte in digest.iter().take(HASH_HEX_CHARS / 2) {
        let _ = write!(hash, "{:02x}", byte);
    }
    hash
}
