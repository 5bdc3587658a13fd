//! Per-container shell detection cache.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Probe order for interactive shells; the last entry doubles as the
/// universal fallback.
pub const SHELL_PREFERENCE: [&str; 3] = ["bash", "zsh", "sh"];
pub const FALLBACK_SHELL: &str = "sh";

/// Which shell binary is usable inside each container.
///
/// Entries are created on the first successful probe and read on every exec
/// call. Recreating a container yields a fresh id, so stale entries are
/// invalidated explicitly rather than expiring.
#[derive(Debug, Default)]
pub struct ShellCache {
    entries: Mutex<HashMap<String, String>>,
}

impl ShellCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, container_id: &str) -> Option<String> {
        self.lock().get(container_id).cloned()
    }

    pub fn insert(&self, container_id: &str, shell: &str) {
        self.lock()
            .insert(container_id.to_string(), shell.to_string());
    }

    /// Invalidate one entry, or the whole cache when no id is given.
    pub fn clear(&self, container_id: Option<&str>) {
        match container_id {
            Some(id) => {
                self.lock().remove(id);
            }
            None => self.lock().clear(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let cache = ShellCache::new();
        assert_eq!(cache.get("abc"), None);
        cache.insert("abc", "zsh");
        assert_eq!(cache.get("abc"), Some("zsh".to_string()));
    }

    #[test]
    fn targeted_invalidation() {
        let cache = ShellCache::new();
        cache.insert("abc", "bash");
        cache.insert("def", "sh");

        cache.clear(Some("abc"));
        assert_eq!(cache.get("abc"), None);
        assert_eq!(cache.get("def"), Some("sh".to_string()));
    }

    #[test]
    fn global_invalidation() {
        let cache = ShellCache::new();
        cache.insert("abc", "bash");
        cache.insert("def", "sh");

        cache.clear(None);
        assert_eq!(cache.get("abc"), None);
        assert_eq!(cache.get("def"), None);
    }
}
