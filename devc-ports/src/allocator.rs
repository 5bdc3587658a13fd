//! Host-port allocation for container forwarding.
//!
//! The allocator resolves forward specs into concrete host→container
//! mappings, probing the host for genuinely free ports and keeping a
//! process-wide table of what it has handed out. The table exists so that
//! two resolve passes cannot pick the same port before either container has
//! actually bound it; the loopback bind-probe remains the authority on
//! whether a port is free on the host.

// Standard library
use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

// External crates
use serde::Serialize;
use tracing::debug;

// Internal imports
use crate::range::PortRange;
use crate::spec::{AllocationKind, PortMapping, PortSpec, Protocol};

/// Tuning for dynamic host-port selection. Timing and bounds here are
/// configuration, not contract.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Range scanned for `auto:` specs.
    pub auto_range: PortRange,
    /// Upper bound on ports examined per dynamic allocation.
    pub max_scan_attempts: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            auto_range: PortRange {
                start: 10000,
                end: 10999,
            },
            max_scan_attempts: 256,
        }
    }
}

/// A recorded host-port allocation.
#[derive(Debug, Clone, Serialize)]
pub struct PortAllocation {
    pub port: u16,
    pub project_id: String,
    pub purpose: String,
    pub allocated_at: SystemTime,
}

/// A per-entry resolution failure. Other entries in the same resolve call
/// are unaffected.
#[derive(Debug, Clone)]
pub struct PortFailure {
    pub spec: String,
    pub reason: String,
}

/// Outcome of one resolve pass: the mappings that succeeded plus the
/// entries that did not.
#[derive(Debug, Default)]
pub struct PortResolution {
    pub mappings: Vec<PortMapping>,
    pub failures: Vec<PortFailure>,
}

impl PortResolution {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Read-only view over the allocation table.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationStats {
    pub total_allocated: usize,
    pub by_project: HashMap<String, usize>,
    pub by_purpose: HashMap<String, usize>,
}

/// Process-wide port allocation table. Constructed once at startup and
/// shared by reference with every call site; state lives only as long as
/// the process.
#[derive(Debug, Default)]
pub struct PortAllocator {
    config: AllocatorConfig,
    table: Mutex<HashMap<u16, PortAllocation>>,
}

impl PortAllocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self {
            config,
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a batch of forward specs for one project.
    ///
    /// Fixed entries pass through verbatim and are never probed. Dynamic
    /// entries are allocated and recorded immediately, so a concurrent
    /// resolve for another project cannot land on the same port. A
    /// malformed or unsatisfiable entry fails alone; the rest of the batch
    /// proceeds.
    pub fn resolve(&self, specs: &[String], project_id: &str) -> PortResolution {
        let mut resolution = PortResolution::default();
        // Ports chosen earlier in this same pass, fixed ones included.
        let mut chosen: HashSet<u16> = HashSet::new();

        for raw in specs {
            let spec = match PortSpec::parse(raw) {
                Ok(spec) => spec,
                Err(e) => {
                    resolution.failures.push(PortFailure {
                        spec: raw.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match spec {
                PortSpec::Fixed {
                    host,
                    container,
                    protocol,
                } => {
                    chosen.insert(host);
                    resolution.mappings.push(PortMapping {
                        host_port: host,
                        container_port: container,
                        protocol,
                        allocation: AllocationKind::Fixed,
                    });
                }
                PortSpec::Auto {
                    container,
                    protocol,
                } => {
                    self.resolve_dynamic(
                        raw,
                        self.config.auto_range,
                        AllocationKind::Auto,
                        container,
                        protocol,
                        project_id,
                        &mut chosen,
                        &mut resolution,
                    );
                }
                PortSpec::Range {
                    range,
                    container,
                    protocol,
                } => {
                    self.resolve_dynamic(
                        raw,
                        range,
                        AllocationKind::Range {
                            start: range.start,
                            end: range.end,
                        },
                        container,
                        protocol,
                        project_id,
                        &mut chosen,
                        &mut resolution,
                    );
                }
            }
        }

        resolution
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_dynamic(
        &self,
        raw: &str,
        range: PortRange,
        allocation: AllocationKind,
        container: u16,
        protocol: Protocol,
        project_id: &str,
        chosen: &mut HashSet<u16>,
        resolution: &mut PortResolution,
    ) {
        let purpose = format!("forward:{}", container);
        match self.allocate_in_range(range, project_id, &purpose, chosen) {
            Some(host_port) => {
                chosen.insert(host_port);
                debug!(host_port, container, project_id, "allocated dynamic port");
                resolution.mappings.push(PortMapping {
                    host_port,
                    container_port: container,
                    protocol,
                    allocation,
                });
            }
            None => {
                resolution.failures.push(PortFailure {
                    spec: raw.to_string(),
                    reason: format!("no available host port in range {}", range),
                });
            }
        }
    }

    /// Linear scan over `range`, bounded by `max_scan_attempts`, skipping
    /// ports chosen earlier in this pass and ports already in the table.
    /// The winning port is recorded before this returns.
    fn allocate_in_range(
        &self,
        range: PortRange,
        project_id: &str,
        purpose: &str,
        exclude: &HashSet<u16>,
    ) -> Option<u16> {
        let mut table = self.lock_table();
        let mut attempts = 0u32;

        for port in range.ports() {
            if attempts >= self.config.max_scan_attempts {
                break;
            }
            attempts += 1;

            if exclude.contains(&port) || table.contains_key(&port) {
                continue;
            }
            if !is_host_port_free(port) {
                debug!(port, "host port already bound, skipping");
                continue;
            }

            table.insert(
                port,
                PortAllocation {
                    port,
                    project_id: project_id.to_string(),
                    purpose: purpose.to_string(),
                    allocated_at: SystemTime::now(),
                },
            );
            return Some(port);
        }

        None
    }

    /// Record an explicit allocation. Returns false if the port is already
    /// held by any project.
    pub fn allocate(&self, port: u16, project_id: &str, purpose: &str) -> bool {
        let mut table = self.lock_table();
        if table.contains_key(&port) {
            return false;
        }
        table.insert(
            port,
            PortAllocation {
                port,
                project_id: project_id.to_string(),
                purpose: purpose.to_string(),
                allocated_at: SystemTime::now(),
            },
        );
        true
    }

    /// Release one port. Returns false when the port was not allocated.
    pub fn release(&self, port: u16) -> bool {
        self.lock_table().remove(&port).is_some()
    }

    /// Release every allocation held by a project, returning how many were
    /// removed.
    pub fn release_project(&self, project_id: &str) -> usize {
        let mut table = self.lock_table();
        let before = table.len();
        table.retain(|_, allocation| allocation.project_id != project_id);
        before - table.len()
    }

    pub fn lookup(&self, port: u16) -> Option<PortAllocation> {
        self.lock_table().get(&port).cloned()
    }

    pub fn stats(&self) -> AllocationStats {
        let table = self.lock_table();
        let mut by_project: HashMap<String, usize> = HashMap::new();
        let mut by_purpose: HashMap<String, usize> = HashMap::new();
        for allocation in table.values() {
            *by_project.entry(allocation.project_id.clone()).or_default() += 1;
            *by_purpose.entry(allocation.purpose.clone()).or_default() += 1;
        }
        AllocationStats {
            total_allocated: table.len(),
            by_project,
            by_purpose,
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<u16, PortAllocation>> {
        match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Bind-probe on loopback. The OS, not the allocation table, is the
/// authority on whether a port is genuinely free.
pub fn is_host_port_free(port: u16) -> bool {
    TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fixed_specs_pass_through_without_probing() {
        let allocator = PortAllocator::default();
        // Port 1 is privileged and unbindable for a normal user; a fixed
        // mapping must still be returned untouched.
        let resolution = allocator.resolve(&specs(&["1:80"]), "proj");
        assert!(resolution.is_complete());
        assert_eq!(resolution.mappings[0].host_port, 1);
        assert_eq!(resolution.mappings[0].allocation, AllocationKind::Fixed);
        // Fixed mappings are not recorded in the table.
        assert!(allocator.lookup(1).is_none());
    }

    #[test]
    fn auto_allocation_records_a_bindable_port() {
        let allocator = PortAllocator::default();
        let resolution = allocator.resolve(&specs(&["auto:3000"]), "proj");
        assert!(resolution.is_complete());
        assert_eq!(resolution.mappings.len(), 1);

        let mapping = &resolution.mappings[0];
        assert_eq!(mapping.container_port, 3000);
        assert_eq!(mapping.allocation, AllocationKind::Auto);
        assert!((10000..=10999).contains(&mapping.host_port));
        // Recorded immediately, and still free on the host.
        assert!(allocator.lookup(mapping.host_port).is_some());
        assert!(is_host_port_free(mapping.host_port));
    }

    #[test]
    fn concurrent_projects_get_distinct_ports_for_same_container_port() {
        let allocator = PortAllocator::default();
        let first = allocator.resolve(&specs(&["auto:8080"]), "p1");
        let second = allocator.resolve(&specs(&["auto:8080"]), "p2");
        assert!(first.is_complete());
        assert!(second.is_complete());
        assert_ne!(first.mappings[0].host_port, second.mappings[0].host_port);
    }

    #[test]
    fn same_pass_entries_never_collide() {
        let allocator = PortAllocator::default();
        let resolution = allocator.resolve(&specs(&["auto:3000", "auto:4000"]), "proj");
        assert!(resolution.is_complete());
        assert_ne!(
            resolution.mappings[0].host_port,
            resolution.mappings[1].host_port
        );
    }

    #[test]
    fn exhausted_range_fails_alone() {
        let allocator = PortAllocator::default();
        for port in 9000..=9005 {
            assert!(allocator.allocate(port, "other", "test"));
        }

        let resolution = allocator.resolve(&specs(&["range:9000-9005:3000", "4000:4000"]), "proj");
        assert_eq!(resolution.failures.len(), 1);
        assert!(resolution.failures[0].reason.contains("no available host port"));
        // The sibling fixed entry still succeeded.
        assert_eq!(resolution.mappings.len(), 1);
        assert_eq!(resolution.mappings[0].host_port, 4000);
    }

    #[test]
    fn malformed_entry_does_not_abort_the_batch() {
        let allocator = PortAllocator::default();
        let resolution = allocator.resolve(&specs(&["nonsense:spec:extra:parts", "auto:3000"]), "proj");
        assert_eq!(resolution.failures.len(), 1);
        assert_eq!(resolution.mappings.len(), 1);
    }

    #[test]
    fn release_round_trip() {
        let allocator = PortAllocator::default();
        assert!(allocator.allocate(12345, "proj", "test"));
        assert!(!allocator.allocate(12345, "proj2", "test"));
        assert!(allocator.release(12345));
        assert!(allocator.lookup(12345).is_none());
        assert!(!allocator.release(12345));
    }

    #[test]
    fn release_project_removes_only_that_project() {
        let allocator = PortAllocator::default();
        allocator.allocate(12001, "a", "test");
        allocator.allocate(12002, "a", "test");
        allocator.allocate(12003, "b", "test");

        assert_eq!(allocator.release_project("a"), 2);
        assert!(allocator.lookup(12003).is_some());
        assert_eq!(allocator.release_project("a"), 0);
    }

    #[test]
    fn stats_reflect_the_table() {
        let allocator = PortAllocator::default();
        allocator.allocate(12010, "a", "forward:80");
        allocator.allocate(12011, "a", "forward:443");
        allocator.allocate(12012, "b", "forward:80");

        let stats = allocator.stats();
        assert_eq!(stats.total_allocated, 3);
        assert_eq!(stats.by_project.get("a"), Some(&2));
        assert_eq!(stats.by_project.get("b"), Some(&1));
        assert_eq!(stats.by_purpose.get("forward:80"), Some(&2));
    }

    #[test]
    fn scan_bound_limits_dynamic_allocation() {
        let allocator = PortAllocator::new(AllocatorConfig {
            auto_range: PortRange {
                start: 10000,
                end: 10999,
            },
            max_scan_attempts: 0,
        });
        let resolution = allocator.resolve(&specs(&["auto:3000"]), "proj");
        assert_eq!(resolution.failures.len(), 1);
    }
}
