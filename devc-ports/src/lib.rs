//! Host-port management for devcontainer forwarding.
//!
//! Parses port-forward specs (fixed, auto-assign, ranged-assign), probes the
//! host for free ports, and tracks allocations per project so they can be
//! released when a container goes away.

pub mod allocator;
pub mod range;
pub mod spec;

pub use allocator::{
    is_host_port_free, AllocationStats, AllocatorConfig, PortAllocation, PortAllocator,
    PortFailure, PortResolution,
};
pub use range::PortRange;
pub use spec::{AllocationKind, PortMapping, PortSpec, Protocol};
