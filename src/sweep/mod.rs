//! Tenant-wide permission sweep.
//!
//! The [`enumerator`] streams site collections, [`probe`] inspects one site for the target
//! identity, and the [`coordinator`] fans probes out over a bounded worker pool and builds
//! the [`SweepResult`]. Providers plug in through the traits in [`provider`].

pub mod coordinator;
pub mod enumerator;
pub mod identity;
pub mod model;
pub mod probe;
pub mod provider;

#[cfg(test)]
pub(crate) mod mock;

pub use coordinator::{run_sweep, ProgressFn, SweepCoordinator, SweepOptions, SweepProgress};
pub use enumerator::{list_sites, EnumerateOptions};
pub use identity::{IdentityMatcher, MatchStrategy};
pub use model::{
    MatchKind, PermissionMatch, SiteDescriptor, SiteError, SiteOutcome, StopReason, SweepResult,
};
pub use probe::{probe_site, ProbeOptions, ProbeOutcome, ProbeReport};
pub use provider::{SiteSession, TenantSession};
