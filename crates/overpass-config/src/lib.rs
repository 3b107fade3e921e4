//! # Config
//!
//! Admin-managed platform truth and the governance gate in front of it.
//!
//! Four YAML documents (plus the batch policy catalog) define what the
//! platform can physically do: satellite buses, SAR mode envelopes, ground
//! stations, and mission settings. Mission input never touches these
//! documents; the [`resolver`] validates each request against them,
//! clamping or rejecting out-of-bounds values and rejecting any attempt to
//! set an admin-only parameter per mission.
//!
//! - [`docs`] — typed documents, on-disk loading, defaults when a file is
//!   missing, the 16-hex `config_hash`, and full snapshots.
//! - [`resolver`] — per-mission validation producing a
//!   [`resolver::ResolveResult`] with violations and clamped values.
//! - [`snapshots`] — point-in-time copies of the admin documents under
//!   `config/snapshots/{id}/` with a `metadata.json` sidecar.
//!
//! The hash and snapshot are pure functions of the on-disk documents at
//! load time; reordering keys inside a YAML file does not change the hash.

pub mod docs;
pub mod resolver;
pub mod snapshots;

pub use docs::{AdminConfig, ConfigSnapshot, SarModeSpec};
pub use resolver::{ResolveResult, ResolvedConfig, Resolver, Violation, ViolationSeverity};
pub use snapshots::{SnapshotMetadata, SnapshotStore};
