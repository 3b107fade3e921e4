//! # Orbit
//!
//! Orbit propagation and opportunity geometry for overpass.
//!
//! The crate wraps an SGP4 propagator and layers the mission-planning
//! geometry on top of it:
//!
//! - [`propagator`] — TLE parsing and position/velocity sampling. One
//!   [`propagator::Propagator`] per satellite; the type is cheap to build
//!   and is duplicated per worker rather than shared across threads.
//! - [`geometry`] — ECEF/ENU frame math: elevation, azimuth, incidence,
//!   and the spherical-Earth conversions the rest of the pipeline assumes.
//! - [`visibility`] — the adaptive coarse-to-fine pass sweep producing
//!   [`overpass_types::PassWindow`] lists per target.
//! - [`pool`] — a worker pool that fans the sweep out over
//!   (satellite, target) pairs with progress reporting and cancellation.
//! - [`sar`] — look side, pass direction, incidence envelope, and swath
//!   polygon analysis for SAR passes.
//!
//! All outputs are deterministic functions of (ephemeris, time window,
//! configuration); repeated calls return identical results.

pub mod geometry;
pub mod pool;
pub mod propagator;
pub mod sar;
pub mod visibility;

pub use pool::{ParallelSweep, ProgressFn, run_parallel_sweep};
pub use propagator::{OrbitError, Propagator};
pub use sar::SarGeometryContext;
pub use visibility::{PassScan, VisibilityConfig};
