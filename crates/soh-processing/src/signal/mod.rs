//! Signal processing primitives.
//!
//! This module contains the pluggable filter strategies applied to the
//! measurement columns and the numerical integration used to derive
//! cumulative counters.

pub mod filters;
pub mod integrate;

pub use filters::{ClosureFilter, IdentityFilter, MedianFilter, MovingAverageFilter, SignalFilter};
pub use integrate::{cumulative_trapezoid, offset};
