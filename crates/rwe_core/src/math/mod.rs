//! Fixed-point math for deterministic simulation.
//!
//! All game simulation uses fixed-point arithmetic so that every peer
//! computes bit-identical results. Floating-point values only appear when
//! building lookup tables and when handing state to a renderer.

mod angle;
mod bounds;
mod scalar;
mod vector;

pub use angle::{angle_between, asin, atan, atan2, SimAngle, SIN_TABLE_SIZE};
pub use bounds::SimBox;
pub use scalar::{sim_scalar, SimScalar, WideScalar, FRACTION_BITS};
pub use vector::SimVector;
