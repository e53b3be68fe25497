//! Streaming φ-quantile estimation via the CKMS algorithm.
//!
//! This crate implements the Cormode/Korn/Muthukrishnan/Srivastava streaming
//! quantile summary: a compressed, rank-ordered sample list that answers
//! quantile queries over an unbounded stream of observations in sublinear
//! space, with a configurable rank-error bound per target quantile.
//!
//! # Quick Start
//!
//! ```
//! use ckms::{CkmsQuantiles, Quantile};
//!
//! let targets = [
//!     Quantile::new(0.5, 0.01).unwrap(),
//!     Quantile::new(0.95, 0.001).unwrap(),
//! ];
//!
//! let mut estimator = CkmsQuantiles::new(&targets);
//! for i in 1..=1000 {
//!     estimator.insert(i as f64);
//! }
//!
//! let median = estimator.get(0.5);
//! ```
//!
//! Two special targets are supported: `Quantile::new(0.0, 0.0)` tracks the
//! exact minimum, and `Quantile::new(1.0, 0.0)` tracks the exact maximum.

#![deny(warnings)]
#![deny(missing_docs)]

mod estimator;
mod quantile;

pub use estimator::CkmsQuantiles;
pub use quantile::{Quantile, QuantileError};
