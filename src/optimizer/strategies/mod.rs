//! Alternative LP backends
//!
//! - `minilp`: `good_lp` modelling over the pure-Rust minilp solver
//!   (requires the `optimization` feature)

#[cfg(feature = "optimization")]
pub mod minilp;

#[cfg(feature = "optimization")]
pub use minilp::*;
