//! # Load Allocation Optimizer
//!
//! Solves a linear program over one allocation value per device: a linear
//! objective, linear constraint rows and per-device bounds. The default
//! backend is [`SimplexSolver`]; other backends live in [`strategies`].

pub mod constraints;
pub mod plans;
pub mod simplex;
pub mod strategies;
pub mod types;

pub use constraints::*;
pub use plans::*;
pub use simplex::*;
pub use strategies::*;
pub use types::*;
