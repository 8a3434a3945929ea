//! # Energy Manager
//!
//! Core of a household energy manager:
//!
//! - [`ledger`]: append-only device state history and consumption queries
//! - [`assignment`]: binds clients to the nearest transformer of their zone
//! - [`optimizer`]: linear-program allocation of device usage and load
//! - [`reporting`]: household, transformer and device consumption reports
//!
//! [`service::EnergyService`] wires these to a [`repo::Storage`] backend.

pub mod assignment;
pub mod config;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod optimizer;
pub mod reporting;
pub mod repo;
pub mod scheduler;
pub mod service;
pub mod telemetry;

pub use error::{Error, Result};
