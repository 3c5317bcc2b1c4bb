//! `gamma-dl5` library crate.
//!
//! The binary (`dl5`) is a thin wrapper around this library so that:
//!
//! - the reduction and fitting chain is testable without spawning processes
//! - other front-ends can drive the same pipeline
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod geometry;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod reduction;
pub mod report;
pub mod selection;
pub mod sim;
pub mod stats;
pub mod store;
pub mod telemetry;
pub mod timebins;
