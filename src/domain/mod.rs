//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - sky positions and regions (`SkyCoord`, `CircleRegion`)
//! - run metadata and time bins (`ObservationRecord`, `TimeBin`)
//! - the analysis configuration and its per-component option structs

pub mod types;

pub use types::*;
