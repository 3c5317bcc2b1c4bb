//! Diagnostic plots.
//!
//! Rendering is best effort: every chart returns a `Result`, and the pipeline
//! turns a failure into a report warning.

pub mod charts;

pub use charts::*;
