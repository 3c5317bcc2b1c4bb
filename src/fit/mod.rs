//! Likelihood fitting on reduced datasets.
//!
//! Responsibilities:
//!
//! - joint fit of one spectral model across all runs (`fitter`)
//! - one-dimensional norm profiles (`norm`)
//! - flux points, integral flux and light curves built on the best fit

pub mod fitter;
pub mod flux_points;
pub mod integral;
pub mod light_curve;
pub mod norm;

pub use fitter::*;
pub use flux_points::*;
pub use integral::*;
pub use light_curve::*;
pub use norm::*;
