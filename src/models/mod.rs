//! Parametric spectral models.
//!
//! - model-expression parsing and validation (`expr`)
//! - typed parameter records per model kind (`params`)
//! - evaluable spectral models with fit parameters (`spectral`)

pub mod expr;
pub mod params;
pub mod spectral;

pub use expr::*;
pub use params::*;
pub use spectral::*;
