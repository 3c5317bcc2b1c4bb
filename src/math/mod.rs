//! Mathematical utilities: sky geometry, linear solves, minimisation, quadrature.

pub mod ols;
pub mod optimize;
pub mod sky;
pub mod special;

pub use ols::*;
pub use optimize::*;
pub use special::*;
