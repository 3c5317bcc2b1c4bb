//! Output helpers.
//!
//! - analysis directory layout (`layout`)
//! - CSV/JSON result exports (`export`)

pub mod export;
pub mod layout;

pub use export::*;
pub use layout::*;
