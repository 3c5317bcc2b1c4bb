//! On/off statistics: per-bin Wstat, Li & Ma significance and collection
//! summaries.

pub mod significance;
pub mod wstat;

pub use significance::*;
pub use wstat::*;
