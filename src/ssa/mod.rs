//! SSA construction and verification.

pub mod constructor;
pub mod verify;

pub use constructor::{construct, SsaBuildResult};
pub use verify::verify;
