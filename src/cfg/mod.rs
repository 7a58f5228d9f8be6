//! Control-flow graph construction: block boundaries, edges, reachability.

pub mod builder;
pub mod graph;

pub use builder::CfgBuilder;
pub use graph::{Cfg, CfgEdge};
