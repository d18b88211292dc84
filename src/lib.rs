//! TALLOW: frame-slot liveness analysis for a bitcode-style register IR.
//!
//! Given a decoded function body (blocks of typed instructions over named
//! virtual values), computes which frame slots are live at every program
//! point and where they die, so that an interpreting or compiling backend
//! can reclaim slot storage as early as safely possible.

pub mod cfg;
pub mod entity;
mod errors;
mod frame;
mod ir;
mod liveness;
mod reads;

pub use cfg::{successors, CFGInfo};
pub use errors::*;
pub use frame::*;
pub use ir::*;
pub use liveness::*;
pub use reads::extract_reads;
