//! A retargetable code-generation middle-end: an entity-keyed SSA IR,
//! CFG/dominator-tree/SSA-construction analyses, an equality-saturation
//! e-graph optimizer, and a RISC-V (RV64GC + M/A/F/D) instruction encoder.

pub mod cfg;
pub mod dominator_tree;
pub mod egraph;
pub mod error;
pub mod ir;
pub mod range;
pub mod riscv;
pub mod ssa;
pub mod verifier;

#[cfg(feature = "enable-serde")]
pub use serde::{Deserialize, Serialize};
