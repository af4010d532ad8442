//! The in-memory SSA intermediate representation: entities, the packed
//! value table, instruction formats, the data-flow graph, layout, and the
//! `Function` aggregate that ties them together.

pub mod builder;
pub mod condcodes;
pub mod constant;
pub mod dfg;
pub mod entities;
pub mod function;
pub mod instructions;
pub mod jumptable;
pub mod layout;
pub mod memflags;
pub mod opcode;
pub mod packed_value;
pub mod stackslot;
pub mod types;
