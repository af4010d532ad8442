//! The error taxonomy from spec §7: one `thiserror` enum per family, plus
//! `VerifierErrorEntry`, the (kind, entity) pair the verifier accumulates
//! rather than failing fast on.
//!
//! New module — the teacher has no centralized error taxonomy (Mu passes
//! largely panic or return `bool`); grounded on `thiserror`'s idiom as
//! used throughout the retrieval pack (e.g. `messense-llvm-bitcode-rs`'s
//! `Error` enum) and on the field lists spec §7 gives verbatim.

use thiserror::Error;

use crate::ir::entities::AnyEntity;

/// A caller passed a handle this function doesn't recognize (spec §7
/// "Structural").
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralError {
    #[error("invalid block handle")]
    InvalidBlock,
    #[error("invalid instruction handle")]
    InvalidInst,
    #[error("invalid value handle")]
    InvalidValue,
}

/// The `FunctionBuilder` cursor was asked to do something that requires a
/// current position.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderError {
    #[error("no current block: call switch_to_block first")]
    NoCurrentBlock,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgError {
    #[error("control-flow graph has not been computed for this function")]
    CfgNotComputed,
    #[error("block is not present in the function's layout")]
    BlockNotInLayout,
    #[error("block's last instruction is not a valid terminator")]
    InvalidTerminator,
    #[error("branch instruction is missing a target block")]
    MissingBranchTarget,
    #[error("br_table instruction is missing a jump-table entry")]
    MissingJumpTarget,
    #[error("expected successor edge is absent from the CFG cache")]
    MissingSuccessorEdge,
    #[error("expected predecessor edge is absent from the CFG cache")]
    MissingPredecessorEdge,
    #[error("predecessor list contains an edge whose source block's terminator disagrees")]
    InconsistentPredecessor,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomTreeError {
    #[error("the entry block was assigned an immediate dominator")]
    EntryBlockHasIdom,
    #[error("a reachable non-entry block has no immediate dominator")]
    ReachableBlockWithoutIdom,
    #[error("a block's immediate dominator does not dominate one of its predecessors")]
    IdomDoesNotDominatePredecessor,
    #[error("the immediate-dominator chain contains a cycle")]
    DominatorTreeCycle,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierError {
    #[error("value used before its definition dominates the use")]
    UseBeforeDef,
    #[error("instruction is not reachable from any block in the layout")]
    InstructionOrphaned,
    #[error("block is not reachable from the entry block")]
    BlockOrphaned,
    #[error("operand type does not match the opcode's expected type")]
    TypeMismatch,
    #[error("instruction has the wrong number of operands for its format")]
    InvalidOperandCount,
    #[error("block does not end in exactly one terminator, or a non-terminator appears mid-block")]
    ControlFlowError,
    #[error("a dominance invariant was violated")]
    DominatorViolation,
    #[error("a block-call argument list does not match its target block's parameter list")]
    InvalidBlockParams,
}

/// One verifier finding: what went wrong, and which entity it was found
/// at. The verifier's public entry point returns `Vec<VerifierErrorEntry>`
/// rather than failing on the first error, so a host can print every
/// problem in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierErrorEntry {
    pub kind: VerifierError,
    pub at: AnyEntity,
    pub detail: String,
}

impl VerifierErrorEntry {
    pub fn new(kind: VerifierError, at: impl Into<AnyEntity>, detail: impl Into<String>) -> Self {
        Self { kind, at: at.into(), detail: detail.into() }
    }
}

impl std::fmt::Display for VerifierErrorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.at, self.detail)
    }
}
