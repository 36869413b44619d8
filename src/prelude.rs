//! # spvshrink Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the spvshrink library. Import this module to get quick access to the essential
//! types for SPIR-V module reduction and transformation.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all spvshrink operations
pub use crate::Error;

/// The result type used throughout spvshrink
pub use crate::Result;

// ================================================================================================
// Module Model
// ================================================================================================

/// The word-level binary codec and `.spv` file loading
pub use crate::spirv::binary;

/// The in-memory module, its header and structural pieces
pub use crate::spirv::{BasicBlock, Function, Instruction, Module, ModuleHeader, Operand};

/// Opcode enumeration and the 32-bit word type
pub use crate::spirv::{Op, Word};

/// The SPIR-V environment modules are processed against
pub use crate::spirv::TargetEnv;

// ================================================================================================
// Analyses
// ================================================================================================

/// Control flow and dominance queries over one function
pub use crate::analysis::{ControlFlowGraph, DominatorTree};

/// Definition sites and reference counts for every id
pub use crate::analysis::DefUseManager;

/// Interned type and constant pools
pub use crate::analysis::{ConstantId, ConstantManager, TypeManager};

// ================================================================================================
// Transformations
// ================================================================================================

/// The folding-rule registry and per-rule context
pub use crate::fold::{FoldingContext, FoldingRules};

/// Loop discovery and the loop transform entry point
pub use crate::loops::{LoopNest, LoopUtils};

// ================================================================================================
// Reduction
// ================================================================================================

/// The reduction session driver and its options
pub use crate::reduce::{Reducer, ReducerOptions, ReductionOutcome, ReductionResultStatus};

/// The pass machinery for custom reductions
pub use crate::reduce::{OpportunityFinder, ReductionOpportunity, ReductionPass};

/// The stock opportunity finders
pub use crate::reduce::{BlindlyRemoveGlobalValuesFinder, RemoveUnreferencedInstructionFinder};

// ================================================================================================
// Validation and Diagnostics
// ================================================================================================

/// The structural validator used as the reduction oracle
pub use crate::validate::{validate, validate_module};

/// Diagnostic reporting: severity levels and the consumer callback type
pub use crate::validate::{nop_message_consumer, MessageConsumer, MessageLevel};
