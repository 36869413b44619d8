//! Module-wide analyses shared by folding, loop transforms and reduction.
//!
//! Everything here is derived state. The [`crate::spirv::Module`] is the
//! single source of truth; these structures index it for fast queries and are
//! either rebuilt after structural edits ([`ControlFlowGraph`]) or kept
//! current through targeted updates ([`DefUseManager`], [`ConstantManager`]).
//!
//! # Components
//!
//! - [`ControlFlowGraph`] - block successor/predecessor edges of one function,
//!   with a lazily computed [`DominatorTree`]
//! - [`DefUseManager`] - definition sites and reference counts for every id
//! - [`TypeManager`] - declared types by result id
//! - [`ConstantManager`] - interned constants with on-demand declaration

mod cfg;
mod constants;
mod defuse;
mod dominators;
mod types;

pub use cfg::ControlFlowGraph;
pub use constants::{ConstValue, Constant, ConstantId, ConstantManager};
pub use defuse::{DefSite, DefUseManager};
pub use dominators::{DominatorIterator, DominatorTree};
pub use types::{Type, TypeManager};
