// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # spvshrink
//!
//! [![Crates.io](https://img.shields.io/crates/v/spvshrink.svg)](https://crates.io/crates/spvshrink)
//! [![Documentation](https://docs.rs/spvshrink/badge.svg)](https://docs.rs/spvshrink)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/spvshrink/blob/main/LICENSE-APACHE)
//!
//! A library for shrinking and transforming SPIR-V shader modules. Built in pure Rust,
//! `spvshrink` decodes a module binary into a typed in-memory representation and provides
//! three compiler-grade transformations over it: delta-debugging reduction under an
//! external interestingness oracle, constant folding with IEEE-754 semantics behind an
//! ordered rule table, and loop restructuring (dedicated exits, loop-closed SSA, loop
//! cloning) with dominator-tree-backed bookkeeping.
//!
//! ## Features
//!
//! - **🗜️ Delta-debugging reduction** - Shrink a failing shader while preserving validity
//!   and a caller-supplied "still interesting" property, coarse chunks first
//! - **🧮 Constant folding** - Ordered per-opcode rule tables with exact IEEE-754
//!   comparison semantics, including the NaN behavior of ordered/unordered predicates
//! - **🔁 Loop restructuring** - Dedicated exit creation, loop-closed SSA construction
//!   and two-pass loop cloning with consistent id remapping
//! - **📊 Module analyses** - Control-flow graphs, Lengauer-Tarjan dominator trees,
//!   def-use tracking and interned type/constant pools
//! - **🔧 Faithful round trips** - Instructions outside the modeled opcode subset are
//!   carried verbatim, so any module survives decode and re-encode bit for bit
//! - **🛡️ Memory safe** - No pointer graphs; blocks, loops and instructions reference
//!   each other through ids and arena handles
//!
//! ## Quick Start
//!
//! Add `spvshrink` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! spvshrink = "0.2"
//! ```
//!
//! Reduce a module while an external property holds:
//!
//! ```rust,no_run
//! use spvshrink::reduce::{Reducer, ReducerOptions, RemoveUnreferencedInstructionFinder};
//! use spvshrink::spirv::{binary, TargetEnv};
//!
//! let module = binary::read_file("crash.spv")?;
//! let words = binary::serialize(&module);
//!
//! let mut reducer = Reducer::new(TargetEnv::default());
//! reducer.set_interestingness_function(|candidate, _attempt| {
//!     // Feed `candidate` to the system under test; keep it while the bug
//!     // still reproduces.
//!     candidate.len() > 5
//! });
//! reducer.add_pass(Box::new(RemoveUnreferencedInstructionFinder::new()));
//!
//! let outcome = reducer.run(words, &ReducerOptions::default())?;
//! println!("reduced to {} words", outcome.binary.len());
//! # Ok::<(), spvshrink::Error>(())
//! ```
//!
//! ## Architecture
//!
//! The [`spirv`] module is the substrate: a typed, mutable model of a module
//! (instructions, basic blocks, functions, ordered global sections) plus the
//! word-level codec. Everything else is layered on top of it:
//!
//! - [`analysis`] derives queryable state from a module: control-flow graphs
//!   with lazy dominator trees, def-use information, and interning managers
//!   for types and constants
//! - [`fold`] evaluates instructions whose operands are compile-time constants
//! - [`loops`] discovers natural loops and restructures them
//! - [`reduce`] drives delta-debugging reduction sessions
//! - [`validate`] is the structural oracle the reduction framework accepts or
//!   rejects candidates with
//!
//! Expected outcomes are never errors anywhere in the crate: a rule that cannot
//! fold returns `None`, a reduction chunk that breaks the module is discarded,
//! and a session that runs out of opportunities terminates cleanly. [`Error`]
//! is reserved for malformed binaries and broken caller preconditions.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// This module provides a curated selection of the most frequently used types
/// from across the spvshrink library, allowing for convenient glob imports.
///
/// # Example
///
/// ```rust,no_run
/// use spvshrink::prelude::*;
///
/// let module = binary::read_file("shader.spv")?;
/// println!("{} functions", module.functions().len());
/// # Ok::<(), spvshrink::Error>(())
/// ```
pub mod prelude;

/// The in-memory SPIR-V module model and its binary codec.
///
/// This module provides the typed representation every transformation in the
/// crate operates on, along with the word-level decode/encode layer:
///
/// - **Instruction model**: [`spirv::Instruction`] with typed [`spirv::Operand`]s,
///   distinguishing id references from literals
/// - **Structure**: [`spirv::BasicBlock`], [`spirv::Function`] and [`spirv::Module`]
///   with its ordered global sections
/// - **Binary codec**: [`spirv::binary`] for parsing and serializing word streams
///   and loading `.spv` files
/// - **Opcode subset**: [`spirv::Op`] models the instructions the transformations
///   understand; everything else round-trips as [`spirv::Op::Unknown`]
///
/// # Examples
///
/// ```rust,no_run
/// use spvshrink::spirv::{binary, Module};
///
/// let module = binary::read_file("shader.spv")?;
/// for function in module.functions() {
///     println!("function %{} has {} blocks", function.id(), function.blocks().len());
/// }
/// # Ok::<(), spvshrink::Error>(())
/// ```
pub mod spirv;

/// Derived analyses over a module: CFG, dominators, def-use, interning pools.
///
/// Everything here is computed from a [`spirv::Module`] and indexes it for
/// fast queries:
///
/// - [`analysis::ControlFlowGraph`] - block edges of one function with a lazily
///   computed [`analysis::DominatorTree`]
/// - [`analysis::DefUseManager`] - definition sites and reference counts,
///   maintained through targeted incremental updates
/// - [`analysis::TypeManager`] / [`analysis::ConstantManager`] - interned type
///   and constant pools; semantically identical constants share one handle
pub mod analysis;

/// Constant folding: ordered per-opcode rule tables.
///
/// [`fold::FoldingRules`] maps each opcode to an ordered list of
/// [`fold::FoldingRule`] closures; the first rule to produce a constant wins.
/// The standard catalogue covers composite construction and extraction, vector
/// shuffles, float/int conversions, binary float arithmetic and the full set
/// of ordered/unordered float comparisons with exact NaN semantics.
pub mod fold;

/// Loop discovery, loop-closed SSA construction and loop cloning.
///
/// [`loops::LoopNest`] discovers the natural loops of a function and their
/// nesting. [`loops::LoopUtils`] restructures one loop: dedicating its exits,
/// rewriting out-of-loop uses through phis and producing deep clones with
/// fresh ids.
pub mod loops;

/// Delta-debugging reduction of module binaries.
///
/// [`reduce::Reducer`] drives [`reduce::ReductionPass`]es over a binary,
/// keeping only candidates that validate and stay interesting. Finders
/// enumerate candidate edits; the pass schedules them ddmin-style, large
/// chunks first.
pub mod reduce;

/// Structural validation used as the reduction oracle.
///
/// [`validate::validate`] decodes a binary and checks the structural rules the
/// rest of the crate relies on, reporting violations through a
/// [`validate::MessageConsumer`] and returning a plain boolean.
pub mod validate;

/// The generic Error type for all errors in this library.
///
/// See [`Error`] for the variants. Expected outcomes - an instruction that
/// cannot fold, a reduction chunk that fails validation - are communicated
/// through return values, never through this type.
///
/// # Example
///
/// ```rust
/// use spvshrink::{spirv::binary, Error};
///
/// match binary::parse(&[]) {
///     Ok(module) => println!("{} functions", module.functions().len()),
///     Err(Error::Empty) => println!("nothing to decode"),
///     Err(e) => println!("error: {e}"),
/// }
/// ```
pub use error::Error;

/// A specialized `Result` type for spvshrink operations.
///
/// This type alias is used throughout the library for any operation that
/// can fail, providing consistent error handling via [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
