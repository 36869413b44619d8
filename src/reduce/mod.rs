//! Delta-debugging reduction of shader module binaries.
//!
//! The framework shrinks a module while preserving two properties: the result
//! must still validate, and it must still satisfy an externally supplied
//! interestingness predicate, typically "still triggers the bug being
//! reported". It is organized in three layers:
//!
//! - [`ReductionOpportunity`] / [`OpportunityFinder`] - one candidate edit,
//!   and the enumeration of all currently available edits of one kind
//! - [`ReductionPass`] - the ddmin chunking state machine over one finder:
//!   large chunks first, halving granularity as sweeps stop producing kept
//!   reductions
//! - [`Reducer`] - the session driver: passes run in rounds against the best
//!   binary so far, under a global attempt budget
//!
//! Failed attempts are ordinary outcomes throughout: a chunk that breaks
//! validation or loses interestingness is discarded and the schedule simply
//! moves on. Errors are reserved for broken caller preconditions.
//!
//! # Examples
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
//!     // e.g. feed `candidate` to the compiler under test and check that it
//!     // still crashes.
//!     candidate.len() > 5
//! });
//! reducer.add_pass(Box::new(RemoveUnreferencedInstructionFinder::new()));
//!
//! let outcome = reducer.run(words, &ReducerOptions::default())?;
//! println!("reduced to {} words ({:?})", outcome.binary.len(), outcome.status);
//! # Ok::<(), spvshrink::Error>(())
//! ```

mod finder;
mod opportunity;
mod pass;
mod reducer;

pub use finder::{
    BlindlyRemoveGlobalValuesFinder, OpportunityFinder, RemoveUnreferencedInstructionFinder,
};
pub use opportunity::{InstructionLocation, ReductionOpportunity, RemoveInstruction};
pub use pass::ReductionPass;
pub use reducer::{
    InterestingnessFunction, ReducerOptions, ReductionOutcome, ReductionResultStatus, Reducer,
};
