//! The reduction driver.
//!
//! A [`Reducer`] owns a sequence of [`ReductionPass`]es and shrinks a module
//! binary while preserving validity and an externally supplied interestingness
//! property. Each pass runs to exhaustion against the current best binary;
//! after a round in which any pass made progress, all passes re-arm and
//! another round runs, because one pass's removals can expose opportunities
//! for another. A round without progress terminates the session cleanly with
//! the best binary found so far.
//!
//! The interestingness predicate is the hook for bug-preserving reduction
//! workflows: it is handed every validated candidate together with a running
//! attempt counter and decides whether the candidate still exhibits the
//! behavior being preserved. The reducer makes no assumption about what it
//! checks.

use crate::reduce::{OpportunityFinder, ReductionPass};
use crate::spirv::{TargetEnv, Word};
use crate::validate::{nop_message_consumer, validate, MessageConsumer, MessageLevel};
use crate::{Error, Result};

/// Source tag under which reducer diagnostics are reported.
const REDUCER_SOURCE: &str = "reducer";

/// Oracle deciding whether a candidate binary still exhibits the property
/// being preserved. The second argument is the number of reduction attempts
/// made before this one.
pub type InterestingnessFunction = Box<dyn Fn(&[Word], u32) -> bool>;

/// Tunable limits for one reduction session.
#[derive(Debug, Clone, Copy)]
pub struct ReducerOptions {
    step_limit: u32,
}

impl ReducerOptions {
    /// Default maximum number of reduction attempts per session.
    pub const DEFAULT_STEP_LIMIT: u32 = 250;

    /// Creates options with the default step limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            step_limit: Self::DEFAULT_STEP_LIMIT,
        }
    }

    /// Sets the maximum number of reduction attempts.
    #[must_use]
    pub const fn with_step_limit(mut self, step_limit: u32) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Returns the maximum number of reduction attempts.
    #[must_use]
    pub const fn step_limit(&self) -> u32 {
        self.step_limit
    }
}

impl Default for ReducerOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// How a reduction session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionResultStatus {
    /// No pass could make further progress; the result is fully reduced with
    /// respect to the registered passes.
    Complete,
    /// The attempt budget ran out; the result is the best binary found so
    /// far.
    ReachedStepLimit,
    /// The input binary failed validation; nothing was attempted.
    InitialStateInvalid,
    /// The input binary failed the interestingness test; nothing was
    /// attempted.
    InitialStateNotInteresting,
}

/// The result of one reduction session.
#[derive(Debug, Clone)]
pub struct ReductionOutcome {
    /// How the session ended.
    pub status: ReductionResultStatus,
    /// The best binary: reduced on success, the unchanged input when the
    /// initial state was rejected.
    pub binary: Vec<Word>,
}

/// Orchestrates reduction passes over a module binary.
///
/// # Examples
///
/// ```rust
/// use spvshrink::reduce::{Reducer, ReducerOptions, RemoveUnreferencedInstructionFinder};
/// use spvshrink::spirv::{binary, Module, TargetEnv};
///
/// let module = Module::new();
/// let words = binary::serialize(&module);
///
/// let mut reducer = Reducer::new(TargetEnv::default());
/// reducer.set_interestingness_function(|_binary, _attempt| true);
/// reducer.add_pass(Box::new(RemoveUnreferencedInstructionFinder::new()));
/// let outcome = reducer.run(words, &ReducerOptions::default())?;
/// # Ok::<(), spvshrink::Error>(())
/// ```
pub struct Reducer {
    env: TargetEnv,
    consumer: MessageConsumer,
    interestingness: Option<InterestingnessFunction>,
    passes: Vec<ReductionPass>,
}

impl Reducer {
    /// Creates a reducer with no passes and no interestingness function.
    #[must_use]
    pub fn new(env: TargetEnv) -> Self {
        Self {
            env,
            consumer: nop_message_consumer(),
            interestingness: None,
            passes: Vec::new(),
        }
    }

    /// Installs the diagnostic sink, shared with every registered pass.
    pub fn set_message_consumer(&mut self, consumer: MessageConsumer) {
        for pass in &mut self.passes {
            pass.set_message_consumer(consumer.clone());
        }
        self.consumer = consumer;
    }

    /// Installs the interestingness oracle.
    pub fn set_interestingness_function<F>(&mut self, function: F)
    where
        F: Fn(&[Word], u32) -> bool + 'static,
    {
        self.interestingness = Some(Box::new(function));
    }

    /// Registers a reduction pass around `finder`. Passes run in registration
    /// order within each round.
    pub fn add_pass(&mut self, finder: Box<dyn OpportunityFinder>) {
        let mut pass = ReductionPass::new(self.env, finder);
        pass.set_message_consumer(self.consumer.clone());
        self.passes.push(pass);
    }

    /// Runs the session to completion.
    ///
    /// The input is validated and checked for interestingness first; a
    /// rejected input terminates immediately with the corresponding status
    /// and the input binary unchanged. Afterwards passes run in rounds until
    /// either a full round makes no progress ([`ReductionResultStatus::Complete`])
    /// or the attempt budget runs out ([`ReductionResultStatus::ReachedStepLimit`]).
    /// Both terminations are clean outcomes, not errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if no interestingness function
    /// has been installed. Decode failures mid-session also surface as
    /// errors, but cannot occur for binaries that passed validation.
    pub fn run(&mut self, binary: Vec<Word>, options: &ReducerOptions) -> Result<ReductionOutcome> {
        let Self {
            env,
            consumer,
            interestingness,
            passes,
        } = self;
        let Some(interestingness) = interestingness.as_ref() else {
            return Err(Error::InvariantViolation(
                "reducer run without an interestingness function".to_string(),
            ));
        };

        if !validate(&binary, *env, consumer) {
            (**consumer)(
                MessageLevel::Error,
                REDUCER_SOURCE,
                0,
                "initial binary is invalid",
            );
            return Ok(ReductionOutcome {
                status: ReductionResultStatus::InitialStateInvalid,
                binary,
            });
        }

        let mut attempts: u32 = 0;
        if !interestingness(&binary, attempts) {
            (**consumer)(
                MessageLevel::Error,
                REDUCER_SOURCE,
                0,
                "initial binary is not interesting",
            );
            return Ok(ReductionOutcome {
                status: ReductionResultStatus::InitialStateNotInteresting,
                binary,
            });
        }
        attempts += 1;

        let mut current = binary;
        loop {
            let mut round_progress = false;
            for pass in passes.iter_mut() {
                pass.reset();
                while !pass.reached_minimum_granularity() {
                    if attempts >= options.step_limit() {
                        (**consumer)(
                            MessageLevel::Info,
                            REDUCER_SOURCE,
                            0,
                            &format!("step limit {} reached", options.step_limit()),
                        );
                        return Ok(ReductionOutcome {
                            status: ReductionResultStatus::ReachedStepLimit,
                            binary: current,
                        });
                    }
                    let counter = attempts;
                    attempts += 1;
                    let mut keep =
                        |candidate: &[Word]| (interestingness)(candidate, counter);
                    if let Some(next) = pass.try_apply_reduction(&current, &mut keep)? {
                        debug_assert!(next.len() <= current.len());
                        current = next;
                        round_progress = true;
                    }
                }
            }
            if !round_progress {
                break;
            }
        }

        (**consumer)(
            MessageLevel::Info,
            REDUCER_SOURCE,
            0,
            &format!("reduction complete after {attempts} attempts"),
        );
        Ok(ReductionOutcome {
            status: ReductionResultStatus::Complete,
            binary: current,
        })
    }
}
