//! The delta-debugging reduction pass.
//!
//! A [`ReductionPass`] owns one [`OpportunityFinder`] and drives it through a
//! ddmin-style schedule: try removing large contiguous chunks of the finder's
//! opportunity list first, and fall back to smaller chunks only when large
//! ones fail validation or the interestingness test. Granularity starts at
//! the full opportunity count and halves on every completed sweep, down to
//! single opportunities.
//!
//! One call to [`ReductionPass::try_apply_reduction`] is one attempt: it
//! enumerates opportunities freshly against the binary it is handed, applies
//! the chunk at the current index whose preconditions still hold, and commits
//! the result only if the serialized module both validates and satisfies the
//! caller's keep test. A failed attempt changes nothing except the pass's
//! position in its schedule.
//!
//! The schedule for a list of four opportunities, when every attempt is
//! accepted and the caller re-feeds the same binary, runs at granularities
//! 4, 4, 2, 2, 2, 1, 1, 1, 1, 1 where the second, fifth and last calls make
//! no progress (they are the sweep wrap-arounds) and the final wrap at
//! granularity one exhausts the pass.

use crate::reduce::OpportunityFinder;
use crate::spirv::{binary, TargetEnv, Word};
use crate::validate::{nop_message_consumer, validate, MessageConsumer, MessageLevel};
use crate::Result;

/// Source tag under which pass diagnostics are reported.
const REDUCTION_SOURCE: &str = "reduction";

/// A reduction pass: one finder plus the chunking state machine over it.
pub struct ReductionPass {
    /// Environment candidate binaries are validated against.
    env: TargetEnv,
    /// The finder enumerating this pass's opportunities.
    finder: Box<dyn OpportunityFinder>,
    /// Diagnostic sink.
    consumer: MessageConsumer,
    /// Whether the schedule state below has been set up.
    initialized: bool,
    /// Position of the next chunk in the opportunity list.
    index: usize,
    /// Current chunk size. Starts unbounded and is clamped to the opportunity
    /// count on every call, so the first real attempt tries everything at
    /// once.
    granularity: usize,
    /// Set once a sweep at granularity one has wrapped around.
    exhausted: bool,
}

impl ReductionPass {
    /// Creates a pass around a finder.
    ///
    /// Diagnostics are discarded until a consumer is installed with
    /// [`ReductionPass::set_message_consumer`].
    #[must_use]
    pub fn new(env: TargetEnv, finder: Box<dyn OpportunityFinder>) -> Self {
        Self {
            env,
            finder,
            consumer: nop_message_consumer(),
            initialized: false,
            index: 0,
            granularity: usize::MAX,
            exhausted: false,
        }
    }

    /// Installs the diagnostic sink.
    pub fn set_message_consumer(&mut self, consumer: MessageConsumer) {
        self.consumer = consumer;
    }

    /// Returns the name of the underlying finder.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.finder.name()
    }

    /// Returns the current chunk size, for diagnostics and tests.
    ///
    /// Meaningful only after the first [`ReductionPass::try_apply_reduction`]
    /// call; before that the schedule is not set up.
    #[must_use]
    pub const fn granularity(&self) -> usize {
        self.granularity
    }

    /// Returns `true` once the pass has completed a full sweep at granularity
    /// one and therefore has nothing further to try.
    #[must_use]
    pub const fn reached_minimum_granularity(&self) -> bool {
        self.exhausted
    }

    /// Re-arms the pass for another run over a changed module.
    ///
    /// The reducer calls this between rounds: a reduction kept by some other
    /// pass can surface new opportunities for this one.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.index = 0;
        self.granularity = usize::MAX;
        self.exhausted = false;
    }

    /// Makes one reduction attempt against `binary`.
    ///
    /// Enumerates the finder's opportunities against the decoded module,
    /// applies the precondition-surviving members of the chunk at the current
    /// index, and serializes the result. The candidate is returned only if at
    /// least one opportunity applied, the candidate validates, and `keep`
    /// accepts it; in every other case the call returns `None` and only the
    /// schedule position advances.
    ///
    /// A call that finds its index past the end of the opportunity list wraps
    /// the sweep instead of attempting anything: the index resets, the
    /// granularity halves (never below one), and a wrap at granularity one
    /// marks the pass exhausted.
    ///
    /// # Arguments
    ///
    /// * `binary` - The current best module words; never mutated
    /// * `keep` - The oracle deciding whether a validated candidate is still
    ///   interesting
    ///
    /// # Errors
    ///
    /// Returns an error only if `binary` cannot be decoded; callers feed
    /// binaries that already passed validation.
    pub fn try_apply_reduction(
        &mut self,
        binary: &[Word],
        keep: &mut dyn FnMut(&[Word]) -> bool,
    ) -> Result<Option<Vec<Word>>> {
        if !self.initialized {
            self.index = 0;
            self.granularity = usize::MAX;
            self.exhausted = false;
            self.initialized = true;
        }

        let mut module = binary::parse(binary)?;
        let opportunities = self.finder.available_opportunities(&module);
        let count = opportunities.len();
        self.granularity = self.granularity.min(count.max(1));

        if self.index >= count {
            let swept_at = self.granularity;
            self.index = 0;
            if self.granularity == 1 {
                self.exhausted = true;
            } else {
                self.granularity = (self.granularity / 2).max(1);
            }
            (*self.consumer)(
                MessageLevel::Info,
                REDUCTION_SOURCE,
                0,
                &format!(
                    "{}: sweep at granularity {swept_at} complete",
                    self.finder.name()
                ),
            );
            return Ok(None);
        }

        let end = (self.index + self.granularity).min(count);
        let chunk = &opportunities[self.index..end];
        self.index += self.granularity;

        let mut applied = 0usize;
        for opportunity in chunk {
            if opportunity.precondition_holds(&module) {
                opportunity.apply(&mut module);
                applied += 1;
            }
        }
        if applied == 0 {
            return Ok(None);
        }

        let candidate = binary::serialize(&module);
        if !validate(&candidate, self.env, &self.consumer) {
            return Ok(None);
        }
        if !keep(&candidate) {
            return Ok(None);
        }

        (*self.consumer)(
            MessageLevel::Info,
            REDUCTION_SOURCE,
            0,
            &format!(
                "{}: applied {applied} opportunities, {} words",
                self.finder.name(),
                candidate.len()
            ),
        );
        Ok(Some(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::{
        BlindlyRemoveGlobalValuesFinder, OpportunityFinder, ReductionOpportunity,
        RemoveUnreferencedInstructionFinder,
    };
    use crate::spirv::{
        BasicBlock, Function, FunctionControl, Instruction, Module, Op, Operand,
    };

    // The four-dead-stores module: stores to %9..%12 are removable, the
    // %13/%14 load-store chain is not.
    fn make_store_module() -> Module {
        let mut module = Module::new();
        module.push_global(Instruction::new(Op::TypeVoid, None, Some(2), Vec::new()));
        module.push_global(Instruction::new(
            Op::TypeFunction,
            None,
            Some(3),
            vec![Operand::Id(2)],
        ));
        module.push_global(Instruction::new(
            Op::TypeFloat,
            None,
            Some(6),
            vec![Operand::Literal(32)],
        ));
        module.push_global(Instruction::new(
            Op::TypePointer,
            None,
            Some(7),
            vec![Operand::Literal(7), Operand::Id(6)],
        ));
        module.push_global(Instruction::new(
            Op::Constant,
            Some(6),
            Some(8),
            vec![Operand::Literal(1.0f32.to_bits())],
        ));

        let mut function = Function::new(4, 2, FunctionControl::empty(), 3);
        let mut block = BasicBlock::new(5);
        for variable in 9..=13 {
            block.push(Instruction::new(
                Op::Variable,
                Some(7),
                Some(variable),
                vec![Operand::Literal(7)],
            ));
        }
        for variable in 9..=12 {
            block.push(Instruction::new(
                Op::Store,
                None,
                None,
                vec![Operand::Id(variable), Operand::Id(8)],
            ));
        }
        block.push(Instruction::new(
            Op::Load,
            Some(6),
            Some(14),
            vec![Operand::Id(13)],
        ));
        block.push(Instruction::new(
            Op::Store,
            None,
            None,
            vec![Operand::Id(13), Operand::Id(14)],
        ));
        block.push(Instruction::new(Op::Return, None, None, Vec::new()));
        function.add_block(block);
        module.add_function(function);
        module.ensure_bound_covers(14);
        module
    }

    // A finder restricted to dead stores, so the opportunity list has exactly
    // four entries for the module above.
    struct DeadStoreFinder;

    impl OpportunityFinder for DeadStoreFinder {
        fn name(&self) -> &'static str {
            "dead-stores"
        }

        fn available_opportunities(
            &self,
            module: &Module,
        ) -> Vec<Box<dyn ReductionOpportunity>> {
            RemoveUnreferencedInstructionFinder::new()
                .available_opportunities(module)
                .into_iter()
                .filter(|opportunity| opportunity.precondition_holds(module))
                .collect()
        }
    }

    fn always_keep(_: &[Word]) -> bool {
        true
    }

    #[test]
    fn test_first_call_removes_everything_at_once() {
        let words = binary::serialize(&make_store_module());
        let mut pass = ReductionPass::new(
            TargetEnv::default(),
            Box::new(RemoveUnreferencedInstructionFinder::new()),
        );

        let mut keep = always_keep;
        let reduced = pass
            .try_apply_reduction(&words, &mut keep)
            .expect("decodes")
            .expect("progress");
        assert!(reduced.len() < words.len());
        assert_eq!(pass.granularity(), 4);
    }

    #[test]
    fn test_granularity_schedule_on_refed_binary() {
        let words = binary::serialize(&make_store_module());
        let mut pass = ReductionPass::new(TargetEnv::default(), Box::new(DeadStoreFinder));

        // Feed the original binary every call so the opportunity count stays
        // at four. The sweeps run at granularities 4, 2, 1 with a no-progress
        // wrap call ending each; recorded here as (granularity after the
        // call, progress made), where a wrap shows the halved value.
        let mut trace = Vec::new();
        let mut keep = always_keep;
        while !pass.reached_minimum_granularity() {
            let outcome = pass.try_apply_reduction(&words, &mut keep).expect("decodes");
            trace.push((pass.granularity(), outcome.is_some()));
        }

        assert_eq!(
            trace,
            vec![
                (4, true),
                (2, false),
                (2, true),
                (2, true),
                (1, false),
                (1, true),
                (1, true),
                (1, true),
                (1, true),
                (1, false),
            ]
        );
    }

    #[test]
    fn test_validation_rejects_unsafe_chunks() {
        let words = binary::serialize(&make_store_module());
        let mut pass = ReductionPass::new(
            TargetEnv::default(),
            Box::new(BlindlyRemoveGlobalValuesFinder::new()),
        );

        // Every global in this module is referenced, so every chunk fails
        // validation and the binary survives unchanged.
        let mut current = words.clone();
        let mut keep = always_keep;
        while !pass.reached_minimum_granularity() {
            if let Some(next) = pass.try_apply_reduction(&current, &mut keep).expect("decodes") {
                current = next;
            }
        }
        assert_eq!(current, words);
    }

    #[test]
    fn test_keep_rejection_discards_candidate() {
        let words = binary::serialize(&make_store_module());
        let mut pass = ReductionPass::new(TargetEnv::default(), Box::new(DeadStoreFinder));

        let mut keep = |_: &[Word]| false;
        while !pass.reached_minimum_granularity() {
            assert!(pass
                .try_apply_reduction(&words, &mut keep)
                .expect("decodes")
                .is_none());
        }
    }

    #[test]
    fn test_empty_opportunity_list_exhausts_after_one_call() {
        let mut module = Module::new();
        module.push_global(Instruction::new(Op::TypeVoid, None, Some(2), Vec::new()));
        // Reference the lone type so nothing is removable.
        module.push_global(Instruction::new(
            Op::TypeFunction,
            None,
            Some(3),
            vec![Operand::Id(2)],
        ));
        module.push_global(Instruction::new(
            Op::Name,
            None,
            None,
            vec![Operand::Id(3), Operand::LiteralString("fn".into())],
        ));
        module.ensure_bound_covers(3);
        let words = binary::serialize(&module);

        let mut pass = ReductionPass::new(
            TargetEnv::default(),
            Box::new(RemoveUnreferencedInstructionFinder::new()),
        );
        let mut keep = always_keep;
        assert!(pass
            .try_apply_reduction(&words, &mut keep)
            .expect("decodes")
            .is_none());
        assert!(pass.reached_minimum_granularity());
    }

    #[test]
    fn test_reset_rearms_the_schedule() {
        let words = binary::serialize(&make_store_module());
        let mut pass = ReductionPass::new(TargetEnv::default(), Box::new(DeadStoreFinder));

        let mut keep = always_keep;
        while !pass.reached_minimum_granularity() {
            let _ = pass.try_apply_reduction(&words, &mut keep).expect("decodes");
        }
        assert!(pass.reached_minimum_granularity());

        pass.reset();
        assert!(!pass.reached_minimum_granularity());
        assert!(pass
            .try_apply_reduction(&words, &mut keep)
            .expect("decodes")
            .is_some());
    }
}
