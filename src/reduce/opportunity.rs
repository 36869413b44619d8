//! Single candidate simplifications of a module.
//!
//! A [`ReductionOpportunity`] is a value object describing one local edit a
//! reduction pass may try: it carries everything needed to locate the edit in
//! the module, a precondition check, and the edit itself. Opportunities are
//! created fresh by a finder on every reduction attempt and discarded after
//! one use, applied or not.
//!
//! Preconditions matter because opportunities in the same chunk are applied in
//! sequence against the live module: an earlier removal can make a later
//! opportunity in the chunk stale. A stale opportunity is skipped, never an
//! error.

use crate::spirv::{Instruction, Module, Word};

/// Where an instruction targeted by an opportunity lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionLocation {
    /// The module's types/constants/variables section.
    Global,
    /// Inside a basic block of a function body.
    Body {
        /// The containing function's result id.
        function: Word,
        /// The containing block's label id.
        block: Word,
    },
}

/// One candidate simplification.
///
/// Implementations locate their target by value, not by reference: they hold
/// ids and instruction snapshots rather than pointers into the module, so an
/// opportunity stays valid to *query* even after the module has changed under
/// it. [`ReductionOpportunity::precondition_holds`] is the staleness check;
/// [`ReductionOpportunity::apply`] must only be called when it passes.
pub trait ReductionOpportunity {
    /// Returns `true` if the opportunity is still applicable to the module's
    /// current state.
    fn precondition_holds(&self, module: &Module) -> bool;

    /// Performs the simplification.
    ///
    /// Callers check [`ReductionOpportunity::precondition_holds`] first; on a
    /// stale opportunity this is a no-op rather than a panic, keeping chunk
    /// application total.
    fn apply(&self, module: &mut Module);
}

/// Removes one instruction from the module.
///
/// The target is identified by its location and an instruction snapshot; the
/// snapshot is the match key, which also covers instructions without a result
/// id such as `OpStore`. Applying removes the first instruction at the
/// location that equals the snapshot.
#[derive(Debug, Clone)]
pub struct RemoveInstruction {
    location: InstructionLocation,
    instruction: Instruction,
}

impl RemoveInstruction {
    /// Creates an opportunity to remove `instruction` at `location`.
    #[must_use]
    pub fn new(location: InstructionLocation, instruction: Instruction) -> Self {
        Self {
            location,
            instruction,
        }
    }

    /// Returns the target location.
    #[must_use]
    pub const fn location(&self) -> InstructionLocation {
        self.location
    }

    /// Returns the instruction snapshot being matched.
    #[must_use]
    pub const fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    fn find<'a>(&self, module: &'a Module) -> Option<&'a Instruction> {
        match self.location {
            InstructionLocation::Global => module
                .globals()
                .iter()
                .find(|candidate| **candidate == self.instruction),
            InstructionLocation::Body { function, block } => module
                .function(function)?
                .block(block)?
                .instructions()
                .iter()
                .find(|candidate| **candidate == self.instruction),
        }
    }
}

impl ReductionOpportunity for RemoveInstruction {
    fn precondition_holds(&self, module: &Module) -> bool {
        self.find(module).is_some()
    }

    fn apply(&self, module: &mut Module) {
        match self.location {
            InstructionLocation::Global => {
                if let Some(position) = module
                    .globals()
                    .iter()
                    .position(|candidate| *candidate == self.instruction)
                {
                    module.globals_mut().remove(position);
                }
            }
            InstructionLocation::Body { function, block } => {
                let Some(block) = module
                    .function_mut(function)
                    .and_then(|f| f.block_mut(block))
                else {
                    return;
                };
                if let Some(position) = block
                    .instructions()
                    .iter()
                    .position(|candidate| *candidate == self.instruction)
                {
                    block.instructions_mut().remove(position);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::{BasicBlock, Function, FunctionControl, Op, Operand};

    fn make_module() -> Module {
        let mut module = Module::new();
        module.push_global(Instruction::new(Op::TypeVoid, None, Some(2), Vec::new()));
        module.push_global(Instruction::new(
            Op::TypeFunction,
            None,
            Some(3),
            vec![Operand::Id(2)],
        ));
        module.push_global(Instruction::new(Op::TypeBool, None, Some(6), Vec::new()));

        let mut function = Function::new(4, 2, FunctionControl::empty(), 3);
        let mut block = BasicBlock::new(5);
        block.push(Instruction::new(Op::Undef, Some(6), Some(7), Vec::new()));
        block.push(Instruction::new(Op::Return, None, None, Vec::new()));
        function.add_block(block);
        module.add_function(function);
        module.ensure_bound_covers(7);
        module
    }

    #[test]
    fn test_remove_global() {
        let mut module = make_module();
        let target = module.global(6).unwrap().clone();
        let opportunity = RemoveInstruction::new(InstructionLocation::Global, target);

        assert!(opportunity.precondition_holds(&module));
        opportunity.apply(&mut module);
        assert!(module.global(6).is_none());
        assert!(!opportunity.precondition_holds(&module));
    }

    #[test]
    fn test_remove_body_instruction() {
        let mut module = make_module();
        let undef = Instruction::new(Op::Undef, Some(6), Some(7), Vec::new());
        let opportunity = RemoveInstruction::new(
            InstructionLocation::Body {
                function: 4,
                block: 5,
            },
            undef,
        );

        assert!(opportunity.precondition_holds(&module));
        opportunity.apply(&mut module);

        let block = module.function(4).unwrap().block(5).unwrap();
        assert_eq!(block.instructions().len(), 2);
        assert_eq!(block.instructions()[1].op(), Op::Return);
        assert!(!opportunity.precondition_holds(&module));
    }

    #[test]
    fn test_stale_apply_is_a_no_op() {
        let mut module = make_module();
        let target = module.global(6).unwrap().clone();
        let first = RemoveInstruction::new(InstructionLocation::Global, target.clone());
        let second = RemoveInstruction::new(InstructionLocation::Global, target);

        first.apply(&mut module);
        let globals_after_first = module.globals().len();
        assert!(!second.precondition_holds(&module));
        second.apply(&mut module);
        assert_eq!(module.globals().len(), globals_after_first);
    }

    #[test]
    fn test_missing_block_is_stale() {
        let module = make_module();
        let opportunity = RemoveInstruction::new(
            InstructionLocation::Body {
                function: 4,
                block: 99,
            },
            Instruction::new(Op::Return, None, None, Vec::new()),
        );
        assert!(!opportunity.precondition_holds(&module));
    }
}
