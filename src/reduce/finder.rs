//! Enumeration of reduction opportunities.
//!
//! An [`OpportunityFinder`] inspects the current module and lists every edit
//! of its kind that could be tried right now. Finders never mutate anything
//! and never judge whether an edit is safe; the pass applies a chunk and lets
//! validation and the interestingness oracle decide. Enumeration order is
//! module order and therefore deterministic, which the chunking state machine
//! relies on.

use std::collections::HashMap;

use crate::analysis::DefUseManager;
use crate::reduce::{InstructionLocation, ReductionOpportunity, RemoveInstruction};
use crate::spirv::{Instruction, Module, Op, Operand, Word};

/// Enumerates the opportunities of one kind currently available in a module.
pub trait OpportunityFinder {
    /// Unique name for diagnostics.
    fn name(&self) -> &'static str;

    /// Lists every opportunity this finder sees in the module's current
    /// state, in module order.
    ///
    /// Called freshly on every reduction attempt; results must not be cached
    /// by implementations, since the module changes between attempts.
    fn available_opportunities(&self, module: &Module) -> Vec<Box<dyn ReductionOpportunity>>;
}

/// Finds instructions that nothing in the module references.
///
/// Covered targets:
/// - global declarations whose result id has a zero reference count; debug
///   names and decorations count as references, so anything listed here is
///   referenced by nothing at all
/// - body instructions with an unreferenced result id, excluding opcodes with
///   side effects (`OpFunctionCall`, `OpExtInst`) and block structure
///   (terminators and merge declarations)
/// - `OpStore`s to pointers whose every reference is itself a store target,
///   so no load or other consumer can observe the stored value
#[derive(Debug, Default)]
pub struct RemoveUnreferencedInstructionFinder;

impl RemoveUnreferencedInstructionFinder {
    /// Creates the finder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn body_instruction_is_removable(instruction: &Instruction, def_use: &DefUseManager) -> bool {
        let Some(id) = instruction.result_id() else {
            return false;
        };
        if !def_use.is_unreferenced(id) {
            return false;
        }
        !matches!(
            instruction.op(),
            Op::FunctionCall | Op::ExtInst | Op::LoopMerge | Op::SelectionMerge
        ) && !instruction.is_terminator()
    }
}

impl OpportunityFinder for RemoveUnreferencedInstructionFinder {
    fn name(&self) -> &'static str {
        "remove-unreferenced-instructions"
    }

    fn available_opportunities(&self, module: &Module) -> Vec<Box<dyn ReductionOpportunity>> {
        let def_use = DefUseManager::build(module);

        // References to an id from the pointer position of a store. A store
        // is dead when these account for every reference to its pointer.
        let mut store_target_counts: HashMap<Word, usize> = HashMap::new();
        for function in module.functions() {
            for block in function.blocks() {
                for instruction in block.instructions() {
                    if instruction.op() == Op::Store {
                        if let Some(Operand::Id(pointer)) = instruction.operand(0) {
                            *store_target_counts.entry(*pointer).or_insert(0) += 1;
                        }
                    }
                }
            }
        }

        let mut opportunities: Vec<Box<dyn ReductionOpportunity>> = Vec::new();

        for instruction in module.globals() {
            if let Some(id) = instruction.result_id() {
                if def_use.is_unreferenced(id) {
                    opportunities.push(Box::new(RemoveInstruction::new(
                        InstructionLocation::Global,
                        instruction.clone(),
                    )));
                }
            }
        }

        for function in module.functions() {
            for block in function.blocks() {
                let location = InstructionLocation::Body {
                    function: function.id(),
                    block: block.id(),
                };
                for instruction in block.instructions() {
                    let removable = if instruction.op() == Op::Store {
                        instruction
                            .operand(0)
                            .and_then(Operand::id)
                            .is_some_and(|pointer| {
                                def_use.use_count(pointer)
                                    == store_target_counts.get(&pointer).copied().unwrap_or(0)
                            })
                    } else {
                        Self::body_instruction_is_removable(instruction, &def_use)
                    };
                    if removable {
                        opportunities.push(Box::new(RemoveInstruction::new(
                            location,
                            instruction.clone(),
                        )));
                    }
                }
            }
        }

        opportunities
    }
}

/// Finds every global declaration, referenced or not.
///
/// Removing a referenced declaration produces an invalid module; the pass's
/// validation step then discards the chunk. The finder exists to exercise
/// exactly that path and mirrors the reduction framework's property that a
/// finder may propose unsafe edits freely.
#[derive(Debug, Default)]
pub struct BlindlyRemoveGlobalValuesFinder;

impl BlindlyRemoveGlobalValuesFinder {
    /// Creates the finder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl OpportunityFinder for BlindlyRemoveGlobalValuesFinder {
    fn name(&self) -> &'static str {
        "blindly-remove-global-values"
    }

    fn available_opportunities(&self, module: &Module) -> Vec<Box<dyn ReductionOpportunity>> {
        module
            .globals()
            .iter()
            .filter(|instruction| instruction.result_id().is_some())
            .map(|instruction| {
                Box::new(RemoveInstruction::new(
                    InstructionLocation::Global,
                    instruction.clone(),
                )) as Box<dyn ReductionOpportunity>
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::{BasicBlock, Function, FunctionControl};

    // void main() with local float variables %9..%13; %9..%12 are only ever
    // stored to, %13 feeds a load whose value is stored back.
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

    #[test]
    fn test_unreferenced_finder_lists_dead_stores() {
        let module = make_store_module();
        let finder = RemoveUnreferencedInstructionFinder::new();
        let opportunities = finder.available_opportunities(&module);

        // Exactly the four stores to %9..%12; the store to %13 is kept alive
        // by the load, and every other instruction is referenced.
        assert_eq!(opportunities.len(), 4);
        for opportunity in &opportunities {
            assert!(opportunity.precondition_holds(&module));
        }
    }

    #[test]
    fn test_unreferenced_finder_lists_dead_global() {
        let mut module = make_store_module();
        module.push_global(Instruction::new(
            Op::Constant,
            Some(6),
            Some(20),
            vec![Operand::Literal(2.0f32.to_bits())],
        ));
        module.ensure_bound_covers(20);

        let finder = RemoveUnreferencedInstructionFinder::new();
        // The dead constant plus the four dead stores.
        assert_eq!(finder.available_opportunities(&module).len(), 5);
    }

    #[test]
    fn test_unreferenced_finder_skips_referenced_results() {
        let module = make_store_module();
        let finder = RemoveUnreferencedInstructionFinder::new();

        // %14 is referenced by the final store, so the load is not listed.
        let mut probe = module.clone();
        for opportunity in finder.available_opportunities(&module) {
            opportunity.apply(&mut probe);
        }
        let block = probe.function(4).unwrap().block(5).unwrap();
        assert!(block
            .instructions()
            .iter()
            .any(|instruction| instruction.op() == Op::Load));
    }

    #[test]
    fn test_blind_finder_lists_every_global_value() {
        let module = make_store_module();
        let finder = BlindlyRemoveGlobalValuesFinder::new();

        // %2, %3, %6, %7 and %8 all carry result ids.
        assert_eq!(finder.available_opportunities(&module).len(), 5);
    }

    #[test]
    fn test_enumeration_is_fresh_per_call() {
        let mut module = make_store_module();
        let finder = RemoveUnreferencedInstructionFinder::new();

        let first = finder.available_opportunities(&module).remove(0);
        first.apply(&mut module);

        // Still four: three remaining dead stores, plus %9 itself, which the
        // removed store was the last reference to.
        assert_eq!(finder.available_opportunities(&module).len(), 4);
        assert!(!first.precondition_holds(&module));
    }
}
