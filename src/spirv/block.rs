//! Basic blocks.

use std::fmt;

use crate::spirv::{Instruction, Op, Operand, Word};

/// A basic block: a label id followed by an ordered instruction sequence.
///
/// The label is held separately from the instruction list, so the list starts
/// with the leading phis (if any) and ends with the block's terminator. The
/// word codec materializes the `OpLabel` on serialization.
///
/// Predecessor/successor relationships are not stored here; they are derived
/// from terminators by [`crate::analysis::ControlFlowGraph`].
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// The block's label id.
    label: Word,

    /// Instructions in order: phis first, one terminator last.
    instructions: Vec<Instruction>,
}

impl BasicBlock {
    /// Creates an empty block with the given label id.
    #[must_use]
    pub fn new(label: Word) -> Self {
        Self {
            label,
            instructions: Vec::new(),
        }
    }

    /// Returns the block's label id.
    #[must_use]
    pub const fn id(&self) -> Word {
        self.label
    }

    /// Returns the instruction list.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns the instruction list mutably.
    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Appends an instruction at the end of the block.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Returns the block's terminator, if the block is complete.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    /// Returns the block's terminator mutably, if the block is complete.
    pub fn terminator_mut(&mut self) -> Option<&mut Instruction> {
        self.instructions.last_mut().filter(|i| i.is_terminator())
    }

    /// Returns the structured merge instruction (`OpLoopMerge` or
    /// `OpSelectionMerge`) sitting just before the terminator, if present.
    #[must_use]
    pub fn merge_instruction(&self) -> Option<&Instruction> {
        let len = self.instructions.len();
        if len < 2 {
            return None;
        }
        let candidate = &self.instructions[len - 2];
        matches!(candidate.op(), Op::LoopMerge | Op::SelectionMerge).then_some(candidate)
    }

    /// Returns the structured merge instruction mutably, if present.
    pub fn merge_instruction_mut(&mut self) -> Option<&mut Instruction> {
        let len = self.instructions.len();
        if len < 2 {
            return None;
        }
        let candidate = &mut self.instructions[len - 2];
        matches!(candidate.op(), Op::LoopMerge | Op::SelectionMerge).then_some(candidate)
    }

    /// Returns the number of leading phi instructions.
    #[must_use]
    pub fn phi_count(&self) -> usize {
        self.instructions
            .iter()
            .take_while(|i| i.op() == Op::Phi)
            .count()
    }

    /// Iterates over the block's leading phi instructions.
    pub fn phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().take_while(|i| i.op() == Op::Phi)
    }

    /// Iterates mutably over the block's leading phi instructions.
    pub fn phis_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.instructions
            .iter_mut()
            .take_while(|i| i.op() == Op::Phi)
    }

    /// Inserts a phi instruction at the end of the leading phi run.
    pub fn insert_phi(&mut self, phi: Instruction) {
        let position = self.phi_count();
        self.instructions.insert(position, phi);
    }

    /// Returns the successor block ids named by the terminator, in operand
    /// order. Blocks ending in `OpReturn`, `OpReturnValue`, `OpKill` or
    /// `OpUnreachable` have none.
    #[must_use]
    pub fn successor_ids(&self) -> Vec<Word> {
        let Some(terminator) = self.terminator() else {
            return Vec::new();
        };
        match terminator.op() {
            Op::Branch => terminator.operand(0).and_then(Operand::id).into_iter().collect(),
            Op::BranchConditional => terminator
                .operands()
                .iter()
                .skip(1)
                .take(2)
                .filter_map(Operand::id)
                .collect(),
            Op::Switch => {
                let operands = terminator.operands();
                let mut targets = Vec::new();
                if let Some(default) = operands.get(1).and_then(Operand::id) {
                    targets.push(default);
                }
                // Case pairs are (literal, label) starting at operand 2.
                let mut index = 3;
                while let Some(target) = operands.get(index).and_then(Operand::id) {
                    targets.push(target);
                    index += 2;
                }
                targets
            }
            _ => Vec::new(),
        }
    }

    /// Redirects every terminator edge targeting `from` to target `to`
    /// instead. Returns `true` if any edge was rewritten.
    ///
    /// Only branch-target operand positions are touched; the condition of an
    /// `OpBranchConditional` and the selector of an `OpSwitch` are left alone.
    pub fn replace_successor(&mut self, from: Word, to: Word) -> bool {
        let Some(terminator) = self.terminator_mut() else {
            return false;
        };
        let target_positions: Vec<usize> = match terminator.op() {
            Op::Branch => vec![0],
            Op::BranchConditional => vec![1, 2],
            Op::Switch => {
                let mut positions = vec![1];
                let mut index = 3;
                while index < terminator.operands().len() {
                    positions.push(index);
                    index += 2;
                }
                positions
            }
            _ => return false,
        };

        let mut rewritten = false;
        for position in target_positions {
            if terminator.operand(position).and_then(Operand::id) == Some(from) {
                terminator.set_operand(position, Operand::Id(to));
                rewritten = true;
            }
        }
        rewritten
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "%{} = OpLabel", self.label)?;
        for instruction in &self.instructions {
            writeln!(f, "  {instruction}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_block(label: Word, terminator: Instruction) -> BasicBlock {
        let mut block = BasicBlock::new(label);
        block.push(terminator);
        block
    }

    #[test]
    fn test_successors_branch() {
        let block = make_block(1, Instruction::branch(7));
        assert_eq!(block.successor_ids(), vec![7]);
    }

    #[test]
    fn test_successors_conditional() {
        let terminator = Instruction::new(
            Op::BranchConditional,
            None,
            None,
            vec![Operand::Id(9), Operand::Id(2), Operand::Id(3)],
        );
        let block = make_block(1, terminator);
        assert_eq!(block.successor_ids(), vec![2, 3]);
    }

    #[test]
    fn test_successors_switch() {
        let terminator = Instruction::new(
            Op::Switch,
            None,
            None,
            vec![
                Operand::Id(9),
                Operand::Id(4),
                Operand::Literal(0),
                Operand::Id(5),
                Operand::Literal(1),
                Operand::Id(6),
            ],
        );
        let block = make_block(1, terminator);
        assert_eq!(block.successor_ids(), vec![4, 5, 6]);
    }

    #[test]
    fn test_successors_return() {
        let block = make_block(1, Instruction::new(Op::Return, None, None, Vec::new()));
        assert!(block.successor_ids().is_empty());
    }

    #[test]
    fn test_replace_successor_keeps_condition() {
        let terminator = Instruction::new(
            Op::BranchConditional,
            None,
            None,
            // Condition %2 happens to collide with the true target %2.
            vec![Operand::Id(2), Operand::Id(2), Operand::Id(3)],
        );
        let mut block = make_block(1, terminator);
        assert!(block.replace_successor(2, 8));
        assert_eq!(
            block.terminator().unwrap().operands(),
            &[Operand::Id(2), Operand::Id(8), Operand::Id(3)]
        );
    }

    #[test]
    fn test_phi_run() {
        let mut block = BasicBlock::new(1);
        block.push(Instruction::phi(3, 10, &[(4, 2)]));
        block.push(Instruction::new(
            Op::IAdd,
            Some(3),
            Some(11),
            vec![Operand::Id(10), Operand::Id(10)],
        ));
        block.push(Instruction::branch(2));

        assert_eq!(block.phi_count(), 1);
        block.insert_phi(Instruction::phi(3, 12, &[(5, 2)]));
        assert_eq!(block.phi_count(), 2);
        // The new phi lands after the existing one, before the add.
        assert_eq!(block.instructions()[1].result_id(), Some(12));
    }

    #[test]
    fn test_merge_instruction() {
        let mut block = BasicBlock::new(1);
        block.push(Instruction::new(
            Op::LoopMerge,
            None,
            None,
            vec![Operand::Id(5), Operand::Id(6), Operand::Literal(0)],
        ));
        block.push(Instruction::new(
            Op::BranchConditional,
            None,
            None,
            vec![Operand::Id(9), Operand::Id(6), Operand::Id(5)],
        ));
        assert!(block.merge_instruction().is_some());
        assert_eq!(
            block.merge_instruction().unwrap().operand(0),
            Some(&Operand::Id(5))
        );
    }
}
