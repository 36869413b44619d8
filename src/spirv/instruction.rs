//! SPIR-V instructions with typed operands.
//!
//! An [`Instruction`] keeps its opcode, optional result type and result id, and
//! an ordered operand list. Operands distinguish id references from literal
//! words: only [`Operand::Id`] entries participate in def/use edges and in id
//! remapping during loop cloning, which is what makes targeted rewrites safe.

use std::fmt;

use crate::spirv::{Op, Word};

/// One operand of a SPIR-V instruction.
///
/// The binary form does not distinguish ids from literals; the distinction is
/// recovered during decoding from the opcode's operand signature and preserved
/// here so that analyses never have to guess.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// A reference to another instruction's result id (or a label id).
    Id(Word),
    /// A literal word (immediate value, index, mask or enumerant).
    Literal(Word),
    /// A literal UTF-8 string, nul-terminated and word-padded in the binary form.
    LiteralString(String),
}

impl Operand {
    /// Returns the referenced id if this operand is an id reference.
    #[must_use]
    pub const fn id(&self) -> Option<Word> {
        match self {
            Self::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the literal value if this operand is a plain literal word.
    #[must_use]
    pub const fn literal(&self) -> Option<Word> {
        match self {
            Self::Literal(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the number of words this operand occupies in the binary form.
    #[must_use]
    pub fn word_count(&self) -> usize {
        match self {
            Self::Id(_) | Self::Literal(_) => 1,
            // String bytes plus the nul terminator, padded to a word boundary.
            Self::LiteralString(text) => text.len() / 4 + 1,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "%{id}"),
            Self::Literal(value) => write!(f, "{value}"),
            Self::LiteralString(text) => write!(f, "\"{text}\""),
        }
    }
}

/// A single SPIR-V instruction.
///
/// Instructions are owned by their containing [`crate::spirv::BasicBlock`] (or
/// by the module's global sections) and are mutable in place: operands may be
/// rewritten and instructions erased, as long as result ids are preserved or
/// consistently remapped by the caller.
///
/// # Examples
///
/// ```rust
/// use spvshrink::spirv::{Instruction, Op, Operand};
///
/// // %5 = OpFAdd %3 %2 %4
/// let add = Instruction::new(
///     Op::FAdd,
///     Some(3),
///     Some(5),
///     vec![Operand::Id(2), Operand::Id(4)],
/// );
/// assert_eq!(add.result_id(), Some(5));
/// assert_eq!(add.word_count(), 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode.
    op: Op,

    /// The result type id, for opcodes that carry one.
    result_type: Option<Word>,

    /// The result id, for opcodes that produce one.
    result_id: Option<Word>,

    /// Ordered input operands.
    operands: Vec<Operand>,

    /// Whether floating-point constant folding is permitted on this
    /// instruction. Set externally to reflect the module's precision mode;
    /// the folding engine refuses any float arithmetic fold while this is
    /// `false`.
    float_folding_allowed: bool,
}

impl Instruction {
    /// Creates a new instruction.
    ///
    /// # Arguments
    ///
    /// * `op` - The opcode
    /// * `result_type` - The result type id, if the opcode carries one
    /// * `result_id` - The result id, if the opcode produces one
    /// * `operands` - The ordered operand list
    #[must_use]
    pub fn new(
        op: Op,
        result_type: Option<Word>,
        result_id: Option<Word>,
        operands: Vec<Operand>,
    ) -> Self {
        Self {
            op,
            result_type,
            result_id,
            operands,
            float_folding_allowed: false,
        }
    }

    /// Creates an `OpLabel` instruction for a block id.
    #[must_use]
    pub fn label(id: Word) -> Self {
        Self::new(Op::Label, None, Some(id), Vec::new())
    }

    /// Creates an `OpBranch` to the given block.
    #[must_use]
    pub fn branch(target: Word) -> Self {
        Self::new(Op::Branch, None, None, vec![Operand::Id(target)])
    }

    /// Creates an `OpPhi` from `(value, predecessor)` incoming pairs.
    #[must_use]
    pub fn phi(result_type: Word, result_id: Word, incoming: &[(Word, Word)]) -> Self {
        let mut operands = Vec::with_capacity(incoming.len() * 2);
        for &(value, parent) in incoming {
            operands.push(Operand::Id(value));
            operands.push(Operand::Id(parent));
        }
        Self::new(Op::Phi, Some(result_type), Some(result_id), operands)
    }

    /// Returns the opcode.
    #[must_use]
    pub const fn op(&self) -> Op {
        self.op
    }

    /// Returns the result type id, if any.
    #[must_use]
    pub const fn result_type(&self) -> Option<Word> {
        self.result_type
    }

    /// Returns the result id, if any.
    #[must_use]
    pub const fn result_id(&self) -> Option<Word> {
        self.result_id
    }

    /// Replaces the result id.
    pub fn set_result_id(&mut self, id: Word) {
        self.result_id = Some(id);
    }

    /// Returns the operand list.
    #[must_use]
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// Returns the operand list mutably.
    pub fn operands_mut(&mut self) -> &mut Vec<Operand> {
        &mut self.operands
    }

    /// Returns the operand at `index`, if present.
    #[must_use]
    pub fn operand(&self, index: usize) -> Option<&Operand> {
        self.operands.get(index)
    }

    /// Replaces the operand at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range; callers index operands they have
    /// already inspected.
    pub fn set_operand(&mut self, index: usize, operand: Operand) {
        self.operands[index] = operand;
    }

    /// Iterates over the ids referenced by the input operands.
    ///
    /// This does not include the result type id; type references are never
    /// remapped by block-level rewrites.
    pub fn id_operands(&self) -> impl Iterator<Item = Word> + '_ {
        self.operands.iter().filter_map(Operand::id)
    }

    /// Applies `remap` to every id operand in place.
    ///
    /// Used by loop cloning to redirect intra-clone references; ids for which
    /// `remap` returns `None` are left unchanged, which is the correct
    /// behavior for references to values defined outside the cloned region.
    pub fn remap_id_operands<F>(&mut self, mut remap: F)
    where
        F: FnMut(Word) -> Option<Word>,
    {
        for operand in &mut self.operands {
            if let Operand::Id(id) = operand {
                if let Some(new_id) = remap(*id) {
                    *id = new_id;
                }
            }
        }
    }

    /// Returns `true` if this instruction ends a basic block.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }

    /// Returns `true` if floating-point constant folding is permitted here.
    #[must_use]
    pub const fn float_folding_allowed(&self) -> bool {
        self.float_folding_allowed
    }

    /// Marks whether floating-point constant folding is permitted here.
    pub fn set_float_folding_allowed(&mut self, allowed: bool) {
        self.float_folding_allowed = allowed;
    }

    /// Returns the total number of words this instruction occupies in the
    /// binary form, including the opcode word.
    #[must_use]
    pub fn word_count(&self) -> usize {
        1 + usize::from(self.result_type.is_some())
            + usize::from(self.result_id.is_some())
            + self
                .operands
                .iter()
                .map(Operand::word_count)
                .sum::<usize>()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = self.result_id {
            write!(f, "%{result} = ")?;
        }
        write!(f, "{}", self.op)?;
        if let Some(result_type) = self.result_type {
            write!(f, " %{result_type}")?;
        }
        for operand in &self.operands {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}
