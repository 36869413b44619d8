//! Function bodies.

use std::fmt;

use crate::spirv::{BasicBlock, FunctionControl, Instruction, Word};

/// A function definition: the `OpFunction` payload, its parameters and its
/// basic blocks in layout order.
///
/// The first block in layout order is the entry block. Structural passes that
/// insert blocks are expected to keep layout order consistent with dominance
/// where they rely on it; [`crate::loops::LoopCloning`] in particular reads
/// blocks in layout order and requires definitions to precede uses.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Result id of the `OpFunction` instruction.
    result_id: Word,

    /// Return type id.
    result_type: Word,

    /// Function control mask.
    control: FunctionControl,

    /// Id of the `OpTypeFunction` describing the signature.
    function_type: Word,

    /// `OpFunctionParameter` instructions in declaration order.
    parameters: Vec<Instruction>,

    /// Basic blocks in layout order.
    blocks: Vec<BasicBlock>,
}

impl Function {
    /// Creates an empty function with the given ids and control mask.
    #[must_use]
    pub fn new(
        result_id: Word,
        result_type: Word,
        control: FunctionControl,
        function_type: Word,
    ) -> Self {
        Self {
            result_id,
            result_type,
            control,
            function_type,
            parameters: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Returns the function's result id.
    #[must_use]
    pub const fn id(&self) -> Word {
        self.result_id
    }

    /// Returns the function's return type id.
    #[must_use]
    pub const fn result_type(&self) -> Word {
        self.result_type
    }

    /// Returns the function control mask.
    #[must_use]
    pub const fn control(&self) -> FunctionControl {
        self.control
    }

    /// Returns the id of the function's `OpTypeFunction`.
    #[must_use]
    pub const fn function_type(&self) -> Word {
        self.function_type
    }

    /// Returns the parameter instructions.
    #[must_use]
    pub fn parameters(&self) -> &[Instruction] {
        &self.parameters
    }

    /// Appends a parameter instruction.
    pub fn add_parameter(&mut self, parameter: Instruction) {
        self.parameters.push(parameter);
    }

    /// Returns the blocks in layout order.
    #[must_use]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Returns the blocks mutably, in layout order.
    pub fn blocks_mut(&mut self) -> &mut Vec<BasicBlock> {
        &mut self.blocks
    }

    /// Returns the entry block, if the function has a body.
    #[must_use]
    pub fn entry(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    /// Returns the block with the given label id.
    #[must_use]
    pub fn block(&self, label: Word) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id() == label)
    }

    /// Returns the block with the given label id mutably.
    pub fn block_mut(&mut self, label: Word) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.id() == label)
    }

    /// Returns the layout position of the block with the given label id.
    #[must_use]
    pub fn block_index(&self, label: Word) -> Option<usize> {
        self.blocks.iter().position(|b| b.id() == label)
    }

    /// Appends a block at the end of the layout.
    pub fn add_block(&mut self, block: BasicBlock) {
        self.blocks.push(block);
    }

    /// Inserts a block immediately before the block labelled `anchor`.
    /// Appends at the end if no block carries that label.
    pub fn insert_block_before(&mut self, anchor: Word, block: BasicBlock) {
        match self.block_index(anchor) {
            Some(index) => self.blocks.insert(index, block),
            None => self.blocks.push(block),
        }
    }

    /// Inserts a block immediately after the block labelled `anchor`.
    /// Appends at the end if no block carries that label.
    pub fn insert_block_after(&mut self, anchor: Word, block: BasicBlock) {
        match self.block_index(anchor) {
            Some(index) => self.blocks.insert(index + 1, block),
            None => self.blocks.push(block),
        }
    }

    /// Iterates over every instruction in the body, blocks in layout order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.parameters
            .iter()
            .chain(self.blocks.iter().flat_map(|b| b.instructions().iter()))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "%{} = OpFunction %{} {:#x} %{}",
            self.result_id,
            self.result_type,
            self.control.bits(),
            self.function_type
        )?;
        for parameter in &self.parameters {
            writeln!(f, "{parameter}")?;
        }
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        writeln!(f, "OpFunctionEnd")
    }
}
