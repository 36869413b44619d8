//! In-memory SPIR-V module model.
//!
//! This module provides the typed, mutable representation of a SPIR-V shader module
//! that the rest of the crate operates on: instructions with result ids and typed
//! operands, basic blocks, functions, and the module with its ordered global
//! sections. The word-level binary form is handled by [`binary`]; everything above
//! it consumes this model and never raw words.
//!
//! # Architecture
//!
//! - [`Op`] - the opcode enumeration for the modeled instruction subset, with an
//!   [`Op::Unknown`] passthrough so unmodeled instructions survive round trips
//! - [`Operand`] / [`Instruction`] - one decoded instruction; only
//!   [`Operand::Id`] operands participate in def/use edges and id remapping
//! - [`BasicBlock`] - a label followed by instructions, phis first, one terminator
//! - [`Function`] - parameters plus an ordered block list, the entry block first
//! - [`Module`] - header and global sections in SPIR-V section order, plus
//!   functions; fresh result ids are allocated from the header bound
//! - [`binary`] - the word codec and `.spv` file loading
//!
//! # Examples
//!
//! ```rust,ignore
//! use spvshrink::spirv::{binary, Module};
//!
//! let module = binary::read_file("shader.spv".as_ref())?;
//! for function in module.functions() {
//!     println!("function %{} with {} blocks", function.id(), function.blocks().len());
//! }
//! ```

use bitflags::bitflags;
use strum::{EnumCount, EnumIter};

pub mod binary;

mod block;
mod function;
mod instruction;
mod module;
mod opcode;

pub use block::BasicBlock;
pub use function::Function;
pub use instruction::{Instruction, Operand};
pub use module::{Module, ModuleHeader};
pub use opcode::Op;

/// A single 32-bit SPIR-V word.
///
/// Result ids, type ids and literal operands are all words; the binary form of a
/// module is a sequence of them.
pub type Word = u32;

/// The SPIR-V magic number, the first word of every module.
pub const MAGIC_NUMBER: Word = 0x0723_0203;

/// The SPIR-V environment a module is processed against.
///
/// The validator uses the environment to bound the module version it accepts;
/// reduction passes carry it so that candidate modules are judged against the
/// same environment as the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumCount, EnumIter)]
pub enum TargetEnv {
    /// SPIR-V 1.0.
    Universal1_0,
    /// SPIR-V 1.1.
    Universal1_1,
    /// SPIR-V 1.2.
    Universal1_2,
    /// SPIR-V 1.3.
    #[default]
    Universal1_3,
    /// SPIR-V 1.4.
    Universal1_4,
    /// SPIR-V 1.5.
    Universal1_5,
    /// SPIR-V 1.6.
    Universal1_6,
}

impl TargetEnv {
    /// Returns the version word this environment corresponds to, as encoded in
    /// the second word of a module header (`0x00MMmm00`).
    #[must_use]
    pub const fn version_word(self) -> Word {
        match self {
            Self::Universal1_0 => 0x0001_0000,
            Self::Universal1_1 => 0x0001_0100,
            Self::Universal1_2 => 0x0001_0200,
            Self::Universal1_3 => 0x0001_0300,
            Self::Universal1_4 => 0x0001_0400,
            Self::Universal1_5 => 0x0001_0500,
            Self::Universal1_6 => 0x0001_0600,
        }
    }

    /// Returns `true` if a module carrying `version` can be processed under this
    /// environment.
    #[must_use]
    pub const fn accepts_version(self, version: Word) -> bool {
        version <= self.version_word()
    }
}

impl std::fmt::Display for TargetEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor) = match self {
            Self::Universal1_0 => (1, 0),
            Self::Universal1_1 => (1, 1),
            Self::Universal1_2 => (1, 2),
            Self::Universal1_3 => (1, 3),
            Self::Universal1_4 => (1, 4),
            Self::Universal1_5 => (1, 5),
            Self::Universal1_6 => (1, 6),
        };
        write!(f, "SPIR-V {major}.{minor}")
    }
}

/// Storage classes for `OpVariable` and `OpTypePointer`.
///
/// Only the classes the crate inspects are named; everything else is carried
/// through [`StorageClass::Other`] untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    /// Read-only external resource memory.
    UniformConstant,
    /// Pipeline input.
    Input,
    /// External buffer memory.
    Uniform,
    /// Pipeline output.
    Output,
    /// Workgroup-shared memory.
    Workgroup,
    /// Device-wide memory.
    CrossWorkgroup,
    /// Module-private global memory.
    Private,
    /// Function-local memory; variables of this class live inside a function body.
    Function,
    /// Any storage class the crate does not inspect.
    Other(Word),
}

impl StorageClass {
    /// Decodes a storage-class literal word.
    #[must_use]
    pub const fn from_word(word: Word) -> Self {
        match word {
            0 => Self::UniformConstant,
            1 => Self::Input,
            2 => Self::Uniform,
            3 => Self::Output,
            4 => Self::Workgroup,
            5 => Self::CrossWorkgroup,
            6 => Self::Private,
            7 => Self::Function,
            other => Self::Other(other),
        }
    }

    /// Encodes this storage class back to its literal word.
    #[must_use]
    pub const fn as_word(self) -> Word {
        match self {
            Self::UniformConstant => 0,
            Self::Input => 1,
            Self::Uniform => 2,
            Self::Output => 3,
            Self::Workgroup => 4,
            Self::CrossWorkgroup => 5,
            Self::Private => 6,
            Self::Function => 7,
            Self::Other(word) => word,
        }
    }
}

bitflags! {
    /// Function control mask carried by `OpFunction`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FunctionControl: u32 {
        /// Strong hint to inline the function.
        const INLINE = 0x01;
        /// Strong hint not to inline the function.
        const DONT_INLINE = 0x02;
        /// The function has no side effects.
        const PURE = 0x04;
        /// The function's result depends only on its arguments.
        const CONST = 0x08;
    }
}

bitflags! {
    /// Loop control mask carried by `OpLoopMerge`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LoopControl: u32 {
        /// Strong hint to unroll the loop.
        const UNROLL = 0x01;
        /// Strong hint not to unroll the loop.
        const DONT_UNROLL = 0x02;
        /// The loop has no memory dependencies between iterations.
        const DEPENDENCY_INFINITE = 0x04;
        /// The loop has bounded memory dependency length.
        const DEPENDENCY_LENGTH = 0x08;
    }
}

bitflags! {
    /// Selection control mask carried by `OpSelectionMerge`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SelectionControl: u32 {
        /// Strong hint to flatten the selection.
        const FLATTEN = 0x01;
        /// Strong hint not to flatten the selection.
        const DONT_FLATTEN = 0x02;
    }
}
