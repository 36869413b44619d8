//! SPIR-V opcode enumeration and classification.
//!
//! [`Op`] names the instruction subset the crate understands: module layout
//! instructions, the type and constant declarations, structured control flow,
//! and the arithmetic/conversion/comparison opcodes the folding engine handles.
//! Every other opcode decodes to [`Op::Unknown`] and is carried through
//! untouched, so a module containing instructions outside the subset still
//! round-trips bit for bit.

use std::fmt;

/// A SPIR-V opcode.
///
/// The numeric values are the ones defined by the SPIR-V specification; an
/// opcode outside the modeled subset is preserved as [`Op::Unknown`] with its
/// raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `OpNop`.
    Nop,
    /// `OpUndef` - an undefined value of a given type.
    Undef,
    /// `OpSourceContinued` - continuation of a source-level debug string.
    SourceContinued,
    /// `OpSource` - source language debug information.
    Source,
    /// `OpSourceExtension` - source-level extension debug string.
    SourceExtension,
    /// `OpName` - debug name for a result id.
    Name,
    /// `OpMemberName` - debug name for a structure member.
    MemberName,
    /// `OpString` - a debug string with a result id.
    String,
    /// `OpLine` - source location marker.
    Line,
    /// `OpExtension` - a required SPIR-V extension.
    Extension,
    /// `OpExtInstImport` - import of an extended instruction set.
    ExtInstImport,
    /// `OpExtInst` - an extended instruction.
    ExtInst,
    /// `OpMemoryModel` - addressing and memory model declaration.
    MemoryModel,
    /// `OpEntryPoint` - an entry point declaration.
    EntryPoint,
    /// `OpExecutionMode` - an execution mode for an entry point.
    ExecutionMode,
    /// `OpCapability` - a capability the module requires.
    Capability,
    /// `OpTypeVoid`.
    TypeVoid,
    /// `OpTypeBool`.
    TypeBool,
    /// `OpTypeInt` - integer type with width and signedness.
    TypeInt,
    /// `OpTypeFloat` - floating-point type with width.
    TypeFloat,
    /// `OpTypeVector` - vector of a scalar component type.
    TypeVector,
    /// `OpTypeMatrix` - matrix of column vectors.
    TypeMatrix,
    /// `OpTypeImage`.
    TypeImage,
    /// `OpTypeSampler`.
    TypeSampler,
    /// `OpTypeSampledImage`.
    TypeSampledImage,
    /// `OpTypeArray` - sized array type.
    TypeArray,
    /// `OpTypeRuntimeArray` - unsized array type.
    TypeRuntimeArray,
    /// `OpTypeStruct`.
    TypeStruct,
    /// `OpTypeOpaque`.
    TypeOpaque,
    /// `OpTypePointer` - pointer with a storage class.
    TypePointer,
    /// `OpTypeFunction` - function type with return and parameter types.
    TypeFunction,
    /// `OpConstantTrue`.
    ConstantTrue,
    /// `OpConstantFalse`.
    ConstantFalse,
    /// `OpConstant` - scalar constant with literal value words.
    Constant,
    /// `OpConstantComposite` - composite constant built from constituent ids.
    ConstantComposite,
    /// `OpConstantSampler`.
    ConstantSampler,
    /// `OpConstantNull` - the all-zero constant of a type.
    ConstantNull,
    /// `OpFunction` - start of a function definition.
    Function,
    /// `OpFunctionParameter`.
    FunctionParameter,
    /// `OpFunctionEnd`.
    FunctionEnd,
    /// `OpFunctionCall`.
    FunctionCall,
    /// `OpVariable` - a variable in a storage class.
    Variable,
    /// `OpLoad`.
    Load,
    /// `OpStore`.
    Store,
    /// `OpCopyMemory`.
    CopyMemory,
    /// `OpAccessChain`.
    AccessChain,
    /// `OpInBoundsAccessChain`.
    InBoundsAccessChain,
    /// `OpDecorate`.
    Decorate,
    /// `OpMemberDecorate`.
    MemberDecorate,
    /// `OpDecorationGroup`.
    DecorationGroup,
    /// `OpGroupDecorate`.
    GroupDecorate,
    /// `OpVectorShuffle` - positional selection out of two vectors.
    VectorShuffle,
    /// `OpCompositeConstruct` - build a composite from components.
    CompositeConstruct,
    /// `OpCompositeExtract` - extract through a chain of literal indices.
    CompositeExtract,
    /// `OpCompositeInsert`.
    CompositeInsert,
    /// `OpCopyObject`.
    CopyObject,
    /// `OpTranspose`.
    Transpose,
    /// `OpConvertFToU` - float to unsigned integer conversion.
    ConvertFToU,
    /// `OpConvertFToS` - float to signed integer conversion.
    ConvertFToS,
    /// `OpConvertSToF` - signed integer to float conversion.
    ConvertSToF,
    /// `OpConvertUToF` - unsigned integer to float conversion.
    ConvertUToF,
    /// `OpBitcast`.
    Bitcast,
    /// `OpSNegate`.
    SNegate,
    /// `OpFNegate`.
    FNegate,
    /// `OpIAdd`.
    IAdd,
    /// `OpFAdd`.
    FAdd,
    /// `OpISub`.
    ISub,
    /// `OpFSub`.
    FSub,
    /// `OpIMul`.
    IMul,
    /// `OpFMul`.
    FMul,
    /// `OpUDiv`.
    UDiv,
    /// `OpSDiv`.
    SDiv,
    /// `OpFDiv`.
    FDiv,
    /// `OpUMod`.
    UMod,
    /// `OpSRem`.
    SRem,
    /// `OpSMod`.
    SMod,
    /// `OpFRem`.
    FRem,
    /// `OpFMod`.
    FMod,
    /// `OpLogicalOr`.
    LogicalOr,
    /// `OpLogicalAnd`.
    LogicalAnd,
    /// `OpLogicalNot`.
    LogicalNot,
    /// `OpSelect`.
    Select,
    /// `OpIEqual`.
    IEqual,
    /// `OpINotEqual`.
    INotEqual,
    /// `OpUGreaterThan`.
    UGreaterThan,
    /// `OpSGreaterThan`.
    SGreaterThan,
    /// `OpUGreaterThanEqual`.
    UGreaterThanEqual,
    /// `OpSGreaterThanEqual`.
    SGreaterThanEqual,
    /// `OpULessThan`.
    ULessThan,
    /// `OpSLessThan`.
    SLessThan,
    /// `OpULessThanEqual`.
    ULessThanEqual,
    /// `OpSLessThanEqual`.
    SLessThanEqual,
    /// `OpFOrdEqual` - ordered float equality.
    FOrdEqual,
    /// `OpFUnordEqual` - unordered float equality.
    FUnordEqual,
    /// `OpFOrdNotEqual`.
    FOrdNotEqual,
    /// `OpFUnordNotEqual`.
    FUnordNotEqual,
    /// `OpFOrdLessThan`.
    FOrdLessThan,
    /// `OpFUnordLessThan`.
    FUnordLessThan,
    /// `OpFOrdGreaterThan`.
    FOrdGreaterThan,
    /// `OpFUnordGreaterThan`.
    FUnordGreaterThan,
    /// `OpFOrdLessThanEqual`.
    FOrdLessThanEqual,
    /// `OpFUnordLessThanEqual`.
    FUnordLessThanEqual,
    /// `OpFOrdGreaterThanEqual`.
    FOrdGreaterThanEqual,
    /// `OpFUnordGreaterThanEqual`.
    FUnordGreaterThanEqual,
    /// `OpPhi` - SSA merge of per-predecessor values.
    Phi,
    /// `OpLoopMerge` - structured loop declaration (merge and continue targets).
    LoopMerge,
    /// `OpSelectionMerge` - structured selection declaration.
    SelectionMerge,
    /// `OpLabel` - start of a basic block.
    Label,
    /// `OpBranch`.
    Branch,
    /// `OpBranchConditional`.
    BranchConditional,
    /// `OpSwitch`.
    Switch,
    /// `OpKill` - fragment discard terminator.
    Kill,
    /// `OpReturn`.
    Return,
    /// `OpReturnValue`.
    ReturnValue,
    /// `OpUnreachable`.
    Unreachable,
    /// Any opcode outside the modeled subset, preserved with its raw value.
    Unknown(u16),
}

impl Op {
    /// Decodes an opcode from the low half of an instruction's first word.
    #[must_use]
    pub const fn from_word(word: u16) -> Self {
        match word {
            0 => Self::Nop,
            1 => Self::Undef,
            2 => Self::SourceContinued,
            3 => Self::Source,
            4 => Self::SourceExtension,
            5 => Self::Name,
            6 => Self::MemberName,
            7 => Self::String,
            8 => Self::Line,
            10 => Self::Extension,
            11 => Self::ExtInstImport,
            12 => Self::ExtInst,
            14 => Self::MemoryModel,
            15 => Self::EntryPoint,
            16 => Self::ExecutionMode,
            17 => Self::Capability,
            19 => Self::TypeVoid,
            20 => Self::TypeBool,
            21 => Self::TypeInt,
            22 => Self::TypeFloat,
            23 => Self::TypeVector,
            24 => Self::TypeMatrix,
            25 => Self::TypeImage,
            26 => Self::TypeSampler,
            27 => Self::TypeSampledImage,
            28 => Self::TypeArray,
            29 => Self::TypeRuntimeArray,
            30 => Self::TypeStruct,
            31 => Self::TypeOpaque,
            32 => Self::TypePointer,
            33 => Self::TypeFunction,
            41 => Self::ConstantTrue,
            42 => Self::ConstantFalse,
            43 => Self::Constant,
            44 => Self::ConstantComposite,
            45 => Self::ConstantSampler,
            46 => Self::ConstantNull,
            54 => Self::Function,
            55 => Self::FunctionParameter,
            56 => Self::FunctionEnd,
            57 => Self::FunctionCall,
            59 => Self::Variable,
            61 => Self::Load,
            62 => Self::Store,
            63 => Self::CopyMemory,
            65 => Self::AccessChain,
            66 => Self::InBoundsAccessChain,
            71 => Self::Decorate,
            72 => Self::MemberDecorate,
            73 => Self::DecorationGroup,
            74 => Self::GroupDecorate,
            79 => Self::VectorShuffle,
            80 => Self::CompositeConstruct,
            81 => Self::CompositeExtract,
            82 => Self::CompositeInsert,
            83 => Self::CopyObject,
            84 => Self::Transpose,
            109 => Self::ConvertFToU,
            110 => Self::ConvertFToS,
            111 => Self::ConvertSToF,
            112 => Self::ConvertUToF,
            124 => Self::Bitcast,
            126 => Self::SNegate,
            127 => Self::FNegate,
            128 => Self::IAdd,
            129 => Self::FAdd,
            130 => Self::ISub,
            131 => Self::FSub,
            132 => Self::IMul,
            133 => Self::FMul,
            134 => Self::UDiv,
            135 => Self::SDiv,
            136 => Self::FDiv,
            137 => Self::UMod,
            138 => Self::SRem,
            139 => Self::SMod,
            140 => Self::FRem,
            141 => Self::FMod,
            166 => Self::LogicalOr,
            167 => Self::LogicalAnd,
            168 => Self::LogicalNot,
            169 => Self::Select,
            170 => Self::IEqual,
            171 => Self::INotEqual,
            172 => Self::UGreaterThan,
            173 => Self::SGreaterThan,
            174 => Self::UGreaterThanEqual,
            175 => Self::SGreaterThanEqual,
            176 => Self::ULessThan,
            177 => Self::SLessThan,
            178 => Self::ULessThanEqual,
            179 => Self::SLessThanEqual,
            180 => Self::FOrdEqual,
            181 => Self::FUnordEqual,
            182 => Self::FOrdNotEqual,
            183 => Self::FUnordNotEqual,
            184 => Self::FOrdLessThan,
            185 => Self::FUnordLessThan,
            186 => Self::FOrdGreaterThan,
            187 => Self::FUnordGreaterThan,
            188 => Self::FOrdLessThanEqual,
            189 => Self::FUnordLessThanEqual,
            190 => Self::FOrdGreaterThanEqual,
            191 => Self::FUnordGreaterThanEqual,
            245 => Self::Phi,
            246 => Self::LoopMerge,
            247 => Self::SelectionMerge,
            248 => Self::Label,
            249 => Self::Branch,
            250 => Self::BranchConditional,
            251 => Self::Switch,
            252 => Self::Kill,
            253 => Self::Return,
            254 => Self::ReturnValue,
            255 => Self::Unreachable,
            other => Self::Unknown(other),
        }
    }

    /// Encodes this opcode back to its numeric value.
    #[must_use]
    pub const fn as_word(self) -> u16 {
        match self {
            Self::Nop => 0,
            Self::Undef => 1,
            Self::SourceContinued => 2,
            Self::Source => 3,
            Self::SourceExtension => 4,
            Self::Name => 5,
            Self::MemberName => 6,
            Self::String => 7,
            Self::Line => 8,
            Self::Extension => 10,
            Self::ExtInstImport => 11,
            Self::ExtInst => 12,
            Self::MemoryModel => 14,
            Self::EntryPoint => 15,
            Self::ExecutionMode => 16,
            Self::Capability => 17,
            Self::TypeVoid => 19,
            Self::TypeBool => 20,
            Self::TypeInt => 21,
            Self::TypeFloat => 22,
            Self::TypeVector => 23,
            Self::TypeMatrix => 24,
            Self::TypeImage => 25,
            Self::TypeSampler => 26,
            Self::TypeSampledImage => 27,
            Self::TypeArray => 28,
            Self::TypeRuntimeArray => 29,
            Self::TypeStruct => 30,
            Self::TypeOpaque => 31,
            Self::TypePointer => 32,
            Self::TypeFunction => 33,
            Self::ConstantTrue => 41,
            Self::ConstantFalse => 42,
            Self::Constant => 43,
            Self::ConstantComposite => 44,
            Self::ConstantSampler => 45,
            Self::ConstantNull => 46,
            Self::Function => 54,
            Self::FunctionParameter => 55,
            Self::FunctionEnd => 56,
            Self::FunctionCall => 57,
            Self::Variable => 59,
            Self::Load => 61,
            Self::Store => 62,
            Self::CopyMemory => 63,
            Self::AccessChain => 65,
            Self::InBoundsAccessChain => 66,
            Self::Decorate => 71,
            Self::MemberDecorate => 72,
            Self::DecorationGroup => 73,
            Self::GroupDecorate => 74,
            Self::VectorShuffle => 79,
            Self::CompositeConstruct => 80,
            Self::CompositeExtract => 81,
            Self::CompositeInsert => 82,
            Self::CopyObject => 83,
            Self::Transpose => 84,
            Self::ConvertFToU => 109,
            Self::ConvertFToS => 110,
            Self::ConvertSToF => 111,
            Self::ConvertUToF => 112,
            Self::Bitcast => 124,
            Self::SNegate => 126,
            Self::FNegate => 127,
            Self::IAdd => 128,
            Self::FAdd => 129,
            Self::ISub => 130,
            Self::FSub => 131,
            Self::IMul => 132,
            Self::FMul => 133,
            Self::UDiv => 134,
            Self::SDiv => 135,
            Self::FDiv => 136,
            Self::UMod => 137,
            Self::SRem => 138,
            Self::SMod => 139,
            Self::FRem => 140,
            Self::FMod => 141,
            Self::LogicalOr => 166,
            Self::LogicalAnd => 167,
            Self::LogicalNot => 168,
            Self::Select => 169,
            Self::IEqual => 170,
            Self::INotEqual => 171,
            Self::UGreaterThan => 172,
            Self::SGreaterThan => 173,
            Self::UGreaterThanEqual => 174,
            Self::SGreaterThanEqual => 175,
            Self::ULessThan => 176,
            Self::SLessThan => 177,
            Self::ULessThanEqual => 178,
            Self::SLessThanEqual => 179,
            Self::FOrdEqual => 180,
            Self::FUnordEqual => 181,
            Self::FOrdNotEqual => 182,
            Self::FUnordNotEqual => 183,
            Self::FOrdLessThan => 184,
            Self::FUnordLessThan => 185,
            Self::FOrdGreaterThan => 186,
            Self::FUnordGreaterThan => 187,
            Self::FOrdLessThanEqual => 188,
            Self::FUnordLessThanEqual => 189,
            Self::FOrdGreaterThanEqual => 190,
            Self::FUnordGreaterThanEqual => 191,
            Self::Phi => 245,
            Self::LoopMerge => 246,
            Self::SelectionMerge => 247,
            Self::Label => 248,
            Self::Branch => 249,
            Self::BranchConditional => 250,
            Self::Switch => 251,
            Self::Kill => 252,
            Self::Return => 253,
            Self::ReturnValue => 254,
            Self::Unreachable => 255,
            Self::Unknown(word) => word,
        }
    }

    /// Returns `true` for opcodes that end a basic block.
    #[must_use]
    pub const fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Branch
                | Self::BranchConditional
                | Self::Switch
                | Self::Kill
                | Self::Return
                | Self::ReturnValue
                | Self::Unreachable
        )
    }

    /// Returns `true` for type declaration opcodes.
    #[must_use]
    pub const fn is_type(self) -> bool {
        matches!(
            self,
            Self::TypeVoid
                | Self::TypeBool
                | Self::TypeInt
                | Self::TypeFloat
                | Self::TypeVector
                | Self::TypeMatrix
                | Self::TypeImage
                | Self::TypeSampler
                | Self::TypeSampledImage
                | Self::TypeArray
                | Self::TypeRuntimeArray
                | Self::TypeStruct
                | Self::TypeOpaque
                | Self::TypePointer
                | Self::TypeFunction
        )
    }

    /// Returns `true` for constant declaration opcodes.
    #[must_use]
    pub const fn is_constant(self) -> bool {
        matches!(
            self,
            Self::ConstantTrue
                | Self::ConstantFalse
                | Self::Constant
                | Self::ConstantComposite
                | Self::ConstantSampler
                | Self::ConstantNull
        )
    }

    /// Returns `true` for debug-section opcodes (names, strings, source info).
    #[must_use]
    pub const fn is_debug(self) -> bool {
        matches!(
            self,
            Self::SourceContinued
                | Self::Source
                | Self::SourceExtension
                | Self::Name
                | Self::MemberName
                | Self::String
                | Self::Line
        )
    }

    /// Returns `true` for annotation-section opcodes.
    #[must_use]
    pub const fn is_annotation(self) -> bool {
        matches!(
            self,
            Self::Decorate | Self::MemberDecorate | Self::DecorationGroup | Self::GroupDecorate
        )
    }

    /// Returns `(has_result_type, has_result_id)` - whether the words after
    /// the opcode word start with a result type id and a result id.
    ///
    /// Unknown opcodes report `(false, false)`; their words are carried as
    /// opaque literal operands.
    #[must_use]
    pub const fn result_layout(self) -> (bool, bool) {
        match self {
            // Result id only, no result type.
            Self::String
            | Self::ExtInstImport
            | Self::DecorationGroup
            | Self::Label
            | Self::TypeVoid
            | Self::TypeBool
            | Self::TypeInt
            | Self::TypeFloat
            | Self::TypeVector
            | Self::TypeMatrix
            | Self::TypeImage
            | Self::TypeSampler
            | Self::TypeSampledImage
            | Self::TypeArray
            | Self::TypeRuntimeArray
            | Self::TypeStruct
            | Self::TypeOpaque
            | Self::TypePointer
            | Self::TypeFunction => (false, true),

            // Result type and result id.
            Self::Undef
            | Self::ExtInst
            | Self::ConstantTrue
            | Self::ConstantFalse
            | Self::Constant
            | Self::ConstantComposite
            | Self::ConstantSampler
            | Self::ConstantNull
            | Self::Function
            | Self::FunctionParameter
            | Self::FunctionCall
            | Self::Variable
            | Self::Load
            | Self::AccessChain
            | Self::InBoundsAccessChain
            | Self::VectorShuffle
            | Self::CompositeConstruct
            | Self::CompositeExtract
            | Self::CompositeInsert
            | Self::CopyObject
            | Self::Transpose
            | Self::ConvertFToU
            | Self::ConvertFToS
            | Self::ConvertSToF
            | Self::ConvertUToF
            | Self::Bitcast
            | Self::SNegate
            | Self::FNegate
            | Self::IAdd
            | Self::FAdd
            | Self::ISub
            | Self::FSub
            | Self::IMul
            | Self::FMul
            | Self::UDiv
            | Self::SDiv
            | Self::FDiv
            | Self::UMod
            | Self::SRem
            | Self::SMod
            | Self::FRem
            | Self::FMod
            | Self::LogicalOr
            | Self::LogicalAnd
            | Self::LogicalNot
            | Self::Select
            | Self::IEqual
            | Self::INotEqual
            | Self::UGreaterThan
            | Self::SGreaterThan
            | Self::UGreaterThanEqual
            | Self::SGreaterThanEqual
            | Self::ULessThan
            | Self::SLessThan
            | Self::ULessThanEqual
            | Self::SLessThanEqual
            | Self::FOrdEqual
            | Self::FUnordEqual
            | Self::FOrdNotEqual
            | Self::FUnordNotEqual
            | Self::FOrdLessThan
            | Self::FUnordLessThan
            | Self::FOrdGreaterThan
            | Self::FUnordGreaterThan
            | Self::FOrdLessThanEqual
            | Self::FUnordLessThanEqual
            | Self::FOrdGreaterThanEqual
            | Self::FUnordGreaterThanEqual
            | Self::Phi => (true, true),

            _ => (false, false),
        }
    }

    /// Returns `true` if the instruction produces a result id.
    #[must_use]
    pub const fn has_result_id(self) -> bool {
        self.result_layout().1
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(word) => write!(f, "OpUnknown({word})"),
            other => write!(f, "Op{other:?}"),
        }
    }
}
