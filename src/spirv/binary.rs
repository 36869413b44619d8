//! Word-stream codec for shader module binaries.
//!
//! A module binary is a five-word header followed by a flat instruction
//! stream. Each instruction starts with a word packing its total word count
//! in the high half and its opcode in the low half, followed by the optional
//! result type id, the optional result id, and the operand words. Literal
//! strings are stored nul-terminated, UTF-8 encoded, padded to a word
//! boundary.
//!
//! [`parse`] turns a word slice into a structured [`Module`]; [`serialize`]
//! is its inverse. Opcodes this crate does not model survive both directions
//! with their operand words carried verbatim. [`read_file`] and
//! [`write_file`] add file access, memory-mapping on the read side.
//!
//! # Examples
//!
//! ```rust
//! use spvshrink::spirv::{binary, Instruction, Module, Op};
//!
//! let mut module = Module::new();
//! module.push_global(Instruction::new(Op::TypeVoid, None, Some(1), Vec::new()));
//! module.header_mut().bound = 2;
//!
//! let words = binary::serialize(&module);
//! let reparsed = binary::parse(&words)?;
//! assert_eq!(binary::serialize(&reparsed), words);
//! # Ok::<(), spvshrink::Error>(())
//! ```

use memmap2::Mmap;
use std::{fs, path::Path};

use crate::{
    spirv::{
        BasicBlock, Function, FunctionControl, Instruction, Module, ModuleHeader, Op, Operand,
        Word, MAGIC_NUMBER,
    },
    Error, Result,
};

/// Number of words in a module header.
pub const HEADER_WORDS: usize = 5;

/// Parses a word stream into a structured module.
///
/// The stream must start with a well-formed header whose magic word matches
/// [`MAGIC_NUMBER`]; use [`words_from_bytes`] first when the original byte
/// order is unknown. Global instructions are routed into their layout
/// sections, function bodies are rebuilt block by block.
///
/// # Errors
/// Returns [`Error::Empty`] for an empty stream, [`Error::OutOfBounds`] when
/// a declared instruction word count overruns the stream, and
/// [`Error::Malformed`] for header, operand or structure violations.
pub fn parse(words: &[Word]) -> Result<Module> {
    if words.is_empty() {
        return Err(Error::Empty);
    }
    if words.len() < HEADER_WORDS {
        return Err(malformed_error!(
            "module header requires {} words, found {}",
            HEADER_WORDS,
            words.len()
        ));
    }
    if words[0] != MAGIC_NUMBER {
        return Err(malformed_error!("bad magic number {:#010x}", words[0]));
    }

    let mut module = Module::new();
    *module.header_mut() = ModuleHeader {
        magic: words[0],
        version: words[1],
        generator: words[2],
        bound: words[3],
        schema: words[4],
    };

    let mut cursor = HEADER_WORDS;
    let mut current_function: Option<Function> = None;
    let mut current_block: Option<BasicBlock> = None;

    while cursor < words.len() {
        let first = words[cursor];
        let word_count = (first >> 16) as usize;
        if word_count == 0 {
            return Err(malformed_error!(
                "instruction with zero word count at word {}",
                cursor
            ));
        }
        let end = cursor.checked_add(word_count).ok_or(Error::OutOfBounds)?;
        if end > words.len() {
            return Err(Error::OutOfBounds);
        }

        let op = Op::from_word((first & 0xffff) as u16);
        let (has_type, has_result) = op.result_layout();
        let mut reader = OperandReader::new(&words[cursor + 1..end]);
        let result_type = if has_type { Some(reader.word()?) } else { None };
        let result_id = if has_result { Some(reader.word()?) } else { None };
        let operands = decode_operands(op, &mut reader)?;
        let instruction = Instruction::new(op, result_type, result_id, operands);

        match op {
            Op::Function => {
                if current_function.is_some() {
                    return Err(malformed_error!("nested function definition"));
                }
                let (Some(result_type), Some(result_id)) = (result_type, result_id) else {
                    return Err(malformed_error!("OpFunction missing result ids"));
                };
                let Some(control) = instruction.operand(0).and_then(Operand::literal) else {
                    return Err(malformed_error!("OpFunction missing control mask"));
                };
                let Some(function_type) = instruction.operand(1).and_then(Operand::id) else {
                    return Err(malformed_error!("OpFunction missing function type"));
                };
                current_function = Some(Function::new(
                    result_id,
                    result_type,
                    FunctionControl::from_bits_retain(control),
                    function_type,
                ));
            }
            Op::FunctionParameter => {
                let Some(function) = current_function.as_mut() else {
                    return Err(malformed_error!("OpFunctionParameter outside a function"));
                };
                if current_block.is_some() {
                    return Err(malformed_error!("OpFunctionParameter after the first block"));
                }
                function.add_parameter(instruction);
            }
            Op::Label => {
                if current_function.is_none() {
                    return Err(malformed_error!("OpLabel outside a function"));
                }
                if current_block.is_some() {
                    return Err(malformed_error!("OpLabel inside an unterminated block"));
                }
                let Some(label) = result_id else {
                    return Err(malformed_error!("OpLabel missing result id"));
                };
                current_block = Some(BasicBlock::new(label));
            }
            Op::FunctionEnd => {
                let Some(function) = current_function.take() else {
                    return Err(malformed_error!("OpFunctionEnd outside a function"));
                };
                if current_block.is_some() {
                    return Err(malformed_error!("function ends inside an open block"));
                }
                module.add_function(function);
            }
            _ => {
                if let Some(function) = current_function.as_mut() {
                    let Some(block) = current_block.as_mut() else {
                        return Err(malformed_error!(
                            "{} outside of a block in a function body",
                            op
                        ));
                    };
                    let ends_block = instruction.is_terminator();
                    block.push(instruction);
                    if ends_block {
                        if let Some(finished) = current_block.take() {
                            function.add_block(finished);
                        }
                    }
                } else {
                    module.push_global(instruction);
                }
            }
        }

        cursor = end;
    }

    if current_function.is_some() {
        return Err(malformed_error!("unterminated function definition"));
    }
    Ok(module)
}

/// Serializes a module back into its word-stream form.
///
/// Global sections are emitted in layout order, then each function as its
/// `OpFunction` declaration, parameters, labelled blocks and `OpFunctionEnd`.
#[must_use]
pub fn serialize(module: &Module) -> Vec<Word> {
    let header = module.header();
    let mut words = vec![
        header.magic,
        header.version,
        header.generator,
        header.bound,
        header.schema,
    ];

    for instruction in module.global_instructions() {
        encode_instruction(instruction, &mut words);
    }

    for function in module.functions() {
        let declaration = Instruction::new(
            Op::Function,
            Some(function.result_type()),
            Some(function.id()),
            vec![
                Operand::Literal(function.control().bits()),
                Operand::Id(function.function_type()),
            ],
        );
        encode_instruction(&declaration, &mut words);
        for parameter in function.parameters() {
            encode_instruction(parameter, &mut words);
        }
        for block in function.blocks() {
            encode_instruction(&Instruction::label(block.id()), &mut words);
            for instruction in block.instructions() {
                encode_instruction(instruction, &mut words);
            }
        }
        encode_instruction(
            &Instruction::new(Op::FunctionEnd, None, None, Vec::new()),
            &mut words,
        );
    }

    words
}

/// Reinterprets raw bytes as a word stream, byte-swapping when the magic
/// word indicates the binary was produced on the opposite endianness.
///
/// # Errors
/// Returns [`Error::Empty`] for empty input and [`Error::Malformed`] when
/// the byte length is not a whole number of words.
pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<Word>> {
    if bytes.is_empty() {
        return Err(Error::Empty);
    }
    if bytes.len() % 4 != 0 {
        return Err(malformed_error!(
            "binary length {} is not a whole number of words",
            bytes.len()
        ));
    }

    let mut words: Vec<Word> = bytes
        .chunks_exact(4)
        .map(|chunk| Word::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if let Some(&first) = words.first() {
        if first != MAGIC_NUMBER && first.swap_bytes() == MAGIC_NUMBER {
            for word in &mut words {
                *word = word.swap_bytes();
            }
        }
    }
    Ok(words)
}

/// Memory-maps and parses a module binary from disk.
///
/// # Errors
/// Returns [`Error::FileError`] if the file cannot be opened or mapped, plus
/// everything [`parse`] can return.
pub fn read_file(path: impl AsRef<Path>) -> Result<Module> {
    let file = fs::File::open(path)?;
    let data = unsafe { Mmap::map(&file) }?;
    let words = words_from_bytes(&data)?;
    parse(&words)
}

/// Serializes a module and writes it to disk in little-endian byte order.
///
/// # Errors
/// Returns [`Error::FileError`] if the file cannot be written.
pub fn write_file(path: impl AsRef<Path>, module: &Module) -> Result<()> {
    let words = serialize(module);
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for word in &words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    fs::write(path, bytes)?;
    Ok(())
}

/// Appends one encoded instruction to the word stream.
fn encode_instruction(instruction: &Instruction, words: &mut Vec<Word>) {
    let word_count = instruction.word_count();
    debug_assert!(word_count <= usize::from(u16::MAX));
    words.push(((word_count as Word) << 16) | Word::from(instruction.op().as_word()));
    if let Some(result_type) = instruction.result_type() {
        words.push(result_type);
    }
    if let Some(result_id) = instruction.result_id() {
        words.push(result_id);
    }
    for operand in instruction.operands() {
        match operand {
            Operand::Id(id) => words.push(*id),
            Operand::Literal(value) => words.push(*value),
            Operand::LiteralString(text) => encode_string(text, words),
        }
    }
}

/// Appends a nul-terminated, word-padded UTF-8 string.
fn encode_string(text: &str, words: &mut Vec<Word>) {
    let mut word: Word = 0;
    let mut shift = 0;
    for &byte in text.as_bytes() {
        word |= Word::from(byte) << shift;
        shift += 8;
        if shift == 32 {
            words.push(word);
            word = 0;
            shift = 0;
        }
    }
    // The final word always carries at least the terminating nul.
    words.push(word);
}

/// Reads a nul-terminated string, returning it and the word count consumed.
fn read_string(words: &[Word]) -> Result<(String, usize)> {
    let mut bytes = Vec::new();
    for (offset, &word) in words.iter().enumerate() {
        for shift in [0u32, 8, 16, 24] {
            let byte = ((word >> shift) & 0xff) as u8;
            if byte == 0 {
                let text = String::from_utf8(bytes)
                    .map_err(|_| malformed_error!("literal string is not valid UTF-8"))?;
                return Ok((text, offset + 1));
            }
            bytes.push(byte);
        }
    }
    Err(malformed_error!("literal string missing nul terminator"))
}

/// Cursor over the operand words of a single instruction.
struct OperandReader<'a> {
    words: &'a [Word],
    index: usize,
}

impl<'a> OperandReader<'a> {
    const fn new(words: &'a [Word]) -> Self {
        Self { words, index: 0 }
    }

    const fn is_done(&self) -> bool {
        self.index >= self.words.len()
    }

    fn word(&mut self) -> Result<Word> {
        let Some(&word) = self.words.get(self.index) else {
            return Err(malformed_error!("truncated instruction operands"));
        };
        self.index += 1;
        Ok(word)
    }

    fn id(&mut self) -> Result<Operand> {
        Ok(Operand::Id(self.word()?))
    }

    fn literal(&mut self) -> Result<Operand> {
        Ok(Operand::Literal(self.word()?))
    }

    fn string(&mut self) -> Result<Operand> {
        let (text, consumed) = read_string(&self.words[self.index..])?;
        self.index += consumed;
        Ok(Operand::LiteralString(text))
    }
}

/// Decodes the operand words following the result ids of `op`.
///
/// Operand kinds follow the instruction's fixed signature, so id operands
/// and plain literals never get confused even though both are single words.
/// Unmodeled opcodes decode every word as a literal.
#[allow(clippy::too_many_lines)]
fn decode_operands(op: Op, reader: &mut OperandReader<'_>) -> Result<Vec<Operand>> {
    let mut operands = Vec::new();
    match op {
        // No operands beyond the result ids.
        Op::Nop
        | Op::Undef
        | Op::TypeVoid
        | Op::TypeBool
        | Op::TypeSampler
        | Op::ConstantTrue
        | Op::ConstantFalse
        | Op::ConstantNull
        | Op::FunctionParameter
        | Op::FunctionEnd
        | Op::DecorationGroup
        | Op::Label
        | Op::Kill
        | Op::Return
        | Op::Unreachable => {}

        // A single literal string.
        Op::SourceContinued
        | Op::SourceExtension
        | Op::String
        | Op::Extension
        | Op::ExtInstImport
        | Op::TypeOpaque => operands.push(reader.string()?),

        // Language and version literals, then an optional file id and text.
        Op::Source => {
            operands.push(reader.literal()?);
            operands.push(reader.literal()?);
            if !reader.is_done() {
                operands.push(reader.id()?);
            }
            if !reader.is_done() {
                operands.push(reader.string()?);
            }
        }

        Op::Name => {
            operands.push(reader.id()?);
            operands.push(reader.string()?);
        }
        Op::MemberName => {
            operands.push(reader.id()?);
            operands.push(reader.literal()?);
            operands.push(reader.string()?);
        }
        Op::Line => {
            operands.push(reader.id()?);
            operands.push(reader.literal()?);
            operands.push(reader.literal()?);
        }
        Op::ExtInst => {
            operands.push(reader.id()?);
            operands.push(reader.literal()?);
            while !reader.is_done() {
                operands.push(reader.id()?);
            }
        }
        Op::MemoryModel => {
            operands.push(reader.literal()?);
            operands.push(reader.literal()?);
        }
        Op::EntryPoint => {
            operands.push(reader.literal()?);
            operands.push(reader.id()?);
            operands.push(reader.string()?);
            while !reader.is_done() {
                operands.push(reader.id()?);
            }
        }
        Op::Capability | Op::TypeFloat => operands.push(reader.literal()?),
        Op::TypeInt => {
            operands.push(reader.literal()?);
            operands.push(reader.literal()?);
        }
        Op::ConstantSampler => {
            operands.push(reader.literal()?);
            operands.push(reader.literal()?);
            operands.push(reader.literal()?);
        }

        // An id then a literal.
        Op::TypeVector | Op::TypeMatrix | Op::SelectionMerge => {
            operands.push(reader.id()?);
            operands.push(reader.literal()?);
        }

        // A literal then an id.
        Op::TypePointer | Op::Function => {
            operands.push(reader.literal()?);
            operands.push(reader.id()?);
        }

        // A storage class literal and an optional initializer id.
        Op::Variable => {
            operands.push(reader.literal()?);
            if !reader.is_done() {
                operands.push(reader.id()?);
            }
        }

        // A single id operand.
        Op::TypeSampledImage
        | Op::TypeRuntimeArray
        | Op::CopyObject
        | Op::Transpose
        | Op::ConvertFToU
        | Op::ConvertFToS
        | Op::ConvertSToF
        | Op::ConvertUToF
        | Op::Bitcast
        | Op::SNegate
        | Op::FNegate
        | Op::LogicalNot
        | Op::ReturnValue
        | Op::Branch => operands.push(reader.id()?),

        // Exactly two id operands.
        Op::TypeArray
        | Op::IAdd
        | Op::FAdd
        | Op::ISub
        | Op::FSub
        | Op::IMul
        | Op::FMul
        | Op::UDiv
        | Op::SDiv
        | Op::FDiv
        | Op::UMod
        | Op::SRem
        | Op::SMod
        | Op::FRem
        | Op::FMod
        | Op::LogicalOr
        | Op::LogicalAnd
        | Op::IEqual
        | Op::INotEqual
        | Op::UGreaterThan
        | Op::SGreaterThan
        | Op::UGreaterThanEqual
        | Op::SGreaterThanEqual
        | Op::ULessThan
        | Op::SLessThan
        | Op::ULessThanEqual
        | Op::SLessThanEqual
        | Op::FOrdEqual
        | Op::FUnordEqual
        | Op::FOrdNotEqual
        | Op::FUnordNotEqual
        | Op::FOrdLessThan
        | Op::FUnordLessThan
        | Op::FOrdGreaterThan
        | Op::FUnordGreaterThan
        | Op::FOrdLessThanEqual
        | Op::FUnordLessThanEqual
        | Op::FOrdGreaterThanEqual
        | Op::FUnordGreaterThanEqual => {
            operands.push(reader.id()?);
            operands.push(reader.id()?);
        }

        // Exactly three id operands.
        Op::Select => {
            operands.push(reader.id()?);
            operands.push(reader.id()?);
            operands.push(reader.id()?);
        }

        // Ids all the way to the end.
        Op::TypeStruct
        | Op::TypeFunction
        | Op::ConstantComposite
        | Op::CompositeConstruct
        | Op::FunctionCall
        | Op::AccessChain
        | Op::InBoundsAccessChain
        | Op::GroupDecorate
        | Op::Phi => {
            while !reader.is_done() {
                operands.push(reader.id()?);
            }
        }

        // An id then literals to the end.
        Op::ExecutionMode | Op::TypeImage | Op::Load | Op::Decorate | Op::CompositeExtract => {
            operands.push(reader.id()?);
            while !reader.is_done() {
                operands.push(reader.literal()?);
            }
        }

        // An id, a literal, then literals to the end.
        Op::MemberDecorate => {
            operands.push(reader.id()?);
            operands.push(reader.literal()?);
            while !reader.is_done() {
                operands.push(reader.literal()?);
            }
        }

        // Two ids then literals to the end.
        Op::Store | Op::CopyMemory | Op::VectorShuffle | Op::CompositeInsert | Op::LoopMerge => {
            operands.push(reader.id()?);
            operands.push(reader.id()?);
            while !reader.is_done() {
                operands.push(reader.literal()?);
            }
        }

        // Condition, two targets, optional branch weight literals.
        Op::BranchConditional => {
            operands.push(reader.id()?);
            operands.push(reader.id()?);
            operands.push(reader.id()?);
            while !reader.is_done() {
                operands.push(reader.literal()?);
            }
        }

        // Selector, default target, then (case value, target) pairs.
        Op::Switch => {
            operands.push(reader.id()?);
            operands.push(reader.id()?);
            while !reader.is_done() {
                operands.push(reader.literal()?);
                operands.push(reader.id()?);
            }
        }

        // Constant payloads and unmodeled opcodes carry opaque words.
        Op::Constant | Op::Unknown(_) => {
            while !reader.is_done() {
                operands.push(reader.literal()?);
            }
        }
    }

    if !reader.is_done() {
        return Err(malformed_error!("trailing operand words for {}", op));
    }
    Ok(operands)
}
