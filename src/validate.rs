//! Structural validation of shader modules.
//!
//! The validator is a boolean oracle: it decodes a word stream and checks the
//! structural rules the rest of the crate relies on, reporting the first
//! violation through a [`MessageConsumer`] and returning `false`. The
//! reduction framework treats it purely as an accept/reject gate for candidate
//! binaries and never inspects diagnostics programmatically.
//!
//! Checks performed:
//! - the header is well formed and its version is accepted by the target
//!   environment
//! - every referenced id is defined somewhere in the module; definedness is
//!   global, not lexical, so forward references to labels, merge targets and
//!   later globals are accepted
//! - result ids are unique and strictly below the header bound
//! - every basic block ends in exactly one terminator
//! - every `OpPhi` carries one (value, parent) pair per predecessor
//! - entry points name functions that exist
//!
//! # Examples
//!
//! ```rust
//! use spvshrink::spirv::{binary, Instruction, Module, Op, TargetEnv};
//! use spvshrink::validate::{nop_message_consumer, validate};
//!
//! let mut module = Module::new();
//! module.push_global(Instruction::new(Op::TypeVoid, None, Some(2), Vec::new()));
//! module.ensure_bound_covers(2);
//!
//! let words = binary::serialize(&module);
//! assert!(validate(&words, TargetEnv::default(), &nop_message_consumer()));
//! ```

use std::{collections::HashSet, sync::Arc};

use strum::Display;

use crate::{
    analysis::ControlFlowGraph,
    spirv::{binary, Instruction, Module, Op, Operand, TargetEnv, Word, MAGIC_NUMBER},
};

/// Severity of one diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MessageLevel {
    /// The module or the requested operation is broken.
    Error,
    /// Something suspicious that does not invalidate the module.
    Warning,
    /// Progress reporting.
    Info,
}

/// Diagnostic callback taking severity, source tag, word position and message.
///
/// Shared by the validator and the reduction framework; the reducer hands
/// clones of one consumer to every pass it drives. The word position is the
/// offset of the offending instruction in the binary, or zero when no single
/// position applies.
pub type MessageConsumer = Arc<dyn Fn(MessageLevel, &str, usize, &str)>;

/// Returns a consumer that discards every message.
#[must_use]
pub fn nop_message_consumer() -> MessageConsumer {
    Arc::new(|_, _, _, _| {})
}

/// Source tag under which validation diagnostics are reported.
const VALIDATION_SOURCE: &str = "validation";

/// Words occupied by an `OpFunction` declaration.
const FUNCTION_WORDS: usize = 5;

/// Words occupied by an `OpLabel`.
const LABEL_WORDS: usize = 2;

/// Validates a module binary.
///
/// Decodes the words and applies the structural checks described in the
/// module documentation. The first violation is reported through `consumer`
/// at [`MessageLevel::Error`], with the word position of the offending
/// instruction where one is known.
#[must_use]
pub fn validate(words: &[Word], env: TargetEnv, consumer: &MessageConsumer) -> bool {
    let module = match binary::parse(words) {
        Ok(module) => module,
        Err(error) => {
            (**consumer)(MessageLevel::Error, VALIDATION_SOURCE, 0, &error.to_string());
            return false;
        }
    };
    validate_module(&module, env, consumer)
}

/// Validates an already decoded module.
///
/// Identical to [`validate`] except that the word-level decode step is
/// skipped; positions in diagnostics refer to the serialized form the module
/// would produce.
#[must_use]
pub fn validate_module(module: &Module, env: TargetEnv, consumer: &MessageConsumer) -> bool {
    match check_module(module, env) {
        Ok(()) => true,
        Err(violation) => {
            (**consumer)(
                MessageLevel::Error,
                VALIDATION_SOURCE,
                violation.position,
                &violation.message,
            );
            false
        }
    }
}

/// One structural rule violation, located by word position.
struct Violation {
    position: usize,
    message: String,
}

impl Violation {
    fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

fn check_module(module: &Module, env: TargetEnv) -> Result<(), Violation> {
    let header = module.header();
    if header.magic != MAGIC_NUMBER {
        return Err(Violation::new(
            0,
            format!("bad magic number {:#010x}", header.magic),
        ));
    }
    if !env.accepts_version(header.version) {
        return Err(Violation::new(
            1,
            format!(
                "module version {:#010x} is not accepted under {env}",
                header.version
            ),
        ));
    }

    let definitions = collect_definitions(module)?;
    check_structure(module, &definitions)
}

/// Gathers every defined id, rejecting duplicates and ids the bound misses.
///
/// The walk mirrors serialization order so that violation positions match the
/// binary form: global sections first, then each function as its declaration,
/// parameters, labelled blocks and end marker.
fn collect_definitions(module: &Module) -> Result<HashSet<Word>, Violation> {
    let bound = module.bound();
    let mut definitions = HashSet::new();
    let mut define = |id: Word, position: usize| -> Result<(), Violation> {
        if id >= bound {
            return Err(Violation::new(
                position,
                format!("id %{id} is not covered by the bound {bound}"),
            ));
        }
        if !definitions.insert(id) {
            return Err(Violation::new(
                position,
                format!("result id %{id} is defined more than once"),
            ));
        }
        Ok(())
    };

    let mut position = binary::HEADER_WORDS;
    for instruction in module.global_instructions() {
        if let Some(id) = instruction.result_id() {
            define(id, position)?;
        }
        position += instruction.word_count();
    }
    for function in module.functions() {
        define(function.id(), position)?;
        position += FUNCTION_WORDS;
        for parameter in function.parameters() {
            if let Some(id) = parameter.result_id() {
                define(id, position)?;
            }
            position += parameter.word_count();
        }
        for block in function.blocks() {
            define(block.id(), position)?;
            position += LABEL_WORDS;
            for instruction in block.instructions() {
                if let Some(id) = instruction.result_id() {
                    define(id, position)?;
                }
                position += instruction.word_count();
            }
        }
        position += 1;
    }
    Ok(definitions)
}

/// Checks references and block structure against the collected definitions.
fn check_structure(module: &Module, definitions: &HashSet<Word>) -> Result<(), Violation> {
    let mut position = binary::HEADER_WORDS;
    for instruction in module.global_instructions() {
        check_instruction_references(instruction, definitions, position)?;
        if instruction.op() == Op::EntryPoint {
            let target = instruction.operand(1).and_then(Operand::id);
            if !target.is_some_and(|id| module.function(id).is_some()) {
                return Err(Violation::new(
                    position,
                    "entry point does not name a function",
                ));
            }
        }
        position += instruction.word_count();
    }

    for function in module.functions() {
        for id in [function.result_type(), function.function_type()] {
            if !definitions.contains(&id) {
                return Err(Violation::new(
                    position,
                    format!("OpFunction references undefined id %{id}"),
                ));
            }
        }
        position += FUNCTION_WORDS;
        for parameter in function.parameters() {
            check_instruction_references(parameter, definitions, position)?;
            position += parameter.word_count();
        }

        // A function with no blocks is a bodiless declaration.
        if function.blocks().is_empty() {
            position += 1;
            continue;
        }
        let graph = match ControlFlowGraph::build(function) {
            Ok(graph) => graph,
            Err(error) => return Err(Violation::new(position, error.to_string())),
        };
        for block in function.blocks() {
            position += LABEL_WORDS;
            let body = block.instructions();
            if body.last().map_or(true, |last| !last.is_terminator()) {
                return Err(Violation::new(
                    position,
                    format!("block %{} does not end in a terminator", block.id()),
                ));
            }
            let predecessors = graph.predecessors(block.id()).len();
            for (index, instruction) in body.iter().enumerate() {
                check_instruction_references(instruction, definitions, position)?;
                if instruction.is_terminator() && index + 1 != body.len() {
                    return Err(Violation::new(
                        position,
                        format!("block %{} holds more than one terminator", block.id()),
                    ));
                }
                if instruction.op() == Op::Phi
                    && instruction.operands().len() != predecessors * 2
                {
                    return Err(Violation::new(
                        position,
                        format!(
                            "phi %{} carries {} operands for {predecessors} predecessors",
                            instruction.result_id().unwrap_or(0),
                            instruction.operands().len()
                        ),
                    ));
                }
                position += instruction.word_count();
            }
        }
        position += 1;
    }
    Ok(())
}

fn check_instruction_references(
    instruction: &Instruction,
    definitions: &HashSet<Word>,
    position: usize,
) -> Result<(), Violation> {
    if let Some(result_type) = instruction.result_type() {
        if !definitions.contains(&result_type) {
            return Err(Violation::new(
                position,
                format!(
                    "{} references undefined id %{result_type}",
                    instruction.op()
                ),
            ));
        }
    }
    for id in instruction.id_operands() {
        if !definitions.contains(&id) {
            return Err(Violation::new(
                position,
                format!("{} references undefined id %{id}", instruction.op()),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::{BasicBlock, Function, FunctionControl};
    use std::sync::Mutex;

    fn make_valid_module() -> Module {
        let mut module = Module::new();
        module.push_global(Instruction::new(
            Op::Capability,
            None,
            None,
            vec![Operand::Literal(1)],
        ));
        module.push_global(Instruction::new(
            Op::MemoryModel,
            None,
            None,
            vec![Operand::Literal(0), Operand::Literal(1)],
        ));
        module.push_global(Instruction::new(Op::TypeVoid, None, Some(2), Vec::new()));
        module.push_global(Instruction::new(
            Op::TypeFunction,
            None,
            Some(3),
            vec![Operand::Id(2)],
        ));

        let mut function = Function::new(4, 2, FunctionControl::empty(), 3);
        let mut entry = BasicBlock::new(5);
        entry.push(Instruction::branch(6));
        function.add_block(entry);
        let mut exit = BasicBlock::new(6);
        exit.push(Instruction::new(Op::Return, None, None, Vec::new()));
        function.add_block(exit);
        module.add_function(function);
        module.header_mut().bound = 7;
        module
    }

    fn recording_consumer() -> (MessageConsumer, Arc<Mutex<Vec<(MessageLevel, usize, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let consumer: MessageConsumer = Arc::new(move |level, _, position, message| {
            sink.lock()
                .unwrap()
                .push((level, position, message.to_string()));
        });
        (consumer, seen)
    }

    #[test]
    fn test_accepts_minimal_module() {
        let words = binary::serialize(&make_valid_module());
        assert!(validate(&words, TargetEnv::default(), &nop_message_consumer()));
    }

    #[test]
    fn test_accepts_global_forward_reference() {
        let mut module = Module::new();
        // The function type names %2 before %2 is declared.
        module.push_global(Instruction::new(
            Op::TypeFunction,
            None,
            Some(3),
            vec![Operand::Id(2)],
        ));
        module.push_global(Instruction::new(Op::TypeVoid, None, Some(2), Vec::new()));
        module.header_mut().bound = 4;
        assert!(validate_module(
            &module,
            TargetEnv::default(),
            &nop_message_consumer()
        ));
    }

    #[test]
    fn test_accepts_bodiless_function() {
        let mut module = make_valid_module();
        module.add_function(Function::new(8, 2, FunctionControl::empty(), 3));
        module.ensure_bound_covers(8);
        assert!(validate_module(
            &module,
            TargetEnv::default(),
            &nop_message_consumer()
        ));
    }

    #[test]
    fn test_rejects_undefined_reference() {
        let mut module = make_valid_module();
        assert!(module.remove_global(2));
        assert!(!validate_module(
            &module,
            TargetEnv::default(),
            &nop_message_consumer()
        ));
    }

    #[test]
    fn test_rejects_duplicate_result_id() {
        let mut module = make_valid_module();
        module.push_global(Instruction::new(Op::TypeBool, None, Some(2), Vec::new()));
        assert!(!validate_module(
            &module,
            TargetEnv::default(),
            &nop_message_consumer()
        ));
    }

    #[test]
    fn test_rejects_id_above_bound() {
        let mut module = make_valid_module();
        module.header_mut().bound = 3;
        assert!(!validate_module(
            &module,
            TargetEnv::default(),
            &nop_message_consumer()
        ));
    }

    #[test]
    fn test_rejects_unterminated_block() {
        let mut module = make_valid_module();
        module.functions_mut()[0].blocks_mut()[1]
            .instructions_mut()
            .clear();
        assert!(!validate_module(
            &module,
            TargetEnv::default(),
            &nop_message_consumer()
        ));
    }

    #[test]
    fn test_rejects_second_terminator() {
        let mut module = make_valid_module();
        let exit = &mut module.functions_mut()[0].blocks_mut()[1];
        exit.instructions_mut()
            .insert(0, Instruction::new(Op::Return, None, None, Vec::new()));
        assert!(!validate_module(
            &module,
            TargetEnv::default(),
            &nop_message_consumer()
        ));
    }

    #[test]
    fn test_rejects_phi_predecessor_mismatch() {
        let mut module = make_valid_module();
        module.push_global(Instruction::new(
            Op::TypeInt,
            None,
            Some(7),
            vec![Operand::Literal(32), Operand::Literal(1)],
        ));
        module.push_global(Instruction::new(
            Op::Constant,
            Some(7),
            Some(8),
            vec![Operand::Literal(1)],
        ));
        module.ensure_bound_covers(9);
        // Two incoming pairs in a block with a single predecessor.
        let exit = &mut module.functions_mut()[0].blocks_mut()[1];
        exit.insert_phi(Instruction::phi(7, 9, &[(8, 5), (8, 5)]));
        assert!(!validate_module(
            &module,
            TargetEnv::default(),
            &nop_message_consumer()
        ));
    }

    #[test]
    fn test_rejects_entry_point_without_function() {
        let mut module = make_valid_module();
        module.push_global(Instruction::new(
            Op::EntryPoint,
            None,
            None,
            vec![
                Operand::Literal(0),
                Operand::Id(2),
                Operand::LiteralString("main".into()),
            ],
        ));
        assert!(!validate_module(
            &module,
            TargetEnv::default(),
            &nop_message_consumer()
        ));
    }

    #[test]
    fn test_accepts_entry_point_naming_function() {
        let mut module = make_valid_module();
        module.push_global(Instruction::new(
            Op::EntryPoint,
            None,
            None,
            vec![
                Operand::Literal(0),
                Operand::Id(4),
                Operand::LiteralString("main".into()),
            ],
        ));
        assert!(validate_module(
            &module,
            TargetEnv::default(),
            &nop_message_consumer()
        ));
    }

    #[test]
    fn test_rejects_newer_version() {
        let words = binary::serialize(&make_valid_module());
        // The module targets SPIR-V 1.3; a 1.0 environment must refuse it.
        assert!(!validate(
            &words,
            TargetEnv::Universal1_0,
            &nop_message_consumer()
        ));
    }

    #[test]
    fn test_rejects_unparseable_words() {
        let (consumer, seen) = recording_consumer();
        assert!(!validate(&[], TargetEnv::default(), &consumer));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, MessageLevel::Error);
    }

    #[test]
    fn test_reports_first_violation_with_position() {
        let mut module = make_valid_module();
        assert!(module.remove_global(2));
        let (consumer, seen) = recording_consumer();
        assert!(!validate_module(&module, TargetEnv::default(), &consumer));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (level, position, message) = &seen[0];
        assert_eq!(*level, MessageLevel::Error);
        assert!(*position >= binary::HEADER_WORDS);
        assert!(message.contains("%2"));
    }
}
