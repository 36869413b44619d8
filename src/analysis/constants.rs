//! Constant pool with interning and on-demand declaration.
//!
//! Constants live in an arena and are referred to by [`ConstantId`] handles.
//! Structurally equal constants intern to the same handle, so folding the same
//! expression twice yields the same id and equality checks are handle
//! comparisons.
//!
//! The pool tracks which constants are declared in the module, in both
//! directions. Folding can create constants that have no declaration yet;
//! [`ConstantManager::get_defining_instruction`] materializes a global
//! `OpConstant*` for such a handle on first request and reuses the existing
//! declaration on every later one.
//!
//! Null constants are deliberately permissive: the scalar accessors read
//! `OpConstantNull` as zero of the requested shape, which lets arithmetic
//! folding treat null operands as zeros without special cases at every call
//! site.

use std::collections::HashMap;

use crate::analysis::{DefSite, DefUseManager, Type, TypeManager};
use crate::spirv::{Instruction, Module, Op, Operand, Word};
use crate::Result;

/// Handle to a constant in a [`ConstantManager`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantId(usize);

/// The value payload of a constant.
///
/// Numeric payloads hold raw bit patterns: a 32-bit float is kept as its bits
/// zero-extended to 64, which makes interning bitwise and keeps NaN payloads
/// intact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstValue {
    /// A boolean constant.
    Bool(bool),
    /// Integer bits, zero-extended to 64.
    Int(u64),
    /// Float bits, zero-extended to 64.
    Float(u64),
    /// Component handles in declaration order.
    Composite(Vec<ConstantId>),
    /// `OpConstantNull` of the carried type.
    Null,
}

/// One constant: its declared type id and its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    type_id: Word,
    value: ConstValue,
}

impl Constant {
    /// Returns the result id of the constant's type.
    #[must_use]
    pub const fn type_id(&self) -> Word {
        self.type_id
    }

    /// Returns the value payload.
    #[must_use]
    pub const fn value(&self) -> &ConstValue {
        &self.value
    }

    /// Returns `true` for `OpConstantNull` constants.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self.value, ConstValue::Null)
    }

    /// Reads the constant as an `f32`. Null reads as `0.0`.
    #[must_use]
    pub fn as_f32(&self) -> f32 {
        match self.value {
            ConstValue::Float(bits) => f32::from_bits(bits as u32),
            _ => 0.0,
        }
    }

    /// Reads the constant as an `f64`. Null reads as `0.0`.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match self.value {
            ConstValue::Float(bits) => f64::from_bits(bits),
            _ => 0.0,
        }
    }

    /// Reads the constant as a `u32`. Null reads as `0`.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        match self.value {
            ConstValue::Int(bits) => bits as u32,
            _ => 0,
        }
    }

    /// Reads the constant as a `u64`. Null reads as `0`.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        match self.value {
            ConstValue::Int(bits) => bits,
            _ => 0,
        }
    }

    /// Reads the constant as an `i32`. Null reads as `0`.
    #[must_use]
    pub fn as_i32(&self) -> i32 {
        self.as_u32() as i32
    }

    /// Reads the constant as an `i64`. Null reads as `0`.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.as_u64() as i64
    }

    /// Reads the constant as a `bool`. Null reads as `false`.
    #[must_use]
    pub fn as_bool(&self) -> bool {
        matches!(self.value, ConstValue::Bool(true))
    }

    /// Returns the component handles if this is a composite constant.
    #[must_use]
    pub fn components(&self) -> Option<&[ConstantId]> {
        match &self.value {
            ConstValue::Composite(components) => Some(components),
            _ => None,
        }
    }
}

/// Interning arena for constants, with the module declaration maps.
#[derive(Debug, Default)]
pub struct ConstantManager {
    constants: Vec<Constant>,
    interned: HashMap<(Word, ConstValue), ConstantId>,
    /// Declared result id to handle, one entry per declaring instruction.
    id_to_const: HashMap<Word, ConstantId>,
    /// Handle to the first result id that declared it.
    const_to_id: HashMap<ConstantId, Word>,
}

impl ConstantManager {
    /// Builds the pool from a module's global constant declarations.
    ///
    /// Declarations this crate does not model (specialization constants with
    /// operands, for instance) are skipped; their result ids simply never
    /// resolve to a handle.
    #[must_use]
    pub fn build(module: &Module, types: &TypeManager) -> Self {
        let mut manager = Self::default();
        for instruction in module.globals() {
            manager.register_declaration(instruction, types);
        }
        manager
    }

    /// Registers one `OpConstant*` declaration, mapping its result id to an
    /// interned handle. Returns the handle if the declaration was understood.
    pub fn register_declaration(
        &mut self,
        instruction: &Instruction,
        types: &TypeManager,
    ) -> Option<ConstantId> {
        let constant = self.constant_from_inst(instruction, types)?;
        let result_id = instruction.result_id()?;
        self.id_to_const.insert(result_id, constant);
        self.const_to_id.entry(constant).or_insert(result_id);
        Some(constant)
    }

    fn constant_from_inst(
        &mut self,
        instruction: &Instruction,
        types: &TypeManager,
    ) -> Option<ConstantId> {
        let type_id = instruction.result_type()?;
        match instruction.op() {
            Op::ConstantTrue => Some(self.bool_constant(type_id, true)),
            Op::ConstantFalse => Some(self.bool_constant(type_id, false)),
            Op::ConstantNull => Some(self.null_constant(type_id)),
            Op::Constant => {
                let words: Vec<Word> = instruction
                    .operands()
                    .iter()
                    .filter_map(Operand::literal)
                    .collect();
                self.scalar_from_words(types, type_id, &words)
            }
            Op::ConstantComposite => {
                let ids: Vec<Word> = instruction.id_operands().collect();
                self.composite_from_ids(type_id, &ids)
            }
            _ => None,
        }
    }

    fn intern(&mut self, type_id: Word, value: ConstValue) -> ConstantId {
        if let Some(&existing) = self.interned.get(&(type_id, value.clone())) {
            return existing;
        }
        let id = ConstantId(self.constants.len());
        self.constants.push(Constant {
            type_id,
            value: value.clone(),
        });
        self.interned.insert((type_id, value), id);
        id
    }

    /// Interns the null constant of a type.
    pub fn null_constant(&mut self, type_id: Word) -> ConstantId {
        self.intern(type_id, ConstValue::Null)
    }

    /// Interns a boolean constant.
    pub fn bool_constant(&mut self, type_id: Word, value: bool) -> ConstantId {
        self.intern(type_id, ConstValue::Bool(value))
    }

    /// Interns an integer constant from its zero-extended bits.
    pub fn int_constant(&mut self, type_id: Word, bits: u64) -> ConstantId {
        self.intern(type_id, ConstValue::Int(bits))
    }

    /// Interns a float constant from its zero-extended bits.
    pub fn float_constant(&mut self, type_id: Word, bits: u64) -> ConstantId {
        self.intern(type_id, ConstValue::Float(bits))
    }

    /// Interns a scalar constant from its literal words, as laid out by
    /// `OpConstant`. An empty word list interns the null constant.
    ///
    /// Returns `None` when the word count does not match the type's width or
    /// the type is not a scalar.
    pub fn scalar_from_words(
        &mut self,
        types: &TypeManager,
        type_id: Word,
        words: &[Word],
    ) -> Option<ConstantId> {
        if words.is_empty() {
            return Some(self.null_constant(type_id));
        }
        match types.get(type_id)? {
            Type::Bool => {
                (words.len() == 1).then(|| self.bool_constant(type_id, words[0] != 0))
            }
            Type::Int { width, .. } => {
                let bits = bits_from_words(*width, words)?;
                Some(self.int_constant(type_id, bits))
            }
            Type::Float { width } => {
                let bits = bits_from_words(*width, words)?;
                Some(self.float_constant(type_id, bits))
            }
            _ => None,
        }
    }

    /// Interns a composite constant whose components are named by declared
    /// result ids. Returns `None` if any component id has no known constant.
    pub fn composite_from_ids(&mut self, type_id: Word, ids: &[Word]) -> Option<ConstantId> {
        let components: Option<Vec<ConstantId>> = ids
            .iter()
            .map(|&id| self.id_to_const.get(&id).copied())
            .collect();
        Some(self.intern(type_id, ConstValue::Composite(components?)))
    }

    /// Interns a composite constant from component handles.
    pub fn composite_constant(
        &mut self,
        type_id: Word,
        components: Vec<ConstantId>,
    ) -> ConstantId {
        self.intern(type_id, ConstValue::Composite(components))
    }

    /// Returns the constant behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle comes from a different manager.
    #[must_use]
    pub fn get(&self, id: ConstantId) -> &Constant {
        &self.constants[id.0]
    }

    /// Returns the declared result id for a handle, if the module declares
    /// this constant.
    #[must_use]
    pub fn find_declared_constant(&self, id: ConstantId) -> Option<Word> {
        self.const_to_id.get(&id).copied()
    }

    /// Returns the handle for a declared constant's result id.
    #[must_use]
    pub fn constant_from_defining_id(&self, result_id: Word) -> Option<ConstantId> {
        self.id_to_const.get(&result_id).copied()
    }

    /// Resolves each operand of an instruction to a constant handle.
    ///
    /// The returned vector is parallel to the operand list. Literal operands
    /// and ids that do not name a declared constant map to `None`.
    #[must_use]
    pub fn operand_constants(&self, instruction: &Instruction) -> Vec<Option<ConstantId>> {
        instruction
            .operands()
            .iter()
            .map(|operand| operand.id().and_then(|id| self.constant_from_defining_id(id)))
            .collect()
    }

    /// Returns the result id of an instruction declaring this constant,
    /// creating and appending the declaration if the module has none.
    ///
    /// New declarations are appended to the module's global section, recorded
    /// in the def-use manager, and mapped so later requests reuse them.
    /// Composite components are declared first, recursively.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::IdOverflow`] if the module's id space is
    /// exhausted.
    pub fn get_defining_instruction(
        &mut self,
        module: &mut Module,
        types: &TypeManager,
        def_use: &mut DefUseManager,
        constant: ConstantId,
    ) -> Result<Word> {
        if let Some(declared) = self.find_declared_constant(constant) {
            return Ok(declared);
        }

        let type_id = self.get(constant).type_id;
        let instruction = match self.get(constant).value.clone() {
            ConstValue::Null => {
                let id = module.take_next_id()?;
                Instruction::new(Op::ConstantNull, Some(type_id), Some(id), Vec::new())
            }
            ConstValue::Bool(value) => {
                let id = module.take_next_id()?;
                let op = if value { Op::ConstantTrue } else { Op::ConstantFalse };
                Instruction::new(op, Some(type_id), Some(id), Vec::new())
            }
            ConstValue::Int(bits) | ConstValue::Float(bits) => {
                let width = match types.get(type_id) {
                    Some(Type::Int { width, .. } | Type::Float { width }) => *width,
                    _ => 32,
                };
                let words = words_from_bits(width, bits);
                let id = module.take_next_id()?;
                Instruction::new(
                    Op::Constant,
                    Some(type_id),
                    Some(id),
                    words.into_iter().map(Operand::Literal).collect(),
                )
            }
            ConstValue::Composite(components) => {
                let mut operands = Vec::with_capacity(components.len());
                for component in components {
                    let declared =
                        self.get_defining_instruction(module, types, def_use, component)?;
                    operands.push(Operand::Id(declared));
                }
                let id = module.take_next_id()?;
                Instruction::new(Op::ConstantComposite, Some(type_id), Some(id), operands)
            }
        };

        let result_id = instruction.result_id().unwrap_or(0);
        def_use.analyze_inst_def(&instruction, DefSite::Global);
        def_use.analyze_inst_use(&instruction);
        module.push_global(instruction);

        self.id_to_const.insert(result_id, constant);
        self.const_to_id.insert(constant, result_id);
        Ok(result_id)
    }
}

fn bits_from_words(width: u32, words: &[Word]) -> Option<u64> {
    match words {
        &[word] if width <= 32 => Some(u64::from(word)),
        &[low, high] if width == 64 => Some(u64::from(low) | (u64::from(high) << 32)),
        _ => None,
    }
}

fn words_from_bits(width: u32, bits: u64) -> Vec<Word> {
    if width == 64 {
        vec![bits as u32, (bits >> 32) as u32]
    } else {
        vec![bits as u32]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_module() -> Module {
        let mut module = Module::new();
        module.push_global(Instruction::new(Op::TypeBool, None, Some(3), Vec::new()));
        module.push_global(Instruction::new(
            Op::TypeInt,
            None,
            Some(6),
            vec![Operand::Literal(32), Operand::Literal(1)],
        ));
        module.push_global(Instruction::new(
            Op::TypeFloat,
            None,
            Some(7),
            vec![Operand::Literal(32)],
        ));
        module.push_global(Instruction::new(
            Op::TypeVector,
            None,
            Some(8),
            vec![Operand::Id(7), Operand::Literal(2)],
        ));
        // %10 = 2.0f, %11 = null float, %12 = (2.0f, 2.0f), %13 = 5
        module.push_global(Instruction::new(
            Op::Constant,
            Some(7),
            Some(10),
            vec![Operand::Literal(2.0f32.to_bits())],
        ));
        module.push_global(Instruction::new(
            Op::ConstantNull,
            Some(7),
            Some(11),
            Vec::new(),
        ));
        module.push_global(Instruction::new(
            Op::ConstantComposite,
            Some(8),
            Some(12),
            vec![Operand::Id(10), Operand::Id(10)],
        ));
        module.push_global(Instruction::new(
            Op::Constant,
            Some(6),
            Some(13),
            vec![Operand::Literal(5)],
        ));
        module.ensure_bound_covers(13);
        module
    }

    fn make_managers() -> (Module, TypeManager, ConstantManager) {
        let module = make_module();
        let types = TypeManager::build(&module);
        let constants = ConstantManager::build(&module, &types);
        (module, types, constants)
    }

    #[test]
    fn test_build_registers_declarations() {
        let (_, _, constants) = make_managers();

        let two = constants.constant_from_defining_id(10).unwrap();
        assert_eq!(constants.get(two).as_f32(), 2.0);
        assert_eq!(constants.find_declared_constant(two), Some(10));

        let five = constants.constant_from_defining_id(13).unwrap();
        assert_eq!(constants.get(five).as_i32(), 5);

        assert!(constants.constant_from_defining_id(99).is_none());
    }

    #[test]
    fn test_null_reads_as_zero() {
        let (_, _, constants) = make_managers();

        let null = constants.constant_from_defining_id(11).unwrap();
        assert!(constants.get(null).is_null());
        assert_eq!(constants.get(null).as_f32(), 0.0);
        assert_eq!(constants.get(null).as_u32(), 0);
        assert!(!constants.get(null).as_bool());
    }

    #[test]
    fn test_interning_deduplicates() {
        let (_, _, mut constants) = make_managers();

        let declared = constants.constant_from_defining_id(10).unwrap();
        let interned = constants.float_constant(7, u64::from(2.0f32.to_bits()));
        assert_eq!(declared, interned);

        // Same bits under a different type intern separately.
        let other = constants.float_constant(8, u64::from(2.0f32.to_bits()));
        assert_ne!(declared, other);
    }

    #[test]
    fn test_composite_components() {
        let (_, _, constants) = make_managers();

        let vector = constants.constant_from_defining_id(12).unwrap();
        let components = constants.get(vector).components().unwrap().to_vec();
        assert_eq!(components.len(), 2);
        assert_eq!(constants.get(components[0]).as_f32(), 2.0);
    }

    #[test]
    fn test_composite_from_unknown_id_fails() {
        let (_, _, mut constants) = make_managers();

        assert!(constants.composite_from_ids(8, &[10, 99]).is_none());
    }

    #[test]
    fn test_scalar_from_words_shapes() {
        let (_, types, mut constants) = make_managers();

        let null = constants.scalar_from_words(&types, 7, &[]).unwrap();
        assert!(constants.get(null).is_null());

        let bool_true = constants.scalar_from_words(&types, 3, &[1]).unwrap();
        assert!(constants.get(bool_true).as_bool());

        // A 32-bit type rejects two literal words.
        assert!(constants.scalar_from_words(&types, 6, &[1, 2]).is_none());
    }

    #[test]
    fn test_get_defining_instruction_reuses_declared() {
        let (mut module, types, mut constants) = make_managers();
        let mut def_use = DefUseManager::build(&module);

        let two = constants.constant_from_defining_id(10).unwrap();
        let id = constants
            .get_defining_instruction(&mut module, &types, &mut def_use, two)
            .unwrap();
        assert_eq!(id, 10);
    }

    #[test]
    fn test_get_defining_instruction_materializes() {
        let (mut module, types, mut constants) = make_managers();
        let mut def_use = DefUseManager::build(&module);
        let globals_before = module.globals().len();

        let three = constants.float_constant(7, u64::from(3.0f32.to_bits()));
        assert!(constants.find_declared_constant(three).is_none());

        let id = constants
            .get_defining_instruction(&mut module, &types, &mut def_use, three)
            .unwrap();

        assert_eq!(module.globals().len(), globals_before + 1);
        assert!(id >= 14);
        assert!(module.bound() > id);
        assert_eq!(constants.find_declared_constant(three), Some(id));
        assert!(def_use.is_defined(id));

        // A second request returns the same declaration.
        let again = constants
            .get_defining_instruction(&mut module, &types, &mut def_use, three)
            .unwrap();
        assert_eq!(again, id);
    }

    #[test]
    fn test_materialize_composite_declares_components() {
        let (mut module, types, mut constants) = make_managers();
        let mut def_use = DefUseManager::build(&module);

        let three = constants.float_constant(7, u64::from(3.0f32.to_bits()));
        let vector = constants.composite_constant(8, vec![three, three]);

        let id = constants
            .get_defining_instruction(&mut module, &types, &mut def_use, vector)
            .unwrap();

        let declaration = module.global(id).unwrap();
        assert_eq!(declaration.op(), Op::ConstantComposite);
        let component_id = declaration.operand(0).unwrap().id().unwrap();
        let component = module.global(component_id).unwrap();
        assert_eq!(component.op(), Op::Constant);
    }
}
