//! Type information recovered from a module's global section.
//!
//! Folding needs to answer a small set of questions about result types: is
//! this a 32-bit signed integer, what is the element type of this vector, how
//! wide is this float. The [`TypeManager`] indexes every `OpType*` declaration
//! by result id so those questions are one lookup away.
//!
//! The manager is a read-only snapshot. Constant folding never introduces
//! types that are not already declared, so it stays valid for the lifetime of
//! the module it was built from.

use std::collections::HashMap;

use crate::spirv::{Module, Op, Operand, StorageClass, Word};

/// A declared type, keyed by its result id in [`TypeManager`].
///
/// Component references are type ids rather than nested values, mirroring the
/// module's own representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// `OpTypeVoid`.
    Void,
    /// `OpTypeBool`.
    Bool,
    /// `OpTypeInt`.
    Int {
        /// Bit width, 32 or 64 in every module this crate folds.
        width: u32,
        /// True for signed integers.
        signed: bool,
    },
    /// `OpTypeFloat`.
    Float {
        /// Bit width, 32 or 64.
        width: u32,
    },
    /// `OpTypeVector`.
    Vector {
        /// Element type id.
        element: Word,
        /// Component count, 2 to 4.
        count: u32,
    },
    /// `OpTypeMatrix`.
    Matrix {
        /// Column type id.
        column: Word,
        /// Column count.
        count: u32,
    },
    /// `OpTypeStruct`.
    Struct {
        /// Member type ids in declaration order.
        members: Vec<Word>,
    },
    /// `OpTypeArray`.
    Array {
        /// Element type id.
        element: Word,
        /// Id of the constant holding the length.
        length: Word,
    },
    /// `OpTypeRuntimeArray`.
    RuntimeArray {
        /// Element type id.
        element: Word,
    },
    /// `OpTypePointer`.
    Pointer {
        /// Storage class of the pointee.
        storage: StorageClass,
        /// Pointee type id.
        pointee: Word,
    },
    /// Any other type opcode; carried so lookups do not fail, never folded.
    Opaque,
}

impl Type {
    /// Returns `true` for `Float` of any width.
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float { .. })
    }

    /// Returns `true` for `Int` of any width or signedness.
    #[must_use]
    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int { .. })
    }
}

/// Index of every declared type in a module.
#[derive(Debug, Default)]
pub struct TypeManager {
    types: HashMap<Word, Type>,
}

impl TypeManager {
    /// Builds the index from a module's global declarations.
    #[must_use]
    pub fn build(module: &Module) -> Self {
        let mut types = HashMap::new();
        for instruction in module.globals() {
            let Some(id) = instruction.result_id() else {
                continue;
            };
            let operands = instruction.operands();
            let ty = match instruction.op() {
                Op::TypeVoid => Type::Void,
                Op::TypeBool => Type::Bool,
                Op::TypeInt => Type::Int {
                    width: literal_at(operands, 0),
                    signed: literal_at(operands, 1) != 0,
                },
                Op::TypeFloat => Type::Float {
                    width: literal_at(operands, 0),
                },
                Op::TypeVector => Type::Vector {
                    element: id_at(operands, 0),
                    count: literal_at(operands, 1),
                },
                Op::TypeMatrix => Type::Matrix {
                    column: id_at(operands, 0),
                    count: literal_at(operands, 1),
                },
                Op::TypeStruct => Type::Struct {
                    members: operands.iter().filter_map(Operand::id).collect(),
                },
                Op::TypeArray => Type::Array {
                    element: id_at(operands, 0),
                    length: id_at(operands, 1),
                },
                Op::TypeRuntimeArray => Type::RuntimeArray {
                    element: id_at(operands, 0),
                },
                Op::TypePointer => Type::Pointer {
                    storage: StorageClass::from_word(literal_at(operands, 0)),
                    pointee: id_at(operands, 1),
                },
                op if op.is_type() => Type::Opaque,
                _ => continue,
            };
            types.insert(id, ty);
        }
        Self { types }
    }

    /// Looks up a type by result id.
    #[must_use]
    pub fn get(&self, id: Word) -> Option<&Type> {
        self.types.get(&id)
    }

    /// Returns the scalar type behind `id`: the element type for vectors, the
    /// type itself for scalars.
    #[must_use]
    pub fn scalar_type(&self, id: Word) -> Option<&Type> {
        match self.get(id)? {
            Type::Vector { element, .. } => self.get(*element),
            other => Some(other),
        }
    }

    /// Returns the element type id and component count if `id` is a vector
    /// type.
    #[must_use]
    pub fn vector_info(&self, id: Word) -> Option<(Word, u32)> {
        match self.get(id)? {
            Type::Vector { element, count } => Some((*element, *count)),
            _ => None,
        }
    }

    /// Returns `true` if `id` is a float scalar or a vector of floats.
    #[must_use]
    pub fn is_float_scalar_or_vector(&self, id: Word) -> bool {
        self.scalar_type(id).is_some_and(Type::is_float)
    }
}

fn literal_at(operands: &[Operand], index: usize) -> u32 {
    operands.get(index).and_then(Operand::literal).unwrap_or(0)
}

fn id_at(operands: &[Operand], index: usize) -> Word {
    operands.get(index).and_then(Operand::id).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::Instruction;

    fn make_module() -> Module {
        let mut module = Module::new();
        module.push_global(Instruction::new(Op::TypeVoid, None, Some(2), Vec::new()));
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
            vec![Operand::Id(7), Operand::Literal(4)],
        ));
        module.push_global(Instruction::new(
            Op::TypePointer,
            None,
            Some(9),
            vec![Operand::Literal(7), Operand::Id(7)],
        ));
        module.ensure_bound_covers(9);
        module
    }

    #[test]
    fn test_scalar_types() {
        let types = TypeManager::build(&make_module());

        assert_eq!(types.get(2), Some(&Type::Void));
        assert_eq!(types.get(3), Some(&Type::Bool));
        assert_eq!(
            types.get(6),
            Some(&Type::Int {
                width: 32,
                signed: true
            })
        );
        assert_eq!(types.get(7), Some(&Type::Float { width: 32 }));
        assert_eq!(types.get(99), None);
    }

    #[test]
    fn test_vector_info() {
        let types = TypeManager::build(&make_module());

        assert_eq!(types.vector_info(8), Some((7, 4)));
        assert_eq!(types.vector_info(7), None);
        assert_eq!(types.scalar_type(8), Some(&Type::Float { width: 32 }));
    }

    #[test]
    fn test_float_queries() {
        let types = TypeManager::build(&make_module());

        assert!(types.is_float_scalar_or_vector(7));
        assert!(types.is_float_scalar_or_vector(8));
        assert!(!types.is_float_scalar_or_vector(6));
        assert!(!types.is_float_scalar_or_vector(3));
    }

    #[test]
    fn test_pointer_storage_class() {
        let types = TypeManager::build(&make_module());

        assert_eq!(
            types.get(9),
            Some(&Type::Pointer {
                storage: StorageClass::Function,
                pointee: 7
            })
        );
    }
}
