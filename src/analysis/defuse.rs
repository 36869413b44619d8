//! Def-use tracking across a whole module.
//!
//! The manager records where every id is defined and how many times it is
//! referenced. It is built once per module and then kept current through
//! targeted updates: callers that insert, rewrite or erase instructions call
//! [`DefUseManager::analyze_inst_def`], [`DefUseManager::analyze_inst_use`]
//! and the `forget_*` counterparts instead of rebuilding from scratch.
//!
//! Reference counting is deliberately uniform. A use is any id operand of any
//! instruction anywhere in the module, branch targets, phi parent labels,
//! entry-point interfaces, debug names and decorations included, plus the
//! result type id an instruction carries. An id with a count of zero is
//! referenced by nothing at all.

use std::collections::HashMap;

use crate::spirv::{Function, Instruction, Module, Word};

/// Where an id is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefSite {
    /// A module-level instruction outside any function body.
    Global,
    /// An `OpFunction` or one of its `OpFunctionParameter`s.
    Function {
        /// The defining function's result id.
        function: Word,
    },
    /// An instruction inside a basic block; block labels define their own id
    /// with `block` equal to the id itself.
    Body {
        /// The containing function's result id.
        function: Word,
        /// The containing block's label id.
        block: Word,
    },
}

/// Definition sites and reference counts for every id in a module.
#[derive(Debug, Default)]
pub struct DefUseManager {
    definitions: HashMap<Word, DefSite>,
    use_counts: HashMap<Word, usize>,
}

impl DefUseManager {
    /// Builds def-use information for an entire module.
    #[must_use]
    pub fn build(module: &Module) -> Self {
        let mut manager = Self::default();

        for instruction in module.global_instructions() {
            manager.analyze_inst_def(instruction, DefSite::Global);
            manager.analyze_inst_use(instruction);
        }

        for function in module.functions() {
            manager.analyze_function(function);
        }

        manager
    }

    fn analyze_function(&mut self, function: &Function) {
        let site = DefSite::Function {
            function: function.id(),
        };
        self.definitions.insert(function.id(), site);
        // The OpFunction instruction itself references its result type and
        // its function type.
        self.count_use(function.result_type());
        self.count_use(function.function_type());

        for parameter in function.parameters() {
            self.analyze_inst_def(parameter, site);
            self.analyze_inst_use(parameter);
        }

        for block in function.blocks() {
            let body = DefSite::Body {
                function: function.id(),
                block: block.id(),
            };
            self.definitions.insert(block.id(), body);
            for instruction in block.instructions() {
                self.analyze_inst_def(instruction, body);
                self.analyze_inst_use(instruction);
            }
        }
    }

    /// Registers the definition made by an instruction, if it has one.
    pub fn analyze_inst_def(&mut self, instruction: &Instruction, site: DefSite) {
        if let Some(id) = instruction.result_id() {
            self.definitions.insert(id, site);
        }
    }

    /// Registers a block label definition.
    pub fn analyze_label_def(&mut self, function: Word, label: Word) {
        self.definitions
            .insert(label, DefSite::Body { function, block: label });
    }

    /// Counts the references an instruction makes.
    pub fn analyze_inst_use(&mut self, instruction: &Instruction) {
        if let Some(result_type) = instruction.result_type() {
            self.count_use(result_type);
        }
        for id in instruction.id_operands() {
            self.count_use(id);
        }
    }

    /// Releases the references an instruction makes, before it is erased or
    /// rewritten.
    pub fn forget_inst_uses(&mut self, instruction: &Instruction) {
        if let Some(result_type) = instruction.result_type() {
            self.release_use(result_type);
        }
        for id in instruction.id_operands() {
            self.release_use(id);
        }
    }

    /// Drops the definition record for an id. Reference counts held by other
    /// instructions are unaffected.
    pub fn forget_def(&mut self, id: Word) {
        self.definitions.remove(&id);
    }

    fn count_use(&mut self, id: Word) {
        *self.use_counts.entry(id).or_insert(0) += 1;
    }

    fn release_use(&mut self, id: Word) {
        if let Some(count) = self.use_counts.get_mut(&id) {
            *count = count.saturating_sub(1);
        }
    }

    /// Returns the definition site of an id, if it is defined.
    #[must_use]
    pub fn def_site(&self, id: Word) -> Option<DefSite> {
        self.definitions.get(&id).copied()
    }

    /// Returns `true` if the id has a registered definition.
    #[must_use]
    pub fn is_defined(&self, id: Word) -> bool {
        self.definitions.contains_key(&id)
    }

    /// Returns the number of references to an id.
    #[must_use]
    pub fn use_count(&self, id: Word) -> usize {
        self.use_counts.get(&id).copied().unwrap_or(0)
    }

    /// Returns `true` if nothing in the module references the id.
    #[must_use]
    pub fn is_unreferenced(&self, id: Word) -> bool {
        self.use_count(id) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::{BasicBlock, FunctionControl, Op, Operand};

    // void main() { %8 = OpIAdd %6 %7 %7; return; } with %7 a constant.
    fn make_module() -> Module {
        let mut module = Module::new();
        module.push_global(Instruction::new(Op::TypeVoid, None, Some(2), Vec::new()));
        module.push_global(Instruction::new(
            Op::TypeFunction,
            None,
            Some(3),
            vec![Operand::Id(2)],
        ));
        module.push_global(Instruction::new(
            Op::TypeInt,
            None,
            Some(6),
            vec![Operand::Literal(32), Operand::Literal(1)],
        ));
        module.push_global(Instruction::new(
            Op::Constant,
            Some(6),
            Some(7),
            vec![Operand::Literal(1)],
        ));

        let mut function = Function::new(4, 2, FunctionControl::empty(), 3);
        let mut block = BasicBlock::new(5);
        block.push(Instruction::new(
            Op::IAdd,
            Some(6),
            Some(8),
            vec![Operand::Id(7), Operand::Id(7)],
        ));
        block.push(Instruction::new(Op::Return, None, None, Vec::new()));
        function.add_block(block);
        module.add_function(function);
        module.ensure_bound_covers(8);
        module
    }

    #[test]
    fn test_build_records_definitions() {
        let module = make_module();
        let manager = DefUseManager::build(&module);

        assert_eq!(manager.def_site(2), Some(DefSite::Global));
        assert_eq!(manager.def_site(4), Some(DefSite::Function { function: 4 }));
        assert_eq!(
            manager.def_site(5),
            Some(DefSite::Body {
                function: 4,
                block: 5
            })
        );
        assert_eq!(
            manager.def_site(8),
            Some(DefSite::Body {
                function: 4,
                block: 5
            })
        );
        assert!(!manager.is_defined(99));
    }

    #[test]
    fn test_build_counts_uses() {
        let module = make_module();
        let manager = DefUseManager::build(&module);

        // %2: return type in OpTypeFunction, result type of OpFunction.
        assert_eq!(manager.use_count(2), 2);
        // %6: result type of the constant and of the add.
        assert_eq!(manager.use_count(6), 2);
        // %7: both add operands.
        assert_eq!(manager.use_count(7), 2);
        // %8 is dead.
        assert!(manager.is_unreferenced(8));
        assert!(!manager.is_unreferenced(7));
    }

    #[test]
    fn test_phi_parents_count_as_uses() {
        let manager = {
            let mut manager = DefUseManager::default();
            let phi = Instruction::phi(6, 20, &[(7, 5), (8, 9)]);
            manager.analyze_inst_use(&phi);
            manager
        };

        assert_eq!(manager.use_count(5), 1);
        assert_eq!(manager.use_count(9), 1);
        assert_eq!(manager.use_count(7), 1);
        assert_eq!(manager.use_count(6), 1);
    }

    #[test]
    fn test_forget_inst_uses() {
        let module = make_module();
        let mut manager = DefUseManager::build(&module);

        let add = module.functions()[0].blocks()[0].instructions()[0].clone();
        manager.forget_inst_uses(&add);

        assert!(manager.is_unreferenced(7));
        // The constant's own result type reference remains.
        assert_eq!(manager.use_count(6), 1);
    }

    #[test]
    fn test_forget_def() {
        let module = make_module();
        let mut manager = DefUseManager::build(&module);

        manager.forget_def(8);
        assert!(!manager.is_defined(8));
        assert!(manager.is_defined(7));
    }

    #[test]
    fn test_incremental_def_registration() {
        let mut manager = DefUseManager::default();
        let phi = Instruction::phi(6, 30, &[(7, 5)]);
        manager.analyze_inst_def(
            &phi,
            DefSite::Body {
                function: 4,
                block: 5,
            },
        );
        manager.analyze_inst_use(&phi);

        assert!(manager.is_defined(30));
        assert!(manager.is_unreferenced(30));
        assert_eq!(manager.use_count(7), 1);
    }
}
