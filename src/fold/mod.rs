//! Constant folding over instructions.
//!
//! A [`FoldingRules`] registry maps opcodes to ordered lists of folding
//! rules. [`FoldingRules::fold_instruction`] resolves the instruction's
//! operands to constant handles, then tries each rule registered for the
//! opcode in registration order; the first rule that produces a constant
//! wins. A rule that declines returns `None`, which is an ordinary outcome
//! and never an error.
//!
//! Rules work on interned [`ConstantId`] handles, so folding the same
//! expression twice yields the same handle. Results are not declared in the
//! module unless a rule has to materialize them (vector shuffles do, to name
//! component constants by id).
//!
//! Floating-point rules additionally require
//! [`Instruction::float_folding_allowed`]; callers decide per instruction
//! whether IEEE edge cases may be collapsed at compile time.

mod rules;

pub use rules::compare_floating_point;

use std::collections::HashMap;

use crate::analysis::{ConstantId, ConstantManager, DefUseManager, TypeManager};
use crate::spirv::{Instruction, Module, Op};
use crate::Result;

/// The state a folding rule may read and extend.
///
/// Rules intern new constants through `constants` and occasionally declare
/// them in `module`, which also updates `def_use`. The type index is never
/// modified; folding creates no new types.
pub struct FoldingContext<'a> {
    /// The module being folded.
    pub module: &'a mut Module,
    /// Constant pool for the module.
    pub constants: &'a mut ConstantManager,
    /// Type index for the module.
    pub types: &'a TypeManager,
    /// Def-use information, kept current across materialization.
    pub def_use: &'a mut DefUseManager,
}

impl<'a> FoldingContext<'a> {
    /// Bundles the analyses folding works against.
    pub fn new(
        module: &'a mut Module,
        constants: &'a mut ConstantManager,
        types: &'a TypeManager,
        def_use: &'a mut DefUseManager,
    ) -> Self {
        Self { module, constants, types, def_use }
    }
}

/// One folding rule.
///
/// The rule receives the instruction, its operands resolved to constant
/// handles (`None` for literal operands and ids that are not declared
/// constants), and the folding context. It returns the folded constant,
/// `None` when it does not apply, or an error only for invariant violations
/// such as id space exhaustion.
pub type FoldingRule = Box<
    dyn Fn(
        &Instruction,
        &[Option<ConstantId>],
        &mut FoldingContext<'_>,
    ) -> Result<Option<ConstantId>>,
>;

/// Opcode-indexed registry of folding rules.
pub struct FoldingRules {
    rules: HashMap<Op, Vec<FoldingRule>>,
}

impl FoldingRules {
    /// A registry with the standard rule catalogue installed.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        rules::register_all(&mut registry);
        registry
    }

    /// A registry with no rules.
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: HashMap::new() }
    }

    /// Appends a rule for an opcode, after any rules already registered
    /// for it.
    pub fn register_rule(&mut self, op: Op, rule: FoldingRule) {
        self.rules.entry(op).or_default().push(rule);
    }

    /// The rules registered for an opcode, in registration order.
    #[must_use]
    pub fn lookup(&self, op: Op) -> &[FoldingRule] {
        self.rules.get(&op).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if at least one rule is registered for the opcode.
    #[must_use]
    pub fn has_rules(&self, op: Op) -> bool {
        !self.lookup(op).is_empty()
    }

    /// Attempts to fold one instruction to a constant.
    ///
    /// Operands are resolved against the context's constant pool, then the
    /// opcode's rules run in registration order until one produces a value.
    /// `Ok(None)` means no rule applied.
    ///
    /// # Errors
    ///
    /// Only rule-internal invariant failures surface here; an instruction
    /// that simply cannot be folded is `Ok(None)`.
    pub fn fold_instruction(
        &self,
        instruction: &Instruction,
        context: &mut FoldingContext<'_>,
    ) -> Result<Option<ConstantId>> {
        let operands = context.constants.operand_constants(instruction);
        for rule in self.lookup(instruction.op()) {
            if let Some(folded) = rule(instruction, &operands, context)? {
                return Ok(Some(folded));
            }
        }
        Ok(None)
    }
}

impl Default for FoldingRules {
    fn default() -> Self {
        Self::new()
    }
}
