//! The standard folding rule catalogue.
//!
//! Composite rules (construct, extract, shuffle) fold regardless of the
//! floating-point gate. The floating-point rules (conversions, arithmetic,
//! comparisons) decline immediately unless the instruction allows float
//! folding, and otherwise follow IEEE semantics bit for bit.
//!
//! Null handling is uniform: a null scalar operand reads as zero, and a null
//! vector operand contributes a null constant per component.

use crate::analysis::{ConstantId, Type};
use crate::spirv::{Op, Word};
use crate::Result;

use super::{FoldingContext, FoldingRule, FoldingRules};

/// Shuffle index meaning "undefined component". Shuffles carrying it are
/// left unfolded.
const UNDEF_SHUFFLE_INDEX: Word = u32::MAX;

/// Installs the standard catalogue into a registry.
pub(crate) fn register_all(registry: &mut FoldingRules) {
    registry.register_rule(Op::CompositeConstruct, fold_composite_construct());
    registry.register_rule(Op::CompositeExtract, fold_composite_extract());
    registry.register_rule(Op::ConvertFToS, fold_fp_unary_op(fold_f_to_i));
    registry.register_rule(Op::ConvertFToU, fold_fp_unary_op(fold_f_to_i));
    registry.register_rule(Op::ConvertSToF, fold_fp_unary_op(fold_i_to_f));
    registry.register_rule(Op::ConvertUToF, fold_fp_unary_op(fold_i_to_f));
    registry.register_rule(Op::FAdd, fold_fp_binary_op(fold_fadd));
    registry.register_rule(Op::FDiv, fold_fp_binary_op(fold_fdiv));
    registry.register_rule(Op::FMul, fold_fp_binary_op(fold_fmul));
    registry.register_rule(Op::FSub, fold_fp_binary_op(fold_fsub));
    registry.register_rule(Op::FOrdEqual, fold_fp_binary_op(fold_ford_equal));
    registry.register_rule(Op::FUnordEqual, fold_fp_binary_op(fold_funord_equal));
    registry.register_rule(Op::FOrdNotEqual, fold_fp_binary_op(fold_ford_not_equal));
    registry.register_rule(Op::FUnordNotEqual, fold_fp_binary_op(fold_funord_not_equal));
    registry.register_rule(Op::FOrdLessThan, fold_fp_binary_op(fold_ford_less_than));
    registry.register_rule(Op::FUnordLessThan, fold_fp_binary_op(fold_funord_less_than));
    registry.register_rule(Op::FOrdGreaterThan, fold_fp_binary_op(fold_ford_greater_than));
    registry.register_rule(Op::FUnordGreaterThan, fold_fp_binary_op(fold_funord_greater_than));
    registry.register_rule(Op::FOrdLessThanEqual, fold_fp_binary_op(fold_ford_less_than_equal));
    registry
        .register_rule(Op::FUnordLessThanEqual, fold_fp_binary_op(fold_funord_less_than_equal));
    registry
        .register_rule(Op::FOrdGreaterThanEqual, fold_fp_binary_op(fold_ford_greater_than_equal));
    registry.register_rule(
        Op::FUnordGreaterThanEqual,
        fold_fp_binary_op(fold_funord_greater_than_equal),
    );
    registry.register_rule(Op::VectorShuffle, fold_vector_shuffle());
}

/// Combines a raw comparison result with NaN detection into the ordered or
/// unordered form.
///
/// Ordered comparisons are false whenever either operand is NaN; unordered
/// comparisons are true.
#[must_use]
pub const fn compare_floating_point(
    raw_result: bool,
    either_nan: bool,
    need_ordered: bool,
) -> bool {
    if need_ordered {
        !either_nan && raw_result
    } else {
        either_nan || raw_result
    }
}

/// Folds one scalar value; `result_type` is the scalar result type id.
type UnaryScalarRule =
    fn(Word, ConstantId, &mut FoldingContext<'_>) -> Result<Option<ConstantId>>;

/// Folds one pair of scalar values; `result_type` is the scalar result
/// type id.
type BinaryScalarRule =
    fn(Word, ConstantId, ConstantId, &mut FoldingContext<'_>) -> Result<Option<ConstantId>>;

/// Lifts a scalar rule over scalars and vectors, gated on float folding.
///
/// Vector operands fold component by component; every component of the
/// result is declared in the module before the composite is interned.
fn fold_fp_unary_op(scalar_rule: UnaryScalarRule) -> FoldingRule {
    Box::new(move |instruction, operands, context| {
        if !instruction.float_folding_allowed() {
            return Ok(None);
        }
        let Some(result_type) = instruction.result_type() else {
            return Ok(None);
        };
        let Some(operand) = operands.first().copied().flatten() else {
            return Ok(None);
        };
        if let Some((element_type, count)) = context.types.vector_info(result_type) {
            let Some(parts) = vector_components(operand, context) else {
                return Ok(None);
            };
            if parts.len() != count as usize {
                return Ok(None);
            }
            let mut results = Vec::with_capacity(parts.len());
            for part in parts {
                match scalar_rule(element_type, part, context)? {
                    Some(folded) => results.push(folded),
                    None => return Ok(None),
                }
            }
            declare_components(&results, context)?;
            return Ok(Some(context.constants.composite_constant(result_type, results)));
        }
        scalar_rule(result_type, operand, context)
    })
}

/// Binary counterpart of [`fold_fp_unary_op`].
fn fold_fp_binary_op(scalar_rule: BinaryScalarRule) -> FoldingRule {
    Box::new(move |instruction, operands, context| {
        if !instruction.float_folding_allowed() {
            return Ok(None);
        }
        let Some(result_type) = instruction.result_type() else {
            return Ok(None);
        };
        let (Some(first), Some(second)) =
            (operands.first().copied().flatten(), operands.get(1).copied().flatten())
        else {
            return Ok(None);
        };
        if let Some((element_type, count)) = context.types.vector_info(result_type) {
            let Some(first_parts) = vector_components(first, context) else {
                return Ok(None);
            };
            let Some(second_parts) = vector_components(second, context) else {
                return Ok(None);
            };
            if first_parts.len() != count as usize || second_parts.len() != count as usize {
                return Ok(None);
            }
            let mut results = Vec::with_capacity(first_parts.len());
            for (a, b) in first_parts.into_iter().zip(second_parts) {
                match scalar_rule(element_type, a, b, context)? {
                    Some(folded) => results.push(folded),
                    None => return Ok(None),
                }
            }
            declare_components(&results, context)?;
            return Ok(Some(context.constants.composite_constant(result_type, results)));
        }
        scalar_rule(result_type, first, second, context)
    })
}

/// The component handles of a vector constant. A null vector reads as one
/// null constant per component.
fn vector_components(
    constant: ConstantId,
    context: &mut FoldingContext<'_>,
) -> Option<Vec<ConstantId>> {
    let (type_id, components, null) = {
        let value = context.constants.get(constant);
        let components = value.components().map(|components| components.to_vec());
        (value.type_id(), components, value.is_null())
    };
    if let Some(components) = components {
        return Some(components);
    }
    if null {
        let (element_type, count) = context.types.vector_info(type_id)?;
        let element_null = context.constants.null_constant(element_type);
        return Some(vec![element_null; count as usize]);
    }
    None
}

/// Declares each handle in the module so composite results can reference
/// them by id.
fn declare_components(components: &[ConstantId], context: &mut FoldingContext<'_>) -> Result<()> {
    for &component in components {
        context.constants.get_defining_instruction(
            context.module,
            context.types,
            context.def_use,
            component,
        )?;
    }
    Ok(())
}

/// Scalar float to integer conversion.
///
/// Only 32-bit integer results fold; the result type's signedness selects
/// the truncation. Wider or narrower targets are left to the runtime.
fn fold_f_to_i(
    result_type: Word,
    operand: ConstantId,
    context: &mut FoldingContext<'_>,
) -> Result<Option<ConstantId>> {
    let (width, signed) = match context.types.get(result_type) {
        Some(Type::Int { width, signed }) => (*width, *signed),
        _ => return Ok(None),
    };
    if width != 32 {
        return Ok(None);
    }
    let operand_type = context.constants.get(operand).type_id();
    let bits = match context.types.get(operand_type) {
        Some(Type::Float { width: 32 }) => {
            let value = context.constants.get(operand).as_f32();
            if signed {
                value as i32 as u32
            } else {
                value as u32
            }
        }
        Some(Type::Float { width: 64 }) => {
            let value = context.constants.get(operand).as_f64();
            if signed {
                value as i32 as u32
            } else {
                value as u32
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(context.constants.int_constant(result_type, u64::from(bits))))
}

/// Scalar integer to float conversion.
///
/// The source must be a 32-bit integer and its own signedness decides how
/// the bits are read, whatever the opcode says.
fn fold_i_to_f(
    result_type: Word,
    operand: ConstantId,
    context: &mut FoldingContext<'_>,
) -> Result<Option<ConstantId>> {
    let operand_type = context.constants.get(operand).type_id();
    let signed = match context.types.get(operand_type) {
        Some(Type::Int { width: 32, signed }) => *signed,
        _ => return Ok(None),
    };
    let bits = match context.types.get(result_type) {
        Some(Type::Float { width: 32 }) => {
            let value = if signed {
                context.constants.get(operand).as_i32() as f32
            } else {
                context.constants.get(operand).as_u32() as f32
            };
            u64::from(value.to_bits())
        }
        Some(Type::Float { width: 64 }) => {
            let value = if signed {
                f64::from(context.constants.get(operand).as_i32())
            } else {
                f64::from(context.constants.get(operand).as_u32())
            };
            value.to_bits()
        }
        _ => return Ok(None),
    };
    Ok(Some(context.constants.float_constant(result_type, bits)))
}

/// Evaluates one arithmetic operation at the width of the result type.
fn fold_fp_arith(
    result_type: Word,
    a: ConstantId,
    b: ConstantId,
    context: &mut FoldingContext<'_>,
    op32: fn(f32, f32) -> f32,
    op64: fn(f64, f64) -> f64,
) -> Result<Option<ConstantId>> {
    let bits = match context.types.get(result_type) {
        Some(Type::Float { width: 32 }) => {
            let left = context.constants.get(a).as_f32();
            let right = context.constants.get(b).as_f32();
            u64::from(op32(left, right).to_bits())
        }
        Some(Type::Float { width: 64 }) => {
            let left = context.constants.get(a).as_f64();
            let right = context.constants.get(b).as_f64();
            op64(left, right).to_bits()
        }
        _ => return Ok(None),
    };
    Ok(Some(context.constants.float_constant(result_type, bits)))
}

/// Evaluates one comparison. The result type must be bool.
///
/// Promoting f32 operands to f64 is exact, so a single comparison path
/// serves both widths.
fn fold_fp_compare(
    result_type: Word,
    a: ConstantId,
    b: ConstantId,
    context: &mut FoldingContext<'_>,
    raw: fn(f64, f64) -> bool,
    need_ordered: bool,
) -> Result<Option<ConstantId>> {
    if !matches!(context.types.get(result_type), Some(Type::Bool)) {
        return Ok(None);
    }
    let operand_type = context.constants.get(a).type_id();
    let (left, right) = match context.types.get(operand_type) {
        Some(Type::Float { width: 32 }) => (
            f64::from(context.constants.get(a).as_f32()),
            f64::from(context.constants.get(b).as_f32()),
        ),
        Some(Type::Float { width: 64 }) => {
            (context.constants.get(a).as_f64(), context.constants.get(b).as_f64())
        }
        _ => return Ok(None),
    };
    let result =
        compare_floating_point(raw(left, right), left.is_nan() || right.is_nan(), need_ordered);
    Ok(Some(context.constants.bool_constant(result_type, result)))
}

macro_rules! fp_arith_rule {
    ($name:ident, $op:tt) => {
        fn $name(
            result_type: Word,
            a: ConstantId,
            b: ConstantId,
            context: &mut FoldingContext<'_>,
        ) -> Result<Option<ConstantId>> {
            fold_fp_arith(result_type, a, b, context, |x, y| x $op y, |x, y| x $op y)
        }
    };
}

fp_arith_rule!(fold_fadd, +);
fp_arith_rule!(fold_fsub, -);
fp_arith_rule!(fold_fmul, *);
fp_arith_rule!(fold_fdiv, /);

macro_rules! fp_compare_rule {
    ($name:ident, $op:tt, $need_ordered:expr) => {
        fn $name(
            result_type: Word,
            a: ConstantId,
            b: ConstantId,
            context: &mut FoldingContext<'_>,
        ) -> Result<Option<ConstantId>> {
            fold_fp_compare(result_type, a, b, context, |x, y| x $op y, $need_ordered)
        }
    };
}

fp_compare_rule!(fold_ford_equal, ==, true);
fp_compare_rule!(fold_funord_equal, ==, false);
fp_compare_rule!(fold_ford_not_equal, !=, true);
fp_compare_rule!(fold_funord_not_equal, !=, false);
fp_compare_rule!(fold_ford_less_than, <, true);
fp_compare_rule!(fold_funord_less_than, <, false);
fp_compare_rule!(fold_ford_greater_than, >, true);
fp_compare_rule!(fold_funord_greater_than, >, false);
fp_compare_rule!(fold_ford_less_than_equal, <=, true);
fp_compare_rule!(fold_funord_less_than_equal, <=, false);
fp_compare_rule!(fold_ford_greater_than_equal, >=, true);
fp_compare_rule!(fold_funord_greater_than_equal, >=, false);

/// `OpCompositeConstruct` folds only when every operand is a constant that
/// the module already declares; the result then references those constants
/// by handle. Any other operand fails the whole fold.
fn fold_composite_construct() -> FoldingRule {
    Box::new(|instruction, operands, context| {
        let Some(result_type) = instruction.result_type() else {
            return Ok(None);
        };
        let mut components = Vec::with_capacity(operands.len());
        for operand in operands {
            let Some(component) = *operand else {
                return Ok(None);
            };
            if context.constants.find_declared_constant(component).is_none() {
                return Ok(None);
            }
            components.push(component);
        }
        Ok(Some(context.constants.composite_constant(result_type, components)))
    })
}

/// `OpCompositeExtract` walks its literal indices through a constant
/// composite. A null composite at any step folds to null of the
/// instruction's result type.
fn fold_composite_extract() -> FoldingRule {
    Box::new(|instruction, operands, context| {
        let Some(result_type) = instruction.result_type() else {
            return Ok(None);
        };
        let Some(mut current) = operands.first().copied().flatten() else {
            return Ok(None);
        };
        for operand in instruction.operands().iter().skip(1) {
            let Some(index) = operand.literal() else {
                return Ok(None);
            };
            if context.constants.get(current).is_null() {
                return Ok(Some(context.constants.null_constant(result_type)));
            }
            let component = context
                .constants
                .get(current)
                .components()
                .and_then(|components| components.get(index as usize))
                .copied();
            current = match component {
                Some(component) => component,
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    })
}

/// `OpVectorShuffle` over two constant vectors selects components by
/// literal index, counting through the first vector into the second. Null
/// input vectors contribute null components, declared in the module so the
/// result can name them. The undef index sentinel blocks folding.
fn fold_vector_shuffle() -> FoldingRule {
    Box::new(|instruction, operands, context| {
        let Some(result_type) = instruction.result_type() else {
            return Ok(None);
        };
        let (Some(first), Some(second)) =
            (operands.first().copied().flatten(), operands.get(1).copied().flatten())
        else {
            return Ok(None);
        };
        let Some(first_parts) = vector_components(first, context) else {
            return Ok(None);
        };
        let Some(second_parts) = vector_components(second, context) else {
            return Ok(None);
        };

        let mut components = Vec::new();
        for operand in instruction.operands().iter().skip(2) {
            let Some(index) = operand.literal() else {
                return Ok(None);
            };
            if index == UNDEF_SHUFFLE_INDEX {
                return Ok(None);
            }
            let index = index as usize;
            let component = if index < first_parts.len() {
                first_parts.get(index).copied()
            } else {
                second_parts.get(index - first_parts.len()).copied()
            };
            let Some(component) = component else {
                return Ok(None);
            };
            context.constants.get_defining_instruction(
                context.module,
                context.types,
                context.def_use,
                component,
            )?;
            components.push(component);
        }
        Ok(Some(context.constants.composite_constant(result_type, components)))
    })
}
