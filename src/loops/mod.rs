//! Loop discovery and loop restructuring.
//!
//! [`LoopNest::detect`] finds the natural loops of a function from back edges
//! in the dominator tree and links them into a nesting forest. Each [`Loop`]
//! records its header, its latch and merge and preheader blocks where they
//! exist, and the full member block set (nested loops included).
//!
//! [`LoopUtils`] bundles the mutable state loop transforms need: the module,
//! the def-use manager and the loop nest, all externally owned. Its operations
//! are split across submodules:
//!
//! - exit dedication and loop-closed SSA construction in [`lcssa`]
//! - loop body duplication in [`clone`]
//!
//! # Block membership
//!
//! A loop's block set is inclusive: the blocks of nested loops are members of
//! every enclosing loop. The merge block is never a member. All queries here
//! are against that inclusive set.

mod clone;
mod lcssa;

pub use clone::LoopCloningResult;

use std::collections::{HashMap, HashSet};

use crate::analysis::{ControlFlowGraph, DefUseManager};
use crate::spirv::{Function, Module, Op, Operand, Word};
use crate::{Error, Result};

/// Handle to a loop in a [`LoopNest`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(usize);

/// One natural loop.
#[derive(Debug, Clone)]
pub struct Loop {
    /// Header block label; target of every back edge of this loop.
    header: Word,
    /// Back-edge source, when the loop has exactly one back edge.
    latch: Option<Word>,
    /// Merge block, from `OpLoopMerge` or the single-exit fallback. Not a
    /// member of the loop.
    merge: Option<Word>,
    /// The unique out-of-loop predecessor of the header whose only successor
    /// is the header, when that shape exists.
    preheader: Option<Word>,
    /// Member block labels, nested loops included.
    blocks: HashSet<Word>,
    parent: Option<LoopId>,
    children: Vec<LoopId>,
}

impl Loop {
    pub(crate) fn new(header: Word) -> Self {
        let mut blocks = HashSet::new();
        blocks.insert(header);
        Self {
            header,
            latch: None,
            merge: None,
            preheader: None,
            blocks,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Returns the header block label.
    #[must_use]
    pub const fn header(&self) -> Word {
        self.header
    }

    /// Returns the latch block label, when the loop has a single back edge.
    #[must_use]
    pub const fn latch(&self) -> Option<Word> {
        self.latch
    }

    /// Returns the merge block label, if known.
    #[must_use]
    pub const fn merge(&self) -> Option<Word> {
        self.merge
    }

    /// Returns the preheader block label, if the loop has one.
    #[must_use]
    pub const fn preheader(&self) -> Option<Word> {
        self.preheader
    }

    /// Returns the member block set, nested loops included.
    #[must_use]
    pub fn blocks(&self) -> &HashSet<Word> {
        &self.blocks
    }

    /// Returns `true` if `block` belongs to this loop or any loop nested in
    /// it.
    #[must_use]
    pub fn contains(&self, block: Word) -> bool {
        self.blocks.contains(&block)
    }

    /// Returns the enclosing loop, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<LoopId> {
        self.parent
    }

    /// Returns the loops directly nested in this one.
    #[must_use]
    pub fn children(&self) -> &[LoopId] {
        &self.children
    }

    pub(crate) fn set_latch(&mut self, latch: Option<Word>) {
        self.latch = latch;
    }

    pub(crate) fn set_merge(&mut self, merge: Option<Word>) {
        self.merge = merge;
    }

    pub(crate) fn set_preheader(&mut self, preheader: Option<Word>) {
        self.preheader = preheader;
    }

    pub(crate) fn add_block(&mut self, block: Word) {
        self.blocks.insert(block);
    }
}

/// The loops of one function, as a nesting forest.
#[derive(Debug, Default)]
pub struct LoopNest {
    loops: Vec<Loop>,
    roots: Vec<LoopId>,
}

impl LoopNest {
    /// Discovers the natural loops of a function.
    ///
    /// A back edge is an edge whose target dominates its source. Back edges
    /// sharing a target form one loop; the body is gathered by walking
    /// predecessors backward from the latches, restricted to blocks the
    /// header dominates, which keeps unreachable and irreducible edges out.
    ///
    /// The merge block comes from the header's `OpLoopMerge` when present;
    /// a loop without one falls back to its single exit block when the exit
    /// is unique.
    #[must_use]
    pub fn detect(function: &Function, cfg: &ControlFlowGraph) -> Self {
        let mut headers_in_order: Vec<Word> = Vec::new();
        let mut back_edge_sources: HashMap<Word, Vec<Word>> = HashMap::new();
        for &block in cfg.labels() {
            for &successor in cfg.successors(block) {
                if cfg.dominates(successor, block) {
                    let sources = back_edge_sources.entry(successor).or_default();
                    if sources.is_empty() {
                        headers_in_order.push(successor);
                    }
                    sources.push(block);
                }
            }
        }

        let mut nest = Self::default();
        for header in headers_in_order {
            let sources = &back_edge_sources[&header];
            let mut l = Loop::new(header);
            l.set_latch(match sources.as_slice() {
                &[latch] => Some(latch),
                _ => None,
            });

            // Everything that reaches a latch without passing the header.
            let mut worklist: Vec<Word> = Vec::new();
            for &source in sources {
                if l.blocks.insert(source) {
                    worklist.push(source);
                }
            }
            while let Some(block) = worklist.pop() {
                for &pred in cfg.predecessors(block) {
                    if cfg.dominates(header, pred) && l.blocks.insert(pred) {
                        worklist.push(pred);
                    }
                }
            }

            l.set_merge(merge_from_header(function, header));
            l.set_preheader(find_preheader(cfg, &l));

            let id = LoopId(nest.loops.len());
            nest.loops.push(l);
            nest.roots.push(id);
        }

        nest.link_nesting();

        // Single-exit fallback for loops without a declared merge block.
        for index in 0..nest.loops.len() {
            let id = LoopId(index);
            if nest.get(id).merge().is_none() {
                if let [exit] = nest.exit_blocks(id, cfg).as_slice() {
                    nest.loops[index].set_merge(Some(*exit));
                }
            }
        }

        nest
    }

    /// Links parent/child edges by block-set containment: the parent of a
    /// loop is the smallest other loop containing its header.
    fn link_nesting(&mut self) {
        let count = self.loops.len();
        for index in 0..count {
            let header = self.loops[index].header;
            let mut parent: Option<usize> = None;
            for candidate in 0..count {
                if candidate == index || !self.loops[candidate].blocks.contains(&header) {
                    continue;
                }
                let better = parent.map_or(true, |current| {
                    self.loops[candidate].blocks.len() < self.loops[current].blocks.len()
                });
                if better {
                    parent = Some(candidate);
                }
            }
            if let Some(parent_index) = parent {
                self.loops[index].parent = Some(LoopId(parent_index));
                self.loops[parent_index].children.push(LoopId(index));
            }
        }
        self.roots = (0..count)
            .map(LoopId)
            .filter(|id| self.loops[id.0].parent.is_none())
            .collect();
    }

    /// Returns the number of loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns `true` if the function has no loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Returns the loop behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle comes from a different nest.
    #[must_use]
    pub fn get(&self, id: LoopId) -> &Loop {
        &self.loops[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: LoopId) -> &mut Loop {
        &mut self.loops[id.0]
    }

    /// Iterates over all loop handles in discovery order.
    pub fn ids(&self) -> impl Iterator<Item = LoopId> {
        (0..self.loops.len()).map(LoopId)
    }

    /// Returns the outermost loops.
    #[must_use]
    pub fn roots(&self) -> &[LoopId] {
        &self.roots
    }

    /// Returns the handles of all loops nested in `id`, pre-order, the loop
    /// itself excluded.
    #[must_use]
    pub fn descendants(&self, id: LoopId) -> Vec<LoopId> {
        let mut result = Vec::new();
        let mut stack: Vec<LoopId> = self.get(id).children().iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            result.push(current);
            for &child in self.get(current).children().iter().rev() {
                stack.push(child);
            }
        }
        result
    }

    /// Returns the smallest loop containing `block`, if any.
    #[must_use]
    pub fn innermost_containing(&self, block: Word) -> Option<LoopId> {
        self.ids()
            .filter(|&id| self.get(id).contains(block))
            .min_by_key(|&id| self.get(id).blocks.len())
    }

    /// Returns the exit blocks of a loop: out-of-loop successors of member
    /// blocks, in function order, each listed once.
    #[must_use]
    pub fn exit_blocks(&self, id: LoopId, cfg: &ControlFlowGraph) -> Vec<Word> {
        let l = self.get(id);
        let mut exits = Vec::new();
        for &block in cfg.labels() {
            if !l.contains(block) {
                continue;
            }
            for &successor in cfg.successors(block) {
                if !l.contains(successor) && !exits.contains(&successor) {
                    exits.push(successor);
                }
            }
        }
        exits
    }

    /// Returns the merging region of a loop: the merge block plus every block
    /// reached from it by walking predecessor edges without entering the
    /// loop. Empty when the loop has no merge block.
    #[must_use]
    pub fn merging_blocks(&self, id: LoopId, cfg: &ControlFlowGraph) -> Vec<Word> {
        let l = self.get(id);
        let Some(merge) = l.merge() else {
            return Vec::new();
        };
        let mut region = vec![merge];
        let mut stack = vec![merge];
        while let Some(block) = stack.pop() {
            for &pred in cfg.predecessors(block) {
                if !l.contains(pred) && !region.contains(&pred) {
                    region.push(pred);
                    stack.push(pred);
                }
            }
        }
        region
    }

    /// Adds `block` to a loop and to every loop enclosing it, keeping the
    /// inclusive-membership invariant.
    pub(crate) fn add_block_to(&mut self, id: LoopId, block: Word) {
        let mut current = Some(id);
        while let Some(loop_id) = current {
            self.loops[loop_id.0].add_block(block);
            current = self.loops[loop_id.0].parent;
        }
    }

    /// Registers a new loop under `parent` and returns its handle.
    pub fn add_loop(&mut self, mut l: Loop, parent: Option<LoopId>) -> LoopId {
        let id = LoopId(self.loops.len());
        l.parent = parent;
        self.loops.push(l);
        match parent {
            Some(parent_id) => self.loops[parent_id.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }
}

fn merge_from_header(function: &Function, header: Word) -> Option<Word> {
    let merge_inst = function.block(header)?.merge_instruction()?;
    if merge_inst.op() != Op::LoopMerge {
        return None;
    }
    merge_inst.operand(0).and_then(Operand::id)
}

fn find_preheader(cfg: &ControlFlowGraph, l: &Loop) -> Option<Word> {
    let outside: Vec<Word> = cfg
        .predecessors(l.header())
        .iter()
        .copied()
        .filter(|&pred| !l.contains(pred))
        .collect();
    match outside.as_slice() {
        &[pred] if cfg.successors(pred).len() == 1 => Some(pred),
        _ => None,
    }
}

/// Shared state for loop transforms: exit dedication, loop-closed SSA and
/// cloning.
///
/// Holds mutable borrows of the module, the def-use manager and the loop
/// nest; all three stay consistent across the transform. The control-flow
/// graph is rebuilt internally after structural edits.
pub struct LoopUtils<'a> {
    module: &'a mut Module,
    function_id: Word,
    def_use: &'a mut DefUseManager,
    nest: &'a mut LoopNest,
    loop_id: LoopId,
}

impl<'a> LoopUtils<'a> {
    /// Creates the transform context for one loop of one function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if the function or the loop
    /// handle does not exist.
    pub fn new(
        module: &'a mut Module,
        function_id: Word,
        def_use: &'a mut DefUseManager,
        nest: &'a mut LoopNest,
        loop_id: LoopId,
    ) -> Result<Self> {
        if module.function(function_id).is_none() {
            return Err(Error::InvariantViolation(format!(
                "no function with result id %{function_id}"
            )));
        }
        if loop_id.0 >= nest.len() {
            return Err(Error::InvariantViolation(
                "loop handle out of range".to_string(),
            ));
        }
        Ok(Self {
            module,
            function_id,
            def_use,
            nest,
            loop_id,
        })
    }

    /// Returns the handle of the loop being transformed.
    #[must_use]
    pub const fn loop_id(&self) -> LoopId {
        self.loop_id
    }

    fn cfg(&self) -> Result<ControlFlowGraph> {
        ControlFlowGraph::build(function_of(self.module, self.function_id)?)
    }
}

pub(crate) fn function_of(module: &Module, id: Word) -> Result<&Function> {
    module.function(id).ok_or_else(|| {
        Error::InvariantViolation(format!("no function with result id %{id}"))
    })
}

pub(crate) fn function_of_mut(module: &mut Module, id: Word) -> Result<&mut Function> {
    module.function_mut(id).ok_or_else(|| {
        Error::InvariantViolation(format!("no function with result id %{id}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::{BasicBlock, FunctionControl, Instruction};

    fn branch_block(label: Word, target: Word) -> BasicBlock {
        let mut block = BasicBlock::new(label);
        block.push(Instruction::branch(target));
        block
    }

    fn conditional_block(label: Word, cond: Word, then: Word, alt: Word) -> BasicBlock {
        let mut block = BasicBlock::new(label);
        block.push(Instruction::new(
            Op::BranchConditional,
            None,
            None,
            vec![Operand::Id(cond), Operand::Id(then), Operand::Id(alt)],
        ));
        block
    }

    fn return_block(label: Word) -> BasicBlock {
        let mut block = BasicBlock::new(label);
        block.push(Instruction::new(Op::Return, None, None, Vec::new()));
        block
    }

    // %20 -> %10 (header, merge %12, continue %34) -> %11 -> (%34 | %12),
    // %34 -> %10.
    fn make_loop_function() -> Function {
        let mut function = Function::new(4, 2, FunctionControl::empty(), 3);
        function.add_block(branch_block(20, 10));

        let mut header = BasicBlock::new(10);
        header.push(Instruction::new(
            Op::LoopMerge,
            None,
            None,
            vec![Operand::Id(12), Operand::Id(34), Operand::Literal(0)],
        ));
        header.push(Instruction::branch(11));
        function.add_block(header);

        function.add_block(conditional_block(11, 9, 34, 12));
        function.add_block(branch_block(34, 10));
        function.add_block(return_block(12));
        function
    }

    // Outer loop %30 contains inner loop %40.
    // %25 -> %30 -> %40 -> %41 -> (%40 | %48), %48 -> (%30 | %50).
    fn make_nested_function() -> Function {
        let mut function = Function::new(4, 2, FunctionControl::empty(), 3);
        function.add_block(branch_block(25, 30));

        let mut outer = BasicBlock::new(30);
        outer.push(Instruction::new(
            Op::LoopMerge,
            None,
            None,
            vec![Operand::Id(50), Operand::Id(48), Operand::Literal(0)],
        ));
        outer.push(Instruction::branch(40));
        function.add_block(outer);

        let mut inner = BasicBlock::new(40);
        inner.push(Instruction::new(
            Op::LoopMerge,
            None,
            None,
            vec![Operand::Id(48), Operand::Id(41), Operand::Literal(0)],
        ));
        inner.push(Instruction::branch(41));
        function.add_block(inner);

        function.add_block(conditional_block(41, 9, 40, 48));
        function.add_block(conditional_block(48, 9, 30, 50));
        function.add_block(return_block(50));
        function
    }

    fn detect(function: &Function) -> (ControlFlowGraph, LoopNest) {
        let cfg = ControlFlowGraph::build(function).unwrap();
        let nest = LoopNest::detect(function, &cfg);
        (cfg, nest)
    }

    #[test]
    fn test_detect_simple_loop() {
        let function = make_loop_function();
        let (_, nest) = detect(&function);

        assert_eq!(nest.len(), 1);
        let l = nest.get(nest.roots()[0]);
        assert_eq!(l.header(), 10);
        assert_eq!(l.latch(), Some(34));
        assert_eq!(l.merge(), Some(12));
        assert_eq!(l.preheader(), Some(20));
        assert!(l.contains(10));
        assert!(l.contains(11));
        assert!(l.contains(34));
        assert!(!l.contains(12));
        assert!(!l.contains(20));
    }

    #[test]
    fn test_no_loops() {
        let mut function = Function::new(4, 2, FunctionControl::empty(), 3);
        function.add_block(branch_block(20, 21));
        function.add_block(return_block(21));
        let (_, nest) = detect(&function);

        assert!(nest.is_empty());
    }

    #[test]
    fn test_exit_blocks() {
        let function = make_loop_function();
        let (cfg, nest) = detect(&function);

        assert_eq!(nest.exit_blocks(nest.roots()[0], &cfg), vec![12]);
    }

    #[test]
    fn test_merging_blocks_stop_at_loop() {
        let function = make_loop_function();
        let (cfg, nest) = detect(&function);

        // The merge's only predecessor is inside the loop.
        assert_eq!(nest.merging_blocks(nest.roots()[0], &cfg), vec![12]);
    }

    #[test]
    fn test_nested_loops() {
        let function = make_nested_function();
        let (_, nest) = detect(&function);

        assert_eq!(nest.len(), 2);
        let outer_id = nest.innermost_containing(30).unwrap();
        let inner_id = nest.innermost_containing(40).unwrap();
        assert_ne!(outer_id, inner_id);

        let outer = nest.get(outer_id);
        let inner = nest.get(inner_id);
        assert_eq!(outer.header(), 30);
        assert_eq!(inner.header(), 40);
        assert_eq!(inner.parent(), Some(outer_id));
        assert_eq!(outer.parent(), None);
        assert_eq!(outer.children(), &[inner_id]);

        // Inclusive membership: the outer loop contains the inner body.
        assert!(outer.contains(41));
        assert!(inner.contains(41));
        assert!(!inner.contains(48));
        assert!(outer.contains(48));

        assert_eq!(nest.roots(), &[outer_id]);
        assert_eq!(nest.descendants(outer_id), vec![inner_id]);
    }

    #[test]
    fn test_innermost_containing() {
        let function = make_nested_function();
        let (_, nest) = detect(&function);

        let inner_id = nest.innermost_containing(41).unwrap();
        assert_eq!(nest.get(inner_id).header(), 40);
        assert!(nest.innermost_containing(50).is_none());
        assert!(nest.innermost_containing(25).is_none());
    }

    #[test]
    fn test_merge_fallback_without_loop_merge() {
        // Same shape as the simple loop but with no OpLoopMerge.
        let mut function = Function::new(4, 2, FunctionControl::empty(), 3);
        function.add_block(branch_block(20, 10));
        function.add_block(branch_block(10, 11));
        function.add_block(conditional_block(11, 9, 34, 12));
        function.add_block(branch_block(34, 10));
        function.add_block(return_block(12));
        let (_, nest) = detect(&function);

        assert_eq!(nest.len(), 1);
        assert_eq!(nest.get(nest.roots()[0]).merge(), Some(12));
    }

    #[test]
    fn test_multiple_back_edges_have_no_latch() {
        let mut function = Function::new(4, 2, FunctionControl::empty(), 3);
        function.add_block(branch_block(20, 10));
        function.add_block(conditional_block(10, 9, 11, 34));
        function.add_block(conditional_block(11, 9, 10, 12));
        function.add_block(branch_block(34, 10));
        function.add_block(return_block(12));
        let (_, nest) = detect(&function);

        assert_eq!(nest.len(), 1);
        let l = nest.get(nest.roots()[0]);
        assert_eq!(l.header(), 10);
        assert_eq!(l.latch(), None);
        assert!(l.contains(11));
        assert!(l.contains(34));
    }

    #[test]
    fn test_add_block_updates_ancestors() {
        let function = make_nested_function();
        let (_, mut nest) = detect(&function);

        let inner_id = nest.innermost_containing(40).unwrap();
        nest.add_block_to(inner_id, 99);

        let outer_id = nest.get(inner_id).parent().unwrap();
        assert!(nest.get(inner_id).contains(99));
        assert!(nest.get(outer_id).contains(99));
    }
}
