//! Loop body duplication.
//!
//! Cloning copies a dominance-ordered region of blocks, renaming every label
//! and result id, and rebuilds descriptors for the cloned loop and its nested
//! loops. The clone is raw: branches into the region still target the
//! originals, and branches leaving the region keep their original targets.
//! Stitching the clone into the control flow is the caller's job; the result
//! carries the maps needed to do it.

use std::collections::HashMap;

use crate::analysis::DefSite;
use crate::spirv::{BasicBlock, Word};
use crate::{Error, Result};

use super::{function_of, Loop, LoopId, LoopUtils};

/// Outcome of [`LoopUtils::clone_loop`].
#[derive(Debug)]
pub struct LoopCloningResult {
    /// Old id to new id, covering every cloned label and result id.
    value_map: HashMap<Word, Word>,
    /// The cloned blocks, in the order the originals were supplied. Not yet
    /// part of any function.
    cloned_blocks: Vec<BasicBlock>,
    old_to_new_block: HashMap<Word, Word>,
    new_to_old_block: HashMap<Word, Word>,
    /// Handle of the cloned loop registered in the nest.
    cloned_loop: LoopId,
}

impl LoopCloningResult {
    /// Returns the old-to-new id map for labels and result ids.
    #[must_use]
    pub fn value_map(&self) -> &HashMap<Word, Word> {
        &self.value_map
    }

    /// Returns the cloned blocks.
    #[must_use]
    pub fn cloned_blocks(&self) -> &[BasicBlock] {
        &self.cloned_blocks
    }

    /// Takes ownership of the cloned blocks, for insertion into a function.
    pub fn take_cloned_blocks(&mut self) -> Vec<BasicBlock> {
        std::mem::take(&mut self.cloned_blocks)
    }

    /// Returns the new label for a cloned block's old label.
    #[must_use]
    pub fn new_block(&self, old_label: Word) -> Option<Word> {
        self.old_to_new_block.get(&old_label).copied()
    }

    /// Returns the old label behind a cloned block's new label.
    #[must_use]
    pub fn old_block(&self, new_label: Word) -> Option<Word> {
        self.new_to_old_block.get(&new_label).copied()
    }

    /// Returns the handle of the cloned loop.
    #[must_use]
    pub const fn cloned_loop(&self) -> LoopId {
        self.cloned_loop
    }
}

impl LoopUtils<'_> {
    /// Clones the loop's blocks and rebuilds its descriptors.
    ///
    /// `ordered_blocks` lists the labels to clone, each block preceded by its
    /// immediate dominator whenever that dominator is itself in the list. The
    /// list must cover every member of the loop and may add surrounding
    /// blocks, exit blocks for instance.
    ///
    /// Two passes: the first copies blocks with fresh labels and fresh result
    /// ids, seeding the value map and registering the new definitions; the
    /// second remaps id operands through the value map, so references into
    /// the cloned region stay internal while references to anything outside
    /// it are left untouched.
    ///
    /// Descriptors for the cloned loop and every loop nested in it are
    /// registered in the nest: header, latch and member blocks translate
    /// through the map, the merge block falls back to the original block when
    /// it was not cloned, and the preheader is dropped unless cloned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if the list names an unknown
    /// block, misses a loop member, or is not in dominance order, and
    /// [`crate::Error::IdOverflow`] if the module runs out of ids.
    pub fn clone_loop(&mut self, ordered_blocks: &[Word]) -> Result<LoopCloningResult> {
        let cfg = self.cfg()?;

        let mut position: HashMap<Word, usize> = HashMap::with_capacity(ordered_blocks.len());
        for (index, &label) in ordered_blocks.iter().enumerate() {
            if !cfg.contains(label) {
                return Err(Error::InvariantViolation(format!(
                    "cannot clone %{label}: not a block of function %{}",
                    self.function_id
                )));
            }
            position.insert(label, index);
        }
        for &member in self.nest.get(self.loop_id).blocks() {
            if !position.contains_key(&member) {
                return Err(Error::InvariantViolation(format!(
                    "loop member %{member} missing from the blocks to clone"
                )));
            }
        }
        for (index, &label) in ordered_blocks.iter().enumerate() {
            if let Some(idom) = cfg.immediate_dominator(label) {
                if position.get(&idom).is_some_and(|&idom_index| idom_index > index) {
                    return Err(Error::InvariantViolation(format!(
                        "%{label} appears before its dominator %{idom}"
                    )));
                }
            }
        }

        // Pass 1: copy blocks, assign fresh ids, register definitions.
        let source_blocks: Vec<BasicBlock> = {
            let function = function_of(self.module, self.function_id)?;
            ordered_blocks
                .iter()
                .filter_map(|&label| function.block(label).cloned())
                .collect()
        };

        let mut value_map: HashMap<Word, Word> = HashMap::new();
        let mut old_to_new_block: HashMap<Word, Word> = HashMap::new();
        let mut new_to_old_block: HashMap<Word, Word> = HashMap::new();
        let mut cloned_blocks: Vec<BasicBlock> = Vec::with_capacity(source_blocks.len());

        for source in source_blocks {
            let old_label = source.id();
            let new_label = self.module.take_next_id()?;
            value_map.insert(old_label, new_label);
            old_to_new_block.insert(old_label, new_label);
            new_to_old_block.insert(new_label, old_label);
            self.def_use.analyze_label_def(self.function_id, new_label);

            let mut clone = BasicBlock::new(new_label);
            for instruction in source.instructions() {
                let mut copy = instruction.clone();
                if let Some(old_result) = copy.result_id() {
                    let new_result = self.module.take_next_id()?;
                    value_map.insert(old_result, new_result);
                    copy.set_result_id(new_result);
                }
                self.def_use.analyze_inst_def(
                    &copy,
                    DefSite::Body {
                        function: self.function_id,
                        block: new_label,
                    },
                );
                clone.push(copy);
            }
            cloned_blocks.push(clone);
        }

        // Pass 2: redirect intra-region references through the value map.
        for block in &mut cloned_blocks {
            for instruction in block.instructions_mut() {
                instruction.remap_id_operands(|id| value_map.get(&id).copied());
                self.def_use.analyze_inst_use(instruction);
            }
        }

        let cloned_loop = self.populate_loop_nest(&old_to_new_block);

        Ok(LoopCloningResult {
            value_map,
            cloned_blocks,
            old_to_new_block,
            new_to_old_block,
            cloned_loop,
        })
    }

    /// Registers descriptors for the cloned loop and its nested loops,
    /// returning the handle of the cloned root.
    fn populate_loop_nest(&mut self, old_to_new: &HashMap<Word, Word>) -> LoopId {
        let mut loop_mapping: HashMap<LoopId, LoopId> = HashMap::new();

        let mut order = vec![self.loop_id];
        order.extend(self.nest.descendants(self.loop_id));

        for old_id in order {
            let old = self.nest.get(old_id).clone();
            let header = old_to_new.get(&old.header()).copied().unwrap_or(old.header());

            let mut new_loop = Loop::new(header);
            new_loop.set_latch(old.latch().and_then(|l| old_to_new.get(&l).copied()));
            new_loop.set_merge(
                old.merge()
                    .map(|m| old_to_new.get(&m).copied().unwrap_or(m)),
            );
            new_loop.set_preheader(old.preheader().and_then(|p| old_to_new.get(&p).copied()));
            for block in old.blocks() {
                if let Some(&new_block) = old_to_new.get(block) {
                    new_loop.add_block(new_block);
                }
            }

            let parent = if old_id == self.loop_id {
                old.parent()
            } else {
                old.parent().and_then(|p| loop_mapping.get(&p).copied())
            };
            let new_id = self.nest.add_loop(new_loop, parent);
            loop_mapping.insert(old_id, new_id);
        }

        loop_mapping[&self.loop_id]
    }
}
