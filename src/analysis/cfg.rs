//! Control-flow graph over a function's basic blocks.
//!
//! The graph is a snapshot: it is built from a [`Function`] once and holds no
//! references back into it, so the function may be freely mutated afterwards.
//! Callers that change the block structure rebuild the graph.
//!
//! Predecessor lists are deterministic. Blocks contribute edges in function
//! order, and a block's outgoing edges follow the operand order of its
//! terminator, so two builds over the same function always agree. Phi operand
//! handling relies on this when pairing incoming values with predecessors.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::spirv::{Function, Word};
use crate::{Error, Result};

use super::DominatorTree;

/// Control-flow graph of one function, keyed by block label ids.
///
/// Dominator information is computed lazily on first use and cached for the
/// lifetime of the graph.
#[derive(Debug)]
pub struct ControlFlowGraph {
    /// Block labels in function order; index 0 is the entry block.
    labels: Vec<Word>,
    /// Label to dense index.
    index_of: HashMap<Word, usize>,
    /// Successor labels per block, in terminator operand order.
    successors: Vec<Vec<Word>>,
    /// Predecessor labels per block. A predecessor appears once per incoming
    /// edge, so a conditional branch with both arms on one target contributes
    /// it twice.
    predecessors: Vec<Vec<Word>>,
    /// Lazily computed dominator tree over the dense indices.
    dominators: OnceLock<DominatorTree>,
}

impl ControlFlowGraph {
    /// Builds the control-flow graph for a function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the function has no blocks, a label
    /// occurs twice, or a terminator targets a label that is not a block of
    /// this function.
    pub fn build(function: &Function) -> Result<Self> {
        let blocks = function.blocks();
        if blocks.is_empty() {
            return Err(Error::GraphError(format!(
                "function %{} has no blocks",
                function.id()
            )));
        }

        let mut labels = Vec::with_capacity(blocks.len());
        let mut index_of = HashMap::with_capacity(blocks.len());
        for (index, block) in blocks.iter().enumerate() {
            if index_of.insert(block.id(), index).is_some() {
                return Err(Error::GraphError(format!(
                    "duplicate block label %{} in function %{}",
                    block.id(),
                    function.id()
                )));
            }
            labels.push(block.id());
        }

        let mut successors = Vec::with_capacity(blocks.len());
        let mut predecessors = vec![Vec::new(); blocks.len()];
        for block in blocks {
            let targets = block.successor_ids();
            for &target in &targets {
                let Some(&target_index) = index_of.get(&target) else {
                    return Err(Error::GraphError(format!(
                        "block %{} branches to %{target}, which is not a block of function %{}",
                        block.id(),
                        function.id()
                    )));
                };
                predecessors[target_index].push(block.id());
            }
            successors.push(targets);
        }

        Ok(Self {
            labels,
            index_of,
            successors,
            predecessors,
            dominators: OnceLock::new(),
        })
    }

    /// Returns the block labels in function order.
    #[must_use]
    pub fn labels(&self) -> &[Word] {
        &self.labels
    }

    /// Returns the entry block label.
    #[must_use]
    pub fn entry(&self) -> Word {
        self.labels[0]
    }

    /// Returns `true` if `label` names a block of this graph.
    #[must_use]
    pub fn contains(&self, label: Word) -> bool {
        self.index_of.contains_key(&label)
    }

    /// Returns the dense index of a block label.
    #[must_use]
    pub fn index_of(&self, label: Word) -> Option<usize> {
        self.index_of.get(&label).copied()
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.labels.len()
    }

    /// Returns the successor labels of a block, empty for unknown labels.
    #[must_use]
    pub fn successors(&self, label: Word) -> &[Word] {
        self.index_of
            .get(&label)
            .map_or(&[], |&index| &self.successors[index])
    }

    /// Returns the predecessor labels of a block, empty for unknown labels.
    ///
    /// One entry per incoming edge, in the deterministic build order.
    #[must_use]
    pub fn predecessors(&self, label: Word) -> &[Word] {
        self.index_of
            .get(&label)
            .map_or(&[], |&index| &self.predecessors[index])
    }

    /// Returns the dominator tree, computing it on first use.
    pub fn dominators(&self) -> &DominatorTree {
        self.dominators.get_or_init(|| {
            let to_index = |targets: &[Word]| -> Vec<usize> {
                targets.iter().map(|label| self.index_of[label]).collect()
            };
            let successors: Vec<Vec<usize>> =
                self.successors.iter().map(|s| to_index(s)).collect();
            let predecessors: Vec<Vec<usize>> =
                self.predecessors.iter().map(|p| to_index(p)).collect();
            DominatorTree::compute(&successors, &predecessors, 0)
        })
    }

    /// Checks whether block `a` dominates block `b`.
    ///
    /// Unknown and unreachable labels dominate nothing.
    #[must_use]
    pub fn dominates(&self, a: Word, b: Word) -> bool {
        match (self.index_of(a), self.index_of(b)) {
            (Some(a), Some(b)) => self.dominators().dominates(a, b),
            _ => false,
        }
    }

    /// Returns the immediate dominator of a block, or `None` for the entry
    /// block and for unknown or unreachable labels.
    #[must_use]
    pub fn immediate_dominator(&self, label: Word) -> Option<Word> {
        let index = self.index_of(label)?;
        let idom = self.dominators().immediate_dominator(index)?;
        Some(self.labels[idom])
    }

    /// Returns `true` if the block is reachable from the entry block.
    #[must_use]
    pub fn is_reachable(&self, label: Word) -> bool {
        self.index_of(label)
            .is_some_and(|index| self.dominators().is_reachable(index))
    }
}
