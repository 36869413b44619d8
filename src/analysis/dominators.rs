//! Dominator tree computation using the Lengauer-Tarjan algorithm.
//!
//! The dominator tree drives most of the structural reasoning in this crate:
//! loop detection, loop-closed SSA construction, and the dominance queries the
//! structural validator performs on merge constructs.
//!
//! # Theory
//!
//! A block `d` **dominates** a block `n` if every path from the entry block to
//! `n` passes through `d`. The **immediate dominator** of `n` is the unique
//! block that strictly dominates `n` but does not strictly dominate any other
//! strict dominator of `n`. Making each block's immediate dominator its parent
//! yields the dominator tree, rooted at the entry block.
//!
//! # Algorithm
//!
//! Lengauer-Tarjan with path compression, O(V α(V)) where α is the inverse
//! Ackermann function. The computation runs over dense block indices as
//! assigned by [`ControlFlowGraph`](super::ControlFlowGraph); blocks that are
//! unreachable from the entry receive no immediate dominator and report
//! [`DominatorTree::is_reachable`] as `false`.

/// Sentinel index standing in for "no block".
const UNDEFINED: usize = usize::MAX;

/// Result of dominator tree computation over a function's blocks.
///
/// Indices are the dense block indices of the control-flow graph the tree was
/// computed from. Each reachable block except the entry has exactly one
/// immediate dominator.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// The entry (root) block index.
    entry: usize,
    /// Immediate dominator per block index; the entry maps to itself and
    /// unreachable blocks map to [`UNDEFINED`].
    idom: Vec<usize>,
    /// Number of blocks in the analyzed graph.
    node_count: usize,
}

impl DominatorTree {
    /// Computes the dominator tree for a graph given as dense adjacency lists.
    ///
    /// `successors` and `predecessors` must describe the same edge set; both
    /// are indexed by block index. Empty graphs yield an empty tree.
    #[must_use]
    pub fn compute(
        successors: &[Vec<usize>],
        predecessors: &[Vec<usize>],
        entry: usize,
    ) -> Self {
        let node_count = successors.len();

        if node_count == 0 {
            return Self {
                entry,
                idom: Vec::new(),
                node_count: 0,
            };
        }

        let mut lt = LengauerTarjan::new(node_count, entry);
        lt.compute(successors, predecessors);

        Self {
            entry,
            idom: lt.idom,
            node_count,
        }
    }

    /// Returns the entry (root) block index of the tree.
    #[inline]
    #[must_use]
    pub const fn entry(&self) -> usize {
        self.entry
    }

    /// Returns `true` if `node` is reachable from the entry block.
    #[inline]
    #[must_use]
    pub fn is_reachable(&self, node: usize) -> bool {
        node == self.entry || self.idom.get(node).is_some_and(|&idom| idom != UNDEFINED)
    }

    /// Returns the immediate dominator of a block, or `None` for the entry
    /// block and for blocks unreachable from the entry.
    #[inline]
    #[must_use]
    pub fn immediate_dominator(&self, node: usize) -> Option<usize> {
        if node == self.entry || !self.is_reachable(node) {
            None
        } else {
            Some(self.idom[node])
        }
    }

    /// Checks whether block `a` dominates block `b`.
    ///
    /// A block dominates itself. Unreachable blocks dominate nothing and are
    /// dominated by nothing.
    #[must_use]
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        if a == b {
            return true;
        }

        let mut current = b;
        while current != self.entry {
            let idom = self.idom[current];
            if idom == a {
                return true;
            }
            current = idom;
        }

        // Only the entry dominates the entry.
        a == self.entry
    }

    /// Checks whether block `a` strictly dominates block `b`, i.e. dominates
    /// it and is not `b` itself.
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, a: usize, b: usize) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns an iterator over all dominators of a block, from the block
    /// itself up to and including the entry block.
    #[must_use]
    pub fn dominators(&self, node: usize) -> DominatorIterator<'_> {
        DominatorIterator {
            tree: self,
            current: self.is_reachable(node).then_some(node),
        }
    }

    /// Returns the depth of a reachable block in the dominator tree; the
    /// entry block has depth 0.
    #[must_use]
    pub fn depth(&self, node: usize) -> usize {
        let mut depth = 0;
        let mut current = node;
        while current != self.entry {
            current = self.idom[current];
            depth += 1;
        }
        depth
    }

    /// Returns the number of blocks in the analyzed graph.
    #[inline]
    #[must_use]
    pub const fn node_count(&self) -> usize {
        self.node_count
    }
}

/// Iterator over dominators of a block, from the block up to the entry.
pub struct DominatorIterator<'a> {
    tree: &'a DominatorTree,
    current: Option<usize>,
}

impl Iterator for DominatorIterator<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;

        if current == self.tree.entry {
            self.current = None;
        } else {
            self.current = Some(self.tree.idom[current]);
        }
        Some(current)
    }
}

/// Internal state for the Lengauer-Tarjan algorithm.
struct LengauerTarjan {
    /// Entry block index.
    entry: usize,
    /// DFS number per block (0 = not visited).
    dfnum: Vec<usize>,
    /// Block with each DFS number (inverse of `dfnum`).
    vertex: Vec<usize>,
    /// Parent in the DFS tree.
    parent: Vec<usize>,
    /// Semidominator per block.
    semi: Vec<usize>,
    /// Immediate dominator (final result).
    idom: Vec<usize>,
    /// Ancestor in the forest for link-eval.
    ancestor: Vec<usize>,
    /// Best block on the path to the ancestor, for path compression.
    best: Vec<usize>,
    /// Blocks whose semidominator is this block.
    bucket: Vec<Vec<usize>>,
    /// Current DFS counter.
    dfs_counter: usize,
}

impl LengauerTarjan {
    fn new(n: usize, entry: usize) -> Self {
        Self {
            entry,
            dfnum: vec![0; n],
            vertex: vec![UNDEFINED; n],
            parent: vec![UNDEFINED; n],
            semi: (0..n).collect(),
            idom: vec![UNDEFINED; n],
            ancestor: vec![UNDEFINED; n],
            best: (0..n).collect(),
            bucket: vec![Vec::new(); n],
            dfs_counter: 0,
        }
    }

    fn compute(&mut self, successors: &[Vec<usize>], predecessors: &[Vec<usize>]) {
        // Phase 1: DFS numbering.
        self.dfs(successors);

        // Process blocks in reverse DFS order, excluding the entry.
        for i in (1..self.dfs_counter).rev() {
            let w = self.vertex[i];
            let parent_w = self.parent[w];

            // Phase 2: compute semidominators.
            // semi(w) = min over CFG predecessors v of w, taking v itself when
            // dfnum(v) < dfnum(w) and semi(eval(v)) otherwise.
            for &v in &predecessors[w] {
                if self.dfnum[v] == 0 {
                    // v is unreachable from the entry.
                    continue;
                }
                let u = self.eval(v);
                if self.dfnum[self.semi[u]] < self.dfnum[self.semi[w]] {
                    self.semi[w] = self.semi[u];
                }
            }

            // Add w to the bucket of its semidominator.
            let semi_w = self.semi[w];
            self.bucket[semi_w].push(w);

            // Link w into the forest.
            self.link(parent_w, w);

            // Phase 3: implicitly compute immediate dominators by emptying
            // the bucket of parent(w).
            let bucket = std::mem::take(&mut self.bucket[parent_w]);
            for v in bucket {
                let u = self.eval(v);
                if self.semi[u] == self.semi[v] {
                    self.idom[v] = parent_w;
                } else {
                    self.idom[v] = u;
                }
            }
        }

        // Phase 4: explicitly compute immediate dominators in DFS order.
        for i in 1..self.dfs_counter {
            let w = self.vertex[i];
            if self.idom[w] != self.semi[w] {
                self.idom[w] = self.idom[self.idom[w]];
            }
        }

        // The entry block dominates itself.
        self.idom[self.entry] = self.entry;
    }

    /// DFS traversal assigning DFS numbers and building the DFS tree.
    fn dfs(&mut self, successors: &[Vec<usize>]) {
        let mut stack = vec![self.entry];

        while let Some(node) = stack.pop() {
            if self.dfnum[node] != 0 {
                continue;
            }

            self.dfs_counter += 1;
            self.dfnum[node] = self.dfs_counter;
            self.vertex[self.dfs_counter - 1] = node;

            for &succ in &successors[node] {
                if self.dfnum[succ] == 0 {
                    self.parent[succ] = node;
                    stack.push(succ);
                }
            }
        }
    }

    /// Links v as a child of w in the spanning forest.
    fn link(&mut self, w: usize, v: usize) {
        self.ancestor[v] = w;
    }

    /// Finds the block with minimum semidominator on the path to the forest
    /// root.
    fn eval(&mut self, v: usize) -> usize {
        if self.ancestor[v] == UNDEFINED {
            return v;
        }

        self.compress(v);
        self.best[v]
    }

    /// Path compression for the forest.
    fn compress(&mut self, v: usize) {
        let ancestor_v = self.ancestor[v];

        if self.ancestor[ancestor_v] == UNDEFINED {
            return;
        }

        self.compress(ancestor_v);

        let best_ancestor = self.best[ancestor_v];
        if self.dfnum[self.semi[best_ancestor]] < self.dfnum[self.semi[self.best[v]]] {
            self.best[v] = best_ancestor;
        }

        self.ancestor[v] = self.ancestor[ancestor_v];
    }
}
