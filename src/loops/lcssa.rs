//! Exit dedication and loop-closed SSA construction.
//!
//! A loop is in loop-closed SSA form when every value defined inside it is
//! consumed outside only through phi instructions placed in the loop's exit
//! blocks. Dedicated exits are the precondition: each exit block must be
//! reached exclusively from inside the loop, so the inserted phis see loop
//! edges and nothing else.

use std::collections::{HashMap, HashSet};

use crate::analysis::{ControlFlowGraph, DefSite};
use crate::spirv::{BasicBlock, Instruction, Module, Op, Operand, Word};
use crate::{Error, Result};

use super::{function_of, function_of_mut, LoopUtils};

/// One rewritten operand: the instruction at `inst_index` in `block` reads
/// the escaping def at `op_index`, and the replacement value must be valid on
/// entry to `resolution`.
struct UseSite {
    block: Word,
    inst_index: usize,
    op_index: usize,
    resolution: Word,
}

/// Memoized routing decisions for one closure phase.
///
/// `InProgress` marks a block whose predecessors are still being resolved.
/// Hitting it again with a partial result means a back edge was followed and
/// the partial vector is the answer for the re-entrant caller; hitting it
/// with nothing collected yet means the walk never left the cycle.
enum DefiningState {
    InProgress(Vec<Word>),
    Done(Vec<Word>),
}

/// Phase-wide parameters for one closure pass over a block set.
struct ClosurePhase<'p> {
    cfg: &'p ControlFlowGraph,
    exits: &'p [Word],
    merge: Option<Word>,
}

/// Builds the replacement value for each escaping use of a single def.
///
/// New phis are planned, not inserted, so instruction indices recorded during
/// the use scan stay valid until the whole def is applied.
struct IncomingBuilder<'b> {
    module: &'b mut Module,
    function_id: Word,
    cfg: &'b ControlFlowGraph,
    exits: &'b [Word],
    merge: Option<Word>,
    def_id: Word,
    def_type: Word,
    routing: &'b mut HashMap<Word, DefiningState>,
    built: HashMap<Word, Word>,
    planned: Vec<(Word, Instruction)>,
}

impl IncomingBuilder<'_> {
    /// Returns the id to use for the def on entry to `block_id`.
    ///
    /// Exit blocks get a phi fed by the def on every incoming edge, reusing
    /// an existing phi when all its values already are the def. Other blocks
    /// forward the value of their defining blocks, inserting a phi at the
    /// join when those disagree and at the loop merge block unconditionally.
    fn get_or_build(&mut self, block_id: Word) -> Result<Word> {
        if let Some(&existing) = self.built.get(&block_id) {
            return Ok(existing);
        }

        if self.exits.contains(&block_id) {
            if let Some(existing) = self.eligible_phi(block_id)? {
                self.built.insert(block_id, existing);
                return Ok(existing);
            }
            let incomings: Vec<(Word, Word)> = self
                .cfg
                .predecessors(block_id)
                .iter()
                .map(|&pred| (self.def_id, pred))
                .collect();
            return self.plan_phi(block_id, &incomings);
        }

        let defining = self.defining_blocks(block_id)?;
        if defining.len() == 1 && Some(block_id) != self.merge {
            let incoming = self.get_or_build(defining[0])?;
            self.built.insert(block_id, incoming);
            return Ok(incoming);
        }

        let cfg = self.cfg;
        let preds = cfg.predecessors(block_id);
        let mut incomings: Vec<(Word, Word)> = Vec::with_capacity(preds.len());
        for (index, &pred) in preds.iter().enumerate() {
            let source = if defining.len() == 1 {
                defining[0]
            } else {
                *defining.get(index).ok_or_else(|| {
                    Error::GraphError(format!(
                        "defining blocks of %{block_id} do not cover its predecessors"
                    ))
                })?
            };
            let incoming = self.get_or_build(source)?;
            incomings.push((incoming, pred));
        }
        self.plan_phi(block_id, &incomings)
    }

    fn plan_phi(&mut self, block_id: Word, incomings: &[(Word, Word)]) -> Result<Word> {
        let phi_id = self.module.take_next_id()?;
        self.planned
            .push((block_id, Instruction::phi(self.def_type, phi_id, incomings)));
        self.built.insert(block_id, phi_id);
        Ok(phi_id)
    }

    /// Looks for a phi in `block_id` whose incoming values are all the def.
    fn eligible_phi(&self, block_id: Word) -> Result<Option<Word>> {
        let function = function_of(self.module, self.function_id)?;
        let block = function
            .block(block_id)
            .ok_or_else(|| Error::GraphError(format!("block %{block_id} not found")))?;
        for phi in block.phis() {
            let operands = phi.operands();
            if operands.is_empty() {
                continue;
            }
            let all_def = operands
                .iter()
                .step_by(2)
                .all(|operand| *operand == Operand::Id(self.def_id));
            if all_def {
                if let Some(id) = phi.result_id() {
                    return Ok(Some(id));
                }
            }
        }
        Ok(None)
    }

    /// Returns the blocks that carry the def's value on entry to `block_id`.
    ///
    /// A block dominated by an exit is served by that exit alone. Otherwise
    /// each predecessor contributes either its own single defining block or
    /// itself, and the vector collapses to one entry when all agree.
    fn defining_blocks(&mut self, block_id: Word) -> Result<Vec<Word>> {
        match self.routing.get(&block_id) {
            Some(DefiningState::Done(blocks)) => return Ok(blocks.clone()),
            Some(DefiningState::InProgress(partial)) if !partial.is_empty() => {
                return Ok(partial.clone());
            }
            Some(DefiningState::InProgress(_)) => {
                return Err(Error::GraphError(format!(
                    "irreducible control flow around %{block_id}"
                )));
            }
            None => {}
        }

        let cfg = self.cfg;
        let exits = self.exits;
        for &exit in exits {
            if cfg.dominates(exit, block_id) {
                self.routing
                    .insert(block_id, DefiningState::Done(vec![exit]));
                return Ok(vec![exit]);
            }
        }

        self.routing
            .insert(block_id, DefiningState::InProgress(Vec::new()));
        for &pred in cfg.predecessors(block_id) {
            let pred_blocks = self.defining_blocks(pred)?;
            let entry = if pred_blocks.len() == 1 {
                pred_blocks[0]
            } else {
                pred
            };
            if let Some(DefiningState::InProgress(partial)) = self.routing.get_mut(&block_id) {
                partial.push(entry);
            }
        }

        let mut blocks = match self.routing.remove(&block_id) {
            Some(DefiningState::InProgress(collected) | DefiningState::Done(collected)) => {
                collected
            }
            None => Vec::new(),
        };
        if blocks.is_empty() {
            return Err(Error::GraphError(format!(
                "%{block_id} is unreachable from the function entry"
            )));
        }
        if blocks.iter().all(|&block| block == blocks[0]) {
            blocks.truncate(1);
        }
        self.routing
            .insert(block_id, DefiningState::Done(blocks.clone()));
        Ok(blocks)
    }
}

impl LoopUtils<'_> {
    /// Gives every exit of the loop a dedicated exit block.
    ///
    /// An exit block reachable from outside the loop is split: a fresh block
    /// is inserted before it, all in-loop branches are redirected there, and
    /// each phi of the old exit is divided into an in-loop phi in the new
    /// block and a trimmed phi that sees the out-of-loop edges plus the new
    /// one. The new block joins the loops enclosing the old exit.
    ///
    /// When the loop ends up with exactly one exit, that block becomes the
    /// loop's merge block, in the nest descriptor and in the header's
    /// `OpLoopMerge` operand.
    ///
    /// Returns `true` if the function was changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the function's control flow cannot be
    /// analyzed and [`Error::IdOverflow`] if the module runs out of ids.
    pub fn create_loop_dedicated_exits(&mut self) -> Result<bool> {
        let cfg = self.cfg()?;
        let exits = self.nest.exit_blocks(self.loop_id, &cfg);

        let mut resulting_exits: Vec<Word> = Vec::with_capacity(exits.len());
        let mut modified = false;

        for &exit in &exits {
            let preds: Vec<Word> = cfg.predecessors(exit).to_vec();
            let in_loop: Vec<Word> = preds
                .iter()
                .copied()
                .filter(|&pred| self.nest.get(self.loop_id).contains(pred))
                .collect();
            if in_loop.len() == preds.len() {
                resulting_exits.push(exit);
                continue;
            }
            modified = true;

            let dedicated = self.module.take_next_id()?;
            self.def_use.analyze_label_def(self.function_id, dedicated);

            // Partition each phi of the exit by the side its edges come from.
            let phi_plans: Vec<(Word, Vec<(Word, Word)>, Vec<(Word, Word)>)> = {
                let function = function_of(self.module, self.function_id)?;
                let block = function
                    .block(exit)
                    .ok_or_else(|| Error::GraphError(format!("exit block %{exit} not found")))?;
                let mut plans = Vec::new();
                for phi in block.phis() {
                    let type_id = phi.result_type().ok_or_else(|| {
                        Error::GraphError(format!("phi in %{exit} has no result type"))
                    })?;
                    let mut inside = Vec::new();
                    let mut outside = Vec::new();
                    for pair in phi.operands().chunks_exact(2) {
                        if let (Some(value), Some(parent)) = (pair[0].id(), pair[1].id()) {
                            if self.nest.get(self.loop_id).contains(parent) {
                                inside.push((value, parent));
                            } else {
                                outside.push((value, parent));
                            }
                        }
                    }
                    plans.push((type_id, inside, outside));
                }
                plans
            };

            let mut dedicated_block = BasicBlock::new(dedicated);
            let mut trimmed: Vec<Vec<Operand>> = Vec::with_capacity(phi_plans.len());
            for (type_id, inside, outside) in phi_plans {
                let phi_id = self.module.take_next_id()?;
                let split_phi = Instruction::phi(type_id, phi_id, &inside);
                self.def_use.analyze_inst_def(
                    &split_phi,
                    DefSite::Body {
                        function: self.function_id,
                        block: dedicated,
                    },
                );
                self.def_use.analyze_inst_use(&split_phi);
                dedicated_block.push(split_phi);

                let mut kept: Vec<Operand> = Vec::with_capacity(outside.len() * 2 + 2);
                for (value, parent) in outside {
                    kept.push(Operand::Id(value));
                    kept.push(Operand::Id(parent));
                }
                kept.push(Operand::Id(phi_id));
                kept.push(Operand::Id(dedicated));
                trimmed.push(kept);
            }
            let branch = Instruction::branch(exit);
            self.def_use.analyze_inst_use(&branch);
            dedicated_block.push(branch);

            {
                let function = function_of_mut(self.module, self.function_id)?;
                let block = function
                    .block_mut(exit)
                    .ok_or_else(|| Error::GraphError(format!("exit block %{exit} not found")))?;
                for (phi, kept) in block.phis_mut().zip(trimmed) {
                    self.def_use.forget_inst_uses(phi);
                    *phi.operands_mut() = kept;
                    self.def_use.analyze_inst_use(phi);
                }
            }

            let mut redirected: HashSet<Word> = HashSet::new();
            for &pred in &in_loop {
                if !redirected.insert(pred) {
                    continue;
                }
                let function = function_of_mut(self.module, self.function_id)?;
                let block = function.block_mut(pred).ok_or_else(|| {
                    Error::GraphError(format!("predecessor block %{pred} not found"))
                })?;
                if let Some(terminator) = block.terminator() {
                    self.def_use.forget_inst_uses(terminator);
                }
                block.replace_successor(exit, dedicated);
                if let Some(terminator) = block.terminator() {
                    self.def_use.analyze_inst_use(terminator);
                }
            }

            function_of_mut(self.module, self.function_id)?
                .insert_block_before(exit, dedicated_block);

            if let Some(enclosing) = self.nest.innermost_containing(exit) {
                self.nest.add_block_to(enclosing, dedicated);
            }
            resulting_exits.push(dedicated);
        }

        if let [only_exit] = resulting_exits.as_slice() {
            self.set_merge_block(*only_exit)?;
        }

        Ok(modified)
    }

    /// Rewrites the loop into loop-closed SSA form.
    ///
    /// Exits are dedicated first. Then every value defined in the loop and
    /// used outside it is routed through a phi in the exit block covering the
    /// use, with forwarding phis at intermediate joins when several exits can
    /// reach the same use. A second pass does the same for the region between
    /// the exits and the merge block, so that nothing defined there outlives
    /// the merge either.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] on control flow the rewrite cannot
    /// route, unreachable or irreducible regions in particular, and
    /// [`Error::IdOverflow`] if the module runs out of ids.
    pub fn make_loop_closed_ssa(&mut self) -> Result<()> {
        self.create_loop_dedicated_exits()?;

        // The block graph is final from here on. Inserting phis never adds
        // blocks or edges, so one snapshot serves both phases.
        let cfg = self.cfg()?;
        let exits = self.nest.exit_blocks(self.loop_id, &cfg);
        let loop_blocks = self.nest.get(self.loop_id).blocks().clone();
        let merge = self.nest.get(self.loop_id).merge();

        let phase = ClosurePhase {
            cfg: &cfg,
            exits: &exits,
            merge,
        };
        self.make_set_closed_ssa(&loop_blocks, &phase)?;

        // Values defined between the exits and the merge block must not
        // outlive the merge.
        if let Some(merge_block) = merge {
            let mut merging: HashSet<Word> = self
                .nest
                .merging_blocks(self.loop_id, &cfg)
                .into_iter()
                .collect();
            merging.remove(&merge_block);
            if !merging.is_empty() {
                let merge_exit = [merge_block];
                let phase = ClosurePhase {
                    cfg: &cfg,
                    exits: &merge_exit,
                    merge: Some(merge_block),
                };
                self.make_set_closed_ssa(&merging, &phase)?;
            }
        }
        Ok(())
    }

    /// Closes one block set: after this, no def inside `set` is used outside
    /// it except through phis in the phase's exit blocks.
    fn make_set_closed_ssa(&mut self, set: &HashSet<Word>, phase: &ClosurePhase<'_>) -> Result<()> {
        // One routing memo per phase. The exit set differs between phases,
        // so cached decisions must not leak across them.
        let mut routing: HashMap<Word, DefiningState> = HashMap::new();

        let ordered: Vec<Word> = phase
            .cfg
            .labels()
            .iter()
            .copied()
            .filter(|label| set.contains(label))
            .collect();
        for block_id in ordered {
            // A def can only escape if its block dominates a way out.
            if !phase.exits.iter().any(|&exit| phase.cfg.dominates(block_id, exit)) {
                continue;
            }
            let defs: Vec<(Word, Word)> = {
                let function = function_of(self.module, self.function_id)?;
                let block = function
                    .block(block_id)
                    .ok_or_else(|| Error::GraphError(format!("block %{block_id} not found")))?;
                block
                    .instructions()
                    .iter()
                    .filter_map(|inst| inst.result_id().zip(inst.result_type()))
                    .collect()
            };
            for (def_id, def_type) in defs {
                if self.def_use.use_count(def_id) == 0 {
                    continue;
                }
                let sites = self.collect_escaping_uses(def_id, set, phase.exits)?;
                if sites.is_empty() {
                    continue;
                }
                self.rewrite_def(def_id, def_type, &sites, phase, &mut routing)?;
            }
        }
        Ok(())
    }

    /// Finds every use of `def_id` outside `set` that breaks closed form.
    ///
    /// A phi in an exit block already is the closed form and is left alone.
    /// Any other phi use resolves to the incoming edge's block, a plain use
    /// to the block holding it.
    fn collect_escaping_uses(
        &self,
        def_id: Word,
        set: &HashSet<Word>,
        exits: &[Word],
    ) -> Result<Vec<UseSite>> {
        let function = function_of(self.module, self.function_id)?;
        let mut sites = Vec::new();
        for block in function.blocks() {
            if set.contains(&block.id()) {
                continue;
            }
            let in_exit = exits.contains(&block.id());
            for (inst_index, instruction) in block.instructions().iter().enumerate() {
                for (op_index, operand) in instruction.operands().iter().enumerate() {
                    if *operand != Operand::Id(def_id) {
                        continue;
                    }
                    let resolution = if instruction.op() == Op::Phi {
                        if in_exit {
                            continue;
                        }
                        instruction
                            .operand(op_index + 1)
                            .and_then(Operand::id)
                            .ok_or_else(|| {
                                Error::GraphError(format!(
                                    "phi in %{} has a value without a parent",
                                    block.id()
                                ))
                            })?
                    } else {
                        block.id()
                    };
                    sites.push(UseSite {
                        block: block.id(),
                        inst_index,
                        op_index,
                        resolution,
                    });
                }
            }
        }
        Ok(sites)
    }

    /// Rewrites all escaping uses of one def and inserts the planned phis.
    ///
    /// Operand rewrites go first, while the recorded instruction indices are
    /// still valid; the new phis are inserted afterwards.
    fn rewrite_def(
        &mut self,
        def_id: Word,
        def_type: Word,
        sites: &[UseSite],
        phase: &ClosurePhase<'_>,
        routing: &mut HashMap<Word, DefiningState>,
    ) -> Result<()> {
        let mut resolved: Vec<Word> = Vec::with_capacity(sites.len());
        let planned = {
            let mut builder = IncomingBuilder {
                module: &mut *self.module,
                function_id: self.function_id,
                cfg: phase.cfg,
                exits: phase.exits,
                merge: phase.merge,
                def_id,
                def_type,
                routing,
                built: HashMap::new(),
                planned: Vec::new(),
            };
            for site in sites {
                resolved.push(builder.get_or_build(site.resolution)?);
            }
            builder.planned
        };

        for (site, new_id) in sites.iter().zip(&resolved) {
            let function = function_of_mut(self.module, self.function_id)?;
            let block = function
                .block_mut(site.block)
                .ok_or_else(|| Error::GraphError(format!("block %{} not found", site.block)))?;
            let instruction = block
                .instructions_mut()
                .get_mut(site.inst_index)
                .ok_or_else(|| {
                    Error::GraphError(format!("use of %{def_id} moved during rewriting"))
                })?;
            self.def_use.forget_inst_uses(instruction);
            instruction.set_operand(site.op_index, Operand::Id(*new_id));
            self.def_use.analyze_inst_use(instruction);
        }

        for (block_id, phi) in planned {
            self.def_use.analyze_inst_def(
                &phi,
                DefSite::Body {
                    function: self.function_id,
                    block: block_id,
                },
            );
            self.def_use.analyze_inst_use(&phi);
            let function = function_of_mut(self.module, self.function_id)?;
            let block = function
                .block_mut(block_id)
                .ok_or_else(|| Error::GraphError(format!("block %{block_id} not found")))?;
            block.insert_phi(phi);
        }
        Ok(())
    }

    /// Makes `merge` the loop's merge block, in the descriptor and in the
    /// header's `OpLoopMerge` operand when the header carries one.
    fn set_merge_block(&mut self, merge: Word) -> Result<()> {
        let header = self.nest.get(self.loop_id).header();
        self.nest.get_mut(self.loop_id).set_merge(Some(merge));
        let function = function_of_mut(self.module, self.function_id)?;
        let block = function
            .block_mut(header)
            .ok_or_else(|| Error::GraphError(format!("loop header %{header} not found")))?;
        if let Some(merge_inst) = block.merge_instruction_mut() {
            if merge_inst.op() == Op::LoopMerge {
                self.def_use.forget_inst_uses(merge_inst);
                merge_inst.set_operand(0, Operand::Id(merge));
                self.def_use.analyze_inst_use(merge_inst);
            }
        }
        Ok(())
    }
}
