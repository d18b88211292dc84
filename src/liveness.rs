//! Backward liveness fixpoint over one function, and kill-set
//! derivation.
//!
//! For every instruction we compute Live-in/Live-out slot sets by the
//! standard backward dataflow equations, with one twist for join points:
//! a phi's incoming operand is a use on the predecessor *edge*, so it is
//! injected into the predecessor terminator's synthetic edge-use set
//! rather than attributed to any instruction in the phi's own block.
//! Convergence is guaranteed because the sets only grow over a finite
//! slot universe.
//!
//! The derived results are what the downstream execution-node builder
//! consumes: `EndKill(instr)` (slots whose last use is this instruction)
//! and `BeginKill(block)` (slots live at block entry that no predecessor
//! edge carried in).

use crate::cfg::CFGInfo;
use crate::entity::{EntityMap, EntityRef, EntityVec};
use crate::errors::AnalysisError;
use crate::frame::{FrameTable, Slot};
use crate::ir::{Block, FunctionDefinition, Module, Symbol, Type};
use crate::reads::extract_reads;
use anyhow::{ensure, Result};
use fxhash::{FxHashMap, FxHashSet};
use rayon::prelude::*;
use std::collections::VecDeque;

pub type SlotSet = FxHashSet<Slot>;

/// One join-point value: a destination slot and, per predecessor block,
/// the symbol supplying the value along that incoming edge.
#[derive(Clone, Debug)]
pub struct PhiEntry {
    pub name: String,
    pub ty: Type,
    pub incoming: Vec<(Block, Symbol)>,
}

/// Per-block phi entries, built by the phi-resolution collaborator before
/// the liveness pass runs. Read-only during analysis.
#[derive(Clone, Debug, Default)]
pub struct PhiTable {
    entries: FxHashMap<Block, Vec<PhiEntry>>,
}

impl PhiTable {
    pub fn add(&mut self, block: Block, entry: PhiEntry) {
        self.entries.entry(block).or_default().push(entry);
    }

    pub fn of(&self, block: Block) -> &[PhiEntry] {
        self.entries.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A slot live at block entry that was neither carried in along a
/// predecessor edge nor accounted for by a parameter or phi destination.
/// Surfaced as a diagnostic; the analysis result is still returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisInconsistency {
    pub block: Block,
    pub slot: Slot,
}

/// Immutable analysis result for one function.
#[derive(Clone, Debug, Default)]
pub struct LivenessResult {
    begin_kills: EntityMap<Block, SlotSet>,
    end_kills: EntityMap<Block, Vec<SlotSet>>,
    live_in: EntityMap<Block, Vec<SlotSet>>,
    live_out: EntityMap<Block, Vec<SlotSet>>,
    inconsistencies: Vec<AnalysisInconsistency>,
    empty: SlotSet,
}

impl LivenessResult {
    /// Slots whose lifetime freshly starts at this block's entry.
    pub fn begin_kill(&self, block: Block) -> &SlotSet {
        &self.begin_kills[block]
    }

    /// Slots that die at the given instruction (live in, not live out).
    pub fn end_kill(&self, block: Block, inst: usize) -> &SlotSet {
        self.end_kills[block].get(inst).unwrap_or(&self.empty)
    }

    pub fn live_in(&self, block: Block, inst: usize) -> &SlotSet {
        self.live_in[block].get(inst).unwrap_or(&self.empty)
    }

    pub fn live_out(&self, block: Block, inst: usize) -> &SlotSet {
        self.live_out[block].get(inst).unwrap_or(&self.empty)
    }

    pub fn inconsistencies(&self) -> &[AnalysisInconsistency] {
        &self.inconsistencies
    }
}

/// Analysis result for one function of a module, bundled with the frame
/// table whose slots the result's sets index.
#[derive(Clone, Debug)]
pub struct FunctionLiveness {
    pub frame: FrameTable,
    pub result: LivenessResult,
}

pub struct Liveness;

impl Liveness {
    /// Analyze one function. The frame table is the function's slot
    /// arena; the phi table must be complete and is only read.
    pub fn compute(
        func: &FunctionDefinition,
        frame: &mut FrameTable,
        phis: &PhiTable,
    ) -> Result<LivenessResult> {
        Context::new(func, frame, phis)?.run()
    }

    /// Analyze every function of a module in parallel, each with its own
    /// frame table. `phis` holds one table per function, same order.
    pub fn compute_module(module: &Module, phis: &[PhiTable]) -> Result<Vec<FunctionLiveness>> {
        ensure!(
            module.functions.len() == phis.len(),
            "one phi table per function required ({} functions, {} tables)",
            module.functions.len(),
            phis.len()
        );
        module
            .functions
            .par_iter()
            .zip(phis.par_iter())
            .map(|(func, phis)| -> Result<FunctionLiveness> {
                let mut frame = FrameTable::default();
                let result = Liveness::compute(func, &mut frame, phis)?;
                Ok(FunctionLiveness { frame, result })
            })
            .collect()
    }
}

/// Working state for one function's fixpoint; discarded after `run`.
struct Context<'a> {
    func: &'a FunctionDefinition,
    frame: &'a mut FrameTable,
    phis: &'a PhiTable,
    cfg: CFGInfo,
    uses: EntityVec<Block, Vec<SlotSet>>,
    defs: EntityVec<Block, Vec<SlotSet>>,
    /// Synthetic uses at each block's terminator, injected by phi
    /// entries of its successors.
    edge_uses: EntityMap<Block, SlotSet>,
    live_in: EntityVec<Block, Vec<SlotSet>>,
    live_out: EntityVec<Block, Vec<SlotSet>>,
    param_slots: SlotSet,
}

impl<'a> Context<'a> {
    fn new(
        func: &'a FunctionDefinition,
        frame: &'a mut FrameTable,
        phis: &'a PhiTable,
    ) -> Result<Context<'a>> {
        let cfg = CFGInfo::new(func)?;

        // Parameter slots are written by the function prologue, so they
        // legitimately enter the entry block live without a CFG edge.
        let mut param_slots = SlotSet::default();
        for (name, ty) in &func.parameters {
            let slot = frame.find_or_create(name);
            frame.resolve_kind(slot, *ty)?;
            param_slots.insert(slot);
        }

        let mut ctx = Context {
            func,
            frame,
            phis,
            cfg,
            uses: EntityVec::default(),
            defs: EntityVec::default(),
            edge_uses: EntityMap::default(),
            live_in: EntityVec::default(),
            live_out: EntityVec::default(),
            param_slots,
        };
        ctx.collect_uses_and_defs()?;
        ctx.inject_phi_edge_uses()?;
        Ok(ctx)
    }

    fn collect_uses_and_defs(&mut self) -> Result<()> {
        for (_, body) in self.func.blocks.entries() {
            let mut block_uses = Vec::with_capacity(body.insts.len());
            let mut block_defs = Vec::with_capacity(body.insts.len());
            for inst in &body.insts {
                let reads = extract_reads(self.frame, inst)?;
                block_uses.push(reads.into_iter().collect::<SlotSet>());

                let mut defs = SlotSet::default();
                if let Some((name, ty)) = inst.result() {
                    let slot = self.frame.find_or_create(name);
                    self.frame.resolve_kind(slot, ty)?;
                    defs.insert(slot);
                }
                block_defs.push(defs);
            }
            let empty = vec![SlotSet::default(); body.insts.len()];
            self.uses.push(block_uses);
            self.defs.push(block_defs);
            self.live_in.push(empty.clone());
            self.live_out.push(empty);
        }
        Ok(())
    }

    /// A value referenced only through a phi is live across the incoming
    /// edge, not inside the successor block's body: attribute each
    /// incoming operand to the corresponding predecessor's terminator.
    fn inject_phi_edge_uses(&mut self) -> Result<()> {
        for (&block, entries) in &self.phis.entries {
            ensure!(
                block.index() < self.func.blocks.len(),
                "phi table names out-of-range block {}",
                block
            );
            for entry in entries {
                let dest = self.frame.find_or_create(&entry.name);
                self.frame.resolve_kind(dest, entry.ty)?;
                for (pred, symbol) in &entry.incoming {
                    // An edge use attributed to a nonexistent predecessor
                    // would never be consumed by the fixpoint, silently
                    // undercounting liveness. Reject it instead.
                    ensure!(
                        pred.index() < self.func.blocks.len(),
                        "phi `{}` into {} has out-of-range predecessor {}",
                        entry.name,
                        block,
                        pred
                    );
                    match symbol {
                        Symbol::Constant(_) | Symbol::Global { .. } => {}
                        Symbol::InstructionResult { name, ty }
                        | Symbol::Parameter { name, ty } => {
                            let slot = self.frame.find_or_create(name);
                            self.frame.resolve_kind(slot, *ty)?;
                            log::trace!(
                                "phi {} in {}: edge use of {} at terminator of {}",
                                entry.name,
                                block,
                                self.frame.name(slot),
                                pred
                            );
                            self.edge_uses[*pred].insert(slot);
                        }
                        Symbol::Metadata { .. } => {
                            return Err(
                                AnalysisError::UnsupportedSymbol(format!("{}", symbol)).into()
                            );
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn run(mut self) -> Result<LivenessResult> {
        self.fixpoint();
        Ok(self.derive_kills())
    }

    fn fixpoint(&mut self) {
        // Seed with all blocks, last first: a backward analysis converges
        // fastest when successors are visited before their predecessors.
        let blocks: Vec<Block> = self.func.blocks.iter().collect();
        let mut workqueue: VecDeque<Block> = blocks.iter().rev().copied().collect();
        let mut workqueue_set: FxHashSet<Block> = workqueue.iter().copied().collect();

        let mut passes = 0usize;
        while let Some(block) = workqueue.pop_front() {
            workqueue_set.remove(&block);
            passes += 1;
            if self.update_block(block) {
                for &pred in &self.cfg.preds[block] {
                    if workqueue_set.insert(pred) {
                        workqueue.push_back(pred);
                    }
                }
            }
        }
        log::debug!(
            "liveness({}): fixpoint after {} block visits, {} slots",
            self.func.name,
            passes,
            self.frame.len()
        );
    }

    /// Recompute Live-in/Live-out for every instruction of one block in
    /// reverse order. Returns whether the block-entry Live-in changed.
    fn update_block(&mut self, block: Block) -> bool {
        let n = self.func.blocks[block].insts.len();
        let mut changed_entry = false;
        for i in (0..n).rev() {
            let out = if i + 1 == n {
                // Terminator: union of successor entry Live-ins, plus the
                // synthetic phi edge uses attributed to this block.
                let mut out = self.edge_uses[block].clone();
                for &succ in &self.cfg.succs[block] {
                    out.extend(self.live_in[succ][0].iter().copied());
                }
                out
            } else {
                self.live_in[block][i + 1].clone()
            };

            let mut new_in = self.uses[block][i].clone();
            new_in.extend(out.difference(&self.defs[block][i]).copied());

            self.live_out[block][i] = out;
            if new_in != self.live_in[block][i] {
                log::trace!(
                    "liveness({}): {} inst {}: live-in now {:?}",
                    self.func.name,
                    block,
                    i,
                    new_in
                );
                if i == 0 {
                    changed_entry = true;
                }
                self.live_in[block][i] = new_in;
            }
        }
        changed_entry
    }

    fn derive_kills(self) -> LivenessResult {
        let entry = self.func.entry();
        let mut begin_kills: EntityMap<Block, SlotSet> = EntityMap::default();
        let mut end_kills: EntityMap<Block, Vec<SlotSet>> = EntityMap::default();
        let mut inconsistencies = vec![];

        for (block, body) in self.func.blocks.entries() {
            let n = body.insts.len();
            end_kills[block] = (0..n)
                .map(|i| {
                    self.live_in[block][i]
                        .difference(&self.live_out[block][i])
                        .copied()
                        .collect()
                })
                .collect();

            // Slots live at entry that no predecessor terminator carries
            // out start fresh here.
            let mut carried = SlotSet::default();
            for &pred in &self.cfg.preds[block] {
                let last = self.func.blocks[pred].insts.len() - 1;
                carried.extend(self.live_out[pred][last].iter().copied());
            }
            let begin: SlotSet = self.live_in[block][0]
                .difference(&carried)
                .copied()
                .collect();

            let phi_dests: SlotSet = self
                .phis
                .of(block)
                .iter()
                .filter_map(|e| self.frame.get(&e.name))
                .collect();
            for &slot in &begin {
                let is_param_at_entry = block == entry && self.param_slots.contains(&slot);
                if !is_param_at_entry && !phi_dests.contains(&slot) {
                    log::warn!(
                        "liveness({}): slot `{}` live at {} entry but not carried in by any edge",
                        self.func.name,
                        self.frame.name(slot),
                        block
                    );
                    inconsistencies.push(AnalysisInconsistency { block, slot });
                }
            }
            begin_kills[block] = begin;
        }

        LivenessResult {
            begin_kills,
            end_kills,
            live_in: to_map(self.live_in),
            live_out: to_map(self.live_out),
            inconsistencies,
            empty: SlotSet::default(),
        }
    }
}

fn to_map(vec: EntityVec<Block, Vec<SlotSet>>) -> EntityMap<Block, Vec<SlotSet>> {
    let mut map = EntityMap::default();
    for (block, sets) in vec.entries() {
        map[block] = sets.clone();
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, CmpOp, Instruction, InstructionBlock};

    fn block(i: usize) -> Block {
        Block::new(i)
    }

    // B0: %n = add 1, 2; br B1
    // B1: %c = icmp slt %n, 0; br %c, B2, B1
    // B2: ret %n
    fn looped_function() -> FunctionDefinition {
        let mut f = FunctionDefinition::default();
        f.name = "looped".to_string();
        f.blocks.push(InstructionBlock::new(vec![
            Instruction::Binary {
                name: "n".to_string(),
                ty: Type::I32,
                op: BinOp::Add,
                lhs: Symbol::constant(1),
                rhs: Symbol::constant(2),
            },
            Instruction::Branch { target: block(1) },
        ]));
        f.blocks.push(InstructionBlock::new(vec![
            Instruction::Compare {
                name: "c".to_string(),
                ty: Type::I1,
                op: CmpOp::SLt,
                lhs: Symbol::result("n", Type::I32),
                rhs: Symbol::constant(0),
            },
            Instruction::CondBranch {
                condition: Symbol::result("c", Type::I1),
                true_target: Some(block(2)),
                false_target: Some(block(1)),
            },
        ]));
        f.blocks.push(InstructionBlock::new(vec![Instruction::Return {
            value: Some(Symbol::result("n", Type::I32)),
        }]));
        f
    }

    #[test]
    fn live_sets_only_grow_across_rounds() {
        let func = looped_function();
        let mut frame = FrameTable::default();
        let phis = PhiTable::default();
        let mut ctx = Context::new(&func, &mut frame, &phis).unwrap();

        let blocks: Vec<Block> = ctx.func.blocks.iter().collect();
        let mut prev_in = ctx.live_in.clone();
        let mut prev_out = ctx.live_out.clone();
        let mut changing_rounds = 0;
        loop {
            // Deliberately visit in forward order, the slowest direction
            // for a backward analysis, to observe several growing rounds
            // around the B1 self-loop.
            for &b in &blocks {
                ctx.update_block(b);
            }

            let mut changed = false;
            for &b in &blocks {
                for i in 0..func.blocks[b].insts.len() {
                    assert!(
                        ctx.live_in[b][i].is_superset(&prev_in[b][i]),
                        "live-in shrank at {} inst {}",
                        b,
                        i
                    );
                    assert!(
                        ctx.live_out[b][i].is_superset(&prev_out[b][i]),
                        "live-out shrank at {} inst {}",
                        b,
                        i
                    );
                    changed |= ctx.live_in[b][i] != prev_in[b][i]
                        || ctx.live_out[b][i] != prev_out[b][i];
                }
            }
            if !changed {
                break;
            }
            changing_rounds += 1;
            assert!(changing_rounds < 64, "fixpoint did not converge");
            prev_in = ctx.live_in.clone();
            prev_out = ctx.live_out.clone();
        }
        assert!(changing_rounds >= 1);

        // Converged state: %n is live around the B1 self-loop.
        let n = ctx.frame.get("n").unwrap();
        assert!(ctx.live_in[block(1)][0].contains(&n));
        assert!(ctx.live_out[block(1)][1].contains(&n));
    }
}
