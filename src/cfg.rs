//! Control-flow extraction over terminator instructions.

use crate::entity::{EntityMap, EntityRef, EntityVec};
use crate::errors::AnalysisError;
use crate::ir::{Block, FunctionDefinition, Instruction};
use anyhow::{ensure, Result};
use smallvec::{smallvec, SmallVec};

pub type SuccessorList = SmallVec<[Block; 2]>;

/// Successor blocks of a terminator, deduplicated, in first-appearance
/// order. A switch may name the same block for several cases; the
/// dataflow engine must see each edge target once.
///
/// Fails with `UnhandledTerminator` for any non-terminator variant.
pub fn successors(inst: &Instruction) -> Result<SuccessorList> {
    let raw: SuccessorList = match inst {
        Instruction::Branch { target } => smallvec![*target],
        Instruction::CondBranch {
            true_target,
            false_target,
            ..
        } => {
            // A missing arm is tolerated, not an error; the decoder may
            // leave one unfilled for degenerate inputs.
            let mut list = SuccessorList::new();
            if let Some(t) = true_target {
                list.push(*t);
            }
            if let Some(f) = false_target {
                list.push(*f);
            }
            list
        }
        Instruction::IndirectBranch { candidates, .. } => candidates.iter().copied().collect(),
        Instruction::Switch {
            default_target,
            cases,
            ..
        } => {
            let mut list: SuccessorList = smallvec![*default_target];
            list.extend(cases.iter().map(|&(_, block)| block));
            list
        }
        Instruction::SwitchOld {
            default_target,
            cases,
            ..
        } => {
            let mut list: SuccessorList = smallvec![*default_target];
            list.extend(cases.iter().map(|&(_, block)| block));
            list
        }
        Instruction::Return { .. } | Instruction::Unreachable => SuccessorList::new(),
        other => {
            return Err(AnalysisError::UnhandledTerminator(other.mnemonic()).into());
        }
    };

    let mut deduped = SuccessorList::new();
    for block in raw {
        if !deduped.contains(&block) {
            deduped.push(block);
        }
    }
    Ok(deduped)
}

/// Per-block successor and predecessor lists for one function.
#[derive(Clone, Debug)]
pub struct CFGInfo {
    pub succs: EntityVec<Block, SuccessorList>,
    pub preds: EntityMap<Block, SmallVec<[Block; 4]>>,
}

impl CFGInfo {
    pub fn new(f: &FunctionDefinition) -> Result<CFGInfo> {
        let mut succs: EntityVec<Block, SuccessorList> = EntityVec::default();
        let mut preds: EntityMap<Block, SmallVec<[Block; 4]>> = EntityMap::default();
        for (block, body) in f.blocks.entries() {
            let term = body
                .insts
                .last()
                .ok_or_else(|| AnalysisError::MissingTerminator(format!("{}", block)))?;
            let block_succs = successors(term)?;
            for &succ in &block_succs {
                ensure!(
                    succ.index() < f.blocks.len(),
                    "terminator of {} targets out-of-range block {}",
                    block,
                    succ
                );
                preds[succ].push(block);
            }
            succs.push(block_succs);
        }
        Ok(CFGInfo { succs, preds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Constant, Symbol, Type};

    fn block(i: usize) -> Block {
        Block::new(i)
    }

    #[test]
    fn cond_branch_tolerates_missing_targets() {
        let inst = Instruction::CondBranch {
            condition: Symbol::result("c", Type::I1),
            true_target: Some(block(1)),
            false_target: None,
        };
        let succs = successors(&inst).unwrap();
        assert_eq!(succs.as_slice(), &[block(1)]);
    }

    #[test]
    fn switch_includes_default_and_dedupes_cases() {
        let inst = Instruction::Switch {
            condition: Symbol::result("c", Type::I32),
            default_target: block(3),
            cases: vec![
                (Constant::Integer(0), block(1)),
                (Constant::Integer(1), block(1)),
                (Constant::Integer(2), block(3)),
            ],
        };
        let succs = successors(&inst).unwrap();
        assert_eq!(succs.as_slice(), &[block(3), block(1)]);
    }

    #[test]
    fn return_and_unreachable_have_no_successors() {
        assert!(successors(&Instruction::Return { value: None })
            .unwrap()
            .is_empty());
        assert!(successors(&Instruction::Unreachable).unwrap().is_empty());
    }

    #[test]
    fn non_terminator_is_rejected() {
        let inst = Instruction::Load {
            name: "x".to_string(),
            ty: Type::I32,
            source: Symbol::result("p", Type::Pointer),
        };
        let err = successors(&inst).unwrap_err();
        match err.downcast_ref::<AnalysisError>() {
            Some(AnalysisError::UnhandledTerminator(name)) => assert_eq!(*name, "load"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
