//! Operand-read extraction: which slots does one instruction read, in
//! which order.
//!
//! Each instruction variant contributes a fixed operand list. Constants
//! and globals never materialize a slot; instruction results and
//! parameters are interned into the frame table, resolving the slot's
//! kind on first sight. The returned order is part of the contract
//! (store reads source then destination, getelementptr reads base then
//! each index, and so on), and repeated calls on the same instruction
//! return equal sequences.

use crate::errors::AnalysisError;
use crate::frame::{FrameTable, Slot};
use crate::ir::{Instruction, Symbol};
use anyhow::Result;

/// Collect the ordered slot reads of one instruction.
///
/// Fails with `UnsupportedInstruction` for variants with no read rule
/// (never a partial list) and `UnsupportedSymbol` if an operand is not a
/// valid read target.
pub fn extract_reads(frame: &mut FrameTable, inst: &Instruction) -> Result<Vec<Slot>> {
    let mut reads = vec![];
    match inst {
        Instruction::Alloc { count, .. } => {
            read_operand(frame, count, &mut reads)?;
        }
        Instruction::Load { source, .. } => {
            read_operand(frame, source, &mut reads)?;
        }
        Instruction::Store {
            source,
            destination,
        } => {
            read_operand(frame, source, &mut reads)?;
            read_operand(frame, destination, &mut reads)?;
        }
        Instruction::Binary { lhs, rhs, .. } | Instruction::Compare { lhs, rhs, .. } => {
            read_operand(frame, lhs, &mut reads)?;
            read_operand(frame, rhs, &mut reads)?;
        }
        Instruction::Cast { value, .. } => {
            read_operand(frame, value, &mut reads)?;
        }
        Instruction::GetElementPtr { base, indices, .. } => {
            read_operand(frame, base, &mut reads)?;
            for index in indices {
                read_operand(frame, index, &mut reads)?;
            }
        }
        Instruction::ExtractElement { index, vector, .. } => {
            read_operand(frame, index, &mut reads)?;
            read_operand(frame, vector, &mut reads)?;
        }
        Instruction::InsertElement {
            index,
            vector,
            value,
            ..
        } => {
            read_operand(frame, index, &mut reads)?;
            read_operand(frame, vector, &mut reads)?;
            read_operand(frame, value, &mut reads)?;
        }
        Instruction::InsertValue {
            aggregate, value, ..
        } => {
            read_operand(frame, aggregate, &mut reads)?;
            read_operand(frame, value, &mut reads)?;
        }
        Instruction::ShuffleVector {
            mask,
            vector1,
            vector2,
            ..
        } => {
            read_operand(frame, mask, &mut reads)?;
            read_operand(frame, vector1, &mut reads)?;
            read_operand(frame, vector2, &mut reads)?;
        }
        Instruction::Select {
            condition,
            true_value,
            false_value,
            ..
        } => {
            read_operand(frame, condition, &mut reads)?;
            read_operand(frame, true_value, &mut reads)?;
            read_operand(frame, false_value, &mut reads)?;
        }
        Instruction::Call { arguments, .. } | Instruction::VoidCall { arguments, .. } => {
            for argument in arguments {
                read_operand(frame, argument, &mut reads)?;
            }
        }
        // A phi's incoming operands are uses on the predecessor edges,
        // resolved through the phi table, never reads of the phi itself.
        Instruction::Phi { .. } => {}
        Instruction::Branch { .. } => {}
        Instruction::CondBranch { condition, .. } => {
            read_operand(frame, condition, &mut reads)?;
        }
        Instruction::IndirectBranch { address, .. } => {
            read_operand(frame, address, &mut reads)?;
        }
        Instruction::Switch { condition, .. } | Instruction::SwitchOld { condition, .. } => {
            read_operand(frame, condition, &mut reads)?;
        }
        Instruction::Return { value } => {
            if let Some(value) = value {
                read_operand(frame, value, &mut reads)?;
            }
        }
        Instruction::Unreachable => {}
        Instruction::ExtractValue { .. } => {
            return Err(AnalysisError::UnsupportedInstruction(inst.mnemonic()).into());
        }
    }
    Ok(reads)
}

fn read_operand(frame: &mut FrameTable, symbol: &Symbol, reads: &mut Vec<Slot>) -> Result<()> {
    match symbol {
        // No runtime storage behind these; nothing is read.
        Symbol::Constant(_) | Symbol::Global { .. } => Ok(()),
        Symbol::InstructionResult { name, ty } | Symbol::Parameter { name, ty } => {
            let slot = frame.find_or_create(name);
            frame.resolve_kind(slot, *ty)?;
            reads.push(slot);
            Ok(())
        }
        Symbol::Metadata { .. } => {
            Err(AnalysisError::UnsupportedSymbol(format!("{}", symbol)).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SlotKind;
    use crate::ir::{BinOp, Constant, Type};

    #[test]
    fn store_reads_source_then_destination() {
        let mut frame = FrameTable::default();
        let inst = Instruction::Store {
            source: Symbol::result("v", Type::I32),
            destination: Symbol::result("p", Type::Pointer),
        };
        let reads = extract_reads(&mut frame, &inst).unwrap();
        assert_eq!(reads.len(), 2);
        assert_eq!(frame.name(reads[0]), "v");
        assert_eq!(frame.name(reads[1]), "p");
        assert_eq!(frame.kind(reads[0]), Some(SlotKind::Int));
        assert_eq!(frame.kind(reads[1]), Some(SlotKind::Object));
    }

    #[test]
    fn constants_and_globals_never_materialize_slots() {
        let mut frame = FrameTable::default();
        let inst = Instruction::Binary {
            name: "x".to_string(),
            ty: Type::I32,
            op: BinOp::Add,
            lhs: Symbol::constant(1),
            rhs: Symbol::Global {
                name: "g".to_string(),
            },
        };
        let reads = extract_reads(&mut frame, &inst).unwrap();
        assert!(reads.is_empty());
        assert!(frame.is_empty());
    }

    #[test]
    fn duplicate_operands_keep_multiplicity_and_order() {
        let mut frame = FrameTable::default();
        let inst = Instruction::Binary {
            name: "x".to_string(),
            ty: Type::I32,
            op: BinOp::Mul,
            lhs: Symbol::result("a", Type::I32),
            rhs: Symbol::result("a", Type::I32),
        };
        let first = extract_reads(&mut frame, &inst).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0], first[1]);
        // Determinism across repeated calls.
        let second = extract_reads(&mut frame, &inst).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn phi_and_plain_branch_contribute_no_reads() {
        let mut frame = FrameTable::default();
        let phi = Instruction::Phi {
            name: "p".to_string(),
            ty: Type::I64,
        };
        assert!(extract_reads(&mut frame, &phi).unwrap().is_empty());
        let br = Instruction::Branch {
            target: Default::default(),
        };
        assert!(extract_reads(&mut frame, &br).unwrap().is_empty());
    }

    #[test]
    fn uncatalogued_variant_fails_without_partial_result() {
        let mut frame = FrameTable::default();
        let inst = Instruction::ExtractValue {
            name: "x".to_string(),
            ty: Type::I32,
            aggregate: Symbol::result("agg", Type::Struct),
            index: 0,
        };
        let err = extract_reads(&mut frame, &inst).unwrap_err();
        match err.downcast_ref::<AnalysisError>() {
            Some(AnalysisError::UnsupportedInstruction(name)) => {
                assert_eq!(*name, "extractvalue")
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // The aggregate operand must not have been interned on the way out.
        assert!(frame.is_empty());
    }

    #[test]
    fn metadata_operand_is_rejected() {
        let mut frame = FrameTable::default();
        let inst = Instruction::VoidCall {
            callee: "llvm.dbg.value".to_string(),
            arguments: vec![Symbol::Metadata { index: 3 }],
        };
        let err = extract_reads(&mut frame, &inst).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::UnsupportedSymbol(_))
        ));
    }

    #[test]
    fn return_without_value_reads_nothing() {
        let mut frame = FrameTable::default();
        let inst = Instruction::Return { value: None };
        assert!(extract_reads(&mut frame, &inst).unwrap().is_empty());
        let inst = Instruction::Return {
            value: Some(Symbol::Constant(Constant::Null)),
        };
        assert!(extract_reads(&mut frame, &inst).unwrap().is_empty());
    }
}
