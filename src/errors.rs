//! Error types.

use crate::frame::SlotKind;

/// An error that aborts liveness analysis of one function.
///
/// All variants are model-completeness errors, not transient conditions:
/// a partial use/def or CFG model would yield an unsound liveness result,
/// so the whole-function analysis fails rather than approximating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalysisError {
    /// The given instruction variant has no registered operand-read rule.
    UnsupportedInstruction(&'static str),
    /// The given terminator variant has no registered successor rule, or a
    /// block ends in a non-terminator.
    UnhandledTerminator(&'static str),
    /// An operand resolved to a symbol kind that is not a valid read target.
    UnsupportedSymbol(String),
    /// A block has no instructions at all, so no terminator.
    MissingTerminator(String),
    /// A slot's storage kind was re-resolved to a different kind.
    KindConflict {
        slot: String,
        have: SlotKind,
        want: SlotKind,
    },
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AnalysisError::UnsupportedInstruction(name) => {
                write!(f, "no read rule for instruction variant `{}`", name)
            }
            AnalysisError::UnhandledTerminator(name) => {
                write!(f, "no successor rule for terminator variant `{}`", name)
            }
            AnalysisError::UnsupportedSymbol(desc) => {
                write!(f, "symbol is not a valid read target: {}", desc)
            }
            AnalysisError::MissingTerminator(block) => {
                write!(f, "block {} has no terminator", block)
            }
            AnalysisError::KindConflict { slot, have, want } => write!(
                f,
                "slot `{}` already resolved to kind {:?}, cannot re-resolve to {:?}",
                slot, have, want
            ),
        }
    }
}

impl std::error::Error for AnalysisError {}
