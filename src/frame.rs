//! Per-function frame table: the arena of slots holding virtual-value
//! results.
//!
//! Slots are interned by value name, so two requests for the same name
//! yield the same `Slot` index. A slot's storage kind starts unresolved
//! and is resolved exactly once, on the first typed use or definition;
//! re-resolution to the same kind is a no-op, to a different kind an
//! error.

use crate::declare_entity;
use crate::entity::EntityVec;
use crate::errors::AnalysisError;
use crate::ir::Type;
use anyhow::Result;
use fxhash::FxHashMap;

declare_entity!(Slot, "slot");

/// Storage kind of a frame slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Boolean,
    Byte,
    Int,
    Long,
    Float,
    Double,
    Object,
}

/// Map a declared value type to the slot kind that stores it. Pointers,
/// vectors and aggregates all land in object slots.
pub fn slot_kind_of(ty: Type) -> SlotKind {
    match ty {
        Type::I1 => SlotKind::Boolean,
        Type::I8 => SlotKind::Byte,
        Type::I16 | Type::I32 => SlotKind::Int,
        Type::I64 => SlotKind::Long,
        Type::Float => SlotKind::Float,
        Type::Double => SlotKind::Double,
        Type::Pointer | Type::Vector | Type::Array | Type::Struct => SlotKind::Object,
        Type::Void | Type::Metadata => SlotKind::Object,
    }
}

#[derive(Clone, Debug)]
struct SlotData {
    name: String,
    kind: Option<SlotKind>,
}

#[derive(Clone, Debug, Default)]
pub struct FrameTable {
    by_name: FxHashMap<String, Slot>,
    slots: EntityVec<Slot, SlotData>,
}

impl FrameTable {
    /// Intern a value name, creating its slot on first sight. Idempotent:
    /// repeated calls with the same name return the same index.
    pub fn find_or_create(&mut self, name: &str) -> Slot {
        if let Some(&slot) = self.by_name.get(name) {
            return slot;
        }
        let slot = self.slots.push(SlotData {
            name: name.to_string(),
            kind: None,
        });
        self.by_name.insert(name.to_string(), slot);
        slot
    }

    /// Resolve a slot's storage kind from a declared type. Write-once: a
    /// second resolution must agree with the first.
    pub fn resolve_kind(&mut self, slot: Slot, ty: Type) -> Result<()> {
        let want = slot_kind_of(ty);
        let data = &mut self.slots[slot];
        match data.kind {
            None => {
                data.kind = Some(want);
                Ok(())
            }
            Some(have) if have == want => Ok(()),
            Some(have) => Err(AnalysisError::KindConflict {
                slot: data.name.clone(),
                have,
                want,
            }
            .into()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Slot> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, slot: Slot) -> &str {
        &self.slots[slot].name
    }

    pub fn kind(&self, slot: Slot) -> Option<SlotKind> {
        self.slots[slot].kind
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Slot> {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut frame = FrameTable::default();
        let a = frame.find_or_create("a");
        let b = frame.find_or_create("b");
        assert_ne!(a, b);
        assert_eq!(frame.find_or_create("a"), a);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.name(a), "a");
    }

    #[test]
    fn kind_resolves_once() {
        let mut frame = FrameTable::default();
        let a = frame.find_or_create("a");
        assert_eq!(frame.kind(a), None);
        frame.resolve_kind(a, Type::I32).unwrap();
        assert_eq!(frame.kind(a), Some(SlotKind::Int));
        // Same kind again is a no-op; I16 also maps to Int.
        frame.resolve_kind(a, Type::I16).unwrap();
        assert_eq!(frame.kind(a), Some(SlotKind::Int));
    }

    #[test]
    fn conflicting_kind_is_an_error() {
        let mut frame = FrameTable::default();
        let a = frame.find_or_create("a");
        frame.resolve_kind(a, Type::I32).unwrap();
        let err = frame.resolve_kind(a, Type::Double).unwrap_err();
        match err.downcast_ref::<AnalysisError>() {
            Some(AnalysisError::KindConflict { have, want, .. }) => {
                assert_eq!(*have, SlotKind::Int);
                assert_eq!(*want, SlotKind::Double);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // The original kind survives the failed re-resolution.
        assert_eq!(frame.kind(a), Some(SlotKind::Int));
    }
}
