use std::collections::HashMap;

use crate::error::{CoreError, ResourceKind};

/// Id numbering for a registry. Zero-based tables take caller-chosen ids
/// (id 0 stays reserved as the invalid sentinel); one-based tables assign
/// ids derived from the slot index, so id 0 can never denote a live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpace {
    ZeroBased,
    OneBased,
}

/// Fixed-capacity table of records addressed by a stable integer id.
///
/// Slots are an arena with free-list reuse: removal pushes the slot index
/// onto the free list and a later insert pops it, so ids are unique among
/// currently active entries only. Callers holding an id across a removal
/// must treat it as stale.
#[derive(Debug)]
pub struct SlotRegistry<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
    index: HashMap<u32, usize>,
    capacity: usize,
    id_space: IdSpace,
    kind: ResourceKind,
    name: &'static str,
}

impl<T> SlotRegistry<T> {
    pub fn new(capacity: usize, id_space: IdSpace, kind: ResourceKind, name: &'static str) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            index: HashMap::new(),
            capacity,
            id_space,
            kind,
            name,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.index.len() >= self.capacity
    }

    pub fn contains(&self, id: u32) -> bool {
        self.index.contains_key(&id)
    }

    fn full_error(&self) -> CoreError {
        CoreError::CapacityExceeded {
            registry: self.name,
            capacity: self.capacity,
        }
    }

    // the lowest freed slot is reclaimed first, keeping assigned ids dense
    fn claim_slot(&mut self) -> Option<usize> {
        if !self.free.is_empty() {
            let mut lowest = 0;
            for (pos, slot) in self.free.iter().enumerate() {
                if *slot < self.free[lowest] {
                    lowest = pos;
                }
            }
            return Some(self.free.swap_remove(lowest));
        }
        if self.slots.len() < self.capacity {
            self.slots.push(None);
            return Some(self.slots.len() - 1);
        }
        None
    }

    /// Inserts a record under a caller-chosen id (zero-based tables).
    pub fn insert(&mut self, id: u32, record: T) -> Result<(), CoreError> {
        if id == 0 {
            return Err(CoreError::invalid(format!(
                "{} id 0 is reserved",
                self.kind.as_str()
            )));
        }
        if self.index.contains_key(&id) {
            return Err(CoreError::AlreadyInUse {
                kind: self.kind,
                id,
            });
        }
        let slot = match self.claim_slot() {
            Some(slot) => slot,
            None => return Err(self.full_error()),
        };
        self.slots[slot] = Some(record);
        self.index.insert(id, slot);
        Ok(())
    }

    /// Inserts a record under a registry-assigned id derived from the slot
    /// index (one-based tables). The builder receives the assigned id.
    pub fn insert_assigned(&mut self, build: impl FnOnce(u32) -> T) -> Result<u32, CoreError> {
        let base = match self.id_space {
            IdSpace::ZeroBased => 0,
            IdSpace::OneBased => 1,
        };
        let slot = match self.claim_slot() {
            Some(slot) => slot,
            None => return Err(self.full_error()),
        };
        let id = slot as u32 + base;
        self.slots[slot] = Some(build(id));
        self.index.insert(id, slot);
        Ok(id)
    }

    /// Removes the record, returning it so the caller can run teardown
    /// (exact-value release, storage handback) before the slot is recycled.
    pub fn remove(&mut self, id: u32) -> Result<T, CoreError> {
        let slot = self
            .index
            .remove(&id)
            .ok_or(CoreError::NotFound {
                kind: self.kind,
                id,
            })?;
        let record = self.slots[slot].take().expect("indexed slot is occupied");
        self.free.push(slot);
        Ok(record)
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.index
            .get(&id)
            .and_then(|slot| self.slots[*slot].as_ref())
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_mut()
    }

    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.index.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(capacity: usize) -> SlotRegistry<&'static str> {
        SlotRegistry::new(capacity, IdSpace::ZeroBased, ResourceKind::Process, "process")
    }

    #[test]
    fn insert_lookup_remove_round_trip() {
        let mut table = registry(4);
        table.insert(7, "seven").unwrap();
        assert_eq!(table.get(7), Some(&"seven"));
        assert_eq!(table.len(), 1);

        let record = table.remove(7).unwrap();
        assert_eq!(record, "seven");
        assert!(table.is_empty());
        assert_eq!(
            table.remove(7),
            Err(CoreError::NotFound {
                kind: ResourceKind::Process,
                id: 7
            })
        );
    }

    #[test]
    fn id_zero_is_rejected() {
        let mut table = registry(4);
        assert!(matches!(
            table.insert(0, "zero"),
            Err(CoreError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn duplicate_active_ids_are_rejected() {
        let mut table = registry(4);
        table.insert(3, "first").unwrap();
        assert_eq!(
            table.insert(3, "second"),
            Err(CoreError::AlreadyInUse {
                kind: ResourceKind::Process,
                id: 3
            })
        );
    }

    #[test]
    fn capacity_is_enforced_and_slots_are_reused() {
        let mut table = registry(2);
        table.insert(1, "a").unwrap();
        table.insert(2, "b").unwrap();
        assert_eq!(
            table.insert(3, "c"),
            Err(CoreError::CapacityExceeded {
                registry: "process",
                capacity: 2
            })
        );

        table.remove(1).unwrap();
        table.insert(3, "c").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(3), Some(&"c"));
    }

    #[test]
    fn one_based_tables_assign_ids_from_slot_indices() {
        let mut table: SlotRegistry<u32> = SlotRegistry::new(
            3,
            IdSpace::OneBased,
            ResourceKind::FrameBuffer,
            "frame buffer",
        );
        let first = table.insert_assigned(|id| id).unwrap();
        let second = table.insert_assigned(|id| id).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);

        table.remove(first).unwrap();
        let reused = table.insert_assigned(|id| id).unwrap();
        assert_eq!(reused, 1);
    }

    #[test]
    fn freed_slots_are_reused_lowest_first() {
        let mut table: SlotRegistry<u32> = SlotRegistry::new(
            4,
            IdSpace::OneBased,
            ResourceKind::FrameBuffer,
            "frame buffer",
        );
        for _ in 0..4 {
            table.insert_assigned(|id| id).unwrap();
        }
        table.remove(4).unwrap();
        table.remove(2).unwrap();
        table.remove(3).unwrap();

        assert_eq!(table.insert_assigned(|id| id).unwrap(), 2);
        assert_eq!(table.insert_assigned(|id| id).unwrap(), 3);
        assert_eq!(table.insert_assigned(|id| id).unwrap(), 4);
    }

    #[test]
    fn ids_are_reported_in_order() {
        let mut table = registry(4);
        table.insert(9, "nine").unwrap();
        table.insert(2, "two").unwrap();
        assert_eq!(table.ids(), vec![2, 9]);
    }
}
