use crate::error::{OdbcError, Result};
use std::fmt;

/// Which pool a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Connection,
    Cursor,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Connection => f.write_str("connection"),
            HandleKind::Cursor => f.write_str("cursor"),
        }
    }
}

/// Slot index plus the generation the slot had when the handle was issued.
///
/// Callers only ever see `index`; the generation lets internal references
/// (a cursor pointing at its connection) notice that the slot was released
/// and handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub index: u32,
    pub generation: u32,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Fixed-capacity slot table issuing small non-negative integer handles.
pub struct HandleTable<T> {
    kind: HandleKind,
    slots: Vec<Slot<T>>,
    free: usize,
}

impl<T> HandleTable<T> {
    pub fn new(kind: HandleKind, capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();
        Self {
            kind,
            slots,
            free: capacity,
        }
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free
    }

    pub fn has_free(&self) -> bool {
        self.free > 0
    }

    /// Stores `value` in the first empty slot.
    pub fn acquire(&mut self, value: T) -> Result<Handle> {
        if self.free == 0 {
            return Err(self.exhausted());
        }
        let Some(index) = self.slots.iter().position(|s| s.value.is_none()) else {
            return Err(self.exhausted());
        };
        let slot = &mut self.slots[index];
        slot.value = Some(value);
        self.free -= 1;
        Ok(Handle {
            index: index as u32,
            generation: slot.generation,
        })
    }

    /// Empties the slot and returns its value. Releasing an empty slot is
    /// a no-op, so the free counter can never overshoot the capacity.
    pub fn release(&mut self, index: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free += 1;
        Some(value)
    }

    /// Current handle for a caller-visible index, if the slot is live.
    pub fn resolve(&self, index: u32) -> Option<Handle> {
        let slot = self.slots.get(index as usize)?;
        slot.value.as_ref().map(|_| Handle {
            index,
            generation: slot.generation,
        })
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get_checked(handle).is_some()
    }

    pub fn get(&self, index: u32) -> Result<&T> {
        self.slots
            .get(index as usize)
            .and_then(|s| s.value.as_ref())
            .ok_or_else(|| self.invalid(index))
    }

    pub fn get_mut(&mut self, index: u32) -> Result<&mut T> {
        let kind = self.kind;
        self.slots
            .get_mut(index as usize)
            .and_then(|s| s.value.as_mut())
            .ok_or(OdbcError::InvalidHandle {
                kind,
                handle: i64::from(index),
            })
    }

    /// Lookup that also rejects handles whose slot has since been reused.
    pub fn get_checked(&self, handle: Handle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_checked_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Indices of all live slots, in ascending order.
    pub fn live_indices(&self) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.value.is_some())
            .map(|(i, _)| i as u32)
            .collect()
    }

    fn exhausted(&self) -> OdbcError {
        OdbcError::HandlesExhausted {
            kind: self.kind,
            max: self.slots.len(),
        }
    }

    fn invalid(&self, index: u32) -> OdbcError {
        OdbcError::InvalidHandle {
            kind: self.kind,
            handle: i64::from(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_table_new() {
        let table: HandleTable<String> = HandleTable::new(HandleKind::Connection, 4);
        assert_eq!(table.capacity(), 4);
        assert_eq!(table.free_count(), 4);
        assert_eq!(table.live_count(), 0);
        assert_eq!(table.kind(), HandleKind::Connection);
    }

    #[test]
    fn test_acquire_returns_first_empty_slot() {
        let mut table = HandleTable::new(HandleKind::Cursor, 3);
        let a = table.acquire("a").unwrap();
        let b = table.acquire("b").unwrap();
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);

        table.release(0);
        let c = table.acquire("c").unwrap();
        assert_eq!(c.index, 0);
        assert_ne!(c.generation, a.generation);
        assert_eq!(*table.get(0).unwrap(), "c");
    }

    #[test]
    fn test_acquire_exhausted() {
        let mut table = HandleTable::new(HandleKind::Cursor, 2);
        table.acquire(1).unwrap();
        table.acquire(2).unwrap();
        let result = table.acquire(3);
        match result {
            Err(OdbcError::HandlesExhausted { kind, max }) => {
                assert_eq!(kind, HandleKind::Cursor);
                assert_eq!(max, 2);
            }
            other => panic!("Expected HandlesExhausted, got {:?}", other),
        }
        assert_eq!(table.free_count(), 0);
    }

    #[test]
    fn test_release_twice_is_noop() {
        let mut table = HandleTable::new(HandleKind::Connection, 2);
        let h = table.acquire(10).unwrap();
        assert_eq!(table.release(h.index), Some(10));
        assert_eq!(table.release(h.index), None);
        assert_eq!(table.free_count(), 2);
        assert_eq!(table.release(99), None);
        assert_eq!(table.free_count(), 2);
    }

    #[test]
    fn test_stale_handle_detected_after_reuse() {
        let mut table = HandleTable::new(HandleKind::Connection, 1);
        let old = table.acquire("first").unwrap();
        table.release(old.index);
        let new = table.acquire("second").unwrap();

        assert_eq!(old.index, new.index);
        assert!(!table.contains(old));
        assert!(table.contains(new));
        assert!(table.get_checked(old).is_none());
        assert_eq!(table.get_checked(new), Some(&"second"));
    }

    #[test]
    fn test_get_invalid_index() {
        let table: HandleTable<u8> = HandleTable::new(HandleKind::Cursor, 2);
        match table.get(1) {
            Err(OdbcError::InvalidHandle { kind, handle }) => {
                assert_eq!(kind, HandleKind::Cursor);
                assert_eq!(handle, 1);
            }
            _ => panic!("Expected InvalidHandle error"),
        }
        assert!(table.get(500).is_err());
        assert!(table.resolve(500).is_none());
    }

    #[test]
    fn test_capacity_never_exceeded_under_churn() {
        let capacity = 5;
        let mut table = HandleTable::new(HandleKind::Cursor, capacity);
        let mut live = Vec::new();

        for round in 0..50u32 {
            if round % 3 == 2 {
                if let Some(idx) = live.pop() {
                    assert!(table.release(idx).is_some());
                }
            } else {
                match table.acquire(round) {
                    Ok(h) => live.push(h.index),
                    Err(_) => assert_eq!(live.len(), capacity),
                }
            }
            assert!(table.live_count() <= capacity);
            assert_eq!(table.live_count() + table.free_count(), capacity);
        }

        for idx in live.drain(..) {
            table.release(idx);
        }
        for i in 0..capacity as u32 {
            assert!(table.acquire(i).is_ok());
        }
    }

    #[test]
    fn test_live_indices() {
        let mut table = HandleTable::new(HandleKind::Connection, 4);
        table.acquire('a').unwrap();
        table.acquire('b').unwrap();
        table.acquire('c').unwrap();
        table.release(1);
        assert_eq!(table.live_indices(), vec![0, 2]);
    }
}
