//! Instance handles and the table that owns per-instance host state.
use std::fmt;

use slab::Slab;

/// Opaque handle to one engine instance owned by a [`Host`](crate::Host).
///
/// Handles are never reused: a handle from a destroyed instance keeps failing with
/// `UnknownInstance` even after its slot is taken by a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId {
    key: usize,
    generation: u64,
}

impl InstanceId {
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            key: usize::MAX,
            generation: u64::MAX,
        }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.key, self.generation)
    }
}

#[derive(Debug)]
struct Entry<T> {
    generation: u64,
    value: T,
}

#[derive(Debug)]
pub(crate) struct Registry<T> {
    entries: Slab<Entry<T>>,
    next_generation: u64,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Slab::new(),
            next_generation: 0,
        }
    }

    /// Reserves a slot, builds the value with its final id and stores it.
    /// Nothing is stored when `build` fails.
    pub fn try_insert_with<E>(
        &mut self,
        build: impl FnOnce(InstanceId) -> Result<T, E>,
    ) -> Result<InstanceId, E> {
        let entry = self.entries.vacant_entry();
        let id = InstanceId {
            key: entry.key(),
            generation: self.next_generation,
        };
        let value = build(id)?;
        entry.insert(Entry {
            generation: id.generation,
            value,
        });
        self.next_generation += 1;
        Ok(id)
    }

    pub fn get(&self, id: InstanceId) -> Option<&T> {
        self.entries
            .get(id.key)
            .filter(|entry| entry.generation == id.generation)
            .map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut T> {
        self.entries
            .get_mut(id.key)
            .filter(|entry| entry.generation == id.generation)
            .map(|entry| &mut entry.value)
    }

    pub fn remove(&mut self, id: InstanceId) -> Option<T> {
        self.get(id)?;
        Some(self.entries.remove(id.key).value)
    }

    pub fn ids(&self) -> Vec<InstanceId> {
        self.entries
            .iter()
            .map(|(key, entry)| InstanceId {
                key,
                generation: entry.generation,
            })
            .collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, entry)| &entry.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_ids_do_not_resolve_after_slot_reuse() {
        let mut registry = Registry::new();
        let first = registry.try_insert_with::<()>(|_| Ok("first")).unwrap();
        assert_eq!(registry.remove(first), Some("first"));

        let second = registry.try_insert_with::<()>(|_| Ok("second")).unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.get(first), None);
        assert_eq!(registry.get(second), Some(&"second"));
        assert_eq!(registry.remove(first), None);
        assert_eq!(registry.ids(), vec![second]);
    }

    #[test]
    fn failed_build_leaves_no_entry() {
        let mut registry: Registry<&str> = Registry::new();
        let result = registry.try_insert_with(|_| Err("no engine"));
        assert_eq!(result, Err("no engine"));
        assert!(registry.ids().is_empty());
    }

    #[test]
    fn builder_sees_final_id() {
        let mut registry = Registry::new();
        let id = registry.try_insert_with::<()>(|id| Ok(id)).unwrap();
        assert_eq!(registry.get(id), Some(&id));
        assert_eq!(registry.ids(), vec![id]);
    }
}
