//! Key trie: one level per argument position
//!
//! Each node owns two branch tables. Primitive keys live in a plain hash map;
//! reference keys live in a table that only holds `Weak` anchors, so the trie
//! never keeps an argument alive. A dead anchor makes its entry invisible
//! immediately and the entry is reclaimed by the next sweep of that table or
//! by [`Node::purge`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use ahash::RandomState;
use tracing::debug;

use crate::key::{identity, Handle, Key, PrimitiveKey, Value};

/// Trie node for the argument prefix consumed so far
pub(crate) struct Node<R> {
    pub(crate) result: Option<R>,
    values: Option<HashMap<PrimitiveKey, Node<R>, RandomState>>,
    references: Option<RefTable<R>>,
}

/// Child reached through a reference key
struct RefEntry<R> {
    // Pins the allocation (not the value), so the address stays unique
    anchor: Weak<dyn Any + Send + Sync>,
    node: Node<R>,
}

/// Identity-keyed branch table with amortized sweeping of dead keys
struct RefTable<R> {
    entries: HashMap<usize, RefEntry<R>, RandomState>,
    sweep_at: usize,
    floor: usize,
}

impl<R> RefEntry<R> {
    fn new(handle: &Handle) -> Self {
        Self {
            anchor: Arc::downgrade(handle),
            node: Node::new(),
        }
    }

    fn is_live(&self) -> bool {
        self.anchor.strong_count() > 0
    }
}

impl<R> RefTable<R> {
    fn new(floor: usize) -> Self {
        Self {
            entries: HashMap::default(),
            sweep_at: floor,
            floor,
        }
    }

    fn get(&self, handle: &Handle) -> Option<&Node<R>> {
        self.entries
            .get(&identity(handle))
            .filter(|entry| entry.is_live())
            .map(|entry| &entry.node)
    }

    fn get_mut(&mut self, handle: &Handle) -> Option<&mut Node<R>> {
        self.entries
            .get_mut(&identity(handle))
            .filter(|entry| entry.is_live())
            .map(|entry| &mut entry.node)
    }

    fn get_or_insert(&mut self, handle: &Handle, reclaimed: &mut usize) -> &mut Node<R> {
        let id = identity(handle);

        if self.entries.len() >= self.sweep_at && !self.entries.contains_key(&id) {
            *reclaimed += self.sweep();
            self.sweep_at = (self.entries.len() * 2).max(self.floor);
        }

        // A dead entry's anchor keeps its address out of reuse, so a hit is live
        let entry = self
            .entries
            .entry(id)
            .or_insert_with(|| RefEntry::new(handle));
        debug_assert!(entry.is_live());
        &mut entry.node
    }

    fn remove(&mut self, handle: &Handle) -> Option<Node<R>> {
        let id = identity(handle);
        match self.entries.remove(&id) {
            Some(entry) if entry.is_live() => Some(entry.node),
            _ => None,
        }
    }

    /// Drop entries whose keys are gone
    fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live());
        let swept = before - self.entries.len();
        if swept > 0 {
            debug!(swept, remaining = self.entries.len(), "swept dead reference keys");
        }
        swept
    }
}

impl<R> Node<R> {
    pub(crate) fn new() -> Self {
        Self {
            result: None,
            values: None,
            references: None,
        }
    }

    /// Child for one key, if present and live
    pub(crate) fn child(&self, key: &Value) -> Option<&Node<R>> {
        match key.key() {
            Key::Primitive(k) => self.values.as_ref()?.get(&k),
            Key::Reference(handle) => self.references.as_ref()?.get(handle),
        }
    }

    /// Mutable child for one key, if present and live
    pub(crate) fn child_mut(&mut self, key: &Value) -> Option<&mut Node<R>> {
        match key.key() {
            Key::Primitive(k) => self.values.as_mut()?.get_mut(&k),
            Key::Reference(handle) => self.references.as_mut()?.get_mut(handle),
        }
    }

    /// Child for one key, created on first visit
    ///
    /// `sweep_threshold` seeds a new reference table; dead entries swept on
    /// the way are added to `reclaimed`.
    pub(crate) fn child_or_insert(
        &mut self,
        key: &Value,
        sweep_threshold: usize,
        reclaimed: &mut usize,
    ) -> &mut Node<R> {
        match key.key() {
            Key::Primitive(k) => self
                .values
                .get_or_insert_with(HashMap::default)
                .entry(k)
                .or_insert_with(Node::new),
            Key::Reference(handle) => self
                .references
                .get_or_insert_with(|| RefTable::new(sweep_threshold))
                .get_or_insert(handle, reclaimed),
        }
    }

    /// Detach the subtree under one key
    pub(crate) fn remove_child(&mut self, key: &Value) -> Option<Node<R>> {
        match key.key() {
            Key::Primitive(k) => self.values.as_mut()?.remove(&k),
            Key::Reference(handle) => self.references.as_mut()?.remove(handle),
        }
    }

    /// Follow a path without creating nodes
    pub(crate) fn find(&self, path: &[Value]) -> Option<&Node<R>> {
        let mut node = self;
        for key in path {
            node = node.child(key)?;
        }
        Some(node)
    }

    /// Follow a path mutably without creating nodes
    pub(crate) fn find_mut(&mut self, path: &[Value]) -> Option<&mut Node<R>> {
        let mut node = self;
        for key in path {
            node = node.child_mut(key)?;
        }
        Some(node)
    }

    /// Follow a path, creating missing nodes
    pub(crate) fn entry(
        &mut self,
        path: &[Value],
        sweep_threshold: usize,
        reclaimed: &mut usize,
    ) -> &mut Node<R> {
        let mut node = self;
        for key in path {
            node = node.child_or_insert(key, sweep_threshold, reclaimed);
        }
        node
    }

    /// Number of cached results reachable through live keys
    pub(crate) fn len(&self) -> usize {
        let own = usize::from(self.result.is_some());
        let values: usize = self
            .values
            .iter()
            .flat_map(|table| table.values())
            .map(Node::len)
            .sum();
        let references: usize = self
            .references
            .iter()
            .flat_map(|table| table.entries.values())
            .filter(|entry| entry.is_live())
            .map(|entry| entry.node.len())
            .sum();
        own + values + references
    }

    /// Reclaim dead reference entries in the whole subtree
    pub(crate) fn purge(&mut self) -> usize {
        let mut reclaimed = 0;
        if let Some(table) = self.references.as_mut() {
            reclaimed += table.sweep();
            table.sweep_at = (table.entries.len() * 2).max(table.floor);
            for entry in table.entries.values_mut() {
                reclaimed += entry.node.purge();
            }
        }
        if let Some(table) = self.values.as_mut() {
            for node in table.values_mut() {
                reclaimed += node.purge();
            }
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(keys: &[Value]) -> Vec<Value> {
        keys.to_vec()
    }

    #[test]
    fn test_trie_entry_and_find() {
        let mut root: Node<&str> = Node::new();
        let mut reclaimed = 0;
        let keys = path(&[Value::from(1), Value::from("a")]);

        root.entry(&keys, 4, &mut reclaimed).result = Some("hit");

        assert_eq!(root.find(&keys).and_then(|n| n.result), Some("hit"));
        assert!(root.find(&keys[..1]).is_some());
        assert!(root.find(&keys[..1]).unwrap().result.is_none());
        assert!(root.find(&[Value::from(2)]).is_none());
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn test_trie_find_does_not_create() {
        let root: Node<()> = Node::new();
        assert!(root.find(&[Value::from(1), Value::object(())]).is_none());
        assert!(root.values.is_none());
        assert!(root.references.is_none());
    }

    #[test]
    fn test_trie_separate_tables() {
        let mut root: Node<u8> = Node::new();
        let mut reclaimed = 0;
        let obj = Value::object("1");

        root.entry(&[Value::from("1")], 4, &mut reclaimed).result = Some(1);
        root.entry(&[obj.clone()], 4, &mut reclaimed).result = Some(2);

        assert_eq!(root.find(&[Value::from("1")]).unwrap().result, Some(1));
        assert_eq!(root.find(&[obj]).unwrap().result, Some(2));
        assert_eq!(root.len(), 2);
    }

    #[test]
    fn test_trie_remove_child_prunes_subtree() {
        let mut root: Node<u8> = Node::new();
        let mut reclaimed = 0;

        root.entry(&[Value::from(1), Value::from(2)], 4, &mut reclaimed).result = Some(1);
        root.entry(&[Value::from(1), Value::from(3)], 4, &mut reclaimed).result = Some(2);
        root.entry(&[Value::from(4)], 4, &mut reclaimed).result = Some(3);

        assert!(root.remove_child(&Value::from(1)).is_some());
        assert!(root.remove_child(&Value::from(1)).is_none());
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn test_trie_does_not_pin_reference_keys() {
        let mut root: Node<u8> = Node::new();
        let mut reclaimed = 0;
        let handle: Handle = Arc::new(String::from("key"));
        let weak = Arc::downgrade(&handle);

        root.entry(&[Value::from_handle(handle)], 4, &mut reclaimed).result = Some(1);

        // The Value passed in was the last strong reference
        assert!(weak.upgrade().is_none());
        assert_eq!(root.len(), 0);
        assert_eq!(root.purge(), 1);
        assert!(root.references.as_ref().unwrap().entries.is_empty());
    }

    #[test]
    fn test_trie_reuses_live_reference_entry() {
        let mut root: Node<u8> = Node::new();
        let mut reclaimed = 0;
        let key = Value::object(());

        root.entry(&[key.clone(), Value::from(1)], 4, &mut reclaimed).result = Some(1);
        root.entry(&[key.clone(), Value::from(2)], 4, &mut reclaimed).result = Some(2);

        assert_eq!(reclaimed, 0);
        assert_eq!(root.references.as_ref().unwrap().entries.len(), 1);
        assert_eq!(root.find(&[key]).map(Node::len), Some(2));
    }

    #[test]
    fn test_trie_sweeps_on_growth() {
        let mut root: Node<u8> = Node::new();
        let mut reclaimed = 0;

        for _ in 0..4 {
            let temp = Value::object(0u8);
            root.entry(&[temp], 4, &mut reclaimed).result = Some(0);
        }
        assert_eq!(reclaimed, 0);

        let keep = Value::object(1u8);
        root.entry(&[keep.clone()], 4, &mut reclaimed).result = Some(1);

        assert_eq!(reclaimed, 4);
        assert_eq!(root.references.as_ref().unwrap().entries.len(), 1);
        assert_eq!(root.find(&[keep]).unwrap().result, Some(1));
    }

    #[test]
    fn test_trie_purge_nested() {
        let mut root: Node<u8> = Node::new();
        let mut reclaimed = 0;
        let outer = Value::object(());

        {
            let inner = Value::object(());
            root.entry(&[Value::from(1), outer.clone(), inner], 4, &mut reclaimed)
                .result = Some(1);
        }
        root.entry(&[Value::from(1), outer.clone()], 4, &mut reclaimed).result = Some(2);

        assert_eq!(root.len(), 1);
        assert_eq!(root.purge(), 1);
        assert_eq!(root.purge(), 0);
        assert_eq!(root.find(&[Value::from(1), outer]).unwrap().result, Some(2));
    }
}
