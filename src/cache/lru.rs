//! LRU Policy Module
//!
//! Implements Least Recently Used tracking for size-based eviction.

use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<K> {
    key: K,
    prev: usize,
    next: usize,
}

// == LRU Policy ==
/// Tracks access order for LRU eviction.
///
/// Nodes live in a slab and are linked by index, with a map from key to slot
/// for O(1) touch, removal and eviction:
/// - Head = Most recently used
/// - Tail = Least recently used
///
/// Keys that were never read keep their insertion order, so ties are broken
/// oldest-first.
#[derive(Debug)]
pub struct LruPolicy<K> {
    nodes: Vec<Option<Node<K>>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    head: usize,
    tail: usize,
    maximum: Option<u64>,
}

impl<K> LruPolicy<K>
where
    K: Eq + Hash + Clone,
{
    // == Constructor ==
    /// Creates an empty policy bounded to `maximum` keys (None = unbounded).
    pub fn new(maximum: Option<u64>) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
            maximum,
        }
    }

    // == On Insert ==
    /// Marks a key as written: new keys join at the front, known keys move there.
    pub fn on_insert(&mut self, key: K) {
        if let Some(&slot) = self.index.get(&key) {
            self.move_to_front(slot);
            return;
        }

        let node = Node {
            key: key.clone(),
            prev: NIL,
            next: NIL,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.push_front(slot);
        self.index.insert(key, slot);
    }

    // == On Access ==
    /// Marks a key as recently used. Unknown keys are ignored.
    pub fn on_access(&mut self, key: &K) {
        if let Some(&slot) = self.index.get(key) {
            self.move_to_front(slot);
        }
    }

    // == On Remove ==
    /// Stops tracking a key. Returns false if it was not tracked.
    pub fn on_remove(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(slot) => {
                self.unlink(slot);
                self.nodes[slot] = None;
                self.free.push(slot);
                true
            }
            None => false,
        }
    }

    // == Evict If Needed ==
    /// Pops least recently used keys until the size bound holds again.
    ///
    /// Returns the evicted keys, oldest first.
    pub fn evict_if_needed(&mut self) -> Vec<K> {
        let mut evicted = Vec::new();
        while self.over_capacity() {
            match self.pop_oldest() {
                Some(key) => evicted.push(key),
                None => break,
            }
        }
        evicted
    }

    /// Returns true if more keys are tracked than the bound allows.
    pub fn over_capacity(&self) -> bool {
        self.maximum
            .is_some_and(|maximum| self.index.len() as u64 > maximum)
    }

    // == Pop Oldest ==
    /// Returns and removes the least recently used key.
    pub fn pop_oldest(&mut self) -> Option<K> {
        if self.tail == NIL {
            return None;
        }
        let slot = self.tail;
        self.unlink(slot);
        let node = self.nodes[slot].take()?;
        self.free.push(slot);
        self.index.remove(&node.key);
        Some(node.key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    #[cfg(test)]
    pub fn peek_oldest(&self) -> Option<&K> {
        self.iter_oldest().next()
    }

    /// Iterates keys from least to most recently used.
    pub fn iter_oldest(&self) -> impl Iterator<Item = &K> + '_ {
        let mut cursor = self.tail;
        std::iter::from_fn(move || {
            if cursor == NIL {
                return None;
            }
            let node = self.nodes[cursor].as_ref()?;
            cursor = node.prev;
            Some(&node.key)
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Forgets every key.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.index.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == slot {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(node) = self.nodes[slot].as_mut() {
            node.prev = NIL;
            node.next = old_head;
        }
        if old_head == NIL {
            self.tail = slot;
        } else if let Some(head) = self.nodes[old_head].as_mut() {
            head.prev = slot;
        }
        self.head = slot;
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match self.nodes[slot].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        if prev == NIL {
            self.head = next;
        } else if let Some(node) = self.nodes[prev].as_mut() {
            node.next = next;
        }

        if next == NIL {
            self.tail = prev;
        } else if let Some(node) = self.nodes[next].as_mut() {
            node.prev = prev;
        }

        if let Some(node) = self.nodes[slot].as_mut() {
            node.prev = NIL;
            node.next = NIL;
        }
    }
}
