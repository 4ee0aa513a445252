//! Active drip registry for a single measure token.
//!
//! A singly-linked list stored as an adjacency map: each active drip maps
//! to its successor, and [`Address::SENTINEL`] maps to the head. The list
//! ends when a node points back at the sentinel. Insertion is at the head;
//! removal needs the caller to name the predecessor, so both are O(1).

use std::collections::HashMap;

use voldrip_core::types::Address;

/// Linked list of active drip tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DripRegistry {
    /// node -> successor. Always contains `SENTINEL`.
    next: HashMap<Address, Address>,
}

impl Default for DripRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DripRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let mut next = HashMap::new();
        next.insert(Address::SENTINEL, Address::SENTINEL);
        Self { next }
    }

    /// Whether `drip` is in the list.
    pub fn contains(&self, drip: &Address) -> bool {
        !drip.is_sentinel() && self.next.contains_key(drip)
    }

    /// Number of active drips.
    pub fn len(&self) -> usize {
        self.next.len() - 1
    }

    /// Whether no drip is active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First drip in the list, if any.
    pub fn head(&self) -> Option<Address> {
        self.next
            .get(&Address::SENTINEL)
            .copied()
            .filter(|head| !head.is_sentinel())
    }

    /// Successor of `node`: another drip, the sentinel, or `None` if
    /// `node` is not in the list.
    pub fn successor(&self, node: &Address) -> Option<Address> {
        self.next.get(node).copied()
    }

    /// Insert `drip` at the head.
    ///
    /// Returns `false` (and leaves the list untouched) if `drip` is already
    /// present or is not a valid node address.
    pub fn push(&mut self, drip: Address) -> bool {
        if !drip.is_valid_drip() || self.contains(&drip) {
            return false;
        }
        let head = self.next.get(&Address::SENTINEL).copied().unwrap_or(Address::SENTINEL);
        self.next.insert(drip, head);
        self.next.insert(Address::SENTINEL, drip);
        true
    }

    /// Unlink `drip`, whose predecessor must be `prev`.
    ///
    /// Returns `false` (and leaves the list untouched) if `prev` does not
    /// point at `drip`.
    pub fn remove(&mut self, prev: &Address, drip: &Address) -> bool {
        if !drip.is_valid_drip() || self.next.get(prev) != Some(drip) {
            return false;
        }
        match self.next.remove(drip) {
            Some(after) => {
                self.next.insert(*prev, after);
                true
            }
            None => false,
        }
    }

    /// Predecessor of `drip` found by walking the list. O(n).
    ///
    /// Callers use this to build the argument for [`remove`](Self::remove).
    pub fn predecessor(&self, drip: &Address) -> Option<Address> {
        if !self.contains(drip) {
            return None;
        }
        let mut prev = Address::SENTINEL;
        for node in self.iter() {
            if node == *drip {
                return Some(prev);
            }
            prev = node;
        }
        None
    }

    /// Walk the list from head to sentinel.
    pub fn iter(&self) -> ActiveDrips<'_> {
        ActiveDrips {
            registry: self,
            cursor: Address::SENTINEL,
            remaining: self.len(),
        }
    }
}

/// Lazy head-to-sentinel traversal of a [`DripRegistry`].
pub struct ActiveDrips<'a> {
    registry: &'a DripRegistry,
    cursor: Address,
    remaining: usize,
}

impl Iterator for ActiveDrips<'_> {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.registry.successor(&self.cursor)?;
        if node.is_sentinel() {
            self.remaining = 0;
            return None;
        }
        self.remaining -= 1;
        self.cursor = node;
        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl<'a> IntoIterator for &'a DripRegistry {
    type Item = Address;
    type IntoIter = ActiveDrips<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(seed: u8) -> Address {
        Address::from_bytes([seed; 20])
    }

    #[test]
    fn empty_registry() {
        let reg = DripRegistry::new();
        assert!(reg.is_empty());
        assert_eq!(reg.head(), None);
        assert_eq!(reg.iter().count(), 0);
        assert!(!reg.contains(&Address::SENTINEL));
    }

    #[test]
    fn push_inserts_at_head() {
        let mut reg = DripRegistry::new();
        assert!(reg.push(addr(1)));
        assert!(reg.push(addr(2)));
        assert!(reg.push(addr(3)));
        assert_eq!(reg.iter().collect::<Vec<_>>(), vec![addr(3), addr(2), addr(1)]);
        assert_eq!(reg.head(), Some(addr(3)));
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn push_rejects_duplicate() {
        let mut reg = DripRegistry::new();
        assert!(reg.push(addr(1)));
        let before = reg.clone();
        assert!(!reg.push(addr(1)));
        assert_eq!(reg, before);
    }

    #[test]
    fn push_rejects_reserved_addresses() {
        let mut reg = DripRegistry::new();
        assert!(!reg.push(Address::ZERO));
        assert!(!reg.push(Address::SENTINEL));
        assert!(reg.is_empty());
    }

    #[test]
    fn remove_head_with_sentinel() {
        let mut reg = DripRegistry::new();
        reg.push(addr(1));
        reg.push(addr(2));
        assert!(reg.remove(&Address::SENTINEL, &addr(2)));
        assert_eq!(reg.iter().collect::<Vec<_>>(), vec![addr(1)]);
        assert!(!reg.contains(&addr(2)));
    }

    #[test]
    fn remove_middle_and_tail() {
        let mut reg = DripRegistry::new();
        for seed in 1..=4 {
            reg.push(addr(seed));
        }
        // list: 4 3 2 1
        assert!(reg.remove(&addr(3), &addr(2)));
        assert_eq!(reg.iter().collect::<Vec<_>>(), vec![addr(4), addr(3), addr(1)]);
        assert!(reg.remove(&addr(3), &addr(1)));
        assert_eq!(reg.iter().collect::<Vec<_>>(), vec![addr(4), addr(3)]);
    }

    #[test]
    fn remove_with_wrong_predecessor_is_noop() {
        let mut reg = DripRegistry::new();
        reg.push(addr(1));
        reg.push(addr(2));
        let before = reg.clone();
        assert!(!reg.remove(&Address::SENTINEL, &addr(1)));
        assert!(!reg.remove(&addr(1), &addr(2)));
        assert!(!reg.remove(&addr(9), &addr(2)));
        assert_eq!(reg, before);
    }

    #[test]
    fn remove_reserved_is_noop() {
        let mut reg = DripRegistry::new();
        assert!(!reg.remove(&Address::SENTINEL, &Address::SENTINEL));
        assert!(!reg.remove(&Address::SENTINEL, &Address::ZERO));
        assert_eq!(reg, DripRegistry::new());
    }

    #[test]
    fn predecessor_lookup() {
        let mut reg = DripRegistry::new();
        reg.push(addr(1));
        reg.push(addr(2));
        assert_eq!(reg.predecessor(&addr(2)), Some(Address::SENTINEL));
        assert_eq!(reg.predecessor(&addr(1)), Some(addr(2)));
        assert_eq!(reg.predecessor(&addr(3)), None);
    }

    #[test]
    fn iteration_is_restartable() {
        let mut reg = DripRegistry::new();
        reg.push(addr(1));
        reg.push(addr(2));
        let first: Vec<_> = reg.iter().collect();
        let second: Vec<_> = (&reg).into_iter().collect();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn push_then_remove_restores_membership(seeds in proptest::collection::btree_set(2u8..=255, 1..16)) {
            let mut reg = DripRegistry::new();
            reg.push(addr(200));
            let before = reg.clone();

            for seed in &seeds {
                prop_assert!(reg.push(addr(*seed)) || *seed == 200);
            }
            for seed in &seeds {
                if *seed == 200 {
                    continue;
                }
                let prev = reg.predecessor(&addr(*seed)).unwrap();
                prop_assert!(reg.remove(&prev, &addr(*seed)));
            }
            prop_assert_eq!(reg, before);
        }
    }
}
