//! Fixed-capacity container that evicts its oldest entry first.
//!
//! Backs the skipped-key tables and the per-participant epoch history.

use std::collections::VecDeque;

/// Bounded FIFO. Pushing into a full ring evicts and returns the oldest item.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvictingRing<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> EvictingRing<T> {
    /// Creates an empty ring. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Appends `item` as the newest entry.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut T> {
        self.items.iter_mut()
    }

    #[must_use]
    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<&T> {
        self.items.iter().find(|item| predicate(item))
    }

    pub fn find_mut(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<&mut T> {
        self.items.iter_mut().find(|item| predicate(item))
    }

    /// Removes and returns the first entry matching `predicate`.
    pub fn take(&mut self, predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let position = self.items.iter().position(predicate)?;
        self.items.remove(position)
    }

    pub fn retain(&mut self, predicate: impl FnMut(&T) -> bool) {
        self.items.retain(predicate);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// False if a deserialized ring holds more than its capacity.
    pub(crate) fn is_within_capacity(&self) -> bool {
        self.items.len() <= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_first() {
        let mut ring = EvictingRing::new(3);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), None);
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.push(5), Some(2));

        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(ring.newest(), Some(&5));
    }

    #[test]
    fn test_take_removes_match() {
        let mut ring = EvictingRing::new(4);
        for i in 0..4 {
            ring.push(i);
        }
        assert_eq!(ring.take(|v| *v == 2), Some(2));
        assert_eq!(ring.take(|v| *v == 2), None);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut ring = EvictingRing::new(0);
        ring.push("a");
        assert_eq!(ring.push("b"), Some("a"));
        assert_eq!(ring.capacity(), 1);
    }
}
