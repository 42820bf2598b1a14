use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Fixed-capacity window over a signal's recent values.
///
/// Readers only ever look at the last one or two entries (or a short trend
/// window), so older values are evicted on push.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct History<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> History<T> {
    /// Capacity is at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(value);
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Second-to-last entry.
    pub fn previous(&self) -> Option<&T> {
        let n = self.items.len();
        if n < 2 { None } else { self.items.get(n - 2) }
    }

    /// Overwrite the newest entry in place, or push if empty.
    pub fn replace_last(&mut self, value: T) {
        match self.items.back_mut() {
            Some(slot) => *slot = value,
            None => self.push(value),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> History<T> {
    /// Rebuild a window from stored values, keeping the newest `capacity`.
    pub fn from_values(capacity: usize, values: &[T]) -> Self {
        let mut history = Self::new(capacity);
        for v in values {
            history.push(v.clone());
        }
        history
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut h = History::new(2);
        h.push(1);
        h.push(2);
        h.push(3);
        assert_eq!(h.len(), 2);
        assert_eq!(h.last(), Some(&3));
        assert_eq!(h.previous(), Some(&2));
        assert_eq!(h.to_vec(), vec![2, 3]);
    }

    #[test]
    fn test_replace_last_does_not_grow() {
        let mut h = History::new(3);
        h.push(1.0);
        h.replace_last(0.5);
        assert_eq!(h.len(), 1);
        assert_eq!(h.last(), Some(&0.5));
    }

    #[test]
    fn test_replace_last_on_empty_pushes() {
        let mut h: History<f64> = History::new(2);
        h.replace_last(4.0);
        assert_eq!(h.to_vec(), vec![4.0]);
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let mut h = History::new(0);
        h.push('a');
        h.push('b');
        assert_eq!(h.capacity(), 1);
        assert_eq!(h.to_vec(), vec!['b']);
        assert_eq!(h.previous(), None);
    }

    #[test]
    fn test_from_values_keeps_newest() {
        let h = History::from_values(2, &[1, 2, 3, 4]);
        assert_eq!(h.to_vec(), vec![3, 4]);
    }
}
