//! Fixed-capacity FIFO window

use std::collections::VecDeque;

/// Bounded sequence that evicts its oldest entry on overflow
#[derive(Debug, Clone, PartialEq)]
pub struct RollingWindow<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> RollingWindow<T> {
    /// Create an empty window; a zero-capacity window stays empty
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a value, evicting from the front to stay within capacity
    pub fn push(&mut self, value: T) {
        if self.capacity == 0 {
            return;
        }
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(value);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Most recent value
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> RollingWindow<T> {
    /// Copy out the contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity() {
        let mut window = RollingWindow::new(3);
        window.push(1);
        window.push(2);
        assert_eq!(window.len(), 2);
        assert!(!window.is_full());
        assert_eq!(window.last(), Some(&2));
    }

    #[test]
    fn test_fifo_eviction() {
        let mut window = RollingWindow::new(3);
        for i in 1..=5 {
            window.push(i);
        }
        assert_eq!(window.to_vec(), vec![3, 4, 5]);
        assert!(window.is_full());
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        for capacity in 0..8 {
            let mut window = RollingWindow::new(capacity);
            for i in 0..50 {
                window.push(i);
                assert!(window.len() <= capacity);
            }
            // Survivors are exactly the newest `capacity` values in order
            let expected: Vec<i32> = (50 - capacity as i32..50).collect();
            assert_eq!(window.to_vec(), expected);
        }
    }

    #[test]
    fn test_zero_capacity_stays_empty() {
        let mut window = RollingWindow::new(0);
        window.push(1.0);
        assert!(window.is_empty());
        assert_eq!(window.last(), None);
    }

    #[test]
    fn test_clear() {
        let mut window = RollingWindow::new(2);
        window.push("a");
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.capacity(), 2);
    }
}
