//! Bounded FIFO used for the input event history and the debug console.
//!
//! Once `capacity` is reached every push evicts the oldest entry. Insertion
//! order is the only order the buffer knows about.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// A capacity of zero is bumped to one so a push is always observable.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `entry` and returns the evicted entry, if any.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    // Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T: Clone> RingBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sixty_pushes_keep_last_fifty_in_order() {
        let mut buffer = RingBuffer::new(50);
        for i in 1..=60 {
            buffer.push(i);
        }

        assert_eq!(buffer.len(), 50);
        let kept: Vec<i32> = buffer.to_vec();
        assert_eq!(kept, (11..=60).collect::<Vec<_>>());
    }

    #[test]
    fn push_reports_evicted_entry() {
        let mut buffer = RingBuffer::new(2);
        assert_eq!(buffer.push("a"), None);
        assert_eq!(buffer.push("b"), None);
        assert_eq!(buffer.push("c"), Some("a"));
        assert_eq!(buffer.latest(), Some(&"c"));
    }

    #[test]
    fn zero_capacity_still_holds_one_entry() {
        let mut buffer = RingBuffer::new(0);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.to_vec(), vec![2]);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity_and_keeps_newest(capacity in 1usize..64, count in 0usize..256) {
            let mut buffer = RingBuffer::new(capacity);
            for i in 0..count {
                buffer.push(i);
            }

            prop_assert_eq!(buffer.len(), count.min(capacity));
            let expected: Vec<usize> = (count.saturating_sub(capacity)..count).collect();
            prop_assert_eq!(buffer.to_vec(), expected);
        }
    }
}
