//! Bounded FIFO of outbound frames that evicts the oldest entry on overflow.

use std::collections::VecDeque;

#[derive(Debug)]
pub struct Outbox<T> {
    frames: VecDeque<T>,
    capacity: usize,
}

impl<T> Outbox<T> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Append a frame. Returns the evicted frame if the outbox was full.
    pub fn push(&mut self, frame: T) -> Option<T> {
        let evicted = if self.frames.len() >= self.capacity {
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        evicted
    }

    /// Put a frame that failed to send back at the head. Newer frames win
    /// when there is no room, so the frame is dropped and handed back.
    pub fn requeue(&mut self, frame: T) -> Option<T> {
        if self.frames.len() >= self.capacity {
            return Some(frame);
        }
        self.frames.push_front(frame);
        None
    }

    pub fn pop(&mut self) -> Option<T> {
        self.frames.pop_front()
    }

    /// Discard everything, returning how many frames were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.frames.len();
        self.frames.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut outbox = Outbox::new(4);
        for i in 0..3 {
            assert_eq!(outbox.push(i), None);
        }
        assert_eq!(outbox.pop(), Some(0));
        assert_eq!(outbox.pop(), Some(1));
        assert_eq!(outbox.pop(), Some(2));
        assert_eq!(outbox.pop(), None);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut outbox = Outbox::new(3);
        let evicted: Vec<_> = (0..10).filter_map(|i| outbox.push(i)).collect();
        assert_eq!(evicted, (0..7).collect::<Vec<_>>());
        assert_eq!(outbox.len(), 3);
        let rest: Vec<_> = std::iter::from_fn(|| outbox.pop()).collect();
        assert_eq!(rest, vec![7, 8, 9]);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut outbox = Outbox::new(16);
        for i in 0..1000 {
            outbox.push(i);
            assert!(outbox.len() <= outbox.capacity());
        }
    }

    #[test]
    fn zero_capacity_holds_latest() {
        let mut outbox = Outbox::new(0);
        assert_eq!(outbox.capacity(), 1);
        outbox.push("a");
        assert_eq!(outbox.push("b"), Some("a"));
        assert_eq!(outbox.pop(), Some("b"));
    }

    #[test]
    fn requeue_goes_to_head() {
        let mut outbox = Outbox::new(3);
        outbox.push(2);
        assert_eq!(outbox.requeue(1), None);
        assert_eq!(outbox.pop(), Some(1));
        assert_eq!(outbox.pop(), Some(2));
    }

    #[test]
    fn requeue_when_full_is_dropped() {
        let mut outbox = Outbox::new(2);
        outbox.push(1);
        outbox.push(2);
        assert_eq!(outbox.requeue(0), Some(0));
        assert_eq!(outbox.clear(), 2);
        assert!(outbox.is_empty());
    }
}
