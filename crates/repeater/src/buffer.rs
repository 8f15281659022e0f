use std::{collections::VecDeque, num::NonZeroUsize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    Fixed(usize),
    Sliding(NonZeroUsize),
    Dropping(NonZeroUsize),
}

/// Storage for values pushed ahead of the consumer.
///
/// A fixed buffer makes pushes resolve immediately while it has room and queues them otherwise.
/// Sliding and dropping buffers never make a push wait: when full, a sliding buffer evicts its
/// oldest value and a dropping buffer discards the new one.
#[derive(Debug)]
pub struct Buffer<T> {
    policy: Policy,
    values: VecDeque<T>,
}

impl<T> Default for Buffer<T> {
    fn default() -> Self {
        Self::fixed(0)
    }
}

impl<T> Buffer<T> {
    pub fn fixed(capacity: usize) -> Self {
        Self {
            policy: Policy::Fixed(capacity),
            values: VecDeque::with_capacity(capacity),
        }
    }

    pub fn sliding(capacity: NonZeroUsize) -> Self {
        Self {
            policy: Policy::Sliding(capacity),
            values: VecDeque::with_capacity(capacity.get()),
        }
    }

    pub fn dropping(capacity: NonZeroUsize) -> Self {
        Self {
            policy: Policy::Dropping(capacity),
            values: VecDeque::with_capacity(capacity.get()),
        }
    }

    fn capacity(&self) -> usize {
        match self.policy {
            Policy::Fixed(capacity) => capacity,
            Policy::Sliding(capacity) | Policy::Dropping(capacity) => capacity.get(),
        }
    }

    fn is_full(&self) -> bool {
        self.values.len() >= self.capacity()
    }

    /// Whether a push can be absorbed without waiting for the consumer.
    pub(crate) fn accepts(&self) -> bool {
        match self.policy {
            Policy::Fixed(_) => !self.is_full(),
            Policy::Sliding(_) | Policy::Dropping(_) => true,
        }
    }

    pub(crate) fn add(&mut self, value: T) {
        match self.policy {
            Policy::Fixed(_) => self.values.push_back(value),
            Policy::Sliding(_) => {
                if self.is_full() {
                    self.values.pop_front();
                }
                self.values.push_back(value);
            }
            Policy::Dropping(_) => {
                if !self.is_full() {
                    self.values.push_back(value);
                }
            }
        }
    }

    pub(crate) fn remove(&mut self) -> Option<T> {
        self.values.pop_front()
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mut buffer: Buffer<u32>) -> Vec<u32> {
        std::iter::from_fn(|| buffer.remove()).collect()
    }

    #[test]
    fn sliding_buffer_keeps_latest_values() {
        let mut buffer = Buffer::sliding(NonZeroUsize::new(2).unwrap());
        for value in 1..=4 {
            assert!(buffer.accepts());
            buffer.add(value);
        }
        assert_eq!(drain(buffer), vec![3, 4]);
    }

    #[test]
    fn dropping_buffer_keeps_earliest_values() {
        let mut buffer = Buffer::dropping(NonZeroUsize::new(2).unwrap());
        for value in 1..=4 {
            buffer.add(value);
        }
        assert_eq!(drain(buffer), vec![1, 2]);
    }

    #[test]
    fn fixed_buffer_stops_accepting_when_full() {
        let mut buffer = Buffer::fixed(1);
        assert!(buffer.accepts());
        buffer.add(1);
        assert!(!buffer.accepts());
        assert!(!Buffer::<u32>::default().accepts());
    }
}
