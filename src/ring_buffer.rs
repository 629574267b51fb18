/// Fixed-capacity circular buffer backed by an array.
///
/// `next` is the slot the next push writes to; `full` tells a wrapped buffer
/// apart from one that has not yet seen `N` pushes. The oldest entry is
/// overwritten once the buffer is full.
#[derive(Clone, Debug)]
pub struct RingBuffer<T, const N: usize> {
    slots: [Option<T>; N],
    next: usize,
    full: bool,
}

impl<T, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            next: 0,
            full: false,
        }
    }

    pub fn push(&mut self, item: T) {
        self.slots[self.next] = Some(item);
        self.next = (self.next + 1) % N;
        if !self.full && self.next == 0 {
            self.full = true;
        }
    }

    pub fn len(&self) -> usize {
        if self.full {
            N
        } else {
            self.next
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let len = self.len();
        (0..len).filter_map(move |i| self.slots[(self.next + N - len + i) % N].as_ref())
    }

    /// Up to `count` entries, newest first.
    pub fn newest(&self, count: usize) -> impl Iterator<Item = &T> + '_ {
        let take = count.min(self.len());
        (0..take).filter_map(move |i| self.slots[(self.next + N - 1 - i) % N].as_ref())
    }

    pub fn latest(&self) -> Option<&T> {
        self.newest(1).next()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.next = 0;
        self.full = false;
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_fill() {
        let mut ring: RingBuffer<u32, 4> = RingBuffer::new();
        assert!(ring.is_empty());
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.len(), 2);
        assert!(!ring.is_full());
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(ring.newest(5).copied().collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_wrap_overwrites_oldest() {
        let mut ring: RingBuffer<u32, 3> = RingBuffer::new();
        for v in 1..=5 {
            ring.push(v);
        }
        assert!(ring.is_full());
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(ring.newest(2).copied().collect::<Vec<_>>(), vec![5, 4]);
        assert_eq!(ring.latest(), Some(&5));
    }

    #[test]
    fn test_full_flag_set_exactly_at_capacity() {
        let mut ring: RingBuffer<u32, 3> = RingBuffer::new();
        ring.push(1);
        ring.push(2);
        assert!(!ring.is_full());
        ring.push(3);
        assert!(ring.is_full());
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_clear() {
        let mut ring: RingBuffer<u32, 2> = RingBuffer::new();
        ring.push(7);
        ring.push(8);
        ring.push(9);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.latest(), None);
    }
}
