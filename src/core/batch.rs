//! Look-ahead buffer between the item source and admission.

use std::collections::VecDeque;

/// Boxed, read-once item source.
pub type ItemSource<I> = Box<dyn Iterator<Item = I> + Send>;

/// FIFO of pending items pulled lazily from a source.
///
/// Memory stays bounded by `target` items ahead of consumption regardless of
/// how long the source is.
pub struct BatchQueue<I> {
    source: ItemSource<I>,
    pending: VecDeque<I>,
    target: usize,
    exhausted: bool,
}

impl<I> BatchQueue<I> {
    /// Wrap `source`, discarding its first `skip` items.
    ///
    /// Returns the queue together with the number of items actually skipped,
    /// which is smaller than `skip` only when the source ran out.
    pub fn new(mut source: ItemSource<I>, skip: u64, target: usize) -> (Self, u64) {
        let mut skipped = 0;
        let mut exhausted = false;
        while skipped < skip {
            if source.next().is_none() {
                exhausted = true;
                break;
            }
            skipped += 1;
        }
        let queue = Self {
            source,
            pending: VecDeque::with_capacity(target),
            target: target.max(1),
            exhausted,
        };
        (queue, skipped)
    }

    /// Pull from the source until the target size is reached or it runs dry.
    ///
    /// Returns how many items were pulled.
    pub fn replenish(&mut self) -> usize {
        let mut pulled = 0;
        while !self.exhausted && self.pending.len() < self.target {
            match self.source.next() {
                Some(item) => {
                    self.pending.push_back(item);
                    pulled += 1;
                }
                None => self.exhausted = true,
            }
        }
        pulled
    }

    /// Take the oldest pending item.
    pub fn pop(&mut self) -> Option<I> {
        self.pending.pop_front()
    }

    /// Pending item count.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending right now.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether the source has reported its end.
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Whether no item will ever be available again.
    pub fn is_drained(&self) -> bool {
        self.exhausted && self.pending.is_empty()
    }

    /// Target size of one replenish pass.
    pub const fn target(&self) -> usize {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn boxed<T: Iterator<Item = u32> + Send + 'static>(iter: T) -> ItemSource<u32> {
        Box::new(iter)
    }

    #[test]
    fn test_skip_prefix() {
        let (mut queue, skipped) = BatchQueue::new(boxed(1..=5), 2, 10);
        assert_eq!(skipped, 2);
        queue.replenish();
        let items: Vec<u32> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(items, vec![3, 4, 5]);
        assert!(queue.is_drained());
    }

    #[test]
    fn test_skip_past_end() {
        let (queue, skipped) = BatchQueue::new(boxed(1..=3), 5, 4);
        assert_eq!(skipped, 3);
        assert!(queue.is_exhausted());
        assert!(queue.is_drained());
    }

    #[test]
    fn test_replenish_stops_at_target_on_infinite_source() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let source = (0..).map(move |i| {
            counter.fetch_add(1, Ordering::Relaxed);
            i
        });
        let (mut queue, _) = BatchQueue::new(boxed(source), 0, 6);

        assert_eq!(queue.replenish(), 6);
        assert_eq!(queue.len(), 6);
        assert_eq!(queue.replenish(), 0);
        assert_eq!(pulled.load(Ordering::Relaxed), 6);

        queue.pop();
        queue.pop();
        assert_eq!(queue.replenish(), 2);
        assert!(!queue.is_exhausted());
    }

    #[test]
    fn test_fifo_order() {
        let (mut queue, _) = BatchQueue::new(boxed(10..13), 0, 2);
        queue.replenish();
        assert_eq!(queue.pop(), Some(10));
        queue.replenish();
        assert_eq!(queue.pop(), Some(11));
        assert_eq!(queue.pop(), Some(12));
        assert_eq!(queue.pop(), None);
        queue.replenish();
        assert!(queue.is_drained());
    }
}
