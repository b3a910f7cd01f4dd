//! Dual-lane schedule queue owned by one operation thread.
//!
//! Many producers push, exactly one consumer pops. Urgent items are always
//! popped before normal items; each lane is FIFO. Pushes never block: they
//! either succeed or fail fast with the item handed back.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

/// Push rejected; the item is returned to the caller.
#[derive(Debug)]
pub enum PushError<T> {
    /// The queue was closed by shutdown.
    Closed(T),
    /// The normal lane reached its configured capacity.
    Full(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(item) | Self::Full(item) => item,
        }
    }
}

struct Lanes<T> {
    urgent: VecDeque<T>,
    normal: VecDeque<T>,
    closed: bool,
}

impl<T> Lanes<T> {
    fn pop_next(&mut self) -> Option<T> {
        self.urgent.pop_front().or_else(|| self.normal.pop_front())
    }

    fn len(&self) -> usize {
        self.urgent.len() + self.normal.len()
    }
}

/// Multi-producer, single-consumer queue with an urgent and a normal lane.
pub struct ScheduleQueue<T> {
    lanes: Mutex<Lanes<T>>,
    available: Condvar,
    len: AtomicUsize,
    capacity: Option<usize>,
}

impl<T> ScheduleQueue<T> {
    /// Creates an open queue. `capacity` bounds the normal lane only.
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            lanes: Mutex::new(Lanes {
                urgent: VecDeque::new(),
                normal: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Enqueues `item` without blocking and wakes one waiting consumer.
    ///
    /// # Errors
    ///
    /// Returns the item in [`PushError::Closed`] after [`close`](Self::close),
    /// or in [`PushError::Full`] when the normal lane is at capacity.
    pub fn push(&self, item: T, urgent: bool) -> Result<(), PushError<T>> {
        let mut lanes = self.lanes.lock();
        if lanes.closed {
            return Err(PushError::Closed(item));
        }
        if urgent {
            lanes.urgent.push_back(item);
        } else {
            if self.capacity.is_some_and(|cap| lanes.normal.len() >= cap) {
                return Err(PushError::Full(item));
            }
            lanes.normal.push_back(item);
        }
        self.len.store(lanes.len(), Ordering::Relaxed);
        drop(lanes);
        self.available.notify_one();
        Ok(())
    }

    /// Removes the next item, urgent lane first.
    ///
    /// With `blocking`, waits while both lanes are empty and returns `None`
    /// only once the queue is closed and empty. Without it, returns `None`
    /// whenever both lanes are empty.
    pub fn pop(&self, blocking: bool) -> Option<T> {
        let mut lanes = self.lanes.lock();
        loop {
            if let Some(item) = lanes.pop_next() {
                self.len.store(lanes.len(), Ordering::Relaxed);
                return Some(item);
            }
            if !blocking || lanes.closed {
                return None;
            }
            self.available.wait(&mut lanes);
        }
    }

    /// Approximate number of queued items. Lock-free; for load reporting.
    #[must_use]
    pub fn size(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Exact `(urgent, normal)` lane sizes.
    #[must_use]
    pub fn lane_sizes(&self) -> (usize, usize) {
        let lanes = self.lanes.lock();
        (lanes.urgent.len(), lanes.normal.len())
    }

    /// Rejects further pushes and wakes every blocked consumer. Items already
    /// queued stay poppable.
    pub fn close(&self) {
        self.lanes.lock().closed = true;
        self.available.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lanes.lock().closed
    }

    /// Removes every queued item, urgent lane first.
    pub fn drain(&self) -> Vec<T> {
        let mut lanes = self.lanes.lock();
        let Lanes { urgent, normal, .. } = &mut *lanes;
        let drained: Vec<T> = urgent.drain(..).chain(normal.drain(..)).collect();
        self.len.store(0, Ordering::Relaxed);
        drained
    }
}

impl<T> fmt::Debug for ScheduleQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleQueue")
            .field("size", &self.size())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn urgent_lane_is_popped_first() {
        let queue = ScheduleQueue::new(None);
        queue.push(1, false).unwrap();
        queue.push(2, false).unwrap();
        queue.push(10, true).unwrap();
        queue.push(11, true).unwrap();

        let popped: Vec<_> = std::iter::from_fn(|| queue.pop(false)).collect();
        assert_eq!(popped, vec![10, 11, 1, 2]);
    }

    #[test]
    fn non_blocking_pop_on_empty_returns_none() {
        let queue: ScheduleQueue<u32> = ScheduleQueue::new(None);
        assert!(queue.pop(false).is_none());
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn size_tracks_both_lanes() {
        let queue = ScheduleQueue::new(None);
        queue.push("a", false).unwrap();
        queue.push("b", true).unwrap();
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.lane_sizes(), (1, 1));
        queue.pop(false);
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.lane_sizes(), (0, 1));
    }

    #[test]
    fn blocking_pop_wakes_on_push() {
        let queue = Arc::new(ScheduleQueue::new(None));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop(true))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(7, false).unwrap();
        assert_eq!(consumer.join().unwrap(), Some(7));
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let queue: Arc<ScheduleQueue<u32>> = Arc::new(ScheduleQueue::new(None));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop(true))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn closed_queue_rejects_push_but_keeps_items() {
        let queue = ScheduleQueue::new(None);
        queue.push(1, false).unwrap();
        queue.close();
        assert!(queue.is_closed());

        let err = queue.push(2, true).unwrap_err();
        assert!(matches!(err, PushError::Closed(2)));
        assert_eq!(err.into_inner(), 2);

        assert_eq!(queue.pop(true), Some(1));
        assert_eq!(queue.pop(true), None);
    }

    #[test]
    fn capacity_bounds_normal_lane_only() {
        let queue = ScheduleQueue::new(Some(2));
        queue.push(1, false).unwrap();
        queue.push(2, false).unwrap();
        assert!(matches!(queue.push(3, false), Err(PushError::Full(3))));
        queue.push(4, true).unwrap();
        queue.push(5, true).unwrap();
        assert_eq!(queue.size(), 4);
    }

    #[test]
    fn drain_empties_urgent_then_normal() {
        let queue = ScheduleQueue::new(None);
        queue.push(1, false).unwrap();
        queue.push(2, true).unwrap();
        queue.push(3, false).unwrap();
        assert_eq!(queue.drain(), vec![2, 1, 3]);
        assert_eq!(queue.size(), 0);
        assert!(queue.pop(false).is_none());
    }

    #[test]
    fn many_producers_single_consumer_loses_nothing() {
        let queue = Arc::new(ScheduleQueue::new(None));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.push((p, i), i % 10 == 0).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        queue.close();

        let mut last_seen = [None::<i32>; 4];
        let mut last_urgent_seen = [None::<i32>; 4];
        let mut count = 0;
        while let Some((p, i)) = queue.pop(true) {
            let slot = if i % 10 == 0 {
                &mut last_urgent_seen[p]
            } else {
                &mut last_seen[p]
            };
            assert!(slot.map_or(true, |prev| prev < i), "lane order broken");
            *slot = Some(i);
            count += 1;
        }
        assert_eq!(count, 1000);
    }

    proptest! {
        #[test]
        fn pop_order_is_urgent_fifo_then_normal_fifo(
            pushes in proptest::collection::vec(any::<bool>(), 0..200),
        ) {
            let queue = ScheduleQueue::new(None);
            for (i, urgent) in pushes.iter().enumerate() {
                queue.push(i, *urgent).unwrap();
            }
            let expected: Vec<usize> = pushes
                .iter()
                .enumerate()
                .filter(|(_, u)| **u)
                .chain(pushes.iter().enumerate().filter(|(_, u)| !**u))
                .map(|(i, _)| i)
                .collect();
            let popped: Vec<usize> = std::iter::from_fn(|| queue.pop(false)).collect();
            prop_assert_eq!(popped, expected);
        }
    }
}
