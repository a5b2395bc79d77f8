//! Pending-task buffer.
//!
//! Ordered by descending priority with ties broken by arrival order. The heap
//! key is `(priority, Reverse(id))`; ids are allocated monotonically, so this is
//! the same order a stable re-sort of the backlog before every drain produces.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::task::Task;

#[derive(Debug)]
struct Queued(Task);

impl Queued {
    fn key(&self) -> (i32, Reverse<u64>) {
        (self.0.priority, Reverse(self.0.id))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    heap: BinaryHeap<Queued>,
}

impl TaskQueue {
    pub(crate) fn push(&mut self, task: Task) {
        self.heap.push(Queued(task));
    }

    /// Remove the next task to dispatch.
    pub(crate) fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|q| q.0)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Empty the queue, returning tasks in dispatch order.
    pub(crate) fn drain_ordered(&mut self) -> Vec<Task> {
        let mut tasks: Vec<Task> = std::mem::take(&mut self.heap)
            .into_sorted_vec()
            .into_iter()
            .map(|q| q.0)
            .collect();
        // into_sorted_vec is ascending; dispatch order is the reverse
        tasks.reverse();
        tasks
    }
}
