use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::PollingTask;

/// A heap entry. The heap holds only the ordering key; the task itself lives in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    next_check_at: DateTime<Utc>,
    sequence: u64,
    order_id: i64,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse so the earliest check comes out first, FIFO on ties
        other.next_check_at.cmp(&self.next_check_at).then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A snapshot of the polling queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub length: usize,
    pub next_check_at: Option<DateTime<Utc>>,
}

/// Min-heap of polling tasks ordered by `next_check_at`, with an index by order id.
///
/// Removal is lazy: the index is the source of truth, and heap entries whose sequence number no longer matches the
/// indexed task are discarded when they reach the top. Tasks handed out by [`TaskQueue::take_due`] stay in the index
/// (in flight) until they are rescheduled or removed, so a removal that happens mid-check is not undone.
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<QueueEntry>,
    index: HashMap<i64, (PollingTask, u64)>,
    sequence: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, order_id: i64) -> bool {
        self.index.contains_key(&order_id)
    }

    pub fn get(&self, order_id: i64) -> Option<&PollingTask> {
        self.index.get(&order_id).map(|(task, _)| task)
    }

    /// Adds the task, replacing any task already queued for the same order.
    pub fn push(&mut self, task: PollingTask) {
        // Sequence 0 marks a task as in flight, so live entries start at 1
        self.sequence += 1;
        let entry = QueueEntry { next_check_at: task.next_check_at, sequence: self.sequence, order_id: task.order_id };
        self.index.insert(task.order_id, (task, self.sequence));
        self.heap.push(entry);
    }

    pub fn remove(&mut self, order_id: i64) -> Option<PollingTask> {
        self.index.remove(&order_id).map(|(task, _)| task)
    }

    /// When the earliest task is due, if there are any tasks.
    pub fn next_due(&mut self) -> Option<DateTime<Utc>> {
        self.discard_stale();
        self.heap.peek().map(|e| e.next_check_at)
    }

    /// Takes every task due at or before `now`, earliest first. The tasks remain in flight until passed back to
    /// [`Self::reschedule`] or [`Self::remove`].
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<PollingTask> {
        let mut due = Vec::new();
        loop {
            self.discard_stale();
            match self.heap.peek() {
                Some(entry) if entry.next_check_at <= now => {
                    let order_id = entry.order_id;
                    self.heap.pop();
                    if let Some((task, seq)) = self.index.get_mut(&order_id) {
                        *seq = 0;
                        due.push(task.clone());
                    }
                },
                _ => break,
            }
        }
        due
    }

    /// Puts an in-flight task back on the schedule. Returns false, without queueing anything, if the task was removed
    /// in the meantime.
    pub fn reschedule(&mut self, task: PollingTask) -> bool {
        if !self.contains(task.order_id) {
            return false;
        }
        self.push(task);
        true
    }

    pub fn status(&mut self) -> QueueStatus {
        QueueStatus { length: self.len(), next_check_at: self.next_due() }
    }

    fn discard_stale(&mut self) {
        while let Some(top) = self.heap.peek() {
            let live = matches!(self.index.get(&top.order_id), Some((_, seq)) if *seq == top.sequence);
            if live {
                break;
            }
            self.heap.pop();
        }
    }
}
