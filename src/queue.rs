//! Time-ordered queue of scheduled work items.
//!
//! A binary min-heap keyed on `next_fire_time`. Each item remembers its own
//! position in the backing vector so arbitrary removal stays O(log n). Items
//! sharing a fire time have no defined relative order.
//!
//! The queue does no locking of its own; the scheduler keeps it behind its
//! state mutex.

use std::fmt;
use std::sync::Arc;

use crate::clock::Nanos;
use crate::job::{Job, JobKey};
use crate::trigger::Trigger;

/// A job paired with its trigger and the time it fires next.
#[derive(Clone)]
pub(crate) struct WorkItem {
  pub job: Arc<dyn Job>,
  pub trigger: Arc<dyn Trigger>,
  pub next_fire_time: Nanos,
  /// Sequence number of the `schedule_job` call that created this item.
  /// Unchanged across reschedules.
  pub submission: u64,
  /// Position inside the heap. Only meaningful while the item is queued.
  position: usize,
}

impl WorkItem {
  pub fn new(
    job: Arc<dyn Job>,
    trigger: Arc<dyn Trigger>,
    next_fire_time: Nanos,
    submission: u64,
  ) -> Self {
    Self {
      job,
      trigger,
      next_fire_time,
      submission,
      position: 0,
    }
  }

  pub fn key(&self) -> JobKey {
    self.job.key()
  }
}

impl fmt::Debug for WorkItem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WorkItem")
      .field("key", &self.job.key())
      .field("job", &self.job.description())
      .field("trigger", &self.trigger.description())
      .field("next_fire_time", &self.next_fire_time)
      .field("submission", &self.submission)
      .field("position", &self.position)
      .finish()
  }
}

#[derive(Debug, Default)]
pub(crate) struct TimeQueue {
  heap: Vec<WorkItem>,
}

impl TimeQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.heap.len()
  }

  pub fn insert(&mut self, mut item: WorkItem) {
    let position = self.heap.len();
    item.position = position;
    self.heap.push(item);
    self.sift_up(position);
  }

  pub fn peek_min(&self) -> Option<&WorkItem> {
    self.heap.first()
  }

  pub fn pop_min(&mut self) -> Option<WorkItem> {
    if self.heap.is_empty() {
      return None;
    }
    Some(self.remove_at(0))
  }

  /// Removes the item at `position`.
  ///
  /// # Panics
  /// Panics if `position >= len()`. Positions come from [`position_of`](Self::position_of)
  /// or [`iter`](Self::iter) under the same lock.
  pub fn remove_at(&mut self, position: usize) -> WorkItem {
    let removed = self.heap.swap_remove(position);
    if position < self.heap.len() {
      // The former last element now sits at `position` and may belong above or below it.
      self.heap[position].position = position;
      if !self.sift_down(position) {
        self.sift_up(position);
      }
    }
    removed
  }

  pub fn get(&self, position: usize) -> Option<&WorkItem> {
    self.heap.get(position)
  }

  /// Linear scan for the live item with `key`.
  pub fn position_of(&self, key: JobKey) -> Option<usize> {
    self.heap.iter().position(|item| item.key() == key)
  }

  /// Items in heap order, which is not fire-time order beyond the first.
  pub fn iter(&self) -> impl Iterator<Item = &WorkItem> {
    self.heap.iter()
  }

  fn swap(&mut self, a: usize, b: usize) {
    self.heap.swap(a, b);
    self.heap[a].position = a;
    self.heap[b].position = b;
  }

  fn sift_up(&mut self, mut index: usize) {
    while index > 0 {
      let parent = (index - 1) / 2;
      if self.heap[index].next_fire_time >= self.heap[parent].next_fire_time {
        break;
      }
      self.swap(index, parent);
      index = parent;
    }
  }

  /// Returns `true` if the element moved.
  fn sift_down(&mut self, start: usize) -> bool {
    let len = self.heap.len();
    let mut index = start;
    loop {
      let left = 2 * index + 1;
      if left >= len {
        break;
      }
      let right = left + 1;
      let smallest = if right < len && self.heap[right].next_fire_time < self.heap[left].next_fire_time {
        right
      } else {
        left
      };
      if self.heap[smallest].next_fire_time >= self.heap[index].next_fire_time {
        break;
      }
      self.swap(index, smallest);
      index = smallest;
    }
    index != start
  }
}
