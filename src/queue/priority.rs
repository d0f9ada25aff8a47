//! Bounded priority queue for animation events
//!
//! Kept sorted by `(priority desc, timestamp asc)`; equal keys keep their
//! insertion order. The length never exceeds the configured capacity.

use crate::animation::AnimationEvent;

/// Priority-ordered, capacity-bounded event queue
pub struct AnimationQueue {
    /// Sorted: index 0 is served next, the tail is the eviction candidate
    events: Vec<AnimationEvent>,
    capacity: usize,
    enqueued: u64,
    evicted: u64,
}

impl AnimationQueue {
    /// Create a queue holding at most `capacity` events (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Vec::with_capacity(capacity + 1),
            capacity,
            enqueued: 0,
            evicted: 0,
        }
    }

    /// Insert an event in order.
    ///
    /// When the queue is already full, the minimum member (by ordering key,
    /// incoming event included) is evicted and returned.
    pub fn push(&mut self, event: AnimationEvent) -> Option<AnimationEvent> {
        let index = self
            .events
            .partition_point(|queued| queued.queue_order(&event).is_le());
        self.events.insert(index, event);
        self.enqueued += 1;

        if self.events.len() > self.capacity {
            self.evicted += 1;
            self.events.pop()
        } else {
            None
        }
    }

    /// Remove and return the head event
    pub fn pop(&mut self) -> Option<AnimationEvent> {
        if self.events.is_empty() {
            None
        } else {
            Some(self.events.remove(0))
        }
    }

    /// Drop every queued event belonging to `sequence_id`
    pub fn remove_sequence(&mut self, sequence_id: &str) -> usize {
        let before = self.events.len();
        self.events
            .retain(|e| e.sequence_id.as_deref() != Some(sequence_id));
        before - self.events.len()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &AnimationEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Get statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            level: self.events.len(),
            capacity: self.capacity,
            enqueued: self.enqueued,
            evicted: self.evicted,
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub level: usize,
    pub capacity: usize,
    pub enqueued: u64,
    pub evicted: u64,
}
