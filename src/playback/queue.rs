//! FIFO of clips waiting to be played

use std::collections::VecDeque;

use crate::models::VideoReference;

/// Unbounded clip queue; discovery only appends, the controller consumes
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: VecDeque<VideoReference>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, reference: VideoReference) {
        self.items.push_back(reference);
    }

    pub fn extend(&mut self, references: impl IntoIterator<Item = VideoReference>) {
        self.items.extend(references);
    }

    pub fn try_dequeue(&mut self) -> Option<VideoReference> {
        self.items.pop_front()
    }

    /// Next queued clip, or a fallback pick when the queue is empty.
    ///
    /// On empty, `on_empty` runs first so a refill can be scheduled for later
    /// calls; this call still answers with `fallback` and never waits on it.
    pub fn dequeue_or_fallback<F, E>(&mut self, fallback: F, on_empty: E) -> Option<VideoReference>
    where
        F: FnOnce() -> Option<VideoReference>,
        E: FnOnce(),
    {
        if let Some(reference) = self.try_dequeue() {
            return Some(reference);
        }
        on_empty();
        fallback()
    }

    /// Discard up to `n` queued clips; returns how many were dropped
    pub fn drain_up_to(&mut self, n: usize) -> usize {
        let count = n.min(self.items.len());
        self.items.drain(..count);
        count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VideoReference> {
        self.items.iter()
    }
}
