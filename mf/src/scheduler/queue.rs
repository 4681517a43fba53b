//! Queue types for the scheduler

use std::collections::VecDeque;

use serde::Serialize;

use crate::response::Response;
use crate::transport::HandleId;

/// Result of a pull
#[derive(Debug)]
pub enum Pull<T, H> {
    /// A finished request
    Ready(Response<T, H>),

    /// Nothing pending, nothing in flight, nothing left to hand out
    Exhausted,
}

impl<T, H> Pull<T, H> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Pull::Exhausted)
    }

    pub fn into_response(self) -> Option<Response<T, H>> {
        match self {
            Pull::Ready(response) => Some(response),
            Pull::Exhausted => None,
        }
    }
}

/// A submitted request
#[derive(Debug)]
pub struct Descriptor<H, T> {
    pub id: HandleId,
    pub handle: H,
    pub user_data: Option<T>,
}

/// FIFO of descriptors waiting for a concurrency slot
#[derive(Debug)]
pub struct PendingQueue<H, T> {
    queue: VecDeque<Descriptor<H, T>>,
}

impl<H, T> PendingQueue<H, T> {
    pub fn new() -> Self {
        Self { queue: VecDeque::new() }
    }

    pub fn submit(&mut self, descriptor: Descriptor<H, T>) {
        self.queue.push_back(descriptor);
    }

    pub fn dequeue_next(&mut self) -> Option<Descriptor<H, T>> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Descriptor<H, T>> + '_ {
        self.queue.drain(..)
    }
}

impl<H, T> Default for PendingQueue<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// FIFO of finished responses in the order the transport reported them
#[derive(Debug)]
pub struct CompletionQueue<T, H> {
    queue: VecDeque<Response<T, H>>,
}

impl<T, H> CompletionQueue<T, H> {
    pub fn new() -> Self {
        Self { queue: VecDeque::new() }
    }

    pub fn push(&mut self, response: Response<T, H>) {
        self.queue.push_back(response);
    }

    pub fn pop(&mut self) -> Option<Response<T, H>> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T, H> Default for CompletionQueue<T, H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the scheduler is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    /// Nothing pending, in flight, or completed
    Idle,
    /// Completed responses are ready to hand out
    Draining,
    /// Capacity is free and requests are pending
    Admitting,
    /// Requests are in flight, nothing to hand out yet
    Waiting,
}

/// Statistics for the scheduler
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub total_submitted: u64,
    pub total_admitted: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_rejected: u64,
    pub invariant_violations: u64,
    pub blocking_waits: u64,
    pub peak_in_flight: usize,
    pub peak_pending: usize,
}

/// Snapshot of queue depths
#[derive(Debug, Clone, Serialize)]
pub struct QueueState {
    pub state: SchedulerState,
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub stats: SchedulerStats,
}
