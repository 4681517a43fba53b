//! Scheduler implementation

use tracing::{debug, error, info, warn};

use crate::response::{Response, build_response};
use crate::transport::{Drive, HandleId, Multiplexer, Rejected};

use super::config::{SchedulerConfig, clamp_concurrency};
use super::queue::{CompletionQueue, Descriptor, PendingQueue, Pull, QueueState, SchedulerState, SchedulerStats};
use super::registry::InFlightRegistry;

/// The Scheduler admits submitted requests to a multiplexer under a
/// concurrency cap and hands back finished responses one pull at a time.
///
/// Responses come out in the order the transport finishes them. `pull` is the
/// only suspension point, and it waits only when nothing has finished yet.
/// Exhaustion is not terminal: submitting more work starts another round.
pub struct Scheduler<M: Multiplexer, T = ()> {
    config: SchedulerConfig,
    mux: M,
    pending: PendingQueue<M::Handle, T>,
    in_flight: InFlightRegistry<T>,
    completed: CompletionQueue<T, M::Handle>,
    next_id: u64,
    stats: SchedulerStats,
}

impl<M: Multiplexer, T> Scheduler<M, T> {
    /// Create a new scheduler with the given configuration
    pub fn new(mux: M, config: SchedulerConfig) -> Self {
        debug!(?config, "Scheduler::new: called");
        Self {
            config: config.normalized(),
            mux,
            pending: PendingQueue::new(),
            in_flight: InFlightRegistry::new(),
            completed: CompletionQueue::new(),
            next_id: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Queue a request without user data
    pub fn submit(&mut self, handle: M::Handle) -> HandleId {
        self.enqueue(handle, None)
    }

    /// Queue a request with data to hand back alongside its response
    pub fn submit_with(&mut self, handle: M::Handle, user_data: T) -> HandleId {
        self.enqueue(handle, Some(user_data))
    }

    fn enqueue(&mut self, handle: M::Handle, user_data: Option<T>) -> HandleId {
        self.next_id += 1;
        let id = HandleId::new(self.next_id);
        debug!(%id, pending = self.pending.len(), "Scheduler::submit: called");
        self.pending.submit(Descriptor { id, handle, user_data });
        self.stats.total_submitted += 1;
        self.stats.peak_pending = self.stats.peak_pending.max(self.pending.len());
        id
    }

    /// Produce the next finished response
    ///
    /// Serves an already-finished response without blocking. Otherwise admits
    /// pending work, drives the transport until at least one admitted request
    /// finishes, drains everything that finished, tops up admission, and
    /// returns the first response. Returns [`Pull::Exhausted`] once nothing
    /// is pending or in flight.
    pub async fn pull(&mut self) -> Pull<T, M::Handle> {
        debug!(
            pending = self.pending.len(),
            in_flight = self.in_flight.len(),
            completed = self.completed.len(),
            "Scheduler::pull: called"
        );
        loop {
            if let Some(response) = self.completed.pop() {
                debug!(id = %response.id, "Scheduler::pull: serving completed response");
                return Pull::Ready(response);
            }

            self.admit_pending();

            if self.in_flight.is_empty() {
                if self.completed.is_empty() {
                    debug!("Scheduler::pull: nothing pending or in flight, exhausted");
                    return Pull::Exhausted;
                }
                // Only rejected admissions were produced
                continue;
            }

            let running = self.drive();
            self.wait_for_progress(running).await;
            self.drain_finished();

            if self.admit_pending() {
                debug!("Scheduler::pull: refilled, starting new transfers");
                self.drive();
            }
        }
    }

    /// Pull, mapping exhaustion to `None`
    pub async fn next_response(&mut self) -> Option<Response<T, M::Handle>> {
        self.pull().await.into_response()
    }

    /// Move pending descriptors into the transport while capacity allows
    ///
    /// Returns whether anything was admitted.
    fn admit_pending(&mut self) -> bool {
        let mut admitted = false;
        while self.in_flight.len() < self.config.max_concurrent {
            let Some(Descriptor { id, handle, user_data }) = self.pending.dequeue_next() else {
                break;
            };

            match self.mux.admit_handle(id, handle) {
                Ok(()) => {
                    if let Err(e) = self.in_flight.admit(id, user_data) {
                        error!(%id, %e, "Scheduler::admit_pending: registry bookkeeping defect");
                        self.stats.invariant_violations += 1;
                        if let Some(handle) = self.mux.release_handle(id) {
                            self.mux.close_handle(handle);
                        }
                        continue;
                    }
                    debug!(%id, in_flight = self.in_flight.len(), "Scheduler::admit_pending: admitted");
                    admitted = true;
                    self.stats.total_admitted += 1;
                    self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.in_flight.len());
                }
                Err(Rejected { handle, error }) => {
                    debug!(%id, %error, "Scheduler::admit_pending: transport rejected handle");
                    self.stats.total_rejected += 1;
                    self.stats.total_completed += 1;
                    self.stats.total_failed += 1;
                    let handle = self.dispose(handle);
                    self.completed.push(Response::rejected(id, user_data, error, handle));
                }
            }
        }
        admitted
    }

    /// Call `drive_once` until it reports no further immediate progress
    fn drive(&mut self) -> usize {
        loop {
            let Drive { running, call_again } = self.mux.drive_once();
            if !call_again {
                return running;
            }
        }
    }

    /// Block until at least one admitted request has finished
    async fn wait_for_progress(&mut self, mut running: usize) {
        let admitted = self.in_flight.len();
        while running > 0 && running >= admitted {
            debug!(running, admitted, "Scheduler::wait_for_progress: blocking on transport");
            self.stats.blocking_waits += 1;
            self.mux.block_until_ready().await;
            running = self.drive();
        }
    }

    /// Turn every finished handle into a queued response
    fn drain_finished(&mut self) {
        while let Some(id) = self.mux.next_finished_handle() {
            let entry = match self.in_flight.resolve(id) {
                Ok(entry) => entry,
                Err(e) => {
                    error!(%id, %e, "Scheduler::drain_finished: invariant violation, releasing orphan");
                    self.stats.invariant_violations += 1;
                    if let Some(handle) = self.mux.release_handle(id) {
                        self.mux.close_handle(handle);
                    }
                    continue;
                }
            };

            let raw = self.mux.raw_output_of(id).unwrap_or_default();
            let transfer_error = self.mux.error_of(id).unwrap_or_default();
            debug!(
                %id,
                elapsed_ms = entry.admitted_at.elapsed().as_millis() as u64,
                error = %transfer_error,
                "Scheduler::drain_finished: handle finished"
            );
            if !transfer_error.is_ok() {
                self.stats.total_failed += 1;
            }

            let mut response = build_response(id, raw, transfer_error, entry.user_data, self.config.parse_headers);
            response.handle = match self.mux.release_handle(id) {
                Some(handle) => self.dispose(handle),
                None => {
                    warn!(%id, "Scheduler::drain_finished: transport lost handle before release");
                    None
                }
            };

            self.completed.push(response);
            self.stats.total_completed += 1;
        }
    }

    /// Close a released handle, or hand it back when auto-close is off
    fn dispose(&mut self, handle: M::Handle) -> Option<M::Handle> {
        if self.config.auto_close_handles {
            self.mux.close_handle(handle);
            None
        } else {
            Some(handle)
        }
    }

    /// Release everything still owned and return the unfinished descriptors
    fn release_all(&mut self) -> Vec<Descriptor<M::Handle, T>> {
        let mut unfinished: Vec<_> = Vec::new();
        for id in self.in_flight.ids() {
            let Ok(entry) = self.in_flight.resolve(id) else {
                continue;
            };
            match self.mux.release_handle(id) {
                Some(handle) => unfinished.push(Descriptor {
                    id,
                    handle,
                    user_data: entry.user_data,
                }),
                None => warn!(%id, "Scheduler::release_all: transport lost in-flight handle"),
            }
        }
        unfinished.extend(self.pending.drain());
        unfinished
    }

    /// Stop scheduling and hand back every request that has not finished
    ///
    /// In-flight transfers are released from the transport first. Responses
    /// already finished but not yet pulled are discarded.
    pub fn shutdown(mut self) -> Vec<Descriptor<M::Handle, T>> {
        let unfinished = self.release_all();
        info!(unfinished = unfinished.len(), "Scheduler::shutdown: released");
        unfinished
    }

    /// Change the concurrency cap; values below 1 clamp to 1
    pub fn set_max_concurrent(&mut self, max_concurrent: usize) {
        debug!(max_concurrent, "Scheduler::set_max_concurrent: called");
        self.config.max_concurrent = clamp_concurrency(max_concurrent);
    }

    pub fn set_parse_headers(&mut self, parse_headers: bool) {
        self.config.parse_headers = parse_headers;
    }

    pub fn set_auto_close_handles(&mut self, auto_close: bool) {
        self.config.auto_close_handles = auto_close;
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Requests that have not started executing
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Finished responses not pulled yet
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn state(&self) -> SchedulerState {
        if !self.completed.is_empty() {
            SchedulerState::Draining
        } else if self.has_pending() && self.in_flight.len() < self.config.max_concurrent {
            SchedulerState::Admitting
        } else if self.has_in_flight() {
            SchedulerState::Waiting
        } else {
            SchedulerState::Idle
        }
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Current queue depths for display
    pub fn queue_state(&self) -> QueueState {
        QueueState {
            state: self.state(),
            pending: self.pending.len(),
            in_flight: self.in_flight.len(),
            completed: self.completed.len(),
            stats: self.stats.clone(),
        }
    }

    pub fn multiplexer(&self) -> &M {
        &self.mux
    }

    pub fn multiplexer_mut(&mut self) -> &mut M {
        &mut self.mux
    }
}

impl<M: Multiplexer, T> Drop for Scheduler<M, T> {
    fn drop(&mut self) {
        let unfinished = self.release_all();
        if unfinished.is_empty() {
            return;
        }
        debug!(unfinished = unfinished.len(), "Scheduler::drop: releasing unfinished requests");
        if self.config.auto_close_handles {
            for descriptor in unfinished {
                self.mux.close_handle(descriptor.handle);
            }
        }
    }
}
