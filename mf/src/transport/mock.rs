//! Scripted multiplexer for unit tests
//!
//! Each handle finishes after a fixed number of blocking waits ("ticks").
//! A tick counts down every running handle, so several handles can finish in
//! the same wake-up.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use super::{Drive, HandleId, Multiplexer, RawOutput, Rejected, TransferError, TransferInfo};

/// Test handle: what the transfer produces and when it finishes
#[derive(Debug, Clone, PartialEq)]
pub struct MockHandle {
    pub name: String,
    pub ticks: u32,
    pub content: String,
    pub header_size: usize,
    pub error: Option<TransferError>,
    pub reject: Option<TransferError>,
}

impl MockHandle {
    /// Finishes after `ticks` waits with an empty successful response
    pub fn new(name: impl Into<String>, ticks: u32) -> Self {
        Self {
            name: name.into(),
            ticks,
            content: String::new(),
            header_size: 0,
            error: None,
            reject: None,
        }
    }

    /// Content of `head` (up to and including the blank line) plus `body`
    pub fn with_response(mut self, head: &str, body: &str) -> Self {
        self.header_size = head.len();
        self.content = format!("{}{}", head, body);
        self
    }

    pub fn failing(mut self, error: TransferError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn rejected(mut self, error: TransferError) -> Self {
        self.reject = Some(error);
        self
    }
}

/// Everything the mock observed, shared with the test
#[derive(Debug, Default)]
pub struct MockLog {
    pub admitted: Vec<String>,
    pub peak_running: usize,
    pub blocks: usize,
    pub released: Vec<HandleId>,
    pub closed: Vec<String>,
}

#[derive(Default)]
pub struct MockMultiplexer {
    running: BTreeMap<HandleId, (MockHandle, u32)>,
    done: HashMap<HandleId, MockHandle>,
    finished: VecDeque<HandleId>,
    log: Arc<Mutex<MockLog>>,
}

impl MockMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Arc<Mutex<MockLog>> {
        self.log.clone()
    }

    /// Report a handle as finished that was never admitted
    pub fn inject_orphan(&mut self, id: HandleId) {
        self.finished.push_back(id);
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

#[async_trait]
impl Multiplexer for MockMultiplexer {
    type Handle = MockHandle;

    fn admit_handle(&mut self, id: HandleId, handle: MockHandle) -> Result<(), Rejected<MockHandle>> {
        if let Some(error) = handle.reject.clone() {
            return Err(Rejected { handle, error });
        }
        debug!(%id, name = %handle.name, "MockMultiplexer::admit_handle: called");
        let mut log = self.log.lock().unwrap();
        log.admitted.push(handle.name.clone());
        let ticks = handle.ticks;
        self.running.insert(id, (handle, ticks));
        log.peak_running = log.peak_running.max(self.running.len());
        Ok(())
    }

    fn drive_once(&mut self) -> Drive {
        let ready = self
            .running
            .iter()
            .find(|(_, (_, remaining))| *remaining == 0)
            .map(|(id, _)| *id);
        if let Some((id, (handle, _))) = ready.and_then(|id| self.running.remove_entry(&id)) {
            self.done.insert(id, handle);
            self.finished.push_back(id);
            return Drive {
                running: self.running.len(),
                call_again: true,
            };
        }
        Drive {
            running: self.running.len(),
            call_again: false,
        }
    }

    async fn block_until_ready(&mut self) {
        self.log.lock().unwrap().blocks += 1;
        for (_, remaining) in self.running.values_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }

    fn next_finished_handle(&mut self) -> Option<HandleId> {
        self.finished.pop_front()
    }

    fn raw_output_of(&mut self, id: HandleId) -> Option<RawOutput> {
        let handle = self.done.get(&id)?;
        let info = TransferInfo {
            header_size: handle.header_size,
            size_download: handle.content.len() - handle.header_size,
            status: if handle.error.is_some() { 0 } else { 200 },
            ..TransferInfo::new("GET", format!("mock://{}", handle.name))
        };
        Some(RawOutput {
            info,
            content: handle.content.clone().into_bytes(),
        })
    }

    fn error_of(&self, id: HandleId) -> Option<TransferError> {
        let handle = self.done.get(&id)?;
        Some(handle.error.clone().unwrap_or_default())
    }

    fn release_handle(&mut self, id: HandleId) -> Option<MockHandle> {
        self.log.lock().unwrap().released.push(id);
        if let Some(handle) = self.done.remove(&id) {
            return Some(handle);
        }
        self.running.remove(&id).map(|(handle, _)| handle)
    }

    fn close_handle(&mut self, handle: MockHandle) {
        self.log.lock().unwrap().closed.push(handle.name);
    }
}
