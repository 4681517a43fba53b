//! HTTP multiplexer backed by reqwest on the tokio reactor
//!
//! Every admitted handle runs as its own tokio task. Tasks report back over an
//! unbounded channel; the scheduler's thread only ever touches the channel,
//! so all bookkeeping stays single-threaded.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Drive, HandleId, HttpHandle, Multiplexer, RawOutput, Rejected, TransferError, TransferInfo};

/// Finished transfer as reported by a task
#[derive(Debug)]
struct Outcome {
    output: RawOutput,
    error: TransferError,
}

#[derive(Debug)]
struct Completion {
    id: HandleId,
    outcome: Outcome,
}

/// Multiplexer state for one handle
struct Entry {
    handle: HttpHandle,
    task: Option<JoinHandle<()>>,
    outcome: Option<Outcome>,
}

/// Runs admitted [`HttpHandle`]s concurrently with a shared reqwest client
pub struct HttpMultiplexer {
    client: reqwest::Client,
    entries: HashMap<HandleId, Entry>,
    finished: VecDeque<HandleId>,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
    running: usize,
}

impl HttpMultiplexer {
    /// Create a multiplexer; must be used from within a tokio runtime
    pub fn new(client: reqwest::Client) -> Self {
        debug!("HttpMultiplexer::new: called");
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            client,
            entries: HashMap::new(),
            finished: VecDeque::new(),
            tx,
            rx,
            running: 0,
        }
    }

    /// Number of admitted handles whose transfer is still running
    pub fn running(&self) -> usize {
        self.running
    }

    fn record(&mut self, completion: Completion) {
        let Completion { id, outcome } = completion;
        match self.entries.get_mut(&id) {
            Some(entry) if entry.outcome.is_none() => {
                debug!(%id, error = %outcome.error, "HttpMultiplexer::record: handle finished");
                entry.task = None;
                entry.outcome = Some(outcome);
                self.running = self.running.saturating_sub(1);
                self.finished.push_back(id);
            }
            Some(_) => {
                warn!(%id, "HttpMultiplexer::record: duplicate completion ignored");
            }
            None => {
                debug!(%id, "HttpMultiplexer::record: handle already released, dropping completion");
            }
        }
    }
}

impl Default for HttpMultiplexer {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl Multiplexer for HttpMultiplexer {
    type Handle = HttpHandle;

    fn admit_handle(&mut self, id: HandleId, handle: HttpHandle) -> Result<(), Rejected<HttpHandle>> {
        debug!(%id, url = %handle.url, "HttpMultiplexer::admit_handle: called");
        let request = match handle.build(&self.client) {
            Ok(request) => request,
            Err(e) => {
                debug!(%id, %e, "HttpMultiplexer::admit_handle: request could not be built");
                let error = TransferError::from_reqwest(&e);
                return Err(Rejected { handle, error });
            }
        };

        let client = self.client.clone();
        let tx = self.tx.clone();
        let include_headers = handle.include_headers;
        let task = tokio::spawn(async move {
            let outcome = perform(client, request, include_headers).await;
            // Receiver is gone only when the multiplexer was dropped
            let _ = tx.send(Completion { id, outcome });
        });

        self.entries.insert(
            id,
            Entry {
                handle,
                task: Some(task),
                outcome: None,
            },
        );
        self.running += 1;
        Ok(())
    }

    fn drive_once(&mut self) -> Drive {
        match self.rx.try_recv() {
            Ok(completion) => {
                self.record(completion);
                Drive {
                    running: self.running,
                    call_again: true,
                }
            }
            Err(_) => Drive {
                running: self.running,
                call_again: false,
            },
        }
    }

    async fn block_until_ready(&mut self) {
        if self.running == 0 {
            debug!("HttpMultiplexer::block_until_ready: nothing running");
            return;
        }
        debug!(running = self.running, "HttpMultiplexer::block_until_ready: waiting");
        // The multiplexer holds a sender, so recv only ends with a completion
        if let Some(completion) = self.rx.recv().await {
            self.record(completion);
        }
    }

    fn next_finished_handle(&mut self) -> Option<HandleId> {
        self.finished.pop_front()
    }

    fn raw_output_of(&mut self, id: HandleId) -> Option<RawOutput> {
        let outcome = self.entries.get_mut(&id)?.outcome.as_mut()?;
        Some(std::mem::take(&mut outcome.output))
    }

    fn error_of(&self, id: HandleId) -> Option<TransferError> {
        self.entries.get(&id)?.outcome.as_ref().map(|o| o.error.clone())
    }

    fn release_handle(&mut self, id: HandleId) -> Option<HttpHandle> {
        let entry = self.entries.remove(&id)?;
        if let Some(task) = entry.task {
            debug!(%id, "HttpMultiplexer::release_handle: aborting running transfer");
            task.abort();
            self.running = self.running.saturating_sub(1);
        }
        self.finished.retain(|f| *f != id);
        Some(entry.handle)
    }
}

impl Drop for HttpMultiplexer {
    fn drop(&mut self) {
        for entry in self.entries.values_mut() {
            if let Some(task) = entry.task.take() {
                task.abort();
            }
        }
    }
}

/// Execute one request and capture its raw output
async fn perform(client: reqwest::Client, request: reqwest::Request, include_headers: bool) -> Outcome {
    let started = Instant::now();
    let mut info = TransferInfo::new(request.method().as_str(), request.url().as_str());

    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(e) => {
            debug!(url = %info.url, %e, "perform: request failed");
            info.total_time = started.elapsed().as_secs_f64();
            return Outcome {
                output: RawOutput {
                    info,
                    content: Vec::new(),
                },
                error: TransferError::from_reqwest(&e),
            };
        }
    };

    info.starttransfer_time = started.elapsed().as_secs_f64();
    info.url = response.url().to_string();
    info.status = response.status().as_u16();
    info.http_version = format!("{:?}", response.version());
    info.content_length = response.content_length();

    let mut content = if include_headers {
        render_head(&response).into_bytes()
    } else {
        Vec::new()
    };
    info.header_size = content.len();

    let error = match response.bytes().await {
        Ok(body) => {
            info.size_download = body.len();
            content.extend_from_slice(&body);
            TransferError::none()
        }
        Err(e) => {
            debug!(url = %info.url, %e, "perform: reading body failed");
            TransferError::from_reqwest(&e)
        }
    };
    info.total_time = started.elapsed().as_secs_f64();

    Outcome {
        output: RawOutput { info, content },
        error,
    }
}

/// Status line and header fields, terminated by a blank line
fn render_head(response: &reqwest::Response) -> String {
    let mut head = format!("{:?} {}\r\n", response.version(), response.status());
    for (name, value) in response.headers() {
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(&String::from_utf8_lossy(value.as_bytes()));
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    head
}
