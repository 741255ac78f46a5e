// src/io/canbus/session.rs
//
// Transport session: owns one serial link's lifecycle and runs the worker
// thread that reads it.
//
// Worker loop:
//   disconnected            -> sleep idle_interval
//   connected, no bytes     -> sleep poll_interval
//   connected, bytes ready  -> read, reassemble, dispatch events in order
//   fatal read error        -> close link, report, stop the loop
//   transient read error    -> report, keep going

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::reassembler::{ReassemblerConfig, StreamEvent, StreamReassembler};
use crate::io::error::IoError;
use crate::io::serial::utils::{classify_read_error, ReadErrorClass};
use crate::io::serial::{Link, LinkConfig, Transport};
use crate::io::types::{ConnectionState, EventSink, SessionEvent};
use crate::io::{format_canbus_line, Direction, Frame};

const WORKER_THREAD_NAME: &str = "canbus-session";

// ============================================================================
// Types and Configuration
// ============================================================================

/// Worker loop timing and buffering
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sleep when connected but no bytes are waiting
    pub poll_interval_ms: u64,
    /// Sleep while disconnected
    pub idle_interval_ms: u64,
    /// Largest single read from the link
    pub read_chunk: usize,
    pub reassembler: ReassemblerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            idle_interval_ms: 50,
            read_chunk: 1024,
            reassembler: ReassemblerConfig::default(),
        }
    }
}

struct ActiveLink {
    link: Box<dyn Link>,
    endpoint: String,
    /// Bumped on every successful connect so the worker can drop stale partial lines
    generation: u64,
}

/// Outcome of one worker poll
enum Poll {
    Disconnected,
    NoData,
    Data { generation: u64, len: usize },
    Transient(IoError),
    Fatal { generation: u64, error: io::Error },
}

/// State shared by the controller and the worker thread
struct Shared {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
    config: SessionConfig,
    running: AtomicBool,
    /// Set while disconnect waits for the worker; connect is refused meanwhile
    closing: AtomicBool,
    generation: AtomicU64,
    link: Mutex<Option<ActiveLink>>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        self.sink.emit(event);
    }

    fn lock_link(&self) -> MutexGuard<'_, Option<ActiveLink>> {
        match self.link.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                self.link.clear_poison();
                self.emit(SessionEvent::error(
                    IoError::unexpected("link lock poisoned").to_string(),
                ));
                poisoned.into_inner()
            }
        }
    }

    fn poll(&self, buf: &mut [u8]) -> Poll {
        let mut slot = self.lock_link();
        let Some(active) = slot.as_mut() else {
            return Poll::Disconnected;
        };
        let generation = active.generation;

        let available = match active.link.bytes_available() {
            Ok(n) => n,
            Err(e) => return classify(generation, &active.endpoint, e),
        };
        if available == 0 {
            return Poll::NoData;
        }

        let want = available.min(buf.len());
        match active.link.read(&mut buf[..want]) {
            Ok(0) => Poll::NoData,
            Ok(len) => Poll::Data { generation, len },
            Err(e) => classify(generation, &active.endpoint, e),
        }
    }

    fn dispatch(&self, event: StreamEvent) {
        match event {
            StreamEvent::Frame(mut frame) => {
                // Everything read off the link is inbound; the text token is informational
                frame.direction = Direction::Inbound;
                self.emit(SessionEvent::FrameReceived { frame });
            }
            StreamEvent::Rejected { error, line } => {
                self.emit(SessionEvent::error(format!(
                    "parse error: {} - line: {}",
                    error, line
                )));
            }
            StreamEvent::Overflow { discarded } => {
                tlog!("session"; "Line buffer overflow, dropped {} bytes", discarded);
                self.emit(SessionEvent::error(format!(
                    "line buffer overflow: discarded {} bytes without a line terminator",
                    discarded
                )));
            }
        }
    }

    /// Tear down the link after a fatal read error, unless it was already replaced.
    ///
    /// The status goes out before the error, so a sink that reconnects while
    /// handling the error sees its own `connected: true` last.
    fn fail_link(&self, generation: u64, error: io::Error) {
        let taken = {
            let mut slot = self.lock_link();
            match slot.as_ref() {
                Some(active) if active.generation == generation => {
                    // Under the link lock: a connect installing after this sees the worker exiting
                    self.running.store(false, Ordering::SeqCst);
                    slot.take()
                }
                _ => None,
            }
        };

        let Some(mut active) = taken else {
            return;
        };
        active.link.close();

        let error = IoError::read(&active.endpoint, error.to_string());
        tlog!("session"; "{}", error);

        // A connect from another thread already announced its own link
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        self.emit(SessionEvent::status(
            false,
            format!("connection lost: {}", active.endpoint),
        ));
        self.emit(SessionEvent::error(error.to_string()));
    }
}

fn classify(generation: u64, endpoint: &str, error: io::Error) -> Poll {
    match classify_read_error(error.kind()) {
        ReadErrorClass::NoData => Poll::NoData,
        ReadErrorClass::Transient => {
            Poll::Transient(IoError::unexpected(format!("{}: {}", endpoint, error)))
        }
        ReadErrorClass::Fatal => Poll::Fatal { generation, error },
    }
}

fn run_worker(shared: Arc<Shared>) {
    let poll_interval = Duration::from_millis(shared.config.poll_interval_ms);
    let idle_interval = Duration::from_millis(shared.config.idle_interval_ms);
    let mut reassembler = StreamReassembler::new(shared.config.reassembler.clone());
    let mut read_buf = vec![0u8; shared.config.read_chunk.max(1)];
    let mut current_generation = 0;

    tlog!("session"; "Worker started");

    while shared.running.load(Ordering::SeqCst) {
        match shared.poll(&mut read_buf) {
            Poll::Disconnected => thread::sleep(idle_interval),
            Poll::NoData => thread::sleep(poll_interval),
            Poll::Data { generation, len } => {
                if generation != current_generation {
                    reassembler.reset();
                    current_generation = generation;
                }
                for event in reassembler.feed(&read_buf[..len]) {
                    if !shared.running.load(Ordering::SeqCst) {
                        break;
                    }
                    shared.dispatch(event);
                }
            }
            Poll::Transient(error) => {
                tlog!("session"; "{}", error);
                shared.emit(SessionEvent::error(error.to_string()));
                thread::sleep(poll_interval);
            }
            Poll::Fatal { generation, error } => shared.fail_link(generation, error),
        }
    }

    tlog!("session"; "Worker stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn is_current_thread(handle: &JoinHandle<()>) -> bool {
    handle.thread().id() == thread::current().id()
}

// ============================================================================
// Transport Session
// ============================================================================

/// One serial connection and the worker thread that reads it.
///
/// Controller methods (`connect`, `disconnect`, `send`, `stop`) may be called
/// from any thread, including from inside a sink callback.
pub struct TransportSession {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TransportSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn EventSink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                sink,
                config,
                running: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                link: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Open `endpoint`, replacing any link that is already open.
    ///
    /// On success a `connected: true` status is emitted before the link goes
    /// live, so it precedes every frame of the connection. On failure one
    /// `connected: false` status and one error are emitted.
    pub fn connect(&self, endpoint: &str, link_config: &LinkConfig) -> Result<(), IoError> {
        // Replaced link is not announced; the new status follows
        let previous = {
            let mut slot = self.shared.lock_link();
            if self.shared.closing.load(Ordering::SeqCst) {
                None
            } else {
                Some(slot.take())
            }
        };
        let Some(previous) = previous else {
            return Err(self.report_connect_failure(IoError::unexpected(
                "session is shutting down",
            )));
        };
        if let Some(mut previous) = previous {
            previous.link.close();
        }

        let link = match self.shared.transport.open(endpoint, link_config) {
            Ok(link) => link,
            Err(e) => return Err(self.report_connect_failure(e)),
        };

        // Bumped before the announcement so a failing old link stays quiet
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tlog!("session"; "Connected to {}", endpoint);
        self.shared.emit(SessionEvent::status(
            true,
            format!("connected to {} at {} baud", endpoint, link_config.baud_rate),
        ));

        // Checked under the same lock disconnect takes the link with
        let rejected = {
            let mut slot = self.shared.lock_link();
            if self.shared.closing.load(Ordering::SeqCst) {
                Some(link)
            } else {
                *slot = Some(ActiveLink {
                    link,
                    endpoint: endpoint.to_string(),
                    generation,
                });
                None
            }
        };
        if let Some(mut link) = rejected {
            link.close();
            return Err(self.report_connect_failure(IoError::unexpected(
                "session is shutting down",
            )));
        }

        if let Err(e) = self.ensure_worker() {
            if let Some(mut active) = self.shared.lock_link().take() {
                active.link.close();
            }
            return Err(self.report_connect_failure(e));
        }

        Ok(())
    }

    fn report_connect_failure(&self, error: IoError) -> IoError {
        tlog!("session"; "{}", error);
        self.shared
            .emit(SessionEvent::status(false, format!("connection failed: {}", error)));
        self.shared.emit(SessionEvent::error(error.to_string()));
        error
    }

    /// Stop the worker, close the link and report `disconnected`.
    ///
    /// Waits for the worker to finish its current iteration unless called
    /// from the worker itself. Nothing is emitted when already disconnected.
    pub fn disconnect(&self) {
        {
            let _slot = self.shared.lock_link();
            self.shared.closing.store(true, Ordering::SeqCst);
        }
        self.join_worker();
        let taken = {
            let mut slot = self.shared.lock_link();
            self.shared.closing.store(false, Ordering::SeqCst);
            slot.take()
        };

        if let Some(mut active) = taken {
            active.link.close();
            tlog!("session"; "Disconnected from {}", active.endpoint);
            self.shared.emit(SessionEvent::status(false, "disconnected"));
        }
    }

    /// Shut the session down. When this returns the worker has exited and
    /// no further events will be emitted by it. Also run on drop.
    pub fn stop(&self) {
        self.disconnect();
        if lock(&self.worker).is_some() {
            // Called from a sink callback: the worker exits once the callback returns
            tlog!("session"; "stop() called from the worker thread; exit is deferred");
        }
    }

    /// Write `text` followed by a single `\n`.
    ///
    /// Failures are reported through the sink and returned; a failed write
    /// leaves the connection state unchanged.
    pub fn send(&self, text: &str) -> Result<(), IoError> {
        let result = {
            let mut slot = self.shared.lock_link();
            match slot.as_mut() {
                None => Err(IoError::NotConnected),
                Some(active) => {
                    let mut data = Vec::with_capacity(text.len() + 1);
                    data.extend_from_slice(text.as_bytes());
                    data.push(b'\n');
                    active
                        .link
                        .write_all(&data)
                        .map_err(|e| IoError::write(&active.endpoint, e.to_string()))
                }
            }
        };

        if let Err(ref e) = result {
            tlog!("session"; "Send failed: {}", e);
            self.shared.emit(SessionEvent::error(e.to_string()));
        }
        result
    }

    /// Send a frame as its canonical CanBus line
    pub fn send_frame(&self, frame: &Frame) -> Result<(), IoError> {
        self.send(&format_canbus_line(frame))
    }

    pub fn state(&self) -> ConnectionState {
        if self.shared.lock_link().is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Endpoint of the open link, if any
    pub fn endpoint(&self) -> Option<String> {
        self.shared.lock_link().as_ref().map(|a| a.endpoint.clone())
    }

    /// Endpoints the transport can currently open
    pub fn list_endpoints(&self) -> Result<Vec<String>, IoError> {
        self.shared.transport.list_endpoints()
    }

    /// Keep the live worker or start a new one.
    ///
    /// `running` is only raised while holding the worker slot with `closing`
    /// clear, and `join_worker` lowers it under the same slot, so a worker
    /// being joined is never revived.
    fn ensure_worker(&self) -> Result<(), IoError> {
        loop {
            let mut slot = lock(&self.worker);
            if self.shared.closing.load(Ordering::SeqCst) {
                return Err(IoError::unexpected("session is shutting down"));
            }

            match slot.take() {
                Some(handle) => {
                    let alive =
                        !handle.is_finished() && self.shared.running.load(Ordering::SeqCst);
                    if alive || is_current_thread(&handle) {
                        self.shared.running.store(true, Ordering::SeqCst);
                        *slot = Some(handle);
                        return Ok(());
                    }
                    // On its way out and not the calling thread; join outside the slot
                    drop(slot);
                    if handle.join().is_err() {
                        tlog!("session"; "Previous worker panicked");
                    }
                }
                None => {
                    self.shared.running.store(true, Ordering::SeqCst);
                    let shared = Arc::clone(&self.shared);
                    let handle = thread::Builder::new()
                        .name(WORKER_THREAD_NAME.to_string())
                        .spawn(move || run_worker(shared))
                        .map_err(|e| {
                            self.shared.running.store(false, Ordering::SeqCst);
                            IoError::unexpected(format!("failed to spawn session worker: {}", e))
                        })?;
                    *slot = Some(handle);
                    return Ok(());
                }
            }
        }
    }

    fn join_worker(&self) {
        let handle = {
            let mut slot = lock(&self.worker);
            self.shared.running.store(false, Ordering::SeqCst);
            match slot.take() {
                Some(handle) if is_current_thread(&handle) => {
                    *slot = Some(handle);
                    return;
                }
                Some(handle) => handle,
                None => return,
            }
        };

        if handle.join().is_err() {
            tlog!("session"; "Worker panicked");
            self.shared
                .emit(SessionEvent::error(IoError::unexpected("session worker panicked").to_string()));
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================
