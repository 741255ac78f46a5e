// src/io/serial/mock.rs
//
// Scripted in-memory transport for session tests.

use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::sync::{Arc, Mutex};

use super::transport::{Link, LinkConfig, Transport};
use crate::io::error::IoError;

enum ReadStep {
    Data(Vec<u8>),
    Error(ErrorKind),
}

#[derive(Default)]
struct MockState {
    reads: VecDeque<ReadStep>,
    written: Vec<u8>,
    fail_open: Option<String>,
    write_error: Option<ErrorKind>,
    opened: Vec<String>,
    closed: usize,
}

/// Transport whose links replay queued chunks and errors
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.with_state(|s| s.reads.push_back(ReadStep::Data(bytes.to_vec())));
    }

    pub fn push_read_error(&self, kind: ErrorKind) {
        self.with_state(|s| s.reads.push_back(ReadStep::Error(kind)));
    }

    pub fn fail_open(&self, message: &str) {
        self.with_state(|s| s.fail_open = Some(message.to_string()));
    }

    pub fn fail_writes(&self, kind: ErrorKind) {
        self.with_state(|s| s.write_error = Some(kind));
    }

    pub fn written(&self) -> Vec<u8> {
        self.with_state(|s| s.written.clone())
    }

    pub fn opened(&self) -> Vec<String> {
        self.with_state(|s| s.opened.clone())
    }

    pub fn closed(&self) -> usize {
        self.with_state(|s| s.closed)
    }

    pub fn pending_reads(&self) -> usize {
        self.with_state(|s| s.reads.len())
    }
}

impl Transport for MockTransport {
    fn open(&self, endpoint: &str, _config: &LinkConfig) -> Result<Box<dyn Link>, IoError> {
        self.with_state(|s| {
            if let Some(message) = &s.fail_open {
                return Err(IoError::connection(endpoint, message.clone()));
            }
            s.opened.push(endpoint.to_string());
            Ok(())
        })?;
        Ok(Box::new(MockLink {
            transport: self.clone(),
            open: true,
        }))
    }

    fn list_endpoints(&self) -> Result<Vec<String>, IoError> {
        Ok(vec!["mock0".to_string(), "mock1".to_string()])
    }
}

struct MockLink {
    transport: MockTransport,
    open: bool,
}

impl MockLink {
    fn ensure_open(&self) -> io::Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(io::Error::new(ErrorKind::NotConnected, "mock link closed"))
        }
    }
}

impl Link for MockLink {
    fn is_open(&self) -> bool {
        self.open
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        self.ensure_open()?;
        Ok(self.transport.with_state(|s| match s.reads.front() {
            Some(ReadStep::Data(bytes)) => bytes.len(),
            // Report something so the caller goes on to read and hits the error
            Some(ReadStep::Error(_)) => 1,
            None => 0,
        }))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        self.transport.with_state(|s| match s.reads.pop_front() {
            Some(ReadStep::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    s.reads.push_front(ReadStep::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(ReadStep::Error(kind)) => Err(io::Error::new(kind, "scripted read error")),
            None => Ok(0),
        })
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        self.transport.with_state(|s| {
            if let Some(kind) = s.write_error {
                return Err(io::Error::new(kind, "scripted write error"));
            }
            s.written.extend_from_slice(data);
            Ok(())
        })
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.transport.with_state(|s| s.closed += 1);
        }
    }
}
