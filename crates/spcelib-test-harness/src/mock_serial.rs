//! Mock transport for deterministic testing of the protocol client.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. This lets you test frame encoding, retry policy,
//! and response parsing without a controller on the other end of the line.
//!
//! # Example
//!
//! ```
//! use spcelib_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the client sends this request, answer with this response.
//! mock.expect(b"~01 0A 90\r", b"01 OK 00 3.200 mA 9C\r");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use spcelib_core::error::{Error, Result};
use spcelib_core::transport::Transport;

/// A pre-loaded request and the reply it triggers.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// Reply chunks, one per `receive()` call. Empty means no reply at all.
    reply: Vec<Vec<u8>>,
    /// How long after the request the reply becomes readable.
    delay: Duration,
}

/// A reply chunk on its way back from the device.
#[derive(Debug, Clone)]
struct InFlight {
    ready_at: Instant,
    data: Vec<u8>,
}

/// Shared record of every frame sent through a [`MockTransport`].
///
/// The transport is usually moved into a client as a `Box<dyn Transport>`,
/// so tests keep a `SentLog` handle to inspect traffic afterwards.
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<Vec<u8>>>>);

impl SentLog {
    fn push(&self, data: &[u8]) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(data.to_vec());
    }

    /// All frames sent so far, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of `send()` calls recorded.
    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A mock [`Transport`] for testing without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation; its reply is
/// then handed out by subsequent `receive()` calls. Replies are queued
/// behind anything still unread, so a reply nobody collected is still
/// waiting on the line when the next request goes out. When no reply data
/// is ready in time, `receive()` waits out the full timeout and returns
/// [`Error::Timeout`], like a silent device would.
#[derive(Debug)]
pub struct MockTransport {
    /// Ordered queue of expected request/reply pairs.
    expectations: VecDeque<Expectation>,
    /// Reply chunks pending for upcoming `receive()` calls.
    pending: VecDeque<InFlight>,
    /// Accept any send without an expectation and never reply.
    unresponsive: bool,
    /// Whether the transport is "connected".
    connected: bool,
    sent_log: SentLog,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            pending: VecDeque::new(),
            unresponsive: false,
            connected: true,
            sent_log: SentLog::default(),
        }
    }

    /// Create a mock that accepts every request and never answers.
    pub fn unresponsive() -> Self {
        MockTransport {
            unresponsive: true,
            ..Self::new()
        }
    }

    /// Add an expected request/response pair.
    ///
    /// When `send()` is called with data matching `request`, the subsequent
    /// `receive()` call returns `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            reply: vec![response.to_vec()],
            delay: Duration::ZERO,
        });
    }

    /// Add an expectation whose reply only becomes readable `delay` after
    /// the request was sent.
    pub fn expect_late(&mut self, request: &[u8], response: &[u8], delay: Duration) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            reply: vec![response.to_vec()],
            delay,
        });
    }

    /// Add an expectation whose reply trickles in over several reads.
    pub fn expect_chunked(&mut self, request: &[u8], chunks: &[&[u8]]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            reply: chunks.iter().map(|c| c.to_vec()).collect(),
            delay: Duration::ZERO,
        });
    }

    /// Add an expected request that the device ignores.
    pub fn expect_silent(&mut self, request: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            reply: Vec::new(),
            delay: Duration::ZERO,
        });
    }

    /// Return a handle to the log of sent frames.
    pub fn sent_log(&self) -> SentLog {
        self.sent_log.clone()
    }

    /// Return a copy of all data sent through this transport.
    ///
    /// Each element is the byte slice from one `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.sent_log.frames()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        self.sent_log.push(data);

        if self.unresponsive {
            return Ok(());
        }

        let expectation = self
            .expectations
            .pop_front()
            .ok_or_else(|| Error::Transport("no more expectations in mock transport".into()))?;
        if data != expectation.request.as_slice() {
            return Err(Error::Transport(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            )));
        }
        let ready_at = Instant::now() + expectation.delay;
        self.pending.extend(
            expectation
                .reply
                .into_iter()
                .map(|data| InFlight { ready_at, data }),
        );
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let deadline = Instant::now() + timeout;
        match self.pending.front() {
            Some(next) if next.ready_at <= deadline => {
                tokio::time::sleep_until(next.ready_at).await;
            }
            _ => {
                tokio::time::sleep_until(deadline).await;
                return Err(Error::Timeout);
            }
        }

        let Some(mut chunk) = self.pending.pop_front() else {
            return Err(Error::Timeout);
        };
        let n = chunk.data.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk.data[..n]);
        if n < chunk.data.len() {
            chunk.data.drain(..n);
            self.pending.push_front(chunk);
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
