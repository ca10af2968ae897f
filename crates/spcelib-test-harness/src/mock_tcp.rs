//! Mock TCP server for testing the client over a real socket.
//!
//! [`MockTcpServer`] is a lightweight loopback listener pre-loaded with
//! scripted responses, standing in for a serial device server bridging a
//! controller onto the network.
//!
//! # Example
//!
//! ```
//! use spcelib_test_harness::MockTcpServer;
//!
//! # async fn example() -> spcelib_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//! server.expect(b"~01 02 81\r", b"01 OK 00 VERSION=2.10 FF\r");
//! server.start();
//!
//! // Connect a TcpTransport to server.addr() ...
//! # Ok(())
//! # }
//! ```

use spcelib_core::error::{Error, Result};
use std::collections::VecDeque;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A pre-loaded request/response pair for the mock TCP server.
#[derive(Debug, Clone)]
struct TcpExpectation {
    request: Vec<u8>,
    /// Empty means the server reads the request and stays silent.
    response: Vec<u8>,
}

/// A mock TCP server bound to a random port on localhost.
///
/// Once [`start`](MockTcpServer::start) is called it accepts a single
/// connection and processes expectations in order: for each expected
/// request it reads exactly that many bytes from the client, compares them,
/// and writes back the corresponding response. After the script the
/// connection stays open until the client hangs up; anything the client
/// sends in that time is reported as an error.
pub struct MockTcpServer {
    addr: String,
    listener: Option<TcpListener>,
    expectations: VecDeque<TcpExpectation>,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind a new mock server on `127.0.0.1` with an OS-assigned port.
    ///
    /// The listener is bound immediately, so clients may connect before
    /// [`start`](MockTcpServer::start); the connection is accepted once
    /// the server task runs.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {}", e)))?;
        let addr = listener.local_addr()?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            expectations: VecDeque::new(),
            server_handle: None,
        })
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(TcpExpectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Add an expected request that gets no answer.
    pub fn expect_silent(&mut self, request: &[u8]) {
        self.expect(request, &[]);
    }

    /// The address the server is listening on, e.g. `"127.0.0.1:54321"`.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Spawn the server task: accept one client and play the script.
    ///
    /// Call [`wait`](MockTcpServer::wait) afterwards to check that every
    /// expectation was met.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let expectations: Vec<TcpExpectation> = self.expectations.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;

            for (i, expectation) in expectations.iter().enumerate() {
                let mut buf = vec![0u8; expectation.request.len()];
                stream
                    .read_exact(&mut buf)
                    .await
                    .map_err(|e| format!("expectation {}: read error: {}", i, e))?;

                if buf != expectation.request {
                    return Err(format!(
                        "expectation {}: request mismatch: expected {:?}, got {:?}",
                        i,
                        String::from_utf8_lossy(&expectation.request),
                        String::from_utf8_lossy(&buf)
                    ));
                }

                if expectation.response.is_empty() {
                    continue;
                }
                stream
                    .write_all(&expectation.response)
                    .await
                    .map_err(|e| format!("expectation {}: write error: {}", i, e))?;
                stream
                    .flush()
                    .await
                    .map_err(|e| format!("expectation {}: flush error: {}", i, e))?;
            }

            let mut extra = Vec::new();
            stream
                .read_to_end(&mut extra)
                .await
                .map_err(|e| format!("read error after script: {}", e))?;
            if !extra.is_empty() {
                return Err(format!(
                    "unexpected data after script: {:?}",
                    String::from_utf8_lossy(&extra)
                ));
            }
            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task to finish and return any script errors.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?,
            None => Ok(()),
        }
    }
}
