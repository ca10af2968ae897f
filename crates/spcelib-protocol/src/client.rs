//! ProtocolClient -- one request/response exchange at a time over a
//! [`Transport`].
//!
//! The SPCe bus is half-duplex and strictly master/slave: the client writes
//! one request frame and reads until the `\r` terminator or the per-attempt
//! deadline. Timeouts and damaged responses (bad checksum, broken layout) are
//! retried with a short linear backoff; anything the device says on purpose
//! (an `ER` response) and any addressing fault is returned immediately.
//!
//! Input already waiting on the line is discarded before every write, so a
//! reply that missed its deadline is never taken as the answer to a later
//! request.
//!
//! A client refuses overlapping calls with [`Error::Busy`] rather than
//! queueing them. Dropping an in-flight [`send`](ProtocolClient::send)
//! future releases the bus.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use spcelib_core::error::{Error, Result};
use spcelib_core::transport::Transport;
use spcelib_core::types::BusAddress;

use crate::codec::{self, Command, ResponseOutcome};
use crate::commands::{self, PayloadTable, Value};

/// Upper bound on a response frame; longer runs without a terminator are
/// treated as line noise.
const MAX_FRAME_LEN: usize = 256;

/// Read deadline used while clearing stale input before a request.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Stop clearing stale input after this many bytes and send anyway.
const MAX_DRAIN: usize = 4 * MAX_FRAME_LEN;

/// Timing and retry policy of a [`ProtocolClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Deadline for one attempt, from write to terminator.
    pub timeout: Duration,
    /// Resends after the first attempt.
    pub retries: u32,
    /// Delay before resend `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            timeout: Duration::from_millis(500),
            retries: 3,
            backoff: Duration::from_millis(20),
        }
    }
}

/// Whether a request is currently on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    AwaitingResponse,
}

/// Request/response engine for one logical connection.
pub struct ProtocolClient {
    transport: Mutex<Box<dyn Transport>>,
    config: ClientConfig,
    payload_table: PayloadTable,
}

impl ProtocolClient {
    /// Create a client with the default policy and the SPCe payload table.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_config(transport, ClientConfig::default(), PayloadTable::spce())
    }

    pub fn with_config(
        transport: Box<dyn Transport>,
        config: ClientConfig,
        payload_table: PayloadTable,
    ) -> Self {
        ProtocolClient {
            transport: Mutex::new(transport),
            config,
            payload_table,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn payload_table(&self) -> &PayloadTable {
        &self.payload_table
    }

    /// Current state of the exchange machine.
    pub fn state(&self) -> ClientState {
        match self.transport.try_lock() {
            Ok(_) => ClientState::Idle,
            Err(_) => ClientState::AwaitingResponse,
        }
    }

    /// Perform one exchange and return the decoded outcome.
    ///
    /// An `ER` response is a successful exchange and comes back as
    /// [`ResponseOutcome::DeviceError`]. Errors:
    ///
    /// - [`Error::Busy`] if another exchange is in flight; the transport is
    ///   not touched.
    /// - [`Error::InvalidArgument`] if the command cannot be encoded.
    /// - [`Error::ProtocolViolation`] if a response names another bus
    ///   address, whether or not its checksum is valid. Not retried.
    /// - [`Error::Timeout`], [`Error::MalformedFrame`] or
    ///   [`Error::ChecksumMismatch`] once every attempt has failed with one
    ///   of them; the last failure is reported.
    /// - Transport errors other than a timeout, unretried.
    pub async fn send(&self, command: &Command, bus_address: BusAddress) -> Result<ResponseOutcome> {
        let mut transport = self.transport.try_lock().map_err(|_| Error::Busy)?;
        let frame = codec::encode_request(bus_address, command)?;

        let mut last_error = Error::Timeout;
        for attempt in 0..=self.config.retries {
            if attempt > 0 {
                debug!(bus = %bus_address, code = %command.code, attempt, "SPCe request retry");
                tokio::time::sleep(self.config.backoff * attempt).await;
            }

            drain_stale(&mut transport, bus_address).await?;
            transport.send(&frame).await?;

            match self.read_response(&mut transport, bus_address).await {
                Ok(outcome) => {
                    trace!(bus = %bus_address, code = %command.code, ?outcome, "SPCe exchange complete");
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() => {
                    debug!(bus = %bus_address, code = %command.code, attempt, error = %e, "SPCe attempt failed");
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            bus = %bus_address,
            code = %command.code,
            attempts = self.config.retries + 1,
            error = %last_error,
            "SPCe request failed after all attempts"
        );
        Err(last_error)
    }

    /// Perform one exchange and interpret the payload.
    ///
    /// The payload is parsed according to the shape the payload table
    /// records for the command code. An `ER` response becomes
    /// [`Error::Device`]; a payload of the wrong shape becomes
    /// [`Error::UnexpectedPayloadShape`]. Neither is retried.
    pub async fn request(&self, command: &Command, bus_address: BusAddress) -> Result<Value> {
        match self.send(command, bus_address).await? {
            ResponseOutcome::Ok { payload, .. } => commands::parse_payload(
                command.code,
                self.payload_table.shape_for(command.code),
                &payload,
            ),
            ResponseOutcome::DeviceError { bus_address, code } => {
                Err(Error::Device { bus_address, code })
            }
        }
    }

    /// Close the underlying transport.
    pub async fn close(&self) -> Result<()> {
        self.transport.lock().await.close().await
    }

    /// Whether the underlying transport reports a live connection.
    pub fn is_connected(&self) -> bool {
        match self.transport.try_lock() {
            Ok(t) => t.is_connected(),
            // An exchange is in flight, so the link was up a moment ago.
            Err(_) => true,
        }
    }

    /// Read until a terminator arrives or the attempt deadline passes.
    ///
    /// Bytes received after the terminator are discarded.
    async fn read_response(
        &self,
        transport: &mut Box<dyn Transport>,
        bus_address: BusAddress,
    ) -> Result<ResponseOutcome> {
        let deadline = Instant::now() + self.config.timeout;
        let mut buf = [0u8; 128];
        let mut response = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }

            let n = match tokio::time::timeout(remaining, transport.receive(&mut buf, remaining))
                .await
            {
                Ok(Ok(0)) => return Err(Error::ConnectionLost),
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(Error::Timeout),
            };
            response.extend_from_slice(&buf[..n]);

            if let Some(end) = codec::find_frame_end(&response) {
                return decode_for(&response[..end], bus_address);
            }
            if response.len() > MAX_FRAME_LEN {
                return Err(Error::MalformedFrame(format!(
                    "no terminator within {} bytes",
                    MAX_FRAME_LEN
                )));
            }
        }
    }
}

/// Discard whatever is already waiting on the line, such as a reply that
/// arrived after an earlier attempt gave up on it.
async fn drain_stale(transport: &mut Box<dyn Transport>, bus_address: BusAddress) -> Result<()> {
    let mut buf = [0u8; 128];
    let mut discarded = Vec::new();

    while discarded.len() < MAX_DRAIN {
        match transport.receive(&mut buf, DRAIN_TIMEOUT).await {
            Ok(0) => return Err(Error::ConnectionLost),
            Ok(n) => discarded.extend_from_slice(&buf[..n]),
            Err(Error::Timeout) => break,
            Err(e) => return Err(e),
        }
    }

    if !discarded.is_empty() {
        debug!(
            bus = %bus_address,
            bytes = discarded.len(),
            data = %String::from_utf8_lossy(&discarded).escape_debug(),
            "discarded stale input before request"
        );
    }
    Ok(())
}

/// Decode a response and enforce that it came from `expected`.
fn decode_for(raw: &[u8], expected: BusAddress) -> Result<ResponseOutcome> {
    match codec::decode_response(raw) {
        Ok(outcome) if outcome.bus_address() != expected => Err(Error::ProtocolViolation {
            expected,
            received: outcome.bus_address(),
        }),
        Ok(outcome) => Ok(outcome),
        Err(e) => match codec::peek_bus_address(raw) {
            Some(received) if received != expected => {
                Err(Error::ProtocolViolation { expected, received })
            }
            _ => Err(e),
        },
    }
}
