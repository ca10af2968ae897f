//! SpceBuilder -- fluent builder for constructing [`SpceController`] instances.
//!
//! Separates configuration from construction so that callers can set up the
//! link (serial port or TCP bridge), bus address, retry policy and timeout
//! values before the transport is opened.
//!
//! # Example
//!
//! ```no_run
//! use spcelib_protocol::builder::SpceBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> spcelib_core::Result<()> {
//! let pump = SpceBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .baud_rate(9600)
//!     .bus_address(5)
//!     .command_timeout(Duration::from_millis(300))
//!     .build()
//!     .await?;
//! let kv = pump.voltage_kv().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use spcelib_core::error::{Error, Result};
use spcelib_core::transport::Transport;
use spcelib_core::types::BusAddress;
use spcelib_transport::{SerialConfig, SerialTransport, TcpTransport};

use crate::client::{ClientConfig, ProtocolClient};
use crate::commands::PayloadTable;
use crate::controller::SpceController;

/// Fluent builder for [`SpceController`].
pub struct SpceBuilder {
    bus_address: u8,
    serial_port: Option<String>,
    serial_config: SerialConfig,
    tcp_address: Option<String>,
    auto_retry: bool,
    max_retries: u32,
    retry_backoff: Duration,
    command_timeout: Duration,
    payload_table: PayloadTable,
}

impl Default for SpceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SpceBuilder {
    pub fn new() -> Self {
        let client = ClientConfig::default();
        SpceBuilder {
            bus_address: BusAddress::DEFAULT.value(),
            serial_port: None,
            serial_config: SerialConfig::default(),
            tcp_address: None,
            auto_retry: true,
            max_retries: client.retries,
            retry_backoff: client.backoff,
            command_timeout: client.timeout,
            payload_table: PayloadTable::spce(),
        }
    }

    /// Bus address of the controller (0-99, default 1). Checked at build.
    pub fn bus_address(mut self, address: u8) -> Self {
        self.bus_address = address;
        self
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the baud rate (default: 9600).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.serial_config.baud_rate = baud;
        self
    }

    /// Replace the full serial line configuration.
    pub fn serial_config(mut self, config: SerialConfig) -> Self {
        self.serial_config = config;
        self
    }

    /// Reach the controller through a serial-over-TCP bridge at
    /// `host:port`. Takes precedence over [`serial_port()`](Self::serial_port).
    pub fn tcp_address(mut self, addr: &str) -> Self {
        self.tcp_address = Some(addr.to_string());
        self
    }

    /// Enable or disable automatic retry on transient failures.
    pub fn auto_retry(mut self, enabled: bool) -> Self {
        self.auto_retry = enabled;
        self
    }

    /// Set the maximum number of retry attempts (default: 3).
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Base delay between attempts (default: 20ms, grows linearly).
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the timeout for waiting for a response to a single command
    /// (default: 500ms).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Replace the payload table, e.g. to register firmware-specific codes.
    pub fn payload_table(mut self, table: PayloadTable) -> Self {
        self.payload_table = table;
        self
    }

    /// The client policy this builder would produce.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: self.command_timeout,
            retries: if self.auto_retry { self.max_retries } else { 0 },
            backoff: self.retry_backoff,
        }
    }

    /// Build a [`SpceController`] with a caller-provided transport.
    ///
    /// This is the entry point for tests (pass a `MockTransport` from
    /// `spcelib-test-harness`) and for callers that manage the transport
    /// lifecycle themselves.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<SpceController> {
        let bus_address = BusAddress::new(self.bus_address)?;
        let config = self.client_config();
        let client = ProtocolClient::with_config(transport, config, self.payload_table);
        Ok(SpceController::new(client, bus_address))
    }

    /// Open the configured link and build a [`SpceController`].
    ///
    /// Requires [`tcp_address()`](Self::tcp_address) or
    /// [`serial_port()`](Self::serial_port).
    pub async fn build(self) -> Result<SpceController> {
        BusAddress::new(self.bus_address)?;
        let transport: Box<dyn Transport> = match (&self.tcp_address, &self.serial_port) {
            (Some(addr), _) => Box::new(TcpTransport::connect(addr).await?),
            (None, Some(port)) => Box::new(
                SerialTransport::open_with_config(port, self.serial_config.clone()).await?,
            ),
            (None, None) => {
                return Err(Error::InvalidArgument(
                    "serial_port or tcp_address is required for build()".into(),
                ));
            }
        };
        self.build_with_transport(transport).await
    }
}
