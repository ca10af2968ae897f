//! Transport implementations for spcelib.
//!
//! This crate provides concrete implementations of the
//! [`Transport`](spcelib_core::Transport) trait from `spcelib-core`:
//!
//! - [`SerialTransport`]: RS-232 / RS-485 links, directly or through a USB
//!   adapter
//! - [`TcpTransport`]: serial device servers (terminal servers) that bridge
//!   the controller's serial port onto TCP
//!
//! # Example
//!
//! ```no_run
//! use spcelib_transport::SerialTransport;
//! use spcelib_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> spcelib_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 9600).await?;
//!
//! // Read Voltage on bus address 01
//! transport.send(b"~01 0C 92\r").await?;
//!
//! let mut buf = [0u8; 128];
//! let n = transport.receive(&mut buf, Duration::from_millis(500)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;
pub mod tcp;

pub use serial::{DataBits, FlowControl, Parity, SerialConfig, SerialTransport, StopBits};
pub use tcp::TcpTransport;
