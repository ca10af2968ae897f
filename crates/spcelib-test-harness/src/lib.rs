//! spcelib-test-harness: Test utilities and mock transports for spcelib.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the protocol client without a controller attached, and
//! [`MockTcpServer`] for exercising the client over a real TCP socket.

pub mod mock_serial;
pub mod mock_tcp;

pub use mock_serial::{MockTransport, SentLog};
pub use mock_tcp::MockTcpServer;
