//! Transport trait for controller communication.
//!
//! The [`Transport`] trait abstracts over the physical link to a controller:
//! an RS-232/RS-485 serial port, a TCP socket to a serial device server, an
//! in-process simulator, or a scripted mock for tests.
//!
//! The protocol client in `spcelib-protocol` operates on a `Transport` rather
//! than directly on a serial port, so the same request logic drives real
//! hardware, the simulator, and deterministic unit tests.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a controller.
///
/// Implementations move raw bytes only. Framing, checksums, and addressing
/// are handled by the codec that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the controller.
    ///
    /// Completes once all bytes have been handed to the underlying link.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the controller into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Waits up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if nothing is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Loopback {
        pending: Vec<u8>,
        open: bool,
    }

    #[async_trait]
    impl Transport for Loopback {
        async fn send(&mut self, data: &[u8]) -> Result<()> {
            if !self.open {
                return Err(Error::NotConnected);
            }
            self.pending.extend_from_slice(data);
            Ok(())
        }

        async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            if !self.open {
                return Err(Error::NotConnected);
            }
            if self.pending.is_empty() {
                return Err(Error::Timeout);
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }

        async fn close(&mut self) -> Result<()> {
            self.open = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.open
        }
    }

    #[tokio::test]
    async fn transport_is_object_safe() {
        let mut t: Box<dyn Transport> = Box::new(Loopback {
            pending: Vec::new(),
            open: true,
        });
        t.send(b"01 OK 00 BB\r").await.unwrap();
        let mut buf = [0u8; 64];
        let n = t.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], b"01 OK 00 BB\r");

        t.close().await.unwrap();
        assert!(!t.is_connected());
        assert!(matches!(t.send(b"x").await, Err(Error::NotConnected)));
    }
}
