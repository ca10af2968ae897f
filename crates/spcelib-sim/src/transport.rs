//! In-process transport backed by a [`DeviceModel`].
//!
//! Lets a [`ProtocolClient`](spcelib_protocol::ProtocolClient) talk to the
//! simulator without any I/O. Every complete frame written is answered
//! immediately; partial frames are held until their terminator arrives.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use spcelib_core::error::{Error, Result};
use spcelib_core::transport::Transport;
use spcelib_protocol::codec;
use tracing::trace;

use crate::model::DeviceModel;

/// Shared handle to a simulated controller.
pub type SharedModel = Arc<Mutex<DeviceModel>>;

pub struct SimulatedTransport {
    model: SharedModel,
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
    connected: bool,
}

impl SimulatedTransport {
    pub fn new(model: DeviceModel) -> Self {
        Self::with_shared(Arc::new(Mutex::new(model)))
    }

    /// Attach to a model that the caller keeps a handle to.
    pub fn with_shared(model: SharedModel) -> Self {
        SimulatedTransport {
            model,
            inbound: Vec::new(),
            outbound: VecDeque::new(),
            connected: true,
        }
    }

    pub fn model(&self) -> SharedModel {
        Arc::clone(&self.model)
    }

    fn lock_model(&self) -> MutexGuard<'_, DeviceModel> {
        self.model.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        trace!(bytes = data.len(), "simulated send");
        self.inbound.extend_from_slice(data);

        while let Some(len) = codec::find_frame_end(&self.inbound) {
            let frame: Vec<u8> = self.inbound.drain(..len).collect();
            let response = self.lock_model().handle_request(&frame);
            self.outbound.extend(response);
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if self.outbound.is_empty() {
            tokio::time::sleep(timeout).await;
            return Err(Error::Timeout);
        }
        let n = buf.len().min(self.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.inbound.clear();
        self.outbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
