//! Simulator host: serve a [`DeviceModel`] over a serial port or TCP.
//!
//! One task owns the transport and the model. Requests are answered strictly
//! in arrival order, one frame at a time; a TCP listener serves one client
//! connection at a time. Shutdown is signalled through a
//! [`CancellationToken`].

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use spcelib_core::error::{Error, Result};
use spcelib_core::transport::Transport;
use spcelib_protocol::codec;
use spcelib_transport::{SerialConfig, SerialTransport, TcpTransport};

use crate::model::DeviceModel;

/// Idle poll interval; bounds how long cancellation can go unnoticed.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Frames are a few dozen bytes; anything longer without a terminator is
/// line noise.
const MAX_BUF: usize = 1024;

/// Handle to a running simulator task.
pub struct SimHandle {
    /// Cancellation token for graceful shutdown.
    pub cancel: CancellationToken,
    /// Join handle for the serve task; yields the model back on exit.
    pub task: JoinHandle<Result<DeviceModel>>,
    local_addr: Option<SocketAddr>,
}

impl SimHandle {
    /// Address the TCP listener is bound to, if serving TCP.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop serving and wait for the task to finish.
    pub async fn shutdown(self) -> Result<DeviceModel> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| Error::Transport(format!("simulator task failed: {e}")))?
    }
}

/// Bind `addr` and serve TCP clients on a spawned task.
///
/// Use port 0 to let the OS pick; [`SimHandle::local_addr`] reports it.
pub async fn spawn_tcp(addr: &str, model: DeviceModel) -> Result<SimHandle> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, bus = %model.bus_address(), "simulator listening");

    let cancel = CancellationToken::new();
    let task = tokio::spawn(serve_tcp(listener, model, cancel.clone()));
    Ok(SimHandle {
        cancel,
        task,
        local_addr: Some(local_addr),
    })
}

/// Open `port` and serve it on a spawned task.
pub async fn spawn_serial(port: &str, config: SerialConfig, model: DeviceModel) -> Result<SimHandle> {
    let transport = SerialTransport::open_with_config(port, config).await?;
    info!(port, bus = %model.bus_address(), "simulator attached to serial port");

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        let mut transport = transport;
        let mut model = model;
        serve_transport(&mut transport, &mut model, &token).await?;
        Ok(model)
    });
    Ok(SimHandle {
        cancel,
        task,
        local_addr: None,
    })
}

/// Accept TCP clients one after another until cancelled.
pub async fn serve_tcp(
    listener: TcpListener,
    mut model: DeviceModel,
    cancel: CancellationToken,
) -> Result<DeviceModel> {
    loop {
        let (stream, peer) = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("simulator listener cancelled");
                return Ok(model);
            }

            accepted = listener.accept() => accepted?,
        };

        info!(peer = %peer, "simulator client connected");
        let mut transport = TcpTransport::from_stream(stream, peer.to_string());
        match serve_transport(&mut transport, &mut model, &cancel).await {
            Ok(()) => info!(peer = %peer, "simulator client disconnected"),
            Err(e) => warn!(peer = %peer, error = %e, "simulator client dropped"),
        }
        if cancel.is_cancelled() {
            return Ok(model);
        }
    }
}

/// Answer requests on `transport` until the peer goes away or `cancel`
/// fires.
///
/// A closed peer ends the session with `Ok(())`; other transport failures
/// are returned.
pub async fn serve_transport(
    transport: &mut dyn Transport,
    model: &mut DeviceModel,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut pending = Vec::new();
    let mut buf = [0u8; 256];

    loop {
        let n = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("simulator session cancelled");
                if let Err(e) = transport.close().await {
                    warn!(error = %e, "failed to close simulator transport");
                }
                return Ok(());
            }

            read = transport.receive(&mut buf, POLL_INTERVAL) => match read {
                Ok(0) | Err(Error::ConnectionLost) => return Ok(()),
                Ok(n) => n,
                Err(Error::Timeout) => continue,
                Err(e) => return Err(e),
            },
        };

        pending.extend_from_slice(&buf[..n]);
        while let Some(len) = codec::find_frame_end(&pending) {
            let frame: Vec<u8> = pending.drain(..len).collect();
            debug!(request = %String::from_utf8_lossy(&frame).trim_end(), "simulator received");
            let response = model.handle_request(&frame);
            debug!(response = %String::from_utf8_lossy(&response).trim_end(), "simulator sending");
            transport.send(&response).await?;
        }

        if pending.len() > MAX_BUF {
            warn!(len = pending.len(), "simulator buffer overflow, resetting");
            pending.clear();
        }
    }
}
