//! Simulated SPCe ion pump controller.
//!
//! - **Device model** ([`model`]) -- controller state, random-walk telemetry
//!   and a command dispatch table that answers raw request frames.
//! - **Pressure** ([`pressure`]) -- the current to pressure conversion.
//! - **In-process transport** ([`transport`]) -- [`SimulatedTransport`]
//!   connects a client straight to a model.
//! - **Host** ([`server`]) -- serve a model over TCP or a serial port (for
//!   example one end of a `socat` pty pair).
//!
//! # Example
//!
//! ```
//! use spcelib_protocol::ProtocolClient;
//! use spcelib_protocol::commands::cmd_read_model;
//! use spcelib_core::types::BusAddress;
//! use spcelib_sim::{DeviceModel, SimulatedTransport};
//!
//! # async fn example() -> spcelib_core::Result<()> {
//! let client = ProtocolClient::new(Box::new(SimulatedTransport::new(DeviceModel::default())));
//! let model = client.request(&cmd_read_model(), BusAddress::DEFAULT).await?;
//! assert_eq!(model.to_string(), "SPCe-1000");
//! # Ok(())
//! # }
//! ```

pub mod model;
pub mod pressure;
pub mod server;
pub mod transport;

pub use model::{DeviceModel, DeviceState, SimConfig};
pub use server::{SimHandle, spawn_serial, spawn_tcp};
pub use transport::SimulatedTransport;
