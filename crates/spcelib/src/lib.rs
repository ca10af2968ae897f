//! # spcelib -- async control of SPCe ion pump controllers
//!
//! `spcelib` talks to Gamma Vacuum SPCe ion pump controllers over their
//! RS-232/RS-485 serial protocol, either directly or through a serial-over-TCP
//! bridge. It also ships a simulated controller for tests and bench work
//! without hardware.
//!
//! ## Quick Start
//!
//! ```no_run
//! use spcelib::SpceBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pump = SpceBuilder::new()
//!         .serial_port("/dev/ttyUSB0")
//!         .bus_address(1)
//!         .build()
//!         .await?;
//!
//!     let t = pump.read_telemetry().await?;
//!     println!("{:.3} kV  {:.3} mA  {:.3e}", t.voltage_kv, t.current_ma, t.pressure);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                          |
//! |------------------------|--------------------------------------------------|
//! | `spcelib-core`         | [`Transport`] trait, value types, [`Error`]      |
//! | `spcelib-transport`    | Serial and TCP transports                        |
//! | `spcelib-protocol`     | Checksum, frame codec, client, typed controller  |
//! | `spcelib-sim`          | Simulated controller and its serial/TCP host     |
//! | **`spcelib`**          | This facade crate -- re-exports everything       |
//!
//! ## Feature Flags
//!
//! | Feature | Enables                               | Default |
//! |---------|---------------------------------------|---------|
//! | `sim`   | [`sim`] module (simulated controller) | yes     |

pub use spcelib_core::*;

pub use spcelib_protocol::{
    ClientConfig, ClientState, Command, ProtocolClient, ResponseOutcome, SpceBuilder,
    SpceController,
};

/// Wire protocol: checksum, frame codec and the command set.
pub mod protocol {
    pub use spcelib_protocol::{checksum, codec, commands};
}

/// Serial and TCP transports.
pub mod transport {
    pub use spcelib_transport::*;
}

/// Simulated SPCe controller.
///
/// Provides [`DeviceModel`](sim::DeviceModel), the in-process
/// [`SimulatedTransport`](sim::SimulatedTransport) and TCP/serial hosting via
/// [`spawn_tcp`](sim::spawn_tcp) and [`spawn_serial`](sim::spawn_serial).
#[cfg(feature = "sim")]
pub mod sim {
    pub use spcelib_sim::*;
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn facade_wires_controller_to_simulator() {
        let transport = sim::SimulatedTransport::new(sim::DeviceModel::default());
        let pump = SpceBuilder::new()
            .build_with_transport(Box::new(transport))
            .await
            .unwrap();
        assert_eq!(pump.pump_status().await.unwrap(), PumpStatus::Running);
    }
}
