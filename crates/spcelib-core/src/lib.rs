//! spcelib-core: Core traits, types, and error definitions for spcelib.
//!
//! This crate defines the link-agnostic abstractions shared by the protocol
//! client, the transports, and the device simulator. Applications that only
//! consume telemetry can depend on these types without pulling in a serial
//! stack.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`BusAddress`], [`CommandCode`], [`DeviceErrorCode`] -- wire-level values
//! - [`Telemetry`] -- one voltage/current/pressure sample
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use transport::Transport;
pub use types::*;
