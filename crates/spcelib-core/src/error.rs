//! Error types for spcelib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, framing faults,
//! device-reported errors, and client-side misuse are all captured here.

use crate::types::{BusAddress, CommandCode, DeviceErrorCode};

/// The error type for all spcelib operations.
///
/// Variants distinguish failures the client may retry (timeouts and damaged
/// frames) from failures that are final for a request (device errors,
/// addressing faults, payload shape mismatches).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A bus address outside `0..=99` was supplied.
    #[error("invalid bus address: {0} (must be 0-99)")]
    InvalidBusAddress(u8),

    /// The bytes received do not form a valid frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The checksum field did not match the checksum computed over the body.
    #[error("checksum mismatch: computed {computed:02X}, frame carries {received:02X}")]
    ChecksumMismatch { computed: u8, received: u8 },

    /// No complete response arrived before the per-attempt deadline.
    #[error("timeout waiting for response")]
    Timeout,

    /// A response arrived from a bus address other than the one addressed.
    #[error("protocol violation: sent to bus {expected}, response from bus {received}")]
    ProtocolViolation {
        expected: BusAddress,
        received: BusAddress,
    },

    /// The controller answered with an `ER` response.
    #[error("device error {code} on bus {bus_address}: {}", .code.description())]
    Device {
        bus_address: BusAddress,
        code: DeviceErrorCode,
    },

    /// The payload of an `OK` response did not match the shape expected for
    /// the command.
    #[error("unexpected payload for command {code}: expected {expected}, got {payload:?}")]
    UnexpectedPayloadShape {
        code: CommandCode,
        expected: &'static str,
        payload: String,
    },

    /// A request is already in flight on this client.
    #[error("bus busy: a request is already in flight")]
    Busy,

    /// Pressure cannot be derived while the pump size is zero.
    #[error("division by zero: pump size is 0")]
    DivisionByZero,

    /// A command argument failed validation before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A transport-level error (serial port, TCP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport has not been opened or was closed.
    #[error("not connected")]
    NotConnected,

    /// The connection to the controller was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the client should resend the request after this error.
    ///
    /// Only transient link faults qualify: a response that never arrived or
    /// arrived damaged. Everything else is returned to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout | Error::MalformedFrame(_) | Error::ChecksumMismatch { .. }
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(n: u8) -> BusAddress {
        BusAddress::new(n).unwrap()
    }

    #[test]
    fn error_display_invalid_bus_address() {
        let e = Error::InvalidBusAddress(120);
        assert_eq!(e.to_string(), "invalid bus address: 120 (must be 0-99)");
    }

    #[test]
    fn error_display_malformed_frame() {
        let e = Error::MalformedFrame("missing terminator".into());
        assert_eq!(e.to_string(), "malformed frame: missing terminator");
    }

    #[test]
    fn error_display_checksum_mismatch() {
        let e = Error::ChecksumMismatch {
            computed: 0x0B,
            received: 0x0C,
        };
        assert_eq!(
            e.to_string(),
            "checksum mismatch: computed 0B, frame carries 0C"
        );
    }

    #[test]
    fn error_display_timeout() {
        let e = Error::Timeout;
        assert_eq!(e.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_protocol_violation() {
        let e = Error::ProtocolViolation {
            expected: bus(1),
            received: bus(2),
        };
        assert_eq!(
            e.to_string(),
            "protocol violation: sent to bus 01, response from bus 02"
        );
    }

    #[test]
    fn error_display_device() {
        let e = Error::Device {
            bus_address: bus(1),
            code: DeviceErrorCode::UNKNOWN_COMMAND,
        };
        assert_eq!(
            e.to_string(),
            "device error 02 on bus 01: command code not recognized"
        );
    }

    #[test]
    fn error_display_unexpected_payload() {
        let e = Error::UnexpectedPayloadShape {
            code: CommandCode(0x0A),
            expected: "float",
            payload: "abc".into(),
        };
        assert_eq!(
            e.to_string(),
            "unexpected payload for command 0A: expected float, got \"abc\""
        );
    }

    #[test]
    fn error_display_busy() {
        assert_eq!(
            Error::Busy.to_string(),
            "bus busy: a request is already in flight"
        );
    }

    #[test]
    fn error_display_division_by_zero() {
        assert_eq!(
            Error::DivisionByZero.to_string(),
            "division by zero: pump size is 0"
        );
    }

    #[test]
    fn error_display_not_connected() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
    }

    #[test]
    fn error_display_connection_lost() {
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn retryable_classification() {
        assert!(Error::Timeout.is_retryable());
        assert!(Error::MalformedFrame("x".into()).is_retryable());
        assert!(
            Error::ChecksumMismatch {
                computed: 1,
                received: 2
            }
            .is_retryable()
        );
        assert!(!Error::Busy.is_retryable());
        assert!(!Error::ConnectionLost.is_retryable());
        assert!(
            !Error::ProtocolViolation {
                expected: bus(1),
                received: bus(3)
            }
            .is_retryable()
        );
        assert!(
            !Error::Device {
                bus_address: bus(1),
                code: DeviceErrorCode::BAD_CHECKSUM
            }
            .is_retryable()
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
