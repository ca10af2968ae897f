//! Core value types shared by the client, the codec, and the simulator.
//!
//! Everything here is a small `Copy` value with a validated constructor and a
//! `Display` impl that renders it the way it appears on the wire.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use crate::error::{Error, Result};

/// Address of one controller on a shared bus.
///
/// The SPCe protocol renders the address as two decimal digits, so valid
/// addresses are `0..=99`. RS-232 point-to-point links conventionally use
/// address 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusAddress(u8);

impl BusAddress {
    /// Highest address that fits the two-digit wire field.
    pub const MAX: u8 = 99;

    /// Default address for a point-to-point RS-232 link.
    pub const DEFAULT: BusAddress = BusAddress(1);

    /// Validate and wrap a raw bus address.
    ///
    /// Returns [`Error::InvalidBusAddress`] for values above 99.
    pub fn new(addr: u8) -> Result<Self> {
        if addr > Self::MAX {
            return Err(Error::InvalidBusAddress(addr));
        }
        Ok(BusAddress(addr))
    }

    /// Return the raw numeric address.
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for BusAddress {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for BusAddress {
    type Error = Error;

    fn try_from(addr: u8) -> Result<Self> {
        BusAddress::new(addr)
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// One-byte command code, rendered on the wire as two uppercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandCode(pub u8);

impl CommandCode {
    /// Return the raw code byte.
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl From<u8> for CommandCode {
    fn from(code: u8) -> Self {
        CommandCode(code)
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

/// Error code carried by an `ER` response.
///
/// The code is kept as the raw byte the device sent so it can be surfaced to
/// callers verbatim; [`description`](DeviceErrorCode::description) maps the
/// codes listed in the controller manual to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceErrorCode(pub u8);

impl DeviceErrorCode {
    /// Command code or format is not correct; semantics are wrong.
    pub const BAD_COMMAND_FORMAT: DeviceErrorCode = DeviceErrorCode(0x01);
    /// Command code not recognized.
    pub const UNKNOWN_COMMAND: DeviceErrorCode = DeviceErrorCode(0x02);
    /// Request checksum did not match.
    pub const BAD_CHECKSUM: DeviceErrorCode = DeviceErrorCode(0x03);
    /// Command timed out inside the controller.
    pub const COMMAND_TIMEOUT: DeviceErrorCode = DeviceErrorCode(0x04);
    /// Firmware encountered an unknown error.
    pub const UNKNOWN_ERROR: DeviceErrorCode = DeviceErrorCode(0x06);
    /// Communication error, zero characters received.
    pub const COMM_ERROR: DeviceErrorCode = DeviceErrorCode(0x07);
    /// Request addressed to a bus address this device does not answer to.
    pub const UNKNOWN_ADDRESS: DeviceErrorCode = DeviceErrorCode(0x08);
    /// Pump size is not set, so pressure cannot be derived.
    pub const PUMP_SIZE_NOT_SET: DeviceErrorCode = DeviceErrorCode(0x22);

    /// Return the raw code byte.
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Human-readable description of the code.
    pub fn description(&self) -> &'static str {
        match self.0 {
            0x01 => "command code/format is not correct",
            0x02 => "command code not recognized",
            0x03 => "bad checksum",
            0x04 => "command timeout",
            0x06 => "firmware encountered an unknown error",
            0x07 => "communication error, zero characters received",
            0x08 => "unknown bus address",
            0x22 => "pump size is not set",
            _ => "unlisted device error",
        }
    }
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

/// Whether the ion pump high voltage supply is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PumpStatus {
    Running,
    Stopped,
}

impl PumpStatus {
    /// The token the controller uses for this status.
    pub fn as_token(&self) -> &'static str {
        match self {
            PumpStatus::Running => "RUNNING",
            PumpStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for PumpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Error returned when a string is not a known enumerated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTokenError(String);

impl fmt::Display for ParseTokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized token: {}", self.0)
    }
}

impl std::error::Error for ParseTokenError {}

impl FromStr for PumpStatus {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(PumpStatus::Running),
            "STOPPED" => Ok(PumpStatus::Stopped),
            _ => Err(ParseTokenError(s.to_string())),
        }
    }
}

/// Pressure display units.
///
/// The controller computes pressure in Torr internally and scales it by the
/// units factor of the selected unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PressureUnits {
    #[default]
    Torr,
    Mbar,
    Pascal,
}

impl PressureUnits {
    /// Single-character argument used by the set-units command.
    pub fn as_char(&self) -> char {
        match self {
            PressureUnits::Torr => 'T',
            PressureUnits::Mbar => 'M',
            PressureUnits::Pascal => 'P',
        }
    }

    /// Multiplier converting Torr into this unit.
    pub fn factor(&self) -> f64 {
        match self {
            PressureUnits::Torr => 1.0,
            PressureUnits::Mbar => 1.333_22,
            PressureUnits::Pascal => 133.322,
        }
    }
}

impl fmt::Display for PressureUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PressureUnits::Torr => "Torr",
            PressureUnits::Mbar => "mbar",
            PressureUnits::Pascal => "Pa",
        };
        f.write_str(s)
    }
}

impl FromStr for PressureUnits {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "T" | "TORR" => Ok(PressureUnits::Torr),
            "M" | "MBAR" => Ok(PressureUnits::Mbar),
            "P" | "PA" | "PASCAL" => Ok(PressureUnits::Pascal),
            _ => Err(ParseTokenError(s.to_string())),
        }
    }
}

/// One telemetry sample as handed to persistence collaborators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    /// Wall-clock time the sample was completed.
    pub timestamp: SystemTime,
    /// High voltage in kV.
    pub voltage_kv: f64,
    /// Emission current in mA.
    pub current_ma: f64,
    /// Pressure in the controller's configured units.
    pub pressure: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_address_range() {
        assert_eq!(BusAddress::new(0).unwrap().value(), 0);
        assert_eq!(BusAddress::new(99).unwrap().value(), 99);
        assert!(matches!(
            BusAddress::new(100),
            Err(Error::InvalidBusAddress(100))
        ));
    }

    #[test]
    fn bus_address_display_is_two_digits() {
        assert_eq!(BusAddress::new(5).unwrap().to_string(), "05");
        assert_eq!(BusAddress::new(42).unwrap().to_string(), "42");
    }

    #[test]
    fn bus_address_try_from() {
        let addr: BusAddress = 7u8.try_into().unwrap();
        assert_eq!(addr.value(), 7);
        assert!(BusAddress::try_from(200u8).is_err());
    }

    #[test]
    fn command_code_display_is_uppercase_hex() {
        assert_eq!(CommandCode(0x0a).to_string(), "0A");
        assert_eq!(CommandCode(0xd4).to_string(), "D4");
    }

    #[test]
    fn device_error_code_display_and_description() {
        assert_eq!(DeviceErrorCode::UNKNOWN_COMMAND.to_string(), "02");
        assert_eq!(
            DeviceErrorCode::BAD_CHECKSUM.description(),
            "bad checksum"
        );
        assert_eq!(DeviceErrorCode(0x5A).description(), "unlisted device error");
    }

    #[test]
    fn pump_status_tokens() {
        assert_eq!("RUNNING".parse::<PumpStatus>().unwrap(), PumpStatus::Running);
        assert_eq!("STOPPED".parse::<PumpStatus>().unwrap(), PumpStatus::Stopped);
        assert!("running".parse::<PumpStatus>().is_err());
        assert_eq!(PumpStatus::Running.to_string(), "RUNNING");
    }

    #[test]
    fn pressure_units_parse() {
        assert_eq!("T".parse::<PressureUnits>().unwrap(), PressureUnits::Torr);
        assert_eq!("mbar".parse::<PressureUnits>().unwrap(), PressureUnits::Mbar);
        assert_eq!("p".parse::<PressureUnits>().unwrap(), PressureUnits::Pascal);
        assert!("psi".parse::<PressureUnits>().is_err());
    }

    #[test]
    fn pressure_units_factor() {
        assert_eq!(PressureUnits::Torr.factor(), 1.0);
        assert!(PressureUnits::Pascal.factor() > PressureUnits::Mbar.factor());
        assert_eq!(PressureUnits::Mbar.as_char(), 'M');
    }
}
