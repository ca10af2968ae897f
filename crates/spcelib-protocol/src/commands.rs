//! SPCe command table, command builders, and payload parsers.
//!
//! Command builders are pure: they validate arguments and produce a
//! [`Command`] without performing any I/O. Argument validation happens here
//! so an out-of-range value is rejected with [`Error::InvalidArgument`]
//! before anything reaches the wire.
//!
//! Response payloads are interpreted through a [`PayloadTable`] mapping each
//! command code to the [`PayloadShape`] its `OK` payload is expected to take.
//! Payloads of the form `KEY=value` yield `value`; numeric shapes read the
//! first word of the value, so `3.200 mA` parses as `3.2`.

use std::collections::HashMap;

use spcelib_core::error::{Error, Result};
use spcelib_core::types::{CommandCode, PressureUnits};

use crate::codec::Command;

// ---------------------------------------------------------------
// Command codes
// ---------------------------------------------------------------

pub const READ_MODEL: CommandCode = CommandCode(0x01);
pub const READ_VERSION: CommandCode = CommandCode(0x02);
pub const RESET: CommandCode = CommandCode(0x07);
pub const READ_CURRENT: CommandCode = CommandCode(0x0A);
pub const READ_PRESSURE: CommandCode = CommandCode(0x0B);
pub const READ_VOLTAGE: CommandCode = CommandCode(0x0C);
pub const GET_PUMP_STATUS: CommandCode = CommandCode(0x0D);
pub const SET_PRESSURE_UNITS: CommandCode = CommandCode(0x0E);
pub const GET_PUMP_SIZE: CommandCode = CommandCode(0x11);
pub const SET_PUMP_SIZE: CommandCode = CommandCode(0x12);
pub const GET_CAL_FACTOR: CommandCode = CommandCode(0x1D);
pub const SET_CAL_FACTOR: CommandCode = CommandCode(0x1E);
pub const SET_AUTO_RESTART: CommandCode = CommandCode(0x33);
pub const GET_AUTO_RESTART: CommandCode = CommandCode(0x34);
pub const START_PUMP: CommandCode = CommandCode(0x37);
pub const STOP_PUMP: CommandCode = CommandCode(0x38);
pub const LOCK_KEYPAD: CommandCode = CommandCode(0x44);
pub const UNLOCK_KEYPAD: CommandCode = CommandCode(0x45);
pub const SET_COMM_INTERFACE: CommandCode = CommandCode(0x4B);
pub const GET_ANALOG_MODE: CommandCode = CommandCode(0x50);
pub const SET_ANALOG_MODE: CommandCode = CommandCode(0x51);
pub const GET_HIGH_VOLTAGE: CommandCode = CommandCode(0x61);
pub const SET_HV_AUTORECOVERY: CommandCode = CommandCode(0x68);
pub const GET_HV_AUTORECOVERY: CommandCode = CommandCode(0x69);
pub const SET_ARC_DETECT: CommandCode = CommandCode(0x91);
pub const GET_ARC_DETECT: CommandCode = CommandCode(0x92);
pub const SET_COMM_MODE: CommandCode = CommandCode(0xD3);
pub const GET_COMM_MODE: CommandCode = CommandCode(0xD4);

/// Tokens of the pump status payload.
pub const PUMP_STATUS_TOKENS: &[&str] = &["RUNNING", "STOPPED"];

/// Tokens of yes/no payloads and arguments.
pub const YES_NO_TOKENS: &[&str] = &["YES", "NO"];

// ---------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------

/// Expected shape of an `OK` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Float,
    Integer,
    Text,
    /// One of a fixed set of tokens.
    Token(&'static [&'static str]),
    /// Acknowledgement; any payload is ignored.
    Ack,
}

impl PayloadShape {
    /// Short name used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            PayloadShape::Float => "float",
            PayloadShape::Integer => "integer",
            PayloadShape::Text => "string",
            PayloadShape::Token(_) => "enumerated token",
            PayloadShape::Ack => "acknowledgement",
        }
    }
}

/// A parsed payload value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f64),
    Integer(i64),
    Text(String),
    Token(String),
    Empty,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Token(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Text(s) | Value::Token(s) => f.write_str(s),
            Value::Empty => f.write_str("OK"),
        }
    }
}

/// Mapping from command code to expected payload shape.
///
/// Codes missing from the table are treated as [`PayloadShape::Text`].
#[derive(Debug, Clone)]
pub struct PayloadTable {
    shapes: HashMap<CommandCode, PayloadShape>,
}

impl PayloadTable {
    /// An empty table: every payload is returned as text.
    pub fn empty() -> Self {
        PayloadTable {
            shapes: HashMap::new(),
        }
    }

    /// The table for the SPCe command set.
    pub fn spce() -> Self {
        use PayloadShape::*;
        let entries = [
            (READ_MODEL, Text),
            (READ_VERSION, Text),
            (RESET, Ack),
            (READ_CURRENT, Float),
            (READ_PRESSURE, Float),
            (READ_VOLTAGE, Float),
            (GET_PUMP_STATUS, Token(PUMP_STATUS_TOKENS)),
            (SET_PRESSURE_UNITS, Ack),
            (GET_PUMP_SIZE, Integer),
            (SET_PUMP_SIZE, Ack),
            (GET_CAL_FACTOR, Float),
            (SET_CAL_FACTOR, Ack),
            (SET_AUTO_RESTART, Ack),
            (GET_AUTO_RESTART, Token(YES_NO_TOKENS)),
            (START_PUMP, Ack),
            (STOP_PUMP, Ack),
            (LOCK_KEYPAD, Ack),
            (UNLOCK_KEYPAD, Ack),
            (SET_COMM_INTERFACE, Ack),
            (GET_ANALOG_MODE, Integer),
            (SET_ANALOG_MODE, Ack),
            (GET_HIGH_VOLTAGE, Token(YES_NO_TOKENS)),
            (SET_HV_AUTORECOVERY, Ack),
            (GET_HV_AUTORECOVERY, Integer),
            (SET_ARC_DETECT, Ack),
            (GET_ARC_DETECT, Token(YES_NO_TOKENS)),
            (SET_COMM_MODE, Ack),
            (GET_COMM_MODE, Integer),
        ];
        PayloadTable {
            shapes: entries.into_iter().collect(),
        }
    }

    /// Add or replace the shape for `code`.
    pub fn insert(&mut self, code: CommandCode, shape: PayloadShape) {
        self.shapes.insert(code, shape);
    }

    /// The expected shape for `code`.
    pub fn shape_for(&self, code: CommandCode) -> PayloadShape {
        self.shapes.get(&code).copied().unwrap_or(PayloadShape::Text)
    }
}

impl Default for PayloadTable {
    fn default() -> Self {
        Self::spce()
    }
}

/// Strip a `KEY=` prefix from a payload.
///
/// ```
/// use spcelib_protocol::commands::extract_value;
///
/// assert_eq!(extract_value("MODEL=SPCe-1000"), "SPCe-1000");
/// assert_eq!(extract_value("3.200 mA"), "3.200 mA");
/// ```
pub fn extract_value(payload: &str) -> &str {
    match payload.split_once('=') {
        Some((_, value)) => value.trim(),
        None => payload.trim(),
    }
}

/// Interpret an `OK` payload for `code` according to `shape`.
pub fn parse_payload(code: CommandCode, shape: PayloadShape, payload: &str) -> Result<Value> {
    let value = extract_value(payload);
    let first_word = value.split_whitespace().next().unwrap_or("");
    let mismatch = || Error::UnexpectedPayloadShape {
        code,
        expected: shape.describe(),
        payload: payload.to_string(),
    };

    match shape {
        PayloadShape::Ack => Ok(Value::Empty),
        PayloadShape::Text => Ok(Value::Text(value.to_string())),
        PayloadShape::Float => first_word
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::Float)
            .ok_or_else(mismatch),
        PayloadShape::Integer => first_word
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| mismatch()),
        PayloadShape::Token(allowed) => {
            if allowed.contains(&first_word) {
                Ok(Value::Token(first_word.to_string()))
            } else {
                Err(mismatch())
            }
        }
    }
}

// ---------------------------------------------------------------
// Command builders
// ---------------------------------------------------------------

/// Build a "read model" command.
pub fn cmd_read_model() -> Command {
    Command::new(READ_MODEL)
}

/// Build a "read firmware version" command.
pub fn cmd_read_version() -> Command {
    Command::new(READ_VERSION)
}

/// Build a "reset controller" command.
pub fn cmd_reset() -> Command {
    Command::new(RESET)
}

/// Build a "read emission current" command.
pub fn cmd_read_current() -> Command {
    Command::new(READ_CURRENT)
}

/// Build a "read pressure" command.
pub fn cmd_read_pressure() -> Command {
    Command::new(READ_PRESSURE)
}

/// Build a "read high voltage" command.
pub fn cmd_read_voltage() -> Command {
    Command::new(READ_VOLTAGE)
}

pub fn cmd_get_pump_status() -> Command {
    Command::new(GET_PUMP_STATUS)
}

/// Build a "set pressure units" command (`T`, `M` or `P`).
pub fn cmd_set_units(units: PressureUnits) -> Command {
    Command::with_argument(SET_PRESSURE_UNITS, units.as_char().to_string())
}

pub fn cmd_get_pump_size() -> Command {
    Command::new(GET_PUMP_SIZE)
}

/// Build a "set pump size" command.
///
/// The size in L/s is sent as four zero-padded digits, so it must be at
/// most 9999.
pub fn cmd_set_pump_size(liters_per_second: u16) -> Result<Command> {
    if liters_per_second > 9999 {
        return Err(Error::InvalidArgument(format!(
            "pump size {} L/s out of range 0-9999",
            liters_per_second
        )));
    }
    Ok(Command::with_argument(
        SET_PUMP_SIZE,
        format!("{:04}", liters_per_second),
    ))
}

pub fn cmd_get_cal_factor() -> Command {
    Command::new(GET_CAL_FACTOR)
}

/// Build a "set calibration factor" command, formatted with two decimals.
pub fn cmd_set_cal_factor(factor: f64) -> Result<Command> {
    if !(0.0..=9.99).contains(&factor) {
        return Err(Error::InvalidArgument(format!(
            "calibration factor {} out of range 0.00-9.99",
            factor
        )));
    }
    Ok(Command::with_argument(SET_CAL_FACTOR, format!("{:.2}", factor)))
}

pub fn cmd_set_auto_restart(enabled: bool) -> Command {
    Command::with_argument(SET_AUTO_RESTART, yes_no(enabled))
}

pub fn cmd_get_auto_restart() -> Command {
    Command::new(GET_AUTO_RESTART)
}

pub fn cmd_start_pump() -> Command {
    Command::new(START_PUMP)
}

pub fn cmd_stop_pump() -> Command {
    Command::new(STOP_PUMP)
}

pub fn cmd_lock_keypad() -> Command {
    Command::new(LOCK_KEYPAD)
}

pub fn cmd_unlock_keypad() -> Command {
    Command::new(UNLOCK_KEYPAD)
}

pub fn cmd_get_analog_mode() -> Command {
    Command::new(GET_ANALOG_MODE)
}

/// Build a "set analog output mode" command. Valid modes are 0-6 and 8-10.
pub fn cmd_set_analog_mode(mode: u8) -> Result<Command> {
    if !matches!(mode, 0..=6 | 8..=10) {
        return Err(Error::InvalidArgument(format!(
            "analog mode {} not one of 0-6, 8-10",
            mode
        )));
    }
    Ok(Command::with_argument(SET_ANALOG_MODE, mode.to_string()))
}

/// Build a "is high voltage on" query.
pub fn cmd_get_high_voltage() -> Command {
    Command::new(GET_HIGH_VOLTAGE)
}

/// Build a "set HV autorecovery" command (0-2).
pub fn cmd_set_hv_autorecovery(mode: u8) -> Result<Command> {
    check_range("HV autorecovery mode", mode, 2)?;
    Ok(Command::with_argument(SET_HV_AUTORECOVERY, mode.to_string()))
}

pub fn cmd_get_hv_autorecovery() -> Command {
    Command::new(GET_HV_AUTORECOVERY)
}

pub fn cmd_set_arc_detect(enabled: bool) -> Command {
    Command::with_argument(SET_ARC_DETECT, yes_no(enabled))
}

pub fn cmd_get_arc_detect() -> Command {
    Command::new(GET_ARC_DETECT)
}

/// Build a "set comm mode" command (0-2).
pub fn cmd_set_comm_mode(mode: u8) -> Result<Command> {
    check_range("comm mode", mode, 2)?;
    Ok(Command::with_argument(SET_COMM_MODE, mode.to_string()))
}

pub fn cmd_get_comm_mode() -> Command {
    Command::new(GET_COMM_MODE)
}

/// Build a "set comm interface" command (0-5).
pub fn cmd_set_comm_interface(interface: u8) -> Result<Command> {
    check_range("comm interface", interface, 5)?;
    Ok(Command::with_argument(
        SET_COMM_INTERFACE,
        interface.to_string(),
    ))
}

fn check_range(what: &str, value: u8, max: u8) -> Result<()> {
    if value > max {
        return Err(Error::InvalidArgument(format!(
            "{} {} out of range 0-{}",
            what, value, max
        )));
    }
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "YES" } else { "NO" }
}

/// Parse a `YES`/`NO` token.
pub fn parse_yes_no(code: CommandCode, token: &str) -> Result<bool> {
    match token {
        "YES" => Ok(true),
        "NO" => Ok(false),
        _ => Err(Error::UnexpectedPayloadShape {
            code,
            expected: "YES/NO",
            payload: token.to_string(),
        }),
    }
}
