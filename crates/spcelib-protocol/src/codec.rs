//! SPCe frame encoder/decoder.
//!
//! The SPCe serial protocol uses space-separated ASCII fields terminated by a
//! carriage return, with an additive checksum as the last field.
//!
//! # Request format
//!
//! ```text
//! ~AA CC[ ARG] KK\r
//! ```
//!
//! - `~`: start character (0x7E).
//! - `AA`: bus address, two decimal digits (`00`-`99`).
//! - `CC`: command code, two uppercase hex digits.
//! - `ARG`: optional argument (e.g. `0550` for a pump size).
//! - `KK`: checksum over everything from `~` up to and including the space
//!   before it, two uppercase hex digits.
//!
//! # Response format
//!
//! ```text
//! AA OK 00[ PAYLOAD] KK\r
//! AA ER EE KK\r
//! ```
//!
//! A successful response carries the literal `00` field followed by an
//! optional payload (which may itself contain spaces, e.g. `3.200 mA`).
//! An error response carries a two-digit hex error code instead.
//!
//! The client side uses [`encode_request`] and [`decode_response`]; the
//! simulator uses the mirror pair [`decode_request`] and
//! [`encode_ok_response`] / [`encode_error_response`].

use bytes::{BufMut, BytesMut};

use spcelib_core::error::{Error, Result};
use spcelib_core::types::{BusAddress, CommandCode, DeviceErrorCode};

use crate::checksum::{self, Checksum};

/// Request start character.
pub const START: u8 = b'~';

/// Frame terminator.
pub const TERMINATOR: u8 = b'\r';

/// Field separator.
pub const SEPARATOR: u8 = b' ';

/// Status token of a successful response.
pub const STATUS_OK: &str = "OK";

/// Status token of an error response.
pub const STATUS_ERROR: &str = "ER";

/// Literal field following `OK` in every successful response.
pub const OK_CODE: &str = "00";

/// A command to send: a code and an optional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub code: CommandCode,
    pub argument: Option<String>,
}

impl Command {
    /// A command without an argument.
    pub fn new(code: CommandCode) -> Self {
        Command {
            code,
            argument: None,
        }
    }

    /// A command carrying an argument.
    pub fn with_argument(code: CommandCode, argument: impl Into<String>) -> Self {
        Command {
            code,
            argument: Some(argument.into()),
        }
    }
}

/// A decoded request, as seen by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub bus_address: BusAddress,
    pub command: Command,
    pub checksum: Checksum,
}

/// A decoded response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// `OK` response. `payload` is empty for acknowledgements.
    Ok {
        bus_address: BusAddress,
        payload: String,
    },
    /// `ER` response with the device's error code.
    DeviceError {
        bus_address: BusAddress,
        code: DeviceErrorCode,
    },
}

impl ResponseOutcome {
    /// The bus address the response came from.
    pub fn bus_address(&self) -> BusAddress {
        match self {
            ResponseOutcome::Ok { bus_address, .. } => *bus_address,
            ResponseOutcome::DeviceError { bus_address, .. } => *bus_address,
        }
    }
}

/// Encode a request frame ready for transmission.
///
/// Fails with [`Error::InvalidArgument`] when the argument is empty or
/// contains a space or a control character, since either would break the
/// field layout.
///
/// # Example
///
/// ```
/// use spcelib_core::{BusAddress, CommandCode};
/// use spcelib_protocol::codec::{encode_request, Command};
///
/// let bus = BusAddress::new(1).unwrap();
/// let frame = encode_request(bus, &Command::new(CommandCode(0x0A))).unwrap();
/// assert_eq!(frame, b"~01 0A 90\r");
/// ```
pub fn encode_request(bus_address: BusAddress, command: &Command) -> Result<Vec<u8>> {
    if let Some(arg) = &command.argument {
        validate_argument(arg)?;
    }

    let arg_len = command.argument.as_ref().map_or(0, |a| a.len() + 1);
    let mut buf = BytesMut::with_capacity(10 + arg_len);
    buf.put_u8(START);
    buf.put_slice(bus_address.to_string().as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(command.code.to_string().as_bytes());
    if let Some(arg) = &command.argument {
        buf.put_u8(SEPARATOR);
        buf.put_slice(arg.as_bytes());
    }
    Ok(seal(buf))
}

/// Encode an `OK` response. An empty payload is omitted with its separator.
pub fn encode_ok_response(bus_address: BusAddress, payload: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(12 + payload.len());
    buf.put_slice(bus_address.to_string().as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(STATUS_OK.as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(OK_CODE.as_bytes());
    if !payload.is_empty() {
        buf.put_u8(SEPARATOR);
        buf.put_slice(payload.as_bytes());
    }
    seal(buf)
}

/// Encode an `ER` response carrying `code`.
pub fn encode_error_response(bus_address: BusAddress, code: DeviceErrorCode) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(12);
    buf.put_slice(bus_address.to_string().as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(STATUS_ERROR.as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(code.to_string().as_bytes());
    seal(buf)
}

/// Append the separator, checksum and terminator to a frame body.
fn seal(mut buf: BytesMut) -> Vec<u8> {
    buf.put_u8(SEPARATOR);
    let ck = checksum::compute(&buf);
    buf.put_slice(ck.to_string().as_bytes());
    buf.put_u8(TERMINATOR);
    buf.to_vec()
}

fn validate_argument(arg: &str) -> Result<()> {
    if arg.is_empty() {
        return Err(Error::InvalidArgument("argument is empty".into()));
    }
    if arg.chars().any(|c| c.is_control() || c == ' ') {
        return Err(Error::InvalidArgument(format!(
            "argument {:?} contains a space or control character",
            arg
        )));
    }
    Ok(())
}

/// Locate the end of the first frame in an accumulating read buffer.
///
/// Returns the length of the frame including its terminator, or `None` if
/// no terminator has arrived yet.
pub fn find_frame_end(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == TERMINATOR).map(|pos| pos + 1)
}

/// Decode one complete response frame.
///
/// Validation order: terminator, field layout, checksum, then the bus
/// address, status and code fields. A checksum failure is reported as
/// [`Error::ChecksumMismatch`] and never as [`Error::MalformedFrame`].
pub fn decode_response(raw: &[u8]) -> Result<ResponseOutcome> {
    let (body, fields) = split_frame(raw)?;
    if fields.len() < 3 {
        return Err(malformed(format!(
            "expected at least 3 fields, found {}",
            fields.len()
        )));
    }
    verify_checksum(body, fields[fields.len() - 1])?;

    let bus_address = parse_bus_address(fields[0])?;
    let fields = &fields[..fields.len() - 1];

    match fields[1] {
        STATUS_OK => {
            if fields.len() < 3 || fields[2] != OK_CODE {
                return Err(malformed("OK response without 00 field".into()));
            }
            Ok(ResponseOutcome::Ok {
                bus_address,
                payload: fields[3..].join(" "),
            })
        }
        STATUS_ERROR => {
            if fields.len() != 3 {
                return Err(malformed(format!(
                    "ER response with {} fields",
                    fields.len() + 1
                )));
            }
            let code = parse_hex_byte(fields[2])
                .ok_or_else(|| malformed(format!("bad error code {:?}", fields[2])))?;
            Ok(ResponseOutcome::DeviceError {
                bus_address,
                code: DeviceErrorCode(code),
            })
        }
        other => Err(malformed(format!("unknown status {:?}", other))),
    }
}

/// Decode one complete request frame.
///
/// Validation order: terminator, `~` start character, field layout,
/// checksum, then the bus address and command code fields.
pub fn decode_request(raw: &[u8]) -> Result<RequestFrame> {
    let (body, fields) = split_frame(raw)?;
    if body.first() != Some(&START) {
        return Err(malformed("request does not start with '~'".into()));
    }
    if fields.len() < 3 {
        return Err(malformed(format!(
            "expected at least 3 fields, found {}",
            fields.len()
        )));
    }
    let checksum = verify_checksum(body, fields[fields.len() - 1])?;

    let bus_address = parse_bus_address(&fields[0][1..])?;
    let code = parse_hex_byte(fields[1])
        .ok_or_else(|| malformed(format!("bad command code {:?}", fields[1])))?;
    let args = &fields[2..fields.len() - 1];
    let argument = if args.is_empty() {
        None
    } else {
        Some(args.join(" "))
    };

    Ok(RequestFrame {
        bus_address,
        command: Command {
            code: CommandCode(code),
            argument,
        },
        checksum,
    })
}

/// Read the leading bus address of a frame without validating anything else.
///
/// Used to attribute a damaged response to its sender. Accepts both request
/// (`~AA`) and response (`AA`) frames.
pub fn peek_bus_address(raw: &[u8]) -> Option<BusAddress> {
    let raw = raw.strip_prefix(&[START]).unwrap_or(raw);
    let field = raw.get(..2)?;
    if raw.get(2).is_some_and(|&b| b != SEPARATOR) {
        return None;
    }
    let field = std::str::from_utf8(field).ok()?;
    parse_bus_address(field).ok()
}

/// Check the terminator and split the body into fields.
fn split_frame(raw: &[u8]) -> Result<(&[u8], Vec<&str>)> {
    let body = match raw.split_last() {
        Some((&TERMINATOR, body)) => body,
        _ => return Err(malformed("missing terminator".into())),
    };
    if body.contains(&TERMINATOR) {
        return Err(malformed("terminator inside frame".into()));
    }
    let text = std::str::from_utf8(body).map_err(|_| malformed("frame is not ASCII".into()))?;
    let fields: Vec<&str> = text.split(' ').collect();
    if fields.iter().any(|f| f.is_empty()) {
        return Err(malformed("empty field".into()));
    }
    Ok((body, fields))
}

/// Verify the last field against the checksum of everything before it.
fn verify_checksum(body: &[u8], field: &str) -> Result<Checksum> {
    let received =
        Checksum::parse(field).ok_or_else(|| malformed(format!("bad checksum field {:?}", field)))?;
    let computed = checksum::compute(&body[..body.len() - field.len()]);
    if computed != received {
        return Err(Error::ChecksumMismatch {
            computed: computed.0,
            received: received.0,
        });
    }
    Ok(received)
}

fn parse_bus_address(field: &str) -> Result<BusAddress> {
    if field.len() != 2 || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(format!("bad bus address {:?}", field)));
    }
    let value: u8 = field
        .parse()
        .map_err(|_| malformed(format!("bad bus address {:?}", field)))?;
    BusAddress::new(value)
}

fn parse_hex_byte(field: &str) -> Option<u8> {
    if field.len() != 2 || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(field, 16).ok()
}

fn malformed(msg: String) -> Error {
    Error::MalformedFrame(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bus(n: u8) -> BusAddress {
        BusAddress::new(n).unwrap()
    }

    // ---------------------------------------------------------------
    // Request encoding
    // ---------------------------------------------------------------

    #[test]
    fn encode_read_current() {
        let frame = encode_request(bus(1), &Command::new(CommandCode(0x0A))).unwrap();
        assert_eq!(frame, b"~01 0A 90\r");
    }

    #[test]
    fn encode_with_argument() {
        let cmd = Command::with_argument(CommandCode(0x12), "0550");
        let frame = encode_request(bus(5), &cmd).unwrap();
        assert_eq!(frame, b"~05 12 0550 70\r");
    }

    #[test]
    fn encode_pads_bus_and_uppercases_code() {
        let frame = encode_request(bus(0), &Command::new(CommandCode(0xd4))).unwrap();
        assert!(frame.starts_with(b"~00 D4 "));
        let frame = encode_request(bus(99), &Command::new(CommandCode(0x01))).unwrap();
        assert!(frame.starts_with(b"~99 01 "));
    }

    #[test]
    fn encode_rejects_bad_arguments() {
        for arg in ["", "a b", "x\r", "\t"] {
            let cmd = Command::with_argument(CommandCode(0x12), arg);
            assert!(
                matches!(encode_request(bus(1), &cmd), Err(Error::InvalidArgument(_))),
                "argument {arg:?} should be rejected"
            );
        }
    }

    // ---------------------------------------------------------------
    // Response decoding -- valid responses
    // ---------------------------------------------------------------

    #[test]
    fn decode_ok_with_payload() {
        let outcome = decode_response(b"01 OK 00 3.200 mA 9C\r").unwrap();
        assert_eq!(
            outcome,
            ResponseOutcome::Ok {
                bus_address: bus(1),
                payload: "3.200 mA".into()
            }
        );
    }

    #[test]
    fn decode_ok_without_payload() {
        let outcome = decode_response(b"01 OK 00 BB\r").unwrap();
        assert_eq!(
            outcome,
            ResponseOutcome::Ok {
                bus_address: bus(1),
                payload: String::new()
            }
        );
    }

    #[test]
    fn decode_error_response() {
        let outcome = decode_response(b"01 ER 02 BA\r").unwrap();
        assert_eq!(
            outcome,
            ResponseOutcome::DeviceError {
                bus_address: bus(1),
                code: DeviceErrorCode::UNKNOWN_COMMAND
            }
        );
    }

    #[test]
    fn decode_accepts_lowercase_checksum() {
        assert!(decode_response(b"01 OK 00 bb\r").is_ok());
    }

    // ---------------------------------------------------------------
    // Response decoding -- faults
    // ---------------------------------------------------------------

    #[test]
    fn decode_missing_terminator() {
        assert!(matches!(
            decode_response(b"01 OK 00 BB"),
            Err(Error::MalformedFrame(_))
        ));
        assert!(matches!(decode_response(b""), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn decode_bad_checksum_is_not_malformed() {
        assert!(matches!(
            decode_response(b"01 OK 00 BC\r"),
            Err(Error::ChecksumMismatch {
                computed: 0xBB,
                received: 0xBC
            })
        ));
    }

    #[test]
    fn decode_unknown_status() {
        let raw = encode_frame_with_checksum("01 XX 00 ");
        assert!(matches!(
            decode_response(&raw),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn decode_ok_without_code_field() {
        let raw = encode_frame_with_checksum("01 OK ");
        assert!(matches!(
            decode_response(&raw),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn decode_error_with_extra_field() {
        let raw = encode_frame_with_checksum("01 ER 02 extra ");
        assert!(matches!(
            decode_response(&raw),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn decode_non_hex_error_code() {
        let raw = encode_frame_with_checksum("01 ER ZZ ");
        assert!(matches!(
            decode_response(&raw),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn decode_bad_bus_address() {
        for body in ["1 OK 00 ", "A1 OK 00 ", "001 OK 00 "] {
            let raw = encode_frame_with_checksum(body);
            assert!(
                matches!(decode_response(&raw), Err(Error::MalformedFrame(_))),
                "{body:?}"
            );
        }
    }

    #[test]
    fn decode_double_space_is_malformed() {
        let raw = encode_frame_with_checksum("01  OK 00 ");
        assert!(matches!(
            decode_response(&raw),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn decode_too_few_fields() {
        assert!(matches!(
            decode_response(b"01 BB\r"),
            Err(Error::MalformedFrame(_))
        ));
    }

    fn encode_frame_with_checksum(body: &str) -> Vec<u8> {
        let mut raw = body.as_bytes().to_vec();
        raw.extend_from_slice(checksum::compute(body.as_bytes()).to_string().as_bytes());
        raw.push(TERMINATOR);
        raw
    }

    // ---------------------------------------------------------------
    // Simulator side
    // ---------------------------------------------------------------

    #[test]
    fn request_round_trip() {
        let cmd = Command::with_argument(CommandCode(0x1E), "1.25");
        let raw = encode_request(bus(42), &cmd).unwrap();
        let frame = decode_request(&raw).unwrap();
        assert_eq!(frame.bus_address, bus(42));
        assert_eq!(frame.command, cmd);
        assert_eq!(frame.checksum.to_string().as_bytes(), &raw[raw.len() - 3..raw.len() - 1]);
    }

    #[test]
    fn request_without_argument_round_trip() {
        let raw = encode_request(bus(1), &Command::new(CommandCode(0x37))).unwrap();
        let frame = decode_request(&raw).unwrap();
        assert_eq!(frame.command.argument, None);
        assert_eq!(frame.command.code, CommandCode(0x37));
    }

    #[test]
    fn request_requires_start_character() {
        assert!(matches!(
            decode_request(b"01 0A 90\r"),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn request_checksum_mismatch() {
        assert!(matches!(
            decode_request(b"~01 0A 91\r"),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn ok_response_round_trip() {
        let raw = encode_ok_response(bus(7), "MODEL=SPCe-1000");
        match decode_response(&raw).unwrap() {
            ResponseOutcome::Ok {
                bus_address,
                payload,
            } => {
                assert_eq!(bus_address, bus(7));
                assert_eq!(payload, "MODEL=SPCe-1000");
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn ok_response_empty_payload_has_no_extra_separator() {
        assert_eq!(encode_ok_response(bus(1), ""), b"01 OK 00 BB\r");
    }

    #[test]
    fn error_response_encoding() {
        assert_eq!(
            encode_error_response(bus(1), DeviceErrorCode::UNKNOWN_COMMAND),
            b"01 ER 02 BA\r"
        );
    }

    // ---------------------------------------------------------------
    // Buffer helpers
    // ---------------------------------------------------------------

    #[test]
    fn find_frame_end_in_partial_buffer() {
        assert_eq!(find_frame_end(b"01 OK 00"), None);
        assert_eq!(find_frame_end(b"01 OK 00 BB\r"), Some(12));
        assert_eq!(find_frame_end(b"01 OK 00 BB\rgarbage"), Some(12));
    }

    #[test]
    fn peek_bus_address_ignores_damage() {
        assert_eq!(peek_bus_address(b"02 OK 00 FF\r"), Some(bus(2)));
        assert_eq!(peek_bus_address(b"~03 0A 00\r"), Some(bus(3)));
        assert_eq!(peek_bus_address(b"02OK"), None);
        assert_eq!(peek_bus_address(b"x"), None);
    }

    // ---------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------

    fn any_command() -> impl Strategy<Value = Command> {
        (any::<u8>(), proptest::option::of("[!-~]{1,12}")).prop_map(|(code, argument)| Command {
            code: CommandCode(code),
            argument,
        })
    }

    fn any_payload() -> impl Strategy<Value = String> {
        proptest::collection::vec("[!-~]{1,10}", 0..4).prop_map(|words| words.join(" "))
    }

    /// Add `delta` to one byte that lies before the checksum digits.
    fn corrupt(raw: &[u8], index: proptest::sample::Index, delta: u8) -> Vec<u8> {
        let mut damaged = raw.to_vec();
        // Last three bytes are the two checksum digits and the terminator.
        let i = index.index(raw.len() - 3);
        damaged[i] = damaged[i].wrapping_add(delta);
        damaged
    }

    proptest! {
        #[test]
        fn prop_request_round_trip(n in 0u8..=99, command in any_command()) {
            let raw = encode_request(bus(n), &command).unwrap();
            let frame = decode_request(&raw).unwrap();
            prop_assert_eq!(frame.bus_address, bus(n));
            prop_assert_eq!(frame.command, command);
            prop_assert_eq!(peek_bus_address(&raw), Some(bus(n)));
        }

        #[test]
        fn prop_ok_response_round_trip(n in 0u8..=99, payload in any_payload()) {
            let raw = encode_ok_response(bus(n), &payload);
            prop_assert_eq!(
                decode_response(&raw).unwrap(),
                ResponseOutcome::Ok { bus_address: bus(n), payload }
            );
        }

        #[test]
        fn prop_error_response_round_trip(n in 0u8..=99, code in any::<u8>()) {
            let raw = encode_error_response(bus(n), DeviceErrorCode(code));
            prop_assert_eq!(
                decode_response(&raw).unwrap(),
                ResponseOutcome::DeviceError { bus_address: bus(n), code: DeviceErrorCode(code) }
            );
        }

        #[test]
        fn prop_damaged_request_is_never_accepted_unchanged(
            n in 0u8..=99,
            command in any_command(),
            index in any::<proptest::sample::Index>(),
            delta in 1u8..=255,
        ) {
            let raw = encode_request(bus(n), &command).unwrap();
            if let Ok(frame) = decode_request(&corrupt(&raw, index, delta)) {
                prop_assert!(frame.bus_address != bus(n) || frame.command != command);
            }
        }

        #[test]
        fn prop_damaged_response_is_never_accepted_unchanged(
            n in 0u8..=99,
            payload in any_payload(),
            code in any::<u8>(),
            error in any::<bool>(),
            index in any::<proptest::sample::Index>(),
            delta in 1u8..=255,
        ) {
            let (raw, original) = if error {
                let code = DeviceErrorCode(code);
                (
                    encode_error_response(bus(n), code),
                    ResponseOutcome::DeviceError { bus_address: bus(n), code },
                )
            } else {
                (
                    encode_ok_response(bus(n), &payload),
                    ResponseOutcome::Ok { bus_address: bus(n), payload },
                )
            };
            if let Ok(outcome) = decode_response(&corrupt(&raw, index, delta)) {
                prop_assert_ne!(outcome, original);
            }
        }
    }
}
