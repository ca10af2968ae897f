//! Simulated SPCe controller state and request handling.
//!
//! [`DeviceModel`] answers raw request frames with raw response frames using
//! the same codec as the client. Telemetry drifts by a bounded random walk on
//! every voltage, current or pressure read; pressure is always derived from
//! the current state, never stored.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use spcelib_core::error::{Error, Result};
use spcelib_core::types::{BusAddress, CommandCode, DeviceErrorCode, PressureUnits, PumpStatus};
use spcelib_protocol::codec::{self, RequestFrame};
use spcelib_protocol::commands::{self, PayloadShape, PUMP_STATUS_TOKENS, YES_NO_TOKENS};

use crate::pressure;

/// Mutable controller state.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub voltage_kv: f64,
    pub current_ma: f64,
    pub pump_running: bool,
    pub pump_size_lps: u16,
    pub cal_factor: f64,
    pub units: PressureUnits,
    pub auto_restart: bool,
    pub keypad_locked: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            voltage_kv: 4.5,
            current_ma: 3.2,
            pump_running: true,
            pump_size_lps: 550,
            cal_factor: 1.0,
            units: PressureUnits::Torr,
            auto_restart: true,
            keypad_locked: false,
        }
    }
}

impl DeviceState {
    /// Pressure in the selected units, derived from the current state.
    pub fn pressure(&self) -> Result<f64> {
        pressure::pressure(
            self.current_ma / 1000.0,
            self.voltage_kv * 1000.0,
            self.units.factor(),
            self.cal_factor,
            f64::from(self.pump_size_lps),
        )
    }

    pub fn pump_status(&self) -> PumpStatus {
        if self.pump_running {
            PumpStatus::Running
        } else {
            PumpStatus::Stopped
        }
    }
}

/// Simulator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Address the simulated controller answers to.
    pub bus_address: BusAddress,
    pub model: String,
    pub version: String,
    /// State at start-up and after a reset.
    pub initial: DeviceState,
    /// Largest voltage change per telemetry read, in kV.
    pub voltage_step_kv: f64,
    /// Largest current change per telemetry read, in mA.
    pub current_step_ma: f64,
    /// Fixed RNG seed for reproducible runs; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            bus_address: BusAddress::DEFAULT,
            model: "SPCe-1000".to_string(),
            version: "2.10".to_string(),
            initial: DeviceState::default(),
            voltage_step_kv: 0.1,
            current_step_ma: 0.2,
            seed: None,
        }
    }
}

/// What a handler answers with.
#[derive(Debug, Clone, PartialEq)]
enum Reply {
    Ok(String),
    Error(DeviceErrorCode),
}

type HandlerFn = fn(&mut DeviceModel, Option<&str>) -> Reply;

/// Dispatch table entry: the payload shape the handler produces and the
/// rule that updates state and renders the payload.
#[derive(Clone, Copy)]
struct Handler {
    shape: PayloadShape,
    run: HandlerFn,
}

/// One simulated controller.
pub struct DeviceModel {
    config: SimConfig,
    state: DeviceState,
    rng: StdRng,
    handlers: BTreeMap<CommandCode, Handler>,
    requests: u64,
}

impl DeviceModel {
    pub fn new(config: SimConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        DeviceModel {
            state: config.initial.clone(),
            config,
            rng,
            handlers: handler_table(),
            requests: 0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn bus_address(&self) -> BusAddress {
        self.config.bus_address
    }

    /// Number of frames handled so far, including rejected ones.
    pub fn requests_handled(&self) -> u64 {
        self.requests
    }

    /// Payload shape of the response to `code`, or `None` if the simulator
    /// does not implement it.
    pub fn response_shape(&self, code: CommandCode) -> Option<PayloadShape> {
        self.handlers.get(&code).map(|h| h.shape)
    }

    /// Answer one complete request frame (terminator included).
    pub fn handle_request(&mut self, raw: &[u8]) -> Vec<u8> {
        self.requests += 1;
        match codec::decode_request(raw) {
            Ok(frame) => self.dispatch(frame),
            Err(e) => {
                let code = match e {
                    Error::ChecksumMismatch { .. } => DeviceErrorCode::BAD_CHECKSUM,
                    _ => DeviceErrorCode::BAD_COMMAND_FORMAT,
                };
                let bus = codec::peek_bus_address(raw).unwrap_or(self.config.bus_address);
                warn!(bus = %bus, error = %e, "simulator rejected request");
                codec::encode_error_response(bus, code)
            }
        }
    }

    fn dispatch(&mut self, frame: RequestFrame) -> Vec<u8> {
        let bus = frame.bus_address;
        let code = frame.command.code;
        if bus != self.config.bus_address {
            debug!(bus = %bus, own = %self.config.bus_address, "request for another address");
            return codec::encode_error_response(bus, DeviceErrorCode::UNKNOWN_ADDRESS);
        }

        let Some(run) = self.handlers.get(&code).map(|h| h.run) else {
            debug!(bus = %bus, code = %code, "unsupported command");
            return codec::encode_error_response(bus, DeviceErrorCode::UNKNOWN_COMMAND);
        };

        match run(self, frame.command.argument.as_deref()) {
            Reply::Ok(payload) => {
                debug!(bus = %bus, code = %code, payload = %payload, "simulator reply");
                codec::encode_ok_response(bus, &payload)
            }
            Reply::Error(err) => {
                debug!(bus = %bus, code = %code, error = %err, "simulator error reply");
                codec::encode_error_response(bus, err)
            }
        }
    }

    /// One random-walk step on voltage and current.
    ///
    /// A step that would take a value to zero or below is dropped for that
    /// value.
    pub fn step(&mut self) {
        let dv = self.draw(self.config.voltage_step_kv);
        let di = self.draw(self.config.current_step_ma);
        if self.state.voltage_kv + dv > 0.0 {
            self.state.voltage_kv += dv;
        }
        if self.state.current_ma + di > 0.0 {
            self.state.current_ma += di;
        }
    }

    /// Uniform draw from `[-bound, bound]`. A zero or non-finite bound
    /// means no movement.
    fn draw(&mut self, bound: f64) -> f64 {
        let bound = bound.abs();
        if bound == 0.0 || !bound.is_finite() {
            return 0.0;
        }
        // `gen_range` panics if the range width overflows; scale a unit draw.
        self.rng.gen_range(-1.0..=1.0) * bound
    }
}

impl Default for DeviceModel {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

// ---------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------

fn handler_table() -> BTreeMap<CommandCode, Handler> {
    use PayloadShape::*;
    let entries: &[(CommandCode, PayloadShape, HandlerFn)] = &[
        (commands::READ_MODEL, Text, read_model),
        (commands::READ_VERSION, Text, read_version),
        (commands::RESET, Ack, reset),
        (commands::READ_CURRENT, Float, read_current),
        (commands::READ_PRESSURE, Float, read_pressure),
        (commands::READ_VOLTAGE, Float, read_voltage),
        (commands::GET_PUMP_STATUS, Token(PUMP_STATUS_TOKENS), get_pump_status),
        (commands::SET_PRESSURE_UNITS, Ack, set_units),
        (commands::GET_PUMP_SIZE, Integer, get_pump_size),
        (commands::SET_PUMP_SIZE, Ack, set_pump_size),
        (commands::GET_CAL_FACTOR, Float, get_cal_factor),
        (commands::SET_CAL_FACTOR, Ack, set_cal_factor),
        (commands::START_PUMP, Ack, start_pump),
        (commands::STOP_PUMP, Ack, stop_pump),
        (commands::GET_AUTO_RESTART, Token(YES_NO_TOKENS), get_auto_restart),
        (commands::SET_AUTO_RESTART, Ack, set_auto_restart),
        (commands::GET_HIGH_VOLTAGE, Token(YES_NO_TOKENS), get_high_voltage),
        (commands::LOCK_KEYPAD, Ack, lock_keypad),
        (commands::UNLOCK_KEYPAD, Ack, unlock_keypad),
    ];
    entries
        .iter()
        .map(|&(code, shape, run)| (code, Handler { shape, run }))
        .collect()
}

fn ack() -> Reply {
    Reply::Ok(String::new())
}

fn bad_format() -> Reply {
    Reply::Error(DeviceErrorCode::BAD_COMMAND_FORMAT)
}

fn yes_no(value: bool) -> &'static str {
    if value { "YES" } else { "NO" }
}

fn parse_yes_no(arg: Option<&str>) -> Option<bool> {
    match arg? {
        "YES" => Some(true),
        "NO" => Some(false),
        _ => None,
    }
}

fn read_model(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    Reply::Ok(format!("MODEL={}", m.config.model))
}

fn read_version(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    Reply::Ok(format!("VERSION={}", m.config.version))
}

fn reset(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    m.state = m.config.initial.clone();
    ack()
}

fn read_current(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    m.step();
    Reply::Ok(format!("{:.3} mA", m.state.current_ma))
}

fn read_voltage(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    m.step();
    Reply::Ok(format!("{:.3} kV", m.state.voltage_kv))
}

fn read_pressure(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    if m.state.pump_size_lps == 0 {
        return Reply::Error(DeviceErrorCode::PUMP_SIZE_NOT_SET);
    }
    m.step();
    match m.state.pressure() {
        Ok(p) => Reply::Ok(format!("{:.3E} {}", p, m.state.units)),
        Err(_) => Reply::Error(DeviceErrorCode::UNKNOWN_ERROR),
    }
}

fn get_pump_status(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    Reply::Ok(format!("STATUS={}", m.state.pump_status()))
}

fn set_units(m: &mut DeviceModel, arg: Option<&str>) -> Reply {
    match arg.and_then(|a| a.parse::<PressureUnits>().ok()) {
        Some(units) => {
            m.state.units = units;
            ack()
        }
        None => bad_format(),
    }
}

fn get_pump_size(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    Reply::Ok(m.state.pump_size_lps.to_string())
}

fn set_pump_size(m: &mut DeviceModel, arg: Option<&str>) -> Reply {
    match arg.and_then(|a| a.parse::<u16>().ok()).filter(|&s| s <= 9999) {
        Some(size) => {
            m.state.pump_size_lps = size;
            ack()
        }
        None => bad_format(),
    }
}

fn get_cal_factor(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    Reply::Ok(format!("{:.2}", m.state.cal_factor))
}

fn set_cal_factor(m: &mut DeviceModel, arg: Option<&str>) -> Reply {
    match arg
        .and_then(|a| a.parse::<f64>().ok())
        .filter(|f| (0.0..=9.99).contains(f))
    {
        Some(factor) => {
            m.state.cal_factor = factor;
            ack()
        }
        None => bad_format(),
    }
}

fn start_pump(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    m.state.pump_running = true;
    ack()
}

fn stop_pump(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    m.state.pump_running = false;
    ack()
}

fn get_auto_restart(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    Reply::Ok(yes_no(m.state.auto_restart).to_string())
}

fn set_auto_restart(m: &mut DeviceModel, arg: Option<&str>) -> Reply {
    match parse_yes_no(arg) {
        Some(enabled) => {
            m.state.auto_restart = enabled;
            ack()
        }
        None => bad_format(),
    }
}

fn get_high_voltage(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    Reply::Ok(yes_no(m.state.pump_running).to_string())
}

fn lock_keypad(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    m.state.keypad_locked = true;
    ack()
}

fn unlock_keypad(m: &mut DeviceModel, _: Option<&str>) -> Reply {
    m.state.keypad_locked = false;
    ack()
}

#[cfg(test)]
mod tests {
    use super::*;
    use spcelib_protocol::codec::{decode_response, encode_request, Command, ResponseOutcome};
    use spcelib_protocol::commands::{parse_payload, PayloadTable};

    fn seeded() -> DeviceModel {
        DeviceModel::new(SimConfig {
            seed: Some(7),
            ..SimConfig::default()
        })
    }

    fn exchange(model: &mut DeviceModel, cmd: &Command) -> ResponseOutcome {
        let raw = encode_request(model.bus_address(), cmd).unwrap();
        decode_response(&model.handle_request(&raw)).unwrap()
    }

    fn ok_payload(outcome: ResponseOutcome) -> String {
        match outcome {
            ResponseOutcome::Ok { payload, .. } => payload,
            other => panic!("expected OK, got {other:?}"),
        }
    }

    fn error_code(outcome: ResponseOutcome) -> DeviceErrorCode {
        match outcome {
            ResponseOutcome::DeviceError { code, .. } => code,
            other => panic!("expected ER, got {other:?}"),
        }
    }

    // ---------------------------------------------------------------
    // Identification and framing errors
    // ---------------------------------------------------------------

    #[test]
    fn model_and_version() {
        let mut m = seeded();
        assert_eq!(
            ok_payload(exchange(&mut m, &commands::cmd_read_model())),
            "MODEL=SPCe-1000"
        );
        assert_eq!(
            ok_payload(exchange(&mut m, &commands::cmd_read_version())),
            "VERSION=2.10"
        );
    }

    #[test]
    fn malformed_request_answers_bad_format() {
        let mut m = seeded();
        let resp = decode_response(&m.handle_request(b"01 0A 90\r")).unwrap();
        assert_eq!(error_code(resp), DeviceErrorCode::BAD_COMMAND_FORMAT);
        assert_eq!(m.requests_handled(), 1);
    }

    #[test]
    fn bad_request_checksum_answers_bad_checksum() {
        let mut m = seeded();
        let resp = decode_response(&m.handle_request(b"~01 0A 91\r")).unwrap();
        assert_eq!(resp.bus_address(), BusAddress::DEFAULT);
        assert_eq!(error_code(resp), DeviceErrorCode::BAD_CHECKSUM);
    }

    #[test]
    fn other_address_answers_unknown_address() {
        let mut m = seeded();
        let other = BusAddress::new(9).unwrap();
        let raw = encode_request(other, &commands::cmd_read_current()).unwrap();
        let resp = decode_response(&m.handle_request(&raw)).unwrap();
        assert_eq!(resp.bus_address(), other);
        assert_eq!(error_code(resp), DeviceErrorCode::UNKNOWN_ADDRESS);
    }

    #[test]
    fn unsupported_command() {
        let mut m = seeded();
        let resp = exchange(&mut m, &Command::new(CommandCode(0x99)));
        assert_eq!(error_code(resp), DeviceErrorCode::UNKNOWN_COMMAND);
    }

    // ---------------------------------------------------------------
    // Telemetry
    // ---------------------------------------------------------------

    #[test]
    fn telemetry_reads_step_state() {
        let mut m = seeded();
        let before = m.state().clone();
        let payload = ok_payload(exchange(&mut m, &commands::cmd_read_voltage()));
        assert!(payload.ends_with(" kV"));
        assert_ne!(m.state().voltage_kv, before.voltage_kv);
        assert!((m.state().voltage_kv - before.voltage_kv).abs() <= 0.1);
        assert!((m.state().current_ma - before.current_ma).abs() <= 0.2);
    }

    #[test]
    fn non_telemetry_reads_leave_state_alone() {
        let mut m = seeded();
        let before = m.state().clone();
        exchange(&mut m, &commands::cmd_get_pump_status());
        exchange(&mut m, &commands::cmd_get_pump_size());
        assert_eq!(m.state(), &before);
    }

    #[test]
    fn pressure_matches_formula_for_reported_state() {
        let mut m = DeviceModel::new(SimConfig {
            voltage_step_kv: 0.0,
            current_step_ma: 0.0,
            seed: Some(1),
            ..SimConfig::default()
        });
        let payload = ok_payload(exchange(&mut m, &commands::cmd_read_pressure()));
        let reported: f64 = payload.split_whitespace().next().unwrap().parse().unwrap();
        let expected = (0.066 * 0.0032 * (5600.0 / 4500.0)) / 550.0;
        assert!(((reported - expected) / expected).abs() < 1e-3);
        assert!(payload.ends_with(" Torr"));
    }

    #[test]
    fn pressure_with_zero_pump_size() {
        let mut m = seeded();
        let set = commands::cmd_set_pump_size(0).unwrap();
        assert_eq!(ok_payload(exchange(&mut m, &set)), "");
        let resp = exchange(&mut m, &commands::cmd_read_pressure());
        assert_eq!(error_code(resp), DeviceErrorCode::PUMP_SIZE_NOT_SET);
    }

    #[test]
    fn random_walk_stays_positive() {
        let mut m = DeviceModel::new(SimConfig {
            initial: DeviceState {
                voltage_kv: 0.05,
                current_ma: 0.05,
                ..DeviceState::default()
            },
            seed: Some(99),
            ..SimConfig::default()
        });
        for _ in 0..500 {
            m.step();
            assert!(m.state().voltage_kv > 0.0);
            assert!(m.state().current_ma > 0.0);
        }
    }

    #[test]
    fn huge_step_bound_does_not_panic() {
        let mut m = DeviceModel::new(SimConfig {
            voltage_step_kv: 1e308,
            current_step_ma: f64::MAX,
            seed: Some(3),
            ..SimConfig::default()
        });
        let raw = encode_request(m.bus_address(), &commands::cmd_read_voltage()).unwrap();
        let resp = decode_response(&m.handle_request(&raw)).unwrap();
        assert!(matches!(resp, ResponseOutcome::Ok { .. }));
        assert!(m.state().voltage_kv > 0.0);
        assert!(m.state().current_ma > 0.0);
    }

    #[test]
    fn non_finite_step_bound_freezes_the_walk() {
        let mut m = DeviceModel::new(SimConfig {
            voltage_step_kv: f64::NAN,
            current_step_ma: f64::INFINITY,
            seed: Some(3),
            ..SimConfig::default()
        });
        for _ in 0..10 {
            m.step();
        }
        assert_eq!(m.state().voltage_kv, 4.5);
        assert_eq!(m.state().current_ma, 3.2);
    }

    // ---------------------------------------------------------------
    // Setters
    // ---------------------------------------------------------------

    #[test]
    fn setters_update_state() {
        let mut m = seeded();
        exchange(&mut m, &commands::cmd_set_cal_factor(1.25).unwrap());
        exchange(&mut m, &commands::cmd_set_units(PressureUnits::Pascal));
        exchange(&mut m, &commands::cmd_stop_pump());
        exchange(&mut m, &commands::cmd_set_auto_restart(false));
        exchange(&mut m, &commands::cmd_lock_keypad());

        let s = m.state();
        assert_eq!(s.cal_factor, 1.25);
        assert_eq!(s.units, PressureUnits::Pascal);
        assert!(!s.pump_running);
        assert!(!s.auto_restart);
        assert!(s.keypad_locked);
        assert_eq!(
            ok_payload(exchange(&mut m, &commands::cmd_get_pump_status())),
            "STATUS=STOPPED"
        );
    }

    #[test]
    fn bad_setter_argument() {
        let mut m = seeded();
        let cmd = Command::with_argument(commands::SET_PUMP_SIZE, "lots");
        assert_eq!(
            error_code(exchange(&mut m, &cmd)),
            DeviceErrorCode::BAD_COMMAND_FORMAT
        );
        let cmd = Command::new(commands::SET_CAL_FACTOR);
        assert_eq!(
            error_code(exchange(&mut m, &cmd)),
            DeviceErrorCode::BAD_COMMAND_FORMAT
        );
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut m = seeded();
        exchange(&mut m, &commands::cmd_set_pump_size(10).unwrap());
        exchange(&mut m, &commands::cmd_read_current());
        exchange(&mut m, &commands::cmd_reset());
        assert_eq!(m.state(), &m.config().initial);
    }

    // ---------------------------------------------------------------
    // Agreement with the client payload table
    // ---------------------------------------------------------------

    #[test]
    fn every_reply_parses_with_client_table() {
        let table = PayloadTable::spce();
        let reads = [
            commands::cmd_read_model(),
            commands::cmd_read_version(),
            commands::cmd_read_current(),
            commands::cmd_read_voltage(),
            commands::cmd_read_pressure(),
            commands::cmd_get_pump_status(),
            commands::cmd_get_pump_size(),
            commands::cmd_get_cal_factor(),
            commands::cmd_get_auto_restart(),
            commands::cmd_get_high_voltage(),
        ];
        let mut m = seeded();
        for cmd in reads {
            let shape = table.shape_for(cmd.code);
            assert_eq!(m.response_shape(cmd.code), Some(shape), "code {}", cmd.code);
            let payload = ok_payload(exchange(&mut m, &cmd));
            parse_payload(cmd.code, shape, &payload)
                .unwrap_or_else(|e| panic!("code {}: {e}", cmd.code));
        }
    }
}
