//! SpceController -- typed operations on one SPCe controller.
//!
//! Wraps a [`ProtocolClient`] bound to a single bus address and exposes one
//! async method per command in the SPCe command set. Setters validate their
//! arguments before any I/O; getters convert the payload to a Rust type.

use std::time::SystemTime;

use spcelib_core::error::{Error, Result};
use spcelib_core::types::{BusAddress, CommandCode, PressureUnits, PumpStatus, Telemetry};

use crate::client::ProtocolClient;
use crate::codec::{Command, ResponseOutcome};
use crate::commands::{self, Value};

/// A connected SPCe controller.
///
/// Constructed via [`SpceBuilder`](crate::builder::SpceBuilder).
pub struct SpceController {
    client: ProtocolClient,
    bus_address: BusAddress,
}

impl SpceController {
    pub fn new(client: ProtocolClient, bus_address: BusAddress) -> Self {
        SpceController {
            client,
            bus_address,
        }
    }

    pub fn bus_address(&self) -> BusAddress {
        self.bus_address
    }

    /// The underlying protocol client.
    pub fn client(&self) -> &ProtocolClient {
        &self.client
    }

    // ---------------------------------------------------------------
    // Identification
    // ---------------------------------------------------------------

    /// Controller model string, e.g. `SPCe-1000`.
    pub async fn model(&self) -> Result<String> {
        self.read_text(commands::cmd_read_model()).await
    }

    /// Firmware version string.
    pub async fn version(&self) -> Result<String> {
        self.read_text(commands::cmd_read_version()).await
    }

    /// Restart the controller firmware.
    pub async fn reset(&self) -> Result<()> {
        self.execute(commands::cmd_reset()).await
    }

    // ---------------------------------------------------------------
    // Telemetry
    // ---------------------------------------------------------------

    /// Emission current in mA.
    pub async fn current_ma(&self) -> Result<f64> {
        self.read_float(commands::cmd_read_current()).await
    }

    /// High voltage in kV.
    pub async fn voltage_kv(&self) -> Result<f64> {
        self.read_float(commands::cmd_read_voltage()).await
    }

    /// Pressure in the controller's configured units.
    pub async fn pressure(&self) -> Result<f64> {
        self.read_float(commands::cmd_read_pressure()).await
    }

    /// Read voltage, current and pressure as one sample.
    ///
    /// The three reads are separate exchanges; the timestamp is taken when
    /// the last one completes.
    pub async fn read_telemetry(&self) -> Result<Telemetry> {
        let voltage_kv = self.voltage_kv().await?;
        let current_ma = self.current_ma().await?;
        let pressure = self.pressure().await?;
        Ok(Telemetry {
            timestamp: SystemTime::now(),
            voltage_kv,
            current_ma,
            pressure,
        })
    }

    // ---------------------------------------------------------------
    // Pump
    // ---------------------------------------------------------------

    pub async fn pump_status(&self) -> Result<PumpStatus> {
        let cmd = commands::cmd_get_pump_status();
        let code = cmd.code;
        let token = self.read_token(cmd).await?;
        token.parse().map_err(|_| shape_error(code, "RUNNING/STOPPED", &token))
    }

    pub async fn start_pump(&self) -> Result<()> {
        self.execute(commands::cmd_start_pump()).await
    }

    pub async fn stop_pump(&self) -> Result<()> {
        self.execute(commands::cmd_stop_pump()).await
    }

    /// Pump size in L/s.
    pub async fn pump_size(&self) -> Result<u16> {
        self.read_bounded(commands::cmd_get_pump_size()).await
    }

    /// Set the pump size in L/s (0-9999).
    pub async fn set_pump_size(&self, liters_per_second: u16) -> Result<()> {
        self.execute(commands::cmd_set_pump_size(liters_per_second)?)
            .await
    }

    pub async fn cal_factor(&self) -> Result<f64> {
        self.read_float(commands::cmd_get_cal_factor()).await
    }

    /// Set the calibration factor (0.00-9.99).
    pub async fn set_cal_factor(&self, factor: f64) -> Result<()> {
        self.execute(commands::cmd_set_cal_factor(factor)?).await
    }

    pub async fn set_units(&self, units: PressureUnits) -> Result<()> {
        self.execute(commands::cmd_set_units(units)).await
    }

    // ---------------------------------------------------------------
    // Supply configuration
    // ---------------------------------------------------------------

    pub async fn auto_restart(&self) -> Result<bool> {
        self.read_yes_no(commands::cmd_get_auto_restart()).await
    }

    pub async fn set_auto_restart(&self, enabled: bool) -> Result<()> {
        self.execute(commands::cmd_set_auto_restart(enabled)).await
    }

    /// Whether the high voltage supply is on.
    pub async fn high_voltage_on(&self) -> Result<bool> {
        self.read_yes_no(commands::cmd_get_high_voltage()).await
    }

    pub async fn hv_autorecovery(&self) -> Result<u8> {
        self.read_bounded(commands::cmd_get_hv_autorecovery()).await
    }

    pub async fn set_hv_autorecovery(&self, mode: u8) -> Result<()> {
        self.execute(commands::cmd_set_hv_autorecovery(mode)?).await
    }

    pub async fn arc_detect(&self) -> Result<bool> {
        self.read_yes_no(commands::cmd_get_arc_detect()).await
    }

    pub async fn set_arc_detect(&self, enabled: bool) -> Result<()> {
        self.execute(commands::cmd_set_arc_detect(enabled)).await
    }

    pub async fn analog_mode(&self) -> Result<u8> {
        self.read_bounded(commands::cmd_get_analog_mode()).await
    }

    pub async fn set_analog_mode(&self, mode: u8) -> Result<()> {
        self.execute(commands::cmd_set_analog_mode(mode)?).await
    }

    // ---------------------------------------------------------------
    // Front panel and communication
    // ---------------------------------------------------------------

    pub async fn lock_keypad(&self) -> Result<()> {
        self.execute(commands::cmd_lock_keypad()).await
    }

    pub async fn unlock_keypad(&self) -> Result<()> {
        self.execute(commands::cmd_unlock_keypad()).await
    }

    pub async fn comm_mode(&self) -> Result<u8> {
        self.read_bounded(commands::cmd_get_comm_mode()).await
    }

    pub async fn set_comm_mode(&self, mode: u8) -> Result<()> {
        self.execute(commands::cmd_set_comm_mode(mode)?).await
    }

    pub async fn set_comm_interface(&self, interface: u8) -> Result<()> {
        self.execute(commands::cmd_set_comm_interface(interface)?)
            .await
    }

    /// Send an arbitrary command and return the raw outcome.
    pub async fn raw(&self, code: CommandCode, argument: Option<&str>) -> Result<ResponseOutcome> {
        let cmd = match argument {
            Some(arg) => Command::with_argument(code, arg),
            None => Command::new(code),
        };
        self.client.send(&cmd, self.bus_address).await
    }

    pub async fn close(&self) -> Result<()> {
        self.client.close().await
    }

    // ---------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------

    async fn execute(&self, cmd: Command) -> Result<()> {
        self.client.request(&cmd, self.bus_address).await.map(|_| ())
    }

    async fn read_float(&self, cmd: Command) -> Result<f64> {
        let code = cmd.code;
        let value = self.client.request(&cmd, self.bus_address).await?;
        value
            .as_f64()
            .ok_or_else(|| shape_error(code, "float", &value.to_string()))
    }

    async fn read_text(&self, cmd: Command) -> Result<String> {
        match self.client.request(&cmd, self.bus_address).await? {
            Value::Text(s) | Value::Token(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    async fn read_token(&self, cmd: Command) -> Result<String> {
        let code = cmd.code;
        match self.client.request(&cmd, self.bus_address).await? {
            Value::Token(s) | Value::Text(s) => Ok(s),
            other => Err(shape_error(code, "enumerated token", &other.to_string())),
        }
    }

    async fn read_yes_no(&self, cmd: Command) -> Result<bool> {
        let code = cmd.code;
        let token = self.read_token(cmd).await?;
        commands::parse_yes_no(code, &token)
    }

    /// Read an integer payload and narrow it to `T`.
    async fn read_bounded<T: TryFrom<i64>>(&self, cmd: Command) -> Result<T> {
        let code = cmd.code;
        let value = self.client.request(&cmd, self.bus_address).await?;
        value
            .as_i64()
            .and_then(|i| T::try_from(i).ok())
            .ok_or_else(|| shape_error(code, "integer", &value.to_string()))
    }
}

fn shape_error(code: CommandCode, expected: &'static str, payload: &str) -> Error {
    Error::UnexpectedPayloadShape {
        code,
        expected,
        payload: payload.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use crate::commands::PayloadTable;
    use spcelib_core::types::DeviceErrorCode;
    use spcelib_test_harness::MockTransport;
    use std::time::Duration;

    fn controller(mock: MockTransport) -> SpceController {
        let config = ClientConfig {
            timeout: Duration::from_millis(30),
            retries: 0,
            backoff: Duration::from_millis(1),
        };
        let client = ProtocolClient::with_config(Box::new(mock), config, PayloadTable::spce());
        SpceController::new(client, BusAddress::DEFAULT)
    }

    #[tokio::test]
    async fn read_telemetry_issues_three_reads() {
        let mut mock = MockTransport::new();
        mock.expect(b"~01 0C 92\r", b"01 OK 00 4.500 kV B3\r");
        mock.expect(b"~01 0A 90\r", b"01 OK 00 3.200 mA 9C\r");
        mock.expect(b"~01 0B 91\r", b"01 OK 00 2.000E-08 Torr 6C\r");
        let ctl = controller(mock);

        let t = ctl.read_telemetry().await.unwrap();
        assert_eq!(t.voltage_kv, 4.5);
        assert_eq!(t.current_ma, 3.2);
        assert_eq!(t.pressure, 2.0e-8);
    }

    #[tokio::test]
    async fn identification() {
        let mut mock = MockTransport::new();
        mock.expect(b"~01 01 80\r", b"01 OK 00 MODEL=SPCe-1000 C2\r");
        mock.expect(b"~01 02 81\r", b"01 OK 00 VERSION=2.10 FF\r");
        let ctl = controller(mock);

        assert_eq!(ctl.model().await.unwrap(), "SPCe-1000");
        assert_eq!(ctl.version().await.unwrap(), "2.10");
    }

    #[tokio::test]
    async fn pump_status_and_size() {
        let mut mock = MockTransport::new();
        mock.expect(b"~01 0D 93\r", b"01 OK 00 STATUS=STOPPED 1B\r");
        mock.expect(b"~01 11 81\r", b"01 OK 00 550 75\r");
        let ctl = controller(mock);

        assert_eq!(ctl.pump_status().await.unwrap(), PumpStatus::Stopped);
        assert_eq!(ctl.pump_size().await.unwrap(), 550);
    }

    #[tokio::test]
    async fn yes_no_query() {
        let mut mock = MockTransport::new();
        mock.expect(b"~01 61 86\r", b"01 OK 00 YES CC\r");
        let ctl = controller(mock);
        assert!(ctl.high_voltage_on().await.unwrap());
    }

    #[tokio::test]
    async fn invalid_setter_argument_sends_nothing() {
        let mock = MockTransport::new();
        let log = mock.sent_log();
        let ctl = controller(mock);

        assert!(matches!(
            ctl.set_pump_size(12000).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ctl.set_cal_factor(12.5).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ctl.set_analog_mode(7).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn device_error_surfaces_code() {
        let mut mock = MockTransport::new();
        mock.expect(b"~01 0B 91\r", b"01 ER 22 BC\r");
        let ctl = controller(mock);

        match ctl.pressure().await {
            Err(Error::Device { code, .. }) => {
                assert_eq!(code, DeviceErrorCode::PUMP_SIZE_NOT_SET)
            }
            other => panic!("expected device error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn raw_exchange() {
        let mut mock = MockTransport::new();
        mock.expect(b"~01 0E M 01\r", b"01 OK 00 BB\r");
        let ctl = controller(mock);

        let outcome = ctl.raw(CommandCode(0x0E), Some("M")).await.unwrap();
        assert!(matches!(outcome, ResponseOutcome::Ok { .. }));
    }
}
