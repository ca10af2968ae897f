// spce -- command-line tool for Gamma Vacuum SPCe ion pump controllers and
// the bundled simulator.
//
// Usage:
//   spce --port /dev/ttyUSB0 info
//   spce --tcp 192.168.1.50:4001 --address 5 read pressure
//   spce --port /dev/ttyUSB0 set pump-size 550
//   spce --config spce.yaml monitor --count 10
//   spce --sim raw 0A
//   spce simulate --listen 127.0.0.1:4001
//   spce simulate --serial /dev/pts/3        (one end of a socat pty pair)

mod config;

use std::path::PathBuf;
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use spcelib::sim::{self, DeviceModel, SimulatedTransport};
use spcelib::transport::SerialConfig;
use spcelib::{CommandCode, PressureUnits, ResponseOutcome, SpceBuilder, SpceController, Telemetry};

use crate::config::{ControllerConfig, FileConfig};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// spce -- query and configure SPCe ion pump controllers.
#[derive(Parser)]
#[command(name = "spce", version, about)]
struct Cli {
    /// YAML configuration file. Flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    #[arg(long, global = true)]
    port: Option<String>,

    /// Baud rate (default: 9600).
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Serial-over-TCP bridge as host:port. Takes precedence over --port.
    #[arg(long, global = true)]
    tcp: Option<String>,

    /// Controller bus address, 0-99 (default: 1).
    #[arg(long, global = true)]
    address: Option<u8>,

    /// Per-attempt response timeout in milliseconds (default: 500).
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Resends after a timeout or damaged frame (default: 3).
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Talk to an in-process simulated controller instead of hardware.
    #[arg(long, global = true)]
    sim: bool,

    /// Debug-level logging (RUST_LOG is honoured otherwise).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print controller identity, pump state and configuration.
    Info,

    /// Read one value.
    Read {
        #[arg(value_enum)]
        quantity: Quantity,
    },

    /// Change a setting.
    Set {
        #[command(subcommand)]
        setting: Setting,
    },

    /// Start or stop the pump high voltage.
    Pump {
        #[arg(value_enum)]
        action: PumpAction,
    },

    /// Restart the controller firmware.
    Reset,

    /// Poll voltage, current and pressure and print one line per sample.
    Monitor {
        /// Poll interval in milliseconds (default: config file, else 1000).
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Number of samples (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        count: u64,
    },

    /// Send one raw command and print the outcome.
    Raw {
        /// Command code in hex (e.g. 0A or 0x0A).
        #[arg(value_parser = parse_hex_u8)]
        code: u8,

        /// Optional argument field.
        argument: Option<String>,
    },

    /// Run the simulated controller on a TCP port or a serial port.
    Simulate {
        /// TCP address to listen on (e.g. 127.0.0.1:4001).
        #[arg(long)]
        listen: Option<String>,

        /// Serial port to serve (e.g. /dev/pts/3).
        #[arg(long)]
        serial: Option<String>,

        /// RNG seed for reproducible telemetry.
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Quantity {
    Current,
    Voltage,
    Pressure,
    Telemetry,
    Model,
    Version,
    PumpStatus,
    PumpSize,
    CalFactor,
    AutoRestart,
    HighVoltage,
    HvAutorecovery,
    ArcDetect,
    AnalogMode,
    CommMode,
}

#[derive(Subcommand)]
enum Setting {
    /// Pump size in L/s (0-9999).
    PumpSize { liters_per_second: u16 },
    /// Calibration factor (0.00-9.99).
    CalFactor { factor: f64 },
    /// Pressure display units.
    Units {
        #[arg(value_enum)]
        units: Units,
    },
    /// Restart the pump automatically after power loss.
    AutoRestart {
        #[arg(value_enum)]
        value: YesNo,
    },
    /// HV autorecovery mode (0-2).
    HvAutorecovery { mode: u8 },
    /// Arc detection.
    ArcDetect {
        #[arg(value_enum)]
        value: YesNo,
    },
    /// Analog output mode (0-6, 8-10).
    AnalogMode { mode: u8 },
    /// Serial communication mode (0-2).
    CommMode { mode: u8 },
    /// Active communication interface (0-5).
    CommInterface { interface: u8 },
    /// Front panel keypad lock.
    Keypad {
        #[arg(value_enum)]
        state: KeypadState,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Units {
    Torr,
    Mbar,
    Pascal,
}

impl From<Units> for PressureUnits {
    fn from(units: Units) -> Self {
        match units {
            Units::Torr => PressureUnits::Torr,
            Units::Mbar => PressureUnits::Mbar,
            Units::Pascal => PressureUnits::Pascal,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum YesNo {
    Yes,
    No,
}

impl YesNo {
    fn enabled(self) -> bool {
        matches!(self, YesNo::Yes)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KeypadState {
    Lock,
    Unlock,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PumpAction {
    Start,
    Stop,
}

/// Parse a hex string like "0x0A" or "0A" into a u8.
fn parse_hex_u8(s: &str) -> std::result::Result<u8, String> {
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(s, 16).map_err(|e| format!("invalid hex byte: {e}"))
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// File settings with command-line overrides applied.
fn controller_settings(cli: &Cli, file: &ControllerConfig) -> ControllerConfig {
    let mut settings = file.clone();
    if let Some(port) = &cli.port {
        settings.port = Some(port.clone());
    }
    if let Some(tcp) = &cli.tcp {
        settings.tcp = Some(tcp.clone());
    }
    if let Some(baud) = cli.baud {
        settings.baud_rate = baud;
    }
    if let Some(address) = cli.address {
        settings.bus_address = address;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        settings.timeout_ms = timeout_ms;
    }
    if let Some(retries) = cli.retries {
        settings.retries = retries;
    }
    settings
}

async fn connect(cli: &Cli, file: &FileConfig) -> Result<SpceController> {
    let settings = controller_settings(cli, &file.controller);
    let builder = SpceBuilder::new()
        .bus_address(settings.bus_address)
        .baud_rate(settings.baud_rate)
        .command_timeout(settings.timeout())
        .max_retries(settings.retries)
        .retry_backoff(settings.backoff());

    if cli.sim {
        let mut sim_config = file.simulator.to_sim_config()?;
        sim_config.bus_address = spcelib::BusAddress::new(settings.bus_address)
            .context("invalid --address")?;
        let transport = SimulatedTransport::new(DeviceModel::new(sim_config));
        return builder
            .build_with_transport(Box::new(transport))
            .await
            .context("failed to build simulated controller");
    }

    match (&settings.tcp, &settings.port) {
        (Some(addr), _) => builder
            .tcp_address(addr)
            .build()
            .await
            .with_context(|| format!("failed to connect to {addr}")),
        (None, Some(port)) => builder
            .serial_port(port)
            .build()
            .await
            .with_context(|| {
                format!("failed to open serial port {port} at {} baud", settings.baud_rate)
            }),
        (None, None) => bail!(
            "no controller link: pass --port or --tcp, set controller.port in the config file, or use --sim"
        ),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_info(pump: &SpceController) -> Result<()> {
    println!("Controller on bus {}:", pump.bus_address());
    println!("  Model:          {}", pump.model().await?);
    println!("  Version:        {}", pump.version().await?);
    println!("  Pump:           {}", pump.pump_status().await?);
    println!("  High voltage:   {}", on_off(pump.high_voltage_on().await?));
    println!("  Pump size:      {} L/s", pump.pump_size().await?);
    println!("  Cal factor:     {:.2}", pump.cal_factor().await?);
    Ok(())
}

async fn cmd_read(pump: &SpceController, quantity: Quantity) -> Result<()> {
    match quantity {
        Quantity::Current => println!("{:.3} mA", pump.current_ma().await?),
        Quantity::Voltage => println!("{:.3} kV", pump.voltage_kv().await?),
        Quantity::Pressure => println!("{:.3e}", pump.pressure().await?),
        Quantity::Telemetry => println!("{}", format_telemetry(&pump.read_telemetry().await?)),
        Quantity::Model => println!("{}", pump.model().await?),
        Quantity::Version => println!("{}", pump.version().await?),
        Quantity::PumpStatus => println!("{}", pump.pump_status().await?),
        Quantity::PumpSize => println!("{} L/s", pump.pump_size().await?),
        Quantity::CalFactor => println!("{:.2}", pump.cal_factor().await?),
        Quantity::AutoRestart => println!("{}", on_off(pump.auto_restart().await?)),
        Quantity::HighVoltage => println!("{}", on_off(pump.high_voltage_on().await?)),
        Quantity::HvAutorecovery => println!("{}", pump.hv_autorecovery().await?),
        Quantity::ArcDetect => println!("{}", on_off(pump.arc_detect().await?)),
        Quantity::AnalogMode => println!("{}", pump.analog_mode().await?),
        Quantity::CommMode => println!("{}", pump.comm_mode().await?),
    }
    Ok(())
}

async fn cmd_set(pump: &SpceController, setting: &Setting) -> Result<()> {
    match *setting {
        Setting::PumpSize { liters_per_second } => pump.set_pump_size(liters_per_second).await?,
        Setting::CalFactor { factor } => pump.set_cal_factor(factor).await?,
        Setting::Units { units } => pump.set_units(units.into()).await?,
        Setting::AutoRestart { value } => pump.set_auto_restart(value.enabled()).await?,
        Setting::HvAutorecovery { mode } => pump.set_hv_autorecovery(mode).await?,
        Setting::ArcDetect { value } => pump.set_arc_detect(value.enabled()).await?,
        Setting::AnalogMode { mode } => pump.set_analog_mode(mode).await?,
        Setting::CommMode { mode } => pump.set_comm_mode(mode).await?,
        Setting::CommInterface { interface } => pump.set_comm_interface(interface).await?,
        Setting::Keypad { state } => match state {
            KeypadState::Lock => pump.lock_keypad().await?,
            KeypadState::Unlock => pump.unlock_keypad().await?,
        },
    }
    println!("OK");
    Ok(())
}

async fn cmd_pump(pump: &SpceController, action: PumpAction) -> Result<()> {
    match action {
        PumpAction::Start => pump.start_pump().await?,
        PumpAction::Stop => pump.stop_pump().await?,
    }
    println!("Pump: {}", pump.pump_status().await?);
    Ok(())
}

async fn cmd_monitor(pump: &SpceController, interval: Duration, count: u64) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    let mut taken = 0u64;

    while count == 0 || taken < count {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(samples = taken, "monitor interrupted");
                break;
            }
            _ = ticker.tick() => {
                let sample = pump.read_telemetry().await?;
                println!("{}", format_telemetry(&sample));
                taken += 1;
            }
        }
    }
    Ok(())
}

async fn cmd_raw(pump: &SpceController, code: u8, argument: Option<&str>) -> Result<()> {
    match pump.raw(CommandCode(code), argument).await? {
        ResponseOutcome::Ok { payload, .. } if payload.is_empty() => println!("OK"),
        ResponseOutcome::Ok { payload, .. } => println!("OK {payload}"),
        ResponseOutcome::DeviceError { code, .. } => {
            println!("ER {code} ({})", code.description())
        }
    }
    Ok(())
}

async fn cmd_simulate(
    file: &FileConfig,
    listen: Option<String>,
    serial: Option<String>,
    seed: Option<u64>,
) -> Result<()> {
    let mut settings = file.simulator.clone();
    if seed.is_some() {
        settings.seed = seed;
    }
    let model = DeviceModel::new(settings.to_sim_config()?);

    let serial = serial.or(settings.port.clone());
    let listen = listen.or(settings.listen.clone());
    let handle = match (serial, listen) {
        (Some(port), _) => {
            let line = SerialConfig::with_baud_rate(settings.baud_rate);
            sim::spawn_serial(&port, line, model)
                .await
                .with_context(|| format!("failed to open serial port {port}"))?
        }
        (None, Some(addr)) => sim::spawn_tcp(&addr, model)
            .await
            .with_context(|| format!("failed to listen on {addr}"))?,
        (None, None) => bail!("simulate needs --listen or --serial (or simulator.listen in the config file)"),
    };

    println!("Simulator running on bus {:02}. Press Ctrl-C to stop.", settings.bus_address);
    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;
    let model = handle.shutdown().await?;
    info!(requests = model.requests_handled(), "simulator stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn on_off(value: bool) -> &'static str {
    if value { "ON" } else { "OFF" }
}

fn format_telemetry(t: &Telemetry) -> String {
    let ts = t
        .timestamp
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    format!(
        "{ts:.3}  {:>8.3} kV  {:>8.3} mA  {:>10.3e}",
        t.voltage_kv, t.current_ma, t.pressure
    )
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    if let Command::Simulate {
        listen,
        serial,
        seed,
    } = &cli.command
    {
        return cmd_simulate(&file, listen.clone(), serial.clone(), *seed).await;
    }

    let pump = connect(&cli, &file).await?;

    let result = match &cli.command {
        Command::Info => cmd_info(&pump).await,
        Command::Read { quantity } => cmd_read(&pump, *quantity).await,
        Command::Set { setting } => cmd_set(&pump, setting).await,
        Command::Pump { action } => cmd_pump(&pump, *action).await,
        Command::Reset => pump.reset().await.map_err(Into::into),
        Command::Monitor { interval_ms, count } => {
            let interval = Duration::from_millis(interval_ms.unwrap_or(file.monitor.interval_ms));
            cmd_monitor(&pump, interval, *count).await
        }
        Command::Raw { code, argument } => cmd_raw(&pump, *code, argument.as_deref()).await,
        Command::Simulate { .. } => unreachable!("simulate handled above"),
    };
    pump.close().await.ok();
    result
}
