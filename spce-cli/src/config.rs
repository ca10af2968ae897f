//! YAML configuration file for `spce`.
//!
//! Every section and field is optional; command-line flags override what the
//! file says. See `spce.example.yaml` for a commented sample.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use spcelib::sim::{DeviceState, SimConfig};
use spcelib::BusAddress;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub controller: ControllerConfig,
    pub monitor: MonitorConfig,
    pub simulator: SimulatorConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        // A document of only `~` or `null` reads as no configuration.
        let parsed: Option<FileConfig> = serde_yaml::from_str(text)?;
        Ok(parsed.unwrap_or_default())
    }
}

/// How to reach the controller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub bus_address: u8,
    /// Serial port path.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// `host:port` of a serial-over-TCP bridge; wins over `port`.
    pub tcp: Option<String>,
    pub timeout_ms: u64,
    pub retries: u32,
    pub backoff_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            bus_address: 1,
            port: None,
            baud_rate: 9600,
            tcp: None,
            timeout_ms: 500,
            retries: 3,
            backoff_ms: 20,
        }
    }
}

impl ControllerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig { interval_ms: 1000 }
    }
}

/// Largest accepted random-walk step, in kV or mA per read.
pub const MAX_STEP: f64 = 10.0;

/// Simulated controller: identity, seed state and where to serve it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    pub bus_address: u8,
    /// TCP `host:port` to listen on.
    pub listen: Option<String>,
    /// Serial port to attach to, e.g. one end of a socat pty pair.
    pub port: Option<String>,
    pub baud_rate: u32,
    pub seed: Option<u64>,
    pub model: String,
    pub version: String,
    pub voltage_kv: f64,
    pub current_ma: f64,
    pub pump_size_lps: u16,
    pub voltage_step_kv: f64,
    pub current_step_ma: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let sim = SimConfig::default();
        SimulatorConfig {
            bus_address: sim.bus_address.value(),
            listen: None,
            port: None,
            baud_rate: 9600,
            seed: None,
            model: sim.model,
            version: sim.version,
            voltage_kv: sim.initial.voltage_kv,
            current_ma: sim.initial.current_ma,
            pump_size_lps: sim.initial.pump_size_lps,
            voltage_step_kv: sim.voltage_step_kv,
            current_step_ma: sim.current_step_ma,
        }
    }
}

impl SimulatorConfig {
    pub fn to_sim_config(&self) -> Result<SimConfig> {
        anyhow::ensure!(
            self.voltage_kv > 0.0 && self.current_ma > 0.0,
            "simulator voltage and current must be positive"
        );
        for (name, step) in [
            ("voltage_step_kv", self.voltage_step_kv),
            ("current_step_ma", self.current_step_ma),
        ] {
            anyhow::ensure!(
                step.is_finite() && (0.0..=MAX_STEP).contains(&step),
                "simulator {name} must be between 0 and {MAX_STEP}, got {step}"
            );
        }
        let bus_address = BusAddress::new(self.bus_address)
            .context("invalid simulator bus address")?;
        Ok(SimConfig {
            bus_address,
            model: self.model.clone(),
            version: self.version.clone(),
            initial: DeviceState {
                voltage_kv: self.voltage_kv,
                current_ma: self.current_ma,
                pump_size_lps: self.pump_size_lps,
                ..DeviceState::default()
            },
            voltage_step_kv: self.voltage_step_kv,
            current_step_ma: self.current_step_ma,
            seed: self.seed,
        })
    }
}
