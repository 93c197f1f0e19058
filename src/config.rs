use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::devices::rtb2000::{chan_ok, Coupling, TriggerMode, TriggerSlope};
use crate::instrument::{DEFAULT_OPC_TIMEOUT_MS, DEFAULT_VISA_TIMEOUT_MS};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub acquisition: AcquisitionConfig,
    pub trigger: TriggerConfig,
    pub screenshot: ScreenshotConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// VISA resource string, `TCPIP::<host>::INSTR` or `TCPIP::<host>::<port>::SOCKET`
    pub resource: String,
    pub visa_timeout_ms: u64,
    pub opc_timeout_ms: u64,
    pub status_checking: bool,
    pub id_query: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub acquisition_time: f64,
    pub channel: u8,
    pub range: f64,
    pub offset: f64,
    pub coupling: Coupling,
    /// Has to be longer than the acquisition time
    pub acquisition_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TriggerConfig {
    pub mode: TriggerMode,
    pub slope: TriggerSlope,
    pub source_channel: u8,
    pub level: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ScreenshotConfig {
    pub enabled: bool,
    pub instrument_dir: String,
    pub name: String,
    pub pc_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Where to write the binary waveform as JSON, skipped when unset
    pub waveform_json: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resource: "TCPIP::192.168.2.10::INSTR".to_owned(),
            visa_timeout_ms: DEFAULT_VISA_TIMEOUT_MS,
            opc_timeout_ms: DEFAULT_OPC_TIMEOUT_MS,
            status_checking: true,
            id_query: true,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            acquisition_time: 0.01,
            channel: 1,
            range: 5.0,
            offset: 0.0,
            coupling: Coupling::AcLimit,
            acquisition_timeout_ms: 2000,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::Auto,
            slope: TriggerSlope::Positive,
            source_channel: 1,
            level: 0.05,
        }
    }
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            instrument_dir: "/INT/".to_owned(),
            name: "Dev_Screenshot".to_owned(),
            pc_path: "PC_Screenshot.png".to_owned(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        chan_ok(self.acquisition.channel)
            .map_err(|e| ConfigError::Message(format!("acquisition.channel: {}", e)))?;
        chan_ok(self.trigger.source_channel)
            .map_err(|e| ConfigError::Message(format!("trigger.source_channel: {}", e)))?;

        if !(self.acquisition.acquisition_time > 0.0) {
            return Err(ConfigError::Message("acquisition.acquisition_time must be positive".into()));
        }
        if (self.acquisition.acquisition_timeout_ms as f64) / 1000.0 <= self.acquisition.acquisition_time {
            return Err(ConfigError::Message("acquisition.acquisition_timeout_ms must exceed the acquisition time".into()));
        }
        if self.screenshot.enabled && self.screenshot.name.contains('.') {
            return Err(ConfigError::Message("screenshot.name must not carry a file extension".into()));
        }

        Ok(())
    }
}

/// Defaults, then the TOML file (if any), then `RTB__SECTION__KEY` environment variables
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }

    let config: AppConfig = builder
        .add_source(Environment::with_prefix("RTB").prefix_separator("__").separator("__").try_parsing(true))
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}
