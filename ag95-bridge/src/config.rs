//! Configuration for the gripper bridge.

use ag95_common::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] ag95_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Serial link to the gripper
    #[serde(default)]
    pub serial: SerialConfig,

    /// Connection lifecycle settings
    #[serde(default)]
    pub link: LinkConfig,

    /// Composite routine timing
    #[serde(default)]
    pub routines: RoutineConfig,

    /// Remote-procedure endpoint
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Modbus RTU serial link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0")
    #[serde(default = "default_port")]
    pub port: String,

    /// Baud rate (default: 115200)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Parity (default: none)
    #[serde(default)]
    pub parity: Parity,

    /// Stop bits: 1 or 2 (default: 1)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,

    /// Modbus slave address (1-247)
    #[serde(default = "default_slave")]
    pub slave: u8,

    /// Response timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Request transmit timeout in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Function used for single-register reads
    #[serde(default)]
    pub read_function: ReadFunction,
}

fn default_port() -> String {
    "/dev/ur-ttylink/ttyTool".to_string()
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_stop_bits() -> u8 {
    1
}

fn default_slave() -> u8 {
    1
}

fn default_read_timeout_ms() -> u64 {
    50
}

fn default_write_timeout_ms() -> u64 {
    500
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            parity: Parity::default(),
            stop_bits: default_stop_bits(),
            slave: default_slave(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            read_function: ReadFunction::default(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Upper bound for one request/response exchange.
    pub fn transaction_timeout(&self) -> Duration {
        self.write_timeout() + self.read_timeout()
    }
}

/// Serial parity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Modbus function used to read a single register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFunction {
    /// Read holding registers (0x03)
    #[default]
    Holding,
    /// Read input registers (0x04)
    Input,
}

impl ReadFunction {
    pub fn code(&self) -> u8 {
        match self {
            ReadFunction::Holding => 0x03,
            ReadFunction::Input => 0x04,
        }
    }
}

/// Connection lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Settle time after the warm-up transaction, in milliseconds
    #[serde(default = "default_warmup_delay_ms")]
    pub warmup_delay_ms: u64,
}

fn default_warmup_delay_ms() -> u64 {
    100
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            warmup_delay_ms: default_warmup_delay_ms(),
        }
    }
}

/// Timing of the composite routines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineConfig {
    /// Delay between status polls, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Status polls while waiting for initialization
    #[serde(default = "default_init_attempts")]
    pub init_attempts: u32,

    /// Status polls while waiting for finger motion to stop
    #[serde(default = "default_motion_attempts")]
    pub motion_attempts: u32,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_init_attempts() -> u32 {
    80
}

fn default_motion_attempts() -> u32 {
    50
}

impl Default for RoutineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            init_attempts: default_init_attempts(),
            motion_attempts: default_motion_attempts(),
        }
    }
}

/// Remote-procedure endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Listen address (default: "0.0.0.0:40405")
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "0.0.0.0:40405".to_string()
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl RpcConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|e| {
            ConfigError::Validation(format!("invalid rpc listen address '{}': {}", self.listen, e))
        })
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: BridgeConfig = ag95_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let serial = &self.serial;

        if serial.port.is_empty() {
            return Err(ConfigError::Validation(
                "Serial port cannot be empty".to_string(),
            ));
        }

        if serial.baud_rate == 0 {
            return Err(ConfigError::Validation(
                "Baud rate must be positive".to_string(),
            ));
        }

        if !matches!(serial.stop_bits, 1 | 2) {
            return Err(ConfigError::Validation(format!(
                "invalid stop_bits {} (use 1 or 2)",
                serial.stop_bits
            )));
        }

        if !(1..=247).contains(&serial.slave) {
            return Err(ConfigError::Validation(format!(
                "slave address must be 1-247, got {}",
                serial.slave
            )));
        }

        if serial.read_timeout_ms == 0 || serial.write_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Serial timeouts must be positive".to_string(),
            ));
        }

        if self.routines.init_attempts == 0 || self.routines.motion_attempts == 0 {
            return Err(ConfigError::Validation(
                "Routine attempt counts must be positive".to_string(),
            ));
        }

        self.rpc.listen_addr()?;

        Ok(())
    }
}
