//! Configuration management for ft231x-bridge.
//!
//! [`PortConfig`] is the immutable serial frame format supplied when a port
//! is constructed. [`TransferOptions`] holds timeouts and the read poll cap.
//! [`BridgeConfig`] bundles both with a device selector and is loaded from a
//! TOML file by the binaries.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::{Parity, StopBits, FT231X_PID, FTDI_VID};

/// Serial frame format and speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PortConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl Default for PortConfig {
    /// 9600 baud, 8 data bits, no parity, one stop bit.
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

impl PortConfig {
    /// 8N1 at `baud_rate`.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    pub fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }
}

/// Timeouts and polling limits for transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransferOptions {
    /// Timeout of each control transfer (ms)
    pub control_timeout_ms: u64,
    /// Timeout of each bulk IN transfer (ms)
    pub read_timeout_ms: u64,
    /// Timeout of each bulk OUT transfer (ms)
    pub write_timeout_ms: u64,
    /// Give up a read after this many status-only transfers; `None` waits
    /// until data arrives or the read is cancelled
    pub max_read_polls: Option<u32>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            control_timeout_ms: 1000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            max_read_polls: None,
        }
    }
}

impl TransferOptions {
    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Apply `FT231X_*` environment overrides on top of these options.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        if let Some(ms) = parse("FT231X_CONTROL_TIMEOUT_MS") {
            self.control_timeout_ms = ms;
        }
        if let Some(ms) = parse("FT231X_READ_TIMEOUT_MS") {
            self.read_timeout_ms = ms;
        }
        if let Some(ms) = parse("FT231X_WRITE_TIMEOUT_MS") {
            self.write_timeout_ms = ms;
        }
        if let Some(polls) = parse("FT231X_MAX_READ_POLLS") {
            // 0 restores the unbounded drain loop
            self.max_read_polls = u32::try_from(polls).ok().filter(|&n| n > 0);
        }
        self
    }
}

/// Which device to open.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceSelector {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self {
            vendor_id: FTDI_VID,
            product_id: FT231X_PID,
            serial_number: None,
        }
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub device: DeviceSelector,
    pub port: PortConfig,
    pub transfer: TransferOptions,
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Parse configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_9600_8n1() {
        let config = PortConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.data_bits, 8);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.parity, Parity::None);
    }

    #[test]
    fn test_builder() {
        let config = PortConfig::new(115200)
            .with_data_bits(7)
            .with_parity(Parity::Even)
            .with_stop_bits(StopBits::Two);
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.data_bits, 7);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::Two);
    }

    #[test]
    fn test_parse_full_file() {
        let config = BridgeConfig::parse(
            r#"
            [device]
            vendor_id = 1027
            product_id = 24597
            serial_number = "DK0AB1CD"

            [port]
            baud_rate = 115200
            data_bits = 7
            parity = "odd"
            stop_bits = "2"

            [transfer]
            read_timeout_ms = 250
            max_read_polls = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.device.vendor_id, FTDI_VID);
        assert_eq!(config.device.product_id, FT231X_PID);
        assert_eq!(config.device.serial_number.as_deref(), Some("DK0AB1CD"));
        assert_eq!(
            config.port,
            PortConfig::new(115200)
                .with_data_bits(7)
                .with_parity(Parity::Odd)
                .with_stop_bits(StopBits::Two)
        );
        assert_eq!(config.transfer.read_timeout(), Duration::from_millis(250));
        assert_eq!(config.transfer.control_timeout(), Duration::from_secs(1));
        assert_eq!(config.transfer.max_read_polls, Some(8));
    }

    #[test]
    fn test_parse_empty_file_gives_defaults() {
        assert_eq!(BridgeConfig::parse("").unwrap(), BridgeConfig::default());
    }

    #[test]
    fn test_parse_rejects_unknown_parity() {
        let err = BridgeConfig::parse("[port]\nparity = \"sometimes\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = BridgeConfig::load_from(Path::new("/nonexistent/ft231x.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env = |key: &str| match key {
            "FT231X_READ_TIMEOUT_MS" => Some("100".to_string()),
            "FT231X_WRITE_TIMEOUT_MS" => Some("not a number".to_string()),
            "FT231X_MAX_READ_POLLS" => Some("3".to_string()),
            _ => None,
        };
        let options = TransferOptions::default().with_overrides(env);
        assert_eq!(options.read_timeout_ms, 100);
        assert_eq!(options.write_timeout_ms, 5000);
        assert_eq!(options.control_timeout_ms, 1000);
        assert_eq!(options.max_read_polls, Some(3));

        let unbounded = options.with_overrides(|key| {
            (key == "FT231X_MAX_READ_POLLS").then(|| "0".to_string())
        });
        assert_eq!(unbounded.max_read_polls, None);
    }
}
