//! CLI configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/camlink/config.toml` by default.
//!
//! ```toml
//! [device]
//! id = "cam-01"
//! name = "Pitch camera"
//!
//! [transfer]
//! packet_size = 512
//! preview_source = "/var/lib/camlink/preview.mp4"
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use camlink_core::{TracingConfig, TracingOutputFormat, parse_level};
use camlink_server::ServerConfig;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::error::{CliError, CliResult};

/// Configuration for the camlink CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Identity reported to centrals.
    pub device: DeviceSettings,

    /// Framing and transfer tuning.
    pub transfer: TransferSettings,

    /// Log output.
    pub logging: LoggingSettings,
}

/// Device identity. Unset values fall back to the host name and platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Framing and transfer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Bulk frame size before negotiation.
    pub packet_size: usize,

    /// Frames in flight per subscriber before awaiting the batch.
    pub batch_per_subscriber: usize,

    pub inter_batch_delay_ms: u64,
    pub broadcast_delay_ms: u64,
    pub tick_interval_ms: u64,
    pub reassembly_ttl_secs: u64,

    /// Send a probe buffer to new negotiation subscribers.
    pub negotiation_probe: bool,

    /// File sent on `preview_recording`.
    pub preview_source: Option<PathBuf>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            packet_size: defaults.default_packet_size,
            batch_per_subscriber: defaults.batch_per_subscriber,
            inter_batch_delay_ms: defaults.inter_batch_delay.as_millis() as u64,
            broadcast_delay_ms: defaults.broadcast_delay.as_millis() as u64,
            tick_interval_ms: defaults.tick_interval.as_millis() as u64,
            reassembly_ttl_secs: defaults.reassembly_ttl.as_secs(),
            negotiation_probe: defaults.negotiation_probe,
            preview_source: None,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level for camlink targets when `RUST_LOG` is unset.
    pub level: String,

    /// pretty, compact or json.
    pub format: String,

    /// Explicit filter directive, overrides `level` and `RUST_LOG`.
    pub filter: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            filter: None,
        }
    }
}

impl CliConfig {
    /// Loads configuration from the default path, or defaults if it is absent.
    pub fn load() -> CliResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            CliError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("camlink")
    }

    /// Builds the peripheral configuration.
    pub fn server_config(&self) -> ServerConfig {
        let t = &self.transfer;
        let mut config = ServerConfig::default()
            .with_packet_size(t.packet_size)
            .with_batching(
                t.batch_per_subscriber,
                Duration::from_millis(t.inter_batch_delay_ms),
            )
            .with_broadcast_delay(Duration::from_millis(t.broadcast_delay_ms))
            .with_tick_interval(Duration::from_millis(t.tick_interval_ms))
            .with_reassembly_ttl(Duration::from_secs(t.reassembly_ttl_secs))
            .with_negotiation_probe(t.negotiation_probe);

        if let Some(ref path) = t.preview_source {
            config = config.with_preview_source(path);
        }
        if let Some(ref id) = self.device.id {
            config.device_id = id.clone();
        }
        if let Some(ref name) = self.device.name {
            config.device_name = name.clone();
        }
        config
    }

    /// Builds the logging configuration; `debug` forces the debug level.
    pub fn tracing_config(
        &self,
        debug: bool,
        format_override: Option<&str>,
    ) -> CliResult<TracingConfig> {
        let level = if debug {
            Level::DEBUG
        } else {
            parse_level(&self.logging.level)?
        };
        let format: TracingOutputFormat = format_override
            .unwrap_or(&self.logging.format)
            .parse()?;

        let mut config = TracingConfig::simulation()
            .with_level(level)
            .with_format(format);
        if let Some(ref filter) = self.logging.filter {
            config = config.with_env_filter(filter.clone());
        }
        Ok(config)
    }

    /// Checks the configuration without running anything.
    pub fn validate(&self) -> CliResult<()> {
        self.server_config().validate()?;
        self.tracing_config(false, None)?;
        if let Some(ref path) = self.transfer.preview_source {
            if !path.is_file() {
                return Err(CliError::Config(format!(
                    "preview source {} is not a file",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
