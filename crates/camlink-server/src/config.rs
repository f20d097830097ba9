//! Peripheral configuration.

use std::path::PathBuf;
use std::time::Duration;

use camlink_protocol::{DEFAULT_BULK_FRAME_SIZE, MAX_BULK_FRAME_SIZE, MIN_BULK_FRAME_SIZE};

use crate::error::{ServerError, ServerResult};

/// Peripheral configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bulk frame size before any negotiation.
    pub default_packet_size: usize,

    /// In-flight bulk sends allowed per subscriber before awaiting the batch.
    pub batch_per_subscriber: usize,

    /// Pause between bulk batches.
    pub inter_batch_delay: Duration,

    /// Pause between frames of a broadcast.
    pub broadcast_delay: Duration,

    /// Recording tick period.
    pub tick_interval: Duration,

    /// Age after which an incomplete reassembly session is dropped.
    pub reassembly_ttl: Duration,

    /// File sent on `preview_recording`.
    pub preview_source: Option<PathBuf>,

    pub device_id: String,
    pub device_name: String,

    /// Notify new negotiation subscribers with a probe buffer.
    pub negotiation_probe: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_packet_size: DEFAULT_BULK_FRAME_SIZE,
            batch_per_subscriber: 5,
            inter_batch_delay: Duration::from_millis(5),
            broadcast_delay: Duration::from_millis(10),
            tick_interval: Duration::from_secs(1),
            reassembly_ttl: Duration::from_secs(30),
            preview_source: None,
            device_id: default_device_id(),
            device_name: default_device_name(),
            negotiation_probe: true,
        }
    }
}

impl ServerConfig {
    /// Builder: set the pre-negotiation bulk frame size.
    pub fn with_packet_size(mut self, size: usize) -> Self {
        self.default_packet_size = size;
        self
    }

    /// Builder: set batch size and delay for bulk transfers.
    pub fn with_batching(mut self, per_subscriber: usize, delay: Duration) -> Self {
        self.batch_per_subscriber = per_subscriber;
        self.inter_batch_delay = delay;
        self
    }

    pub fn with_broadcast_delay(mut self, delay: Duration) -> Self {
        self.broadcast_delay = delay;
        self
    }

    /// Builder: set the recording tick period. Must be non-zero.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_reassembly_ttl(mut self, ttl: Duration) -> Self {
        self.reassembly_ttl = ttl;
        self
    }

    /// Builder: file sent on a preview request.
    pub fn with_preview_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.preview_source = Some(path.into());
        self
    }

    /// Builder: identity reported to centrals.
    pub fn with_device(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.device_id = id.into();
        self.device_name = name.into();
        self
    }

    pub fn with_negotiation_probe(mut self, enabled: bool) -> Self {
        self.negotiation_probe = enabled;
        self
    }

    /// Checks values that would make the peripheral unusable.
    pub fn validate(&self) -> ServerResult<()> {
        if !(MIN_BULK_FRAME_SIZE..=MAX_BULK_FRAME_SIZE).contains(&self.default_packet_size) {
            return Err(ServerError::config(format!(
                "packet size {} must be within {}..={}",
                self.default_packet_size, MIN_BULK_FRAME_SIZE, MAX_BULK_FRAME_SIZE
            )));
        }
        if self.batch_per_subscriber == 0 {
            return Err(ServerError::config("batch_per_subscriber must be at least 1"));
        }
        if self.tick_interval.is_zero() {
            return Err(ServerError::config("tick interval must be non-zero"));
        }
        Ok(())
    }
}

/// Device id from `COMPUTERNAME` or `HOSTNAME`, else a fixed fallback.
pub fn default_device_id() -> String {
    ["COMPUTERNAME", "HOSTNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "camlink-sim".to_string())
}

/// Device name reported on `get_device`.
pub fn default_device_name() -> String {
    format!("{} ({})", std::env::consts::OS, std::env::consts::ARCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.default_packet_size, 512);
        assert_eq!(config.batch_per_subscriber, 5);
        assert_eq!(config.inter_batch_delay, Duration::from_millis(5));
        assert_eq!(config.broadcast_delay, Duration::from_millis(10));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert!(config.negotiation_probe);
        assert!(config.preview_source.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn custom_config() {
        let config = ServerConfig::default()
            .with_packet_size(1024)
            .with_batching(2, Duration::ZERO)
            .with_preview_source("/tmp/preview.mp4")
            .with_device("dev-1", "Camera")
            .with_negotiation_probe(false);

        assert_eq!(config.default_packet_size, 1024);
        assert_eq!(config.batch_per_subscriber, 2);
        assert_eq!(config.preview_source, Some(PathBuf::from("/tmp/preview.mp4")));
        assert_eq!(config.device_id, "dev-1");
        assert_eq!(config.device_name, "Camera");
        assert!(!config.negotiation_probe);
    }

    #[test]
    fn rejects_unusable_values() {
        assert!(ServerConfig::default().with_packet_size(9).validate().is_err());
        assert!(ServerConfig::default().with_packet_size(4097).validate().is_err());
        assert!(
            ServerConfig::default()
                .with_batching(0, Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ServerConfig::default()
                .with_tick_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
