//! Service configuration, loaded once at startup from a JSON file.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use tracklink_core::{DEFAULT_MIN_SATELLITES, DecoderConfig, ProtocolKind};

/// A port entry that cannot be turned into a port range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortSpecError {
    #[error("'{entry}' is not a port number: {reason}")]
    NotANumber { entry: String, reason: String },

    #[error("port range '{0}' starts after it ends")]
    Reversed(String),

    #[error("port {port} is bound to both {first} and {second}")]
    Duplicate {
        port: u16,
        first: ProtocolKind,
        second: ProtocolKind,
    },
}

/// One group of ports served by the same protocol decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Single ports (`"20100"`) or inclusive ranges (`"20100-20105"`,
    /// `"20100:20105"`).
    pub ports: Vec<String>,
    pub protocol: ProtocolKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub service_name: String,
    pub bind_address: String,
    pub storage_root: PathBuf,
    pub min_satellites: u32,
    pub idle_timeout_secs: u64,
    pub max_read_bytes: usize,
    /// Capacity of the queue between connections and the storage writer.
    pub storage_queue: usize,
    pub shutdown_poll_ms: u64,
    pub shutdown_max_polls: u32,
    pub listeners: Vec<ListenerConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let listener = |port: &str, protocol| ListenerConfig {
            ports: vec![port.to_string()],
            protocol,
        };
        Self {
            service_name: "tracklinkd".to_string(),
            bind_address: "0.0.0.0".to_string(),
            storage_root: PathBuf::from("data"),
            min_satellites: DEFAULT_MIN_SATELLITES,
            idle_timeout_secs: 180,
            max_read_bytes: 10 * 1024,
            storage_queue: 1024,
            shutdown_poll_ms: 500,
            shutdown_max_polls: 10,
            listeners: vec![
                listener("20100", ProtocolKind::Codec8),
                listener("20101", ProtocolKind::Codec8Extended),
                listener("20102", ProtocolKind::GryphonPro),
                listener("20103", ProtocolKind::GryphonM01),
                listener("20104", ProtocolKind::Wialon),
            ],
        }
    }
}

impl ServiceConfig {
    /// Load the configuration at `path`, writing the defaults there first if
    /// the file does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        let config = if tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("Failed to check config path {}", path.display()))?
        {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: ServiceConfig =
                serde_json::from_str(&content).context("Failed to parse config file")?;
            debug!(path = %path.display(), "Loaded config");
            config
        } else {
            let config = Self::default();
            config.save(path).await?;
            info!(path = %path.display(), "Created default config");
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        tokio::fs::write(path, content)
            .await
            .context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.listeners.is_empty() {
            anyhow::bail!("No listeners configured");
        }
        if self.storage_root.as_os_str().is_empty() {
            anyhow::bail!("Storage root must not be empty");
        }
        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Invalid idle timeout: {} s", self.idle_timeout_secs);
        }
        if self.max_read_bytes == 0 {
            anyhow::bail!("Invalid read buffer size: {} bytes", self.max_read_bytes);
        }
        if self.storage_queue == 0 {
            anyhow::bail!("Invalid storage queue capacity: {}", self.storage_queue);
        }
        if self.shutdown_poll_ms == 0 {
            anyhow::bail!("Invalid shutdown poll interval: {} ms", self.shutdown_poll_ms);
        }
        self.bindings()?;
        Ok(())
    }

    /// Every configured port with the protocol it serves, in port order.
    pub fn bindings(&self) -> Result<Vec<(u16, ProtocolKind)>, PortSpecError> {
        let mut bound: BTreeMap<u16, ProtocolKind> = BTreeMap::new();
        for listener in &self.listeners {
            for entry in &listener.ports {
                for port in parse_port_range(entry)? {
                    if let Some(&first) = bound.get(&port) {
                        return Err(PortSpecError::Duplicate {
                            port,
                            first,
                            second: listener.protocol,
                        });
                    }
                    bound.insert(port, listener.protocol);
                }
            }
        }
        Ok(bound.into_iter().collect())
    }

    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            min_satellites: self.min_satellites,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn shutdown_poll(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms)
    }
}

/// Parse `"20100"`, `"20100-20105"` or `"20100:20105"`.
pub fn parse_port_range(entry: &str) -> Result<RangeInclusive<u16>, PortSpecError> {
    let entry = entry.trim();
    let port = |text: &str| {
        text.trim()
            .parse::<u16>()
            .map_err(|e| PortSpecError::NotANumber {
                entry: entry.to_string(),
                reason: e.to_string(),
            })
    };

    match entry.split_once(['-', ':']) {
        Some((start, end)) => {
            let (start, end) = (port(start)?, port(end)?);
            if start > end {
                return Err(PortSpecError::Reversed(entry.to_string()));
            }
            Ok(start..=end)
        }
        None => {
            let single = port(entry)?;
            Ok(single..=single)
        }
    }
}
