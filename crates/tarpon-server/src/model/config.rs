//! Configuration management for the Tarpon server
//!
//! Configuration is layered: `conf/tarpon.yml` (optional), `TARPON_`-prefixed
//! environment variables, then command line overrides, highest last.

use clap::Parser;
use config::{Config, Environment};
use serde::Deserialize;

use tarpon_api::model::{ClusterNode, ModuleId};

use crate::startup::{LoggingConfig, default_log_dir};

pub const DEFAULT_SERVER_PORT: u16 = 4447;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;
pub const DEFAULT_RECOVERY_SCAN_INTERVAL_SECS: u64 = 120;

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command()]
struct Cli {
    #[arg(short = 'p', long = "port", env = "TARPON_PORT")]
    port: Option<u16>,
    #[arg(short = 'n', long = "node-name", env = "TARPON_NODE_NAME")]
    node_name: Option<String>,
    #[arg(long = "bind-address")]
    bind_address: Option<String>,
}

/// Seed member of a statically configured cluster group.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberSeed {
    pub name: String,
    pub address: String,
}

/// Statically configured cluster group.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupSeed {
    pub name: String,
    #[serde(default)]
    pub members: Vec<MemberSeed>,
}

/// Statically configured deployed module.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleSeed {
    pub app: String,
    pub module: String,
    #[serde(default)]
    pub distinct: String,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new() -> anyhow::Result<Self> {
        let args = Cli::parse();
        Self::build(args.port, args.node_name, args.bind_address)
    }

    /// Build without consuming process arguments; used by tests.
    pub fn build(
        port: Option<u16>,
        node_name: Option<String>,
        bind_address: Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config_builder = Config::builder()
            .add_source(
                Environment::with_prefix("tarpon")
                    .separator(".")
                    .try_parsing(true),
            )
            .add_source(config::File::with_name("conf/tarpon.yml").required(false));

        if let Some(v) = port {
            config_builder = config_builder.set_override("tarpon.server.port", v)?;
        }
        if let Some(v) = node_name {
            config_builder = config_builder.set_override("tarpon.node.name", v)?;
        }
        if let Some(v) = bind_address {
            config_builder = config_builder.set_override("tarpon.server.address", v)?;
        }

        let config = config_builder.build()?;
        Ok(Configuration { config })
    }

    // ========================================================================
    // Server
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("tarpon.server.address")
            .unwrap_or_else(|_| "0.0.0.0".to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int("tarpon.server.port")
            .ok()
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_address(), self.server_port())
    }

    pub fn node_name(&self) -> String {
        self.config
            .get_string("tarpon.node.name")
            .unwrap_or_else(|_| "tarpon-node".to_string())
    }

    pub fn channel_capacity(&self) -> usize {
        self.config
            .get_int("tarpon.channel.capacity")
            .ok()
            .and_then(|v| usize::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn max_frame_len(&self) -> usize {
        self.config
            .get_int("tarpon.channel.max_frame_bytes")
            .ok()
            .and_then(|v| usize::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_FRAME_LEN)
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    pub fn recovery_scan_interval_secs(&self) -> u64 {
        self.config
            .get_int("tarpon.recovery.scan_interval_secs")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_RECOVERY_SCAN_INTERVAL_SECS)
    }

    // ========================================================================
    // Static topology and deployment seeds
    // ========================================================================

    pub fn cluster_groups(&self) -> Vec<(String, Vec<ClusterNode>)> {
        let seeds: Vec<GroupSeed> = self.config.get("tarpon.cluster.groups").unwrap_or_default();
        seeds
            .into_iter()
            .map(|group| {
                let members = group
                    .members
                    .into_iter()
                    .map(|m| ClusterNode {
                        name: m.name,
                        address: m.address,
                    })
                    .collect();
                (group.name, members)
            })
            .collect()
    }

    pub fn modules(&self) -> Vec<ModuleId> {
        let seeds: Vec<ModuleSeed> = self.config.get("tarpon.modules").unwrap_or_default();
        seeds
            .into_iter()
            .map(|m| ModuleId {
                app: m.app,
                module: m.module,
                distinct: m.distinct,
            })
            .collect()
    }

    // ========================================================================
    // Observability
    // ========================================================================

    pub fn metrics_enabled(&self) -> bool {
        self.config
            .get_bool("tarpon.metrics.enabled")
            .unwrap_or(false)
    }

    pub fn metrics_addr(&self) -> String {
        self.config
            .get_string("tarpon.metrics.address")
            .unwrap_or_else(|_| "0.0.0.0:9100".to_string())
    }

    pub fn logging_config(&self) -> LoggingConfig {
        let mut logging = LoggingConfig::from_env();
        if let Ok(dir) = self.config.get_string("tarpon.logs.path") {
            logging.log_dir = dir.into();
        } else {
            logging.log_dir = default_log_dir();
        }
        if let Ok(level) = self.config.get_string("tarpon.logs.level")
            && let Ok(level) = level.parse()
        {
            logging.console_level = level;
            logging.file_level = level;
        }
        logging
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let configuration = Configuration::build(None, None, None).unwrap();
        assert_eq!(configuration.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(configuration.channel_capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(configuration.max_frame_len(), DEFAULT_MAX_FRAME_LEN);
        assert_eq!(
            configuration.recovery_scan_interval_secs(),
            DEFAULT_RECOVERY_SCAN_INTERVAL_SECS
        );
        assert!(configuration.cluster_groups().is_empty());
        assert!(configuration.modules().is_empty());
        assert!(!configuration.metrics_enabled());
    }

    #[test]
    fn test_overrides_win() {
        let configuration =
            Configuration::build(Some(7447), Some("node-b".into()), Some("127.0.0.1".into()))
                .unwrap();
        assert_eq!(configuration.listen_addr(), "127.0.0.1:7447");
        assert_eq!(configuration.node_name(), "node-b");
    }
}
