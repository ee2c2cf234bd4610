//! Daemon Configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then environment
//! variables prefixed with `HCI_TL__` (nested keys separated by `__`, e.g.
//! `HCI_TL__LINK__BAUD_RATE=921600`).

use config::{Config, Environment, File};
use hci_protocol::LinkConfig;
use hci_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "HCI_TL";

/// Top-level daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Maximum tracing level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Serial port settings
    pub link: LinkConfig,
    /// Queue sizes and busy handling
    pub scheduler: SchedulerConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            link: LinkConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Load the configuration; a missing file is not an error
pub fn load_config(path: Option<&str>) -> anyhow::Result<DaemonConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::with_name(path).required(false));
    }
    let config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_sources() {
        let config = load_config(None).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.scheduler.inbound_capacity, 540);
        assert_eq!(config.scheduler.outbound_capacity, 2300);
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let config = load_config(Some("/nonexistent/hci-transport.toml")).unwrap();
        assert_eq!(config.scheduler.alignment, 4);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("hci-transport-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "log_level = \"debug\"\n\
             [link]\n\
             device = \"/dev/ttyACM0\"\n\
             [scheduler]\n\
             outbound_capacity = 4096\n\
             buffer_commands_on_busy = false\n",
        )
        .unwrap();

        let config = load_config(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.link.device, "/dev/ttyACM0");
        assert_eq!(config.scheduler.outbound_capacity, 4096);
        assert!(!config.scheduler.buffer_commands_on_busy);
        assert_eq!(config.scheduler.inbound_capacity, 540);
    }

    #[test]
    fn test_environment_overrides() {
        std::env::set_var("HCI_TL__LINK__BAUD_RATE", "921600");
        let config = load_config(None).unwrap();
        std::env::remove_var("HCI_TL__LINK__BAUD_RATE");

        assert_eq!(config.link.baud_rate, 921_600);
    }
}
