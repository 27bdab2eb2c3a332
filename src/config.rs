use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SetupError;

/// Longest interface name the kernel accepts (IFNAMSIZ - 1).
const MAX_IFNAME_LEN: usize = 15;

const DEFAULT_PACKAGES: &[&str] = &[
    "network-manager",
    "bridge-utils",
    "dnsmasq",
    "hostapd",
    "iproute2",
    "apache2",
    "libapache2-mod-php",
];

/// Overrides for the names and paths the setup uses. Every field is optional
/// in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bridge_name: String,
    pub hotspot_name: String,
    pub packages: Vec<String>,
    pub legacy_dhcp_service: String,
    pub network_service: String,
    pub sudoers_file: PathBuf,
    pub use_sudo: bool,
    /// Skips the `which nmcli` lookup when set.
    pub nmcli_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge_name: "br0".to_string(),
            hotspot_name: "hotspot".to_string(),
            packages: DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect(),
            legacy_dhcp_service: "dhcpcd".to_string(),
            network_service: "NetworkManager".to_string(),
            sudoers_file: PathBuf::from("/etc/sudoers.d/nmcli"),
            use_sudo: true,
            nmcli_path: None,
        }
    }
}

impl Config {
    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one the default location is
    /// tried and a missing file means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::load_from(path)?,
            None => {
                let path = config_path()?;
                if path.exists() {
                    Self::load_from(&path)?
                } else {
                    Config::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        if self.bridge_name.is_empty() {
            return Err(SetupError::InvalidConfig("bridge_name must not be empty".into()));
        }
        if self.bridge_name.len() > MAX_IFNAME_LEN {
            return Err(SetupError::InvalidConfig(format!(
                "bridge_name '{}' is longer than {} bytes",
                self.bridge_name, MAX_IFNAME_LEN
            )));
        }
        if self.hotspot_name.is_empty() {
            return Err(SetupError::InvalidConfig("hotspot_name must not be empty".into()));
        }
        if self.legacy_dhcp_service.is_empty() || self.network_service.is_empty() {
            return Err(SetupError::InvalidConfig("service names must not be empty".into()));
        }
        if self.sudoers_file.as_os_str().is_empty() {
            return Err(SetupError::InvalidConfig("sudoers_file must not be empty".into()));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("pi-bridge-setup").join("config.toml"))
}
