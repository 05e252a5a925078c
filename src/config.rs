//! Configuration & Settings Loader
//!
//! Two files configure the server: a TOML settings file carrying the
//! database connection and the two synchronization intervals, and a
//! bacpypes-style INI file carrying the BACnet device identity (instance
//! number, object name, vendor id, network address). The INI format is kept
//! for compatibility with existing device identity files.
//!
//! All options are required; a missing or invalid option is a fatal startup
//! error.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};

use ini::ini;
use serde::Deserialize;
use thiserror::Error;

/// Default BACnet/IP UDP port
pub const DEFAULT_BACNET_PORT: u16 = 47808;

/// Result type for configuration loading
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Database connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Server settings from the TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Path to the BACnet device identity file
    pub device_ini: PathBuf,
    /// Database connection
    pub db: DbSettings,
    /// Seconds between persistence cycles
    #[serde(alias = "PERSISTENCE_INTERVAL")]
    pub persistence_interval: u64,
    /// Seconds between refresh cycles
    #[serde(alias = "REFRESHING_INTERVAL")]
    pub refreshing_interval: u64,
}

impl Settings {
    /// Load and validate the settings file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.persistence_interval < 1 {
            return Err(ConfigError::Invalid(
                "persistence_interval must be at least 1 second".to_string(),
            ));
        }
        if self.refreshing_interval < 1 {
            return Err(ConfigError::Invalid(
                "refreshing_interval must be at least 1 second".to_string(),
            ));
        }
        if self.db.host.is_empty() || self.db.database.is_empty() {
            return Err(ConfigError::Invalid(
                "db.host and db.database must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse settings from TOML text (used by tests)
    #[cfg(test)]
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

/// BACnet device identity from the INI file
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Device object instance number
    pub instance: u32,
    /// Device object name
    pub object_name: String,
    /// Vendor identifier
    pub vendor_identifier: u16,
    /// Local address to bind the BACnet/IP socket to
    pub address: SocketAddrV4,
    /// Directed broadcast address for the local subnet
    pub broadcast: SocketAddrV4,
}

impl DeviceIdentity {
    /// Load the identity file. The recognized layout is the bacpypes one:
    ///
    /// ```ini
    /// [BACpypes]
    /// objectName: Plant Controller
    /// address: 192.168.1.100/24
    /// objectIdentifier: 600001
    /// vendorIdentifier: 15
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| ConfigError::Invalid(format!("non-UTF-8 path {:?}", path)))?;
        let map = ini!(safe path_str).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        // The ini crate lowercases section and key names
        let section = map.get("bacpypes").ok_or_else(|| {
            ConfigError::Invalid(format!("{} has no [BACpypes] section", path.display()))
        })?;

        let get = |key: &str| -> Result<String> {
            section
                .get(key)
                .and_then(|v| v.clone())
                .ok_or_else(|| ConfigError::Invalid(format!("device ini is missing {}", key)))
        };

        let object_name = get("objectname")?;
        if object_name.is_empty() {
            return Err(ConfigError::Invalid("objectName must not be empty".to_string()));
        }

        let instance: u32 = get("objectidentifier")?
            .parse()
            .map_err(|_| ConfigError::Invalid("objectIdentifier must be an integer".to_string()))?;
        if instance > 0x3F_FFFE {
            return Err(ConfigError::Invalid(format!(
                "objectIdentifier {} exceeds the BACnet instance range",
                instance
            )));
        }

        let vendor_identifier: u16 = get("vendoridentifier")?
            .parse()
            .map_err(|_| ConfigError::Invalid("vendorIdentifier must be an integer".to_string()))?;

        let (address, broadcast) = parse_address(&get("address")?)?;

        Ok(Self {
            instance,
            object_name,
            vendor_identifier,
            address,
            broadcast,
        })
    }
}

/// Parse a bacpypes-style address: `ip[/prefix][:port]`. The prefix length
/// yields the directed broadcast address; without one, limited broadcast is
/// used.
pub fn parse_address(text: &str) -> Result<(SocketAddrV4, SocketAddrV4)> {
    let invalid = |why: &str| ConfigError::Invalid(format!("address {:?}: {}", text, why));

    let (host_part, port) = match text.rsplit_once(':') {
        Some((host, port)) => (
            host,
            port.parse::<u16>().map_err(|_| invalid("bad port"))?,
        ),
        None => (text, DEFAULT_BACNET_PORT),
    };

    let (ip_part, prefix) = match host_part.split_once('/') {
        Some((ip, prefix)) => {
            let prefix: u8 = prefix.parse().map_err(|_| invalid("bad prefix length"))?;
            if prefix > 32 {
                return Err(invalid("prefix length exceeds 32"));
            }
            (ip, Some(prefix))
        }
        None => (host_part, None),
    };

    let ip: Ipv4Addr = ip_part.parse().map_err(|_| invalid("bad IPv4 address"))?;

    let broadcast_ip = match prefix {
        Some(0) | None => Ipv4Addr::BROADCAST,
        Some(prefix) => {
            let mask = u32::MAX << (32 - prefix as u32);
            Ipv4Addr::from(u32::from(ip) | !mask)
        }
    };

    Ok((
        SocketAddrV4::new(ip, port),
        SocketAddrV4::new(broadcast_ip, port),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"
device_ini = "device.ini"
persistence_interval = 5
refreshing_interval = 2

[db]
host = "127.0.0.1"
port = 3306
user = "bacnet"
password = "secret"
database = "bacnet"
"#;

    #[test]
    fn test_settings_load() {
        let settings = Settings::from_toml(GOOD).unwrap();
        assert_eq!(settings.persistence_interval, 5);
        assert_eq!(settings.refreshing_interval, 2);
        assert_eq!(settings.db.port, 3306);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let text = GOOD.replace("refreshing_interval = 2", "refreshing_interval = 0");
        assert!(Settings::from_toml(&text).is_err());
    }

    #[test]
    fn test_uppercase_aliases_accepted() {
        let text = GOOD
            .replace("persistence_interval", "PERSISTENCE_INTERVAL")
            .replace("refreshing_interval", "REFRESHING_INTERVAL");
        let settings = Settings::from_toml(&text).unwrap();
        assert_eq!(settings.persistence_interval, 5);
    }

    #[test]
    fn test_parse_address_with_prefix() {
        let (addr, broadcast) = parse_address("192.168.1.100/24").unwrap();
        assert_eq!(addr, "192.168.1.100:47808".parse().unwrap());
        assert_eq!(broadcast, "192.168.1.255:47808".parse().unwrap());
    }

    #[test]
    fn test_parse_address_plain() {
        let (addr, broadcast) = parse_address("10.0.0.7").unwrap();
        assert_eq!(addr.port(), DEFAULT_BACNET_PORT);
        assert_eq!(*broadcast.ip(), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_parse_address_with_port() {
        let (addr, _) = parse_address("10.0.0.7/8:47809").unwrap();
        assert_eq!(addr.port(), 47809);
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        assert!(parse_address("not-an-ip").is_err());
        assert!(parse_address("10.0.0.7/33").is_err());
    }

    #[test]
    fn test_device_identity_load() {
        let dir = std::env::temp_dir().join("bacnetd-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("device.ini");
        std::fs::write(
            &path,
            "[BACpypes]\nobjectName: Plant Controller\naddress: 192.168.1.100/24\n\
             objectIdentifier: 600001\nvendorIdentifier: 15\n",
        )
        .unwrap();

        let identity = DeviceIdentity::load(&path).unwrap();
        assert_eq!(identity.instance, 600001);
        assert_eq!(identity.object_name, "Plant Controller");
        assert_eq!(identity.vendor_identifier, 15);
        assert_eq!(identity.address, "192.168.1.100:47808".parse().unwrap());
    }
}
