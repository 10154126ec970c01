//! Daemon configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/panovault/panovaultd.toml`
//! - Windows: `%APPDATA%/panovault/panovaultd.toml`

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket server port (0 = auto-assign).
    #[serde(default = "default_port")]
    pub port: u16,

    /// OAuth access token for the photo publishing service.
    ///
    /// The token holds the `streetviewpublish` scope; refresh is handled by
    /// whoever writes this file.
    #[serde(default)]
    pub access_token: String,

    /// Root directory for the destination folder store.
    #[serde(default = "default_storage_root")]
    pub storage_root: String,
}

fn default_port() -> u16 {
    8710
}

fn default_storage_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    format!("{home}/panovault")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            access_token: String::new(),
            storage_root: default_storage_root(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Saves the current configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        // The file carries an access token; restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("panovault")
            .join("panovaultd.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata)
            .join("panovault")
            .join("panovaultd.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/panovault/panovaultd.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8710);
        assert!(config.access_token.is_empty());
        assert!(config.storage_root.contains("panovault"));
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = Config {
            port: 9000,
            access_token: "ya29.token".into(),
            storage_root: "/srv/backup".into(),
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.port, 9000);
        assert_eq!(parsed.access_token, "ya29.token");
        assert_eq!(parsed.storage_root, "/srv/backup");
    }

    #[test]
    fn config_partial_toml() {
        // Only specify the port, rest should use defaults.
        let config: Config = toml::from_str("port = 7000").unwrap();
        assert_eq!(config.port, 7000);
        assert!(config.access_token.is_empty());
        assert!(!config.storage_root.is_empty());
    }

    #[test]
    fn config_path_not_empty() {
        let path = config_path().unwrap();
        assert!(path.to_string_lossy().contains("panovault"));
    }

    #[test]
    fn config_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("panovaultd.toml");

        let config = Config {
            port: 8123,
            ..Config::default()
        };

        // Write manually since save() uses config_path().
        let content = toml::to_string_pretty(&config).unwrap();
        std::fs::write(&path, &content).unwrap();

        let loaded: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.port, 8123);
    }
}
