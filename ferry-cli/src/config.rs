use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use ferry_engine::{ClientConfig, DownloadConfig, EngineConfig, ProxyAuth, ProxyConfig, ProxyType};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::Args;
use crate::error::{AppError, Result};

/// Settings for `ferry serve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 7878)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Upstream media host suffixes the engine may contact
    pub allowed_hosts: Vec<String>,
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub downloads: DownloadConfig,
}

impl AppConfig {
    /// `<config dir>/ferry/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("ferry").join("config.toml"))
            .ok_or(AppError::NoConfigDir)
    }

    fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
        match path {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::default_path(),
        }
    }

    /// Load configuration from `path` (or the default location). A missing file yields the
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(path)?;
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|source| AppError::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let config = toml::from_str(&content)
            .map_err(|source| AppError::ConfigParse { path: path.clone(), source })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = Self::resolve_path(path)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, self.show()?)?;
        Ok(path)
    }

    /// Overwrite the config file with defaults.
    pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
        Self::default().save(path)
    }

    pub fn show(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply the global command-line overrides on top of the file values.
    pub fn apply_args(&mut self, args: &Args) {
        for host in &args.allow_hosts {
            if !self.allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)) {
                self.allowed_hosts.push(host.clone());
            }
        }

        if let Some(url) = &args.proxy {
            let auth = args.proxy_username.as_ref().map(|username| ProxyAuth {
                username: username.clone(),
                password: args.proxy_password.clone().unwrap_or_default(),
            });
            self.client.proxy = Some(ProxyConfig {
                url: url.clone(),
                proxy_type: proxy_type_for(url),
                auth,
            });
        }

        if let Some(user_agent) = &args.user_agent {
            self.client.user_agent = user_agent.clone();
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            allowed_hosts: self.allowed_hosts.clone(),
            client: self.client.clone(),
            downloads: self.downloads.clone(),
        }
    }
}

fn proxy_type_for(url: &str) -> ProxyType {
    let scheme = url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase());
    match scheme.as_deref() {
        Some("socks5" | "socks5h") => ProxyType::Socks5,
        Some("https") => ProxyType::Https,
        _ => ProxyType::Http,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
allowed_hosts = ["cdn.example.com"]

[downloads]
max_concurrent = 4
output_dir = "/tmp/anime"
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.allowed_hosts, vec!["cdn.example.com"]);
        assert_eq!(config.downloads.max_concurrent, 4);
        assert_eq!(config.downloads.output_dir, PathBuf::from("/tmp/anime"));
        assert_eq!(config.downloads.progress_interval_ms, 1000);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn invalid_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "allowed_hosts = 3").unwrap();

        let err = AppConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, AppError::ConfigParse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn reset_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        AppConfig::reset(Some(&path)).unwrap();
        assert_eq!(AppConfig::load(Some(&path)).unwrap(), AppConfig::default());
    }

    #[test]
    fn args_override_file_values() {
        let args = Args::parse_from([
            "ferry",
            "--allow-host",
            "cdn.example.com",
            "--allow-host",
            "media.example.net",
            "--proxy",
            "socks5://127.0.0.1:1080",
            "--proxy-username",
            "me",
            "--user-agent",
            "ferry-test",
            "config",
            "--show",
        ]);

        let mut config = AppConfig {
            allowed_hosts: vec!["CDN.example.com".into()],
            ..Default::default()
        };
        config.apply_args(&args);

        assert_eq!(
            config.allowed_hosts,
            vec!["CDN.example.com", "media.example.net"]
        );
        let proxy = config.client.proxy.as_ref().unwrap();
        assert_eq!(proxy.proxy_type, ProxyType::Socks5);
        assert_eq!(proxy.auth.as_ref().unwrap().username, "me");
        assert_eq!(config.client.user_agent, "ferry-test");
        assert_eq!(config.engine().allowed_hosts, config.allowed_hosts);
    }
}
