//! Optional config file loading. Search order: ./mangamirror.toml, then
//! $XDG_CONFIG_HOME/mangamirror/config.toml (or ~/.config/mangamirror/config.toml).

use crate::mirror::{MirrorStore, DEFAULT_STATIC_PREFIX, DEFAULT_STORAGE_ROOT};
use crate::range::{RangeLimits, DEFAULT_MAX_WIDTH};
use crate::scraper::{HttpClient, Source, DEFAULT_BASE_DELAY_MS, DEFAULT_RETRY_COUNT};
use crate::service::ServiceSettings;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 10001;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Listen address for `serve` (default 0.0.0.0).
    pub bind: Option<String>,
    /// Listen port (default 10001). The PORT environment variable wins over this.
    pub port: Option<u16>,
    /// Directory mirrored images are written to. Relative paths are relative to CWD.
    pub storage_root: Option<PathBuf>,
    /// URL path the storage root is served under (default /images).
    pub static_prefix: Option<String>,
    /// Fixed public origin for mirrored image links, e.g. "https://manga.example.com".
    /// When unset, the request's Host header is used.
    pub public_base_url: Option<String>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Total HTTP attempts per request (default 3).
    pub retry_count: Option<u32>,
    /// Delay before the first retry in milliseconds; doubles on each further retry (default 1000).
    pub retry_base_delay_ms: Option<u64>,
    /// Maximum chapters per request (default 10, 0 disables the cap).
    pub max_chapters: Option<u32>,
    /// Step spans by 0.5 for sites without a chapter list.
    pub fractional_chapters: Option<bool>,
    /// Source used when a request names none (key or name, default "1").
    pub default_source: Option<String>,
}

impl Config {
    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND)
    }

    pub fn range_limits(&self) -> RangeLimits {
        RangeLimits {
            max_width: Some(self.max_chapters.unwrap_or(DEFAULT_MAX_WIDTH)).filter(|w| *w > 0),
            fractional: self.fractional_chapters.unwrap_or(false),
        }
    }

    pub fn mirror_store(&self) -> MirrorStore {
        MirrorStore::new(
            self.storage_root
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT)),
            self.static_prefix.as_deref().unwrap_or(DEFAULT_STATIC_PREFIX),
        )
    }

    /// Pipeline settings. Fails only on an unknown `default_source`.
    pub fn service_settings(&self) -> Result<ServiceSettings, String> {
        let default_source = match self.default_source.as_deref() {
            Some(key) => Source::from_key(key).map_err(|e| e.to_string())?,
            None => Source::MangaReader,
        };
        Ok(ServiceSettings {
            limits: self.range_limits(),
            default_source,
            store: self.mirror_store(),
        })
    }

    pub fn http_client(&self) -> Result<HttpClient, reqwest::Error> {
        let mut builder = HttpClient::builder()
            .retry_count(self.retry_count.unwrap_or(DEFAULT_RETRY_COUNT))
            .base_delay_ms(self.retry_base_delay_ms.unwrap_or(DEFAULT_BASE_DELAY_MS));
        if let Some(ua) = &self.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout_secs(secs);
        }
        builder.build()
    }
}

/// Port precedence: CLI flag, then the PORT environment variable, then config, then 10001.
/// A PORT value that is not a valid port is an error rather than silently ignored.
pub fn effective_port(
    cli: Option<u16>,
    env: Option<&str>,
    config: Option<u16>,
) -> Result<u16, String> {
    if let Some(port) = cli {
        return Ok(port);
    }
    if let Some(raw) = env.map(str::trim).filter(|s| !s.is_empty()) {
        return raw
            .parse()
            .map_err(|_| format!("Invalid PORT environment variable: {:?}", raw));
    }
    Ok(config.unwrap_or(DEFAULT_PORT))
}

/// Search order: (1) ./mangamirror.toml, (2) $XDG_CONFIG_HOME/mangamirror/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("mangamirror.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("mangamirror").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}
