//! Configuration file support for listsync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (`LISTSYNC_` prefix, sections joined with `__`,
//!    e.g. `LISTSYNC_SYNC__BATCH_SIZE`; `LISTSYNC_TOKEN` sets `api.token`)
//! 3. Local config file (./listsync.toml)
//! 4. XDG config file (~/.config/listsync/config.toml)
//! 5. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [api]
//! base_url = "https://api.twitter.com/1.1"
//! token = "..."  # or use LISTSYNC_TOKEN
//! requests_per_window = 180
//!
//! [sync]
//! batch_size = 50
//! window_minutes = 30
//! daily_quota = 100
//! mode = "diff"
//! no_rate_limit = false
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use listsync::SyncMode;
use listsync::rate_limits::DEFAULT_REQUESTS_PER_WINDOW;
use listsync::rest::DEFAULT_BASE_URL;
use listsync::sync::{DEFAULT_BATCH_SIZE, DEFAULT_DAILY_QUOTA, DEFAULT_WINDOW_MINUTES};
use serde::Deserialize;

/// Environment variable holding the API token.
const TOKEN_ENV: &str = "LISTSYNC_TOKEN";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote API configuration.
    pub api: ApiConfig,
    /// Default sync options.
    pub sync: SyncConfig,
}

/// Remote API configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API root URL.
    pub base_url: String,
    /// Bearer token.
    pub token: Option<String>,
    /// Client-side request budget per 15-minute window.
    pub requests_per_window: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
        }
    }
}

/// Default sync options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Members per add call.
    pub batch_size: usize,
    /// Minutes to wait between batches.
    pub window_minutes: i64,
    /// Successful additions allowed per day.
    pub daily_quota: usize,
    /// Mode override; each command has its own default when unset.
    pub mode: Option<SyncMode>,
    /// Whether to disable proactive rate limiting.
    pub no_rate_limit: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            window_minutes: DEFAULT_WINDOW_MINUTES,
            daily_quota: DEFAULT_DAILY_QUOTA,
            mode: None,
            no_rate_limit: false,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/listsync/config.toml)
    /// 3. Local config file (./listsync.toml)
    /// 4. Environment variables with LISTSYNC_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("listsync.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./listsync.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., LISTSYNC_SYNC__DAILY_QUOTA -> sync.daily_quota
        builder = builder.add_source(
            Environment::with_prefix("LISTSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let builder =
            match builder.set_override_option("api.token", std::env::var(TOKEN_ENV).ok()) {
                Ok(builder) => builder,
                Err(e) => {
                    tracing::warn!("Failed to apply {}: {}", TOKEN_ENV, e);
                    return Config::default();
                }
            };

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the API token, if configured and non-blank.
    pub fn api_token(&self) -> Option<&str> {
        self.api
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "listsync").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
