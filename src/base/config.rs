//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use serde::Deserialize;

use super::types::Res;

/// Default Telegram Bot API base URL.
fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

/// Default address the webhook listener binds to.
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Default webhook listener port.
fn default_port() -> u16 {
    8443
}

/// Default path the webhook is served on.
fn default_webhook_path() -> String {
    "/".to_string()
}

/// Advertise the command list to the platform on startup by default.
fn default_register_commands() -> bool {
    true
}

/// Default leading character of a command trigger.
fn default_command_prefix() -> char {
    '/'
}

/// Default canned reply to a bare greeting.
fn default_greeting_reply() -> String {
    "Beep Boop".to_string()
}

/// Default database endpoint (in-memory).
fn default_db_endpoint() -> String {
    "mem://".to_string()
}

/// Default database namespace.
fn default_db_namespace() -> String {
    "dispatch".to_string()
}

/// Default database name.
fn default_db_database() -> String {
    "bot".to_string()
}

/// Default base URL of the weather forecast API.
fn default_weather_api_base_url() -> String {
    "https://api.data.gov.sg/v1/environment".to_string()
}

/// Default base URL of the rain area radar images.
fn default_rainmap_base_url() -> String {
    "http://www.weather.gov.sg/files/rainarea/50km/v2".to_string()
}

/// Default base map the rain radar is drawn over.
fn default_rainmap_base_map_url() -> String {
    "http://www.weather.gov.sg/wp-content/themes/wiptheme/assets/img/base-853.png".to_string()
}

/// Default township label layer drawn over the rain radar.
fn default_rainmap_township_url() -> String {
    "http://www.weather.gov.sg/wp-content/themes/wiptheme/images/SG-Township.png".to_string()
}

/// Configuration for the dispatch-bot application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Telegram bot token (`BOT_TOKEN`).
    pub bot_token: String,
    /// Telegram Bot API base URL (`API_BASE_URL`).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Address for the webhook listener (`BIND_ADDRESS`).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port for the webhook listener (`PORT`).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path the webhook is served on (`WEBHOOK_PATH`).
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    /// Public URL registered with the platform as the webhook (`PUBLIC_URL`).
    /// When unset, the webhook is assumed to be registered out of band.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Path to the public certificate uploaded with the webhook (`CERTIFICATE_PATH`).
    /// Only needed for self-signed certificates.
    #[serde(default)]
    pub certificate_path: Option<String>,
    /// Whether to advertise the command list on startup (`REGISTER_COMMANDS`).
    #[serde(default = "default_register_commands")]
    pub register_commands: bool,
    /// Leading character of a command trigger (`COMMAND_PREFIX`).
    #[serde(default = "default_command_prefix")]
    pub command_prefix: char,
    /// Canned reply to a bare greeting (`GREETING_REPLY`).
    #[serde(default = "default_greeting_reply")]
    pub greeting_reply: String,
    /// Database endpoint URL (`DB_ENDPOINT`), e.g. `mem://` or `ws://localhost:8000`.
    #[serde(default = "default_db_endpoint")]
    pub db_endpoint: String,
    /// Database username (`DB_USERNAME`). Ignored for `mem://`.
    #[serde(default)]
    pub db_username: String,
    /// Database password (`DB_PASSWORD`). Ignored for `mem://`.
    #[serde(default)]
    pub db_password: String,
    /// Database namespace (`DB_NAMESPACE`).
    #[serde(default = "default_db_namespace")]
    pub db_namespace: String,
    /// Database name (`DB_DATABASE`).
    #[serde(default = "default_db_database")]
    pub db_database: String,
    /// Weather forecast API base URL (`WEATHER_API_BASE_URL`).
    #[serde(default = "default_weather_api_base_url")]
    pub weather_api_base_url: String,
    /// Rain area radar image base URL (`RAINMAP_BASE_URL`).
    #[serde(default = "default_rainmap_base_url")]
    pub rainmap_base_url: String,
    /// Base map image under the radar (`RAINMAP_BASE_MAP_URL`).
    #[serde(default = "default_rainmap_base_map_url")]
    pub rainmap_base_map_url: String,
    /// Township label image over the radar (`RAINMAP_TOWNSHIP_URL`).
    #[serde(default = "default_rainmap_township_url")]
    pub rainmap_township_url: String,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base_url: default_api_base_url(),
            bind_address: default_bind_address(),
            port: default_port(),
            webhook_path: default_webhook_path(),
            public_url: None,
            certificate_path: None,
            register_commands: default_register_commands(),
            command_prefix: default_command_prefix(),
            greeting_reply: default_greeting_reply(),
            db_endpoint: default_db_endpoint(),
            db_username: String::new(),
            db_password: String::new(),
            db_namespace: default_db_namespace(),
            db_database: default_db_database(),
            weather_api_base_url: default_weather_api_base_url(),
            rainmap_base_url: default_rainmap_base_url(),
            rainmap_base_map_url: default_rainmap_base_map_url(),
            rainmap_township_url: default_rainmap_township_url(),
        }
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("DISPATCH_BOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    fn validate(&self) -> Res<()> {
        if self.bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!("Bot token must be set."));
        }

        if !self.webhook_path.starts_with('/') {
            return Err(anyhow::anyhow!("Webhook path must start with `/`."));
        }

        if self.command_prefix.is_alphanumeric() || self.command_prefix.is_whitespace() {
            return Err(anyhow::anyhow!("Command prefix must be a symbol, got `{}`.", self.command_prefix));
        }

        Ok(())
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

// Tests.
