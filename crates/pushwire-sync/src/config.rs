//! # Push Configuration
//!
//! Configuration for the push client.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PUSHWIRE_SERVICE_URL=https://push.example.com                      │
//! │     PUSHWIRE_GEOFENCES_ENABLED=false                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pushwire/push.toml (Linux)                               │
//! │     ~/Library/Application Support/io.pushwire.pushwire/push.toml       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # push.toml
//! [platform]
//! uuid = "a4b2..."
//! secret = "s3cr3t"
//! service_url = "https://push.example.com"
//!
//! [messaging]
//! sender_id = "123456789"
//!
//! [app]
//! package_name = "com.example.app"
//! version = 42
//!
//! [geofences]
//! enabled = true          # capability flag; users can still opt out
//!
//! [analytics]
//! enabled = true
//! batch_size = 100
//! send_interval_secs = 300
//! max_backoff_secs = 3600
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{PushError, PushResult};
use pushwire_core::validation::parse_service_url;
use pushwire_core::{RegistrationParameters, TagSet};

// =============================================================================
// Platform Configuration
// =============================================================================

/// Credentials of the platform (application) this device belongs to.
///
/// These are defaults for [`PushConfig::registration_parameters`]; the host
/// can always pass its own parameters to `register_device`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub uuid: String,

    #[serde(default)]
    pub secret: String,

    /// Base server URL of the application back end.
    #[serde(default)]
    pub service_url: Option<String>,

    /// Human-readable device name sent to the back end.
    #[serde(default)]
    pub device_alias: Option<String>,

    #[serde(default)]
    pub tags: TagSet,
}

/// Messaging relay settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Sender id the relay issues tokens for.
    #[serde(default)]
    pub sender_id: String,
}

// =============================================================================
// App / Device Configuration
// =============================================================================

/// The host application. A version change forces a new relay registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_package_name")]
    pub package_name: String,

    #[serde(default = "default_app_version")]
    pub version: i64,
}

fn default_package_name() -> String {
    "io.pushwire.app".to_string()
}

fn default_app_version() -> i64 {
    1
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            package_name: default_package_name(),
            version: default_app_version(),
        }
    }
}

/// Device description sent with back-end registrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_model")]
    pub model: String,

    #[serde(default = "default_device_manufacturer")]
    pub manufacturer: String,

    /// Operating system name; only sent on new registrations.
    #[serde(default = "default_os")]
    pub os: String,

    #[serde(default)]
    pub os_version: String,
}

fn default_device_model() -> String {
    std::env::consts::ARCH.to_string()
}

fn default_device_manufacturer() -> String {
    "unknown".to_string()
}

fn default_os() -> String {
    std::env::consts::OS.to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            model: default_device_model(),
            manufacturer: default_device_manufacturer(),
            os: default_os(),
            os_version: String::new(),
        }
    }
}

// =============================================================================
// Feature Settings
// =============================================================================

/// Geofence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceSettings {
    /// Capability flag. Geofencing runs only when this AND the user's
    /// preference are both on.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Override for the geofence file. Defaults to `geofences.json` beside
    /// the database.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for GeofenceSettings {
    fn default() -> Self {
        GeofenceSettings {
            enabled: true,
            file: None,
        }
    }
}

/// Analytics event delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Largest number of events sent in one request.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Alarm period while events are pending.
    #[serde(default = "default_send_interval")]
    pub send_interval_secs: u64,

    /// Upper bound of the retry delay after failed sends.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_batch_size() -> u32 {
    100
}
fn default_send_interval() -> u64 {
    300
}
fn default_max_backoff() -> u64 {
    3600
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        AnalyticsSettings {
            enabled: true,
            batch_size: default_batch_size(),
            send_interval_secs: default_send_interval(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl AnalyticsSettings {
    pub fn send_interval(&self) -> Duration {
        Duration::from_secs(self.send_interval_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

/// HTTP timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default = "default_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for NetworkSettings {
    fn default() -> Self {
        NetworkSettings {
            connect_timeout_secs: default_timeout(),
            request_timeout_secs: default_timeout(),
        }
    }
}

/// Where local state lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database path. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Main Push Configuration
// =============================================================================

/// Complete push client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub messaging: MessagingConfig,

    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub geofences: GeofenceSettings,

    #[serde(default)]
    pub analytics: AnalyticsSettings,

    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl PushConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (push.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> PushResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading push config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());

        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load push config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> PushResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| PushError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Push config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> PushResult<()> {
        if let Some(ref url) = self.platform.service_url {
            parse_service_url(url).map_err(|e| PushError::InvalidUrl(e.to_string()))?;
        }

        if self.analytics.batch_size == 0 {
            return Err(PushError::InvalidConfig(
                "analytics.batch_size must be greater than 0".into(),
            ));
        }

        if self.analytics.send_interval_secs == 0 {
            return Err(PushError::InvalidConfig(
                "analytics.send_interval_secs must be greater than 0".into(),
            ));
        }

        if self.analytics.max_backoff_secs < self.analytics.send_interval_secs {
            return Err(PushError::InvalidConfig(
                "analytics.max_backoff_secs must not be less than send_interval_secs".into(),
            ));
        }

        if self.network.connect_timeout_secs == 0 || self.network.request_timeout_secs == 0 {
            return Err(PushError::InvalidConfig(
                "network timeouts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `PUSHWIRE_*` overrides read through `lookup`.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(sender_id) = lookup("PUSHWIRE_SENDER_ID") {
            debug!(sender_id = %sender_id, "Overriding sender id from environment");
            self.messaging.sender_id = sender_id;
        }

        if let Some(uuid) = lookup("PUSHWIRE_PLATFORM_UUID") {
            self.platform.uuid = uuid;
        }

        if let Some(secret) = lookup("PUSHWIRE_PLATFORM_SECRET") {
            self.platform.secret = secret;
        }

        if let Some(url) = lookup("PUSHWIRE_SERVICE_URL") {
            debug!(url = %url, "Overriding service URL from environment");
            self.platform.service_url = Some(url);
        }

        if let Some(enabled) = lookup("PUSHWIRE_GEOFENCES_ENABLED") {
            match parse_bool(&enabled) {
                Some(value) => self.geofences.enabled = value,
                None => warn!(value = %enabled, "Ignoring PUSHWIRE_GEOFENCES_ENABLED"),
            }
        }

        if let Some(enabled) = lookup("PUSHWIRE_ANALYTICS_ENABLED") {
            match parse_bool(&enabled) {
                Some(value) => self.analytics.enabled = value,
                None => warn!(value = %enabled, "Ignoring PUSHWIRE_ANALYTICS_ENABLED"),
            }
        }

        if let Some(path) = lookup("PUSHWIRE_DATABASE_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "pushwire", "pushwire")
            .map(|dirs| dirs.config_dir().join("push.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// SQLite database path: configured, or `pushwire.db` in the data directory.
    pub fn database_path(&self) -> PushResult<PathBuf> {
        if let Some(path) = &self.storage.database_path {
            return Ok(path.clone());
        }
        directories::ProjectDirs::from("io", "pushwire", "pushwire")
            .map(|dirs| dirs.data_dir().join("pushwire.db"))
            .ok_or_else(|| PushError::InvalidConfig("No data directory available".into()))
    }

    /// Geofence file path: configured, or `geofences.json` beside the database.
    pub fn geofence_file(&self) -> PushResult<PathBuf> {
        if let Some(path) = &self.geofences.file {
            return Ok(path.clone());
        }
        let database = self.database_path()?;
        Ok(database.with_file_name("geofences.json"))
    }

    /// Builds registration parameters from the configured defaults.
    pub fn registration_parameters(&self) -> PushResult<RegistrationParameters> {
        let service_url = self
            .platform
            .service_url
            .clone()
            .ok_or_else(|| PushError::InvalidConfig("platform.service_url is not set".into()))?;

        let mut params = RegistrationParameters::new(
            &self.messaging.sender_id,
            &self.platform.uuid,
            &self.platform.secret,
            service_url,
        )
        .with_tags(self.platform.tags.clone())
        .with_geofences_enabled(self.geofences.enabled);

        if let Some(alias) = &self.platform.device_alias {
            params = params.with_device_alias(alias);
        }

        params.validate()?;
        Ok(params)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
