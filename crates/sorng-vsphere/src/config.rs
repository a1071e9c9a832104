//! Client configuration.
//!
//! Layers, lowest precedence first: built-in defaults, the system file
//! (`/etc/sorng/vsphere.yml`), the user file (`~/.sorng/vsphere.yml`), and
//! explicit [`ConfigOverrides`] (command-line style). Each file only needs
//! the keys it changes.

use crate::error::{VsphereError, VsphereResult};
use crate::task::PollConfig;
use crate::transport::HttpOptions;
use crate::vsphere::ClientOptions;

use log::{debug, LevelFilter};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const SYSTEM_CONFIG: &str = "/etc/sorng/vsphere.yml";

/// Connection, polling and logging settings for one vSphere endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VsphereConfig {
    /// vCenter or ESXi hostname / IP, or a full SDK URL
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Skip TLS certificate verification (self-signed labs)
    pub insecure: bool,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    pub api_version: String,
    /// Seconds a cached property stays fresh; unset means forever
    pub cache_ttl_secs: Option<u64>,
    /// Directory of YAML templates; `~/.sorng/templates` when unset
    pub template_dir: Option<PathBuf>,
    pub task: TaskConfig,
    pub logging: LoggingConfig,
}

impl Default for VsphereConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: 443,
            username: String::new(),
            password: String::new(),
            insecure: false,
            timeout_secs: 30,
            api_version: "7.0".to_string(),
            cache_ttl_secs: None,
            template_dir: None,
            task: TaskConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskConfig {
    pub poll_interval_ms: u64,
    pub timeout_secs: Option<u64>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log file for the embedding binary's logger
    pub destination: Option<PathBuf>,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            destination: dirs::home_dir().map(|h| h.join(".sorng").join("vsphere.log")),
            level: "INFO".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> VsphereResult<LevelFilter> {
        LevelFilter::from_str(self.level.trim())
            .map_err(|_| VsphereError::config(format!("Unknown log level '{}'", self.level)))
    }
}

impl VsphereConfig {
    /// Everything needed to log in must be present.
    pub fn validate(&self) -> VsphereResult<()> {
        for (key, value) in [
            ("server", &self.server),
            ("username", &self.username),
            ("password", &self.password),
        ] {
            if value.trim().is_empty() {
                return Err(VsphereError::config(format!("'{key}' is not configured")));
            }
        }
        Ok(())
    }

    /// `https://{server}:{port}/sdk`, or `server` itself when it is already
    /// a URL (an empty path becomes `/sdk`).
    pub fn sdk_url(&self) -> VsphereResult<String> {
        let raw = if self.server.contains("://") {
            self.server.clone()
        } else {
            format!("https://{}:{}/sdk", self.server, self.port)
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| VsphereError::config(format!("Invalid server '{}': {e}", self.server)))?;
        if url.path().is_empty() || url.path() == "/" {
            url.set_path("/sdk");
        }
        Ok(url.to_string())
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            insecure: self.insecure,
            api_version: self.api_version.clone(),
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.task.poll_interval_ms),
            timeout: self.task.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            poll: self.poll_config(),
            cache_ttl: self.cache_ttl_secs.map(Duration::from_secs),
        }
    }
}

/// Highest-precedence values, typically from command-line flags.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    system_file: Option<PathBuf>,
    user_file: Option<PathBuf>,
    overrides: ConfigOverrides,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            system_file: Some(PathBuf::from(SYSTEM_CONFIG)),
            user_file: dirs::home_dir().map(|h| h.join(".sorng").join("vsphere.yml")),
            overrides: ConfigOverrides::default(),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults and overrides only.
    pub fn without_files() -> Self {
        Self {
            system_file: None,
            user_file: None,
            overrides: ConfigOverrides::default(),
        }
    }

    pub fn system_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.system_file = Some(path.into());
        self
    }

    pub fn user_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_file = Some(path.into());
        self
    }

    pub fn overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn load(&self) -> VsphereResult<VsphereConfig> {
        let mut merged = serde_yaml::to_value(VsphereConfig::default())?;

        for path in [&self.system_file, &self.user_file].into_iter().flatten() {
            if let Some(layer) = read_layer(path)? {
                merge(&mut merged, layer);
            }
        }
        merge(&mut merged, serde_yaml::to_value(&self.overrides)?);

        Ok(serde_yaml::from_value(merged)?)
    }
}

/// A missing file is no layer; an unreadable or malformed one is an error.
fn read_layer(path: &Path) -> VsphereResult<Option<Value>> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    let layer: Value = serde_yaml::from_str(&text)
        .map_err(|e| VsphereError::config(format!("{}: {e}", path.display())))?;
    match layer {
        Value::Null => Ok(None),
        Value::Mapping(_) => {
            debug!("loaded configuration layer {}", path.display());
            Ok(Some(layer))
        }
        _ => Err(VsphereError::config(format!(
            "{}: expected a mapping at the top level",
            path.display()
        ))),
    }
}

/// Deep merge: mappings merge key by key, anything else in `layer` replaces
/// `base`, and a null in `layer` leaves `base` alone.
pub(crate) fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Mapping(base), Value::Mapping(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (slot, value) => *slot = value,
    }
}
