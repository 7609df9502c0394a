//! config.toml parser.
//!
//! ```toml
//! [engine]
//! concurrency = 12
//! max_failures = 10
//!
//! [query]
//! bind = "0.0.0.0"
//!
//! [dynamic]
//! tokens = ["secret"]
//! interval = "30s"
//!
//! [[static]]
//! group = "Chicago"
//! interval = "30s"
//!
//! [[static.servers]]
//! address = "chi-1.example.net:7777"
//! timeout = "2s"
//! link = "https://example.net/chi-1"
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ut2watch_state::{DEFAULT_INTERVAL, DEFAULT_TIMEOUT, Persistence, Registration};

use crate::duration::DurationValue;
use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub engine: EngineSection,
    pub query: QuerySection,
    pub dynamic: DynamicSection,
    #[serde(rename = "static")]
    pub groups: Vec<StaticGroup>,
}

/// Scheduler tuning. Unset values keep the engine defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub concurrency: Option<usize>,
    pub max_failures: Option<u32>,
    pub jitter: Option<DurationValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySection {
    /// Local IP that query sockets bind to.
    pub bind: String,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
        }
    }
}

/// Runtime registration through the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicSection {
    /// Accepted registration tokens. Empty disables dynamic registration.
    pub tokens: Vec<String>,
    pub interval: Option<DurationValue>,
    pub timeout: Option<DurationValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticGroup {
    pub group: String,
    #[serde(default)]
    pub interval: Option<DurationValue>,
    #[serde(default)]
    pub servers: Vec<StaticServer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticServer {
    pub address: String,
    #[serde(default)]
    pub timeout: Option<DurationValue>,
    #[serde(default)]
    pub link: Option<String>,
}

impl WatchConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Check every duration and address so errors surface at startup.
    pub fn validate(&self) -> ConfigResult<()> {
        self.engine_jitter()?;
        self.dynamic_interval()?;
        self.dynamic_timeout()?;
        self.registrations()?;
        Ok(())
    }

    pub fn engine_jitter(&self) -> ConfigResult<Option<Duration>> {
        self.engine
            .jitter
            .as_ref()
            .map(|j| j.resolve("engine.jitter"))
            .transpose()
    }

    /// Poll interval for servers registered through the API.
    pub fn dynamic_interval(&self) -> ConfigResult<Duration> {
        or_default(self.dynamic.interval.as_ref(), "dynamic.interval", DEFAULT_INTERVAL)
    }

    /// Query timeout for servers registered through the API.
    pub fn dynamic_timeout(&self) -> ConfigResult<Duration> {
        or_default(self.dynamic.timeout.as_ref(), "dynamic.timeout", DEFAULT_TIMEOUT)
    }

    /// One persistent registration per configured static server.
    pub fn registrations(&self) -> ConfigResult<Vec<Registration>> {
        let mut out = Vec::new();
        for (g, group) in self.groups.iter().enumerate() {
            let interval = or_default(
                group.interval.as_ref(),
                &format!("static[{g}].interval"),
                DEFAULT_INTERVAL,
            )?;

            for (s, server) in group.servers.iter().enumerate() {
                let address = server.address.trim();
                if address.is_empty() {
                    return Err(ConfigError::EmptyAddress(group.group.clone()));
                }
                let timeout = or_default(
                    server.timeout.as_ref(),
                    &format!("static[{g}].servers[{s}].timeout"),
                    DEFAULT_TIMEOUT,
                )?;

                let mut registration = Registration::new(address, group.group.as_str())
                    .with_interval(interval)
                    .with_timeout(timeout)
                    .with_persistence(Persistence::Persistent);
                if let Some(link) = server.link.as_deref().filter(|l| !l.is_empty()) {
                    registration = registration.with_external_link(link);
                }
                out.push(registration);
            }
        }
        Ok(out)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl FromStr for WatchConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        let config: WatchConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

/// Missing or zero durations take `default`.
fn or_default(value: Option<&DurationValue>, field: &str, default: Duration) -> ConfigResult<Duration> {
    match value {
        None => Ok(default),
        Some(v) => {
            let d = v.resolve(field)?;
            Ok(if d.is_zero() { default } else { d })
        }
    }
}
