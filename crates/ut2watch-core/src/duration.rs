//! Human-readable durations: `"500ms"`, `"5s"`, `"2m"`, or bare seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// A duration as written in the config file: a string or a number of seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    /// Resolve to a `Duration`; `field` names the setting in errors.
    pub fn resolve(&self, field: &str) -> ConfigResult<Duration> {
        match self {
            Self::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            Self::Text(text) => parse_duration(text).ok_or_else(|| ConfigError::Duration {
                field: field.to_string(),
                value: text.clone(),
            }),
        }
    }
}

impl From<&str> for DurationValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Parse a duration string. `None` if it is not one of the accepted forms.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.trim().parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.trim().parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
