//! Turns a loaded [`WatchConfig`] into the pieces the daemon runs.

use ut2watch_api::DynamicRegistration;
use ut2watch_core::{ConfigResult, WatchConfig};
use ut2watch_engine::EngineConfig;
use ut2watch_state::Registry;

/// Engine tuning: configured values over engine defaults.
pub fn engine_config(config: &WatchConfig) -> ConfigResult<EngineConfig> {
    let mut engine = EngineConfig::default();
    if let Some(concurrency) = config.engine.concurrency {
        engine.concurrency = concurrency;
    }
    if let Some(max_failures) = config.engine.max_failures {
        engine.max_failures = max_failures;
    }
    if let Some(jitter) = config.engine_jitter()? {
        engine.jitter = jitter;
    }
    Ok(engine)
}

pub fn dynamic_registration(config: &WatchConfig) -> ConfigResult<DynamicRegistration> {
    Ok(DynamicRegistration {
        tokens: config.dynamic.tokens.clone(),
        interval: config.dynamic_interval()?,
        timeout: config.dynamic_timeout()?,
    })
}

/// Register every static server. Returns how many were registered.
pub async fn register_static(registry: &Registry, config: &WatchConfig) -> ConfigResult<usize> {
    let registrations = config.registrations()?;
    let count = registrations.len();
    for registration in registrations {
        registry.register(registration).await;
    }
    Ok(count)
}
