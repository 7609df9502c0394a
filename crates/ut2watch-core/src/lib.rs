pub mod config;
pub mod duration;
pub mod error;

pub use config::{DynamicSection, EngineSection, QuerySection, StaticGroup, StaticServer, WatchConfig};
pub use duration::{DurationValue, parse_duration};
pub use error::{ConfigError, ConfigResult};
