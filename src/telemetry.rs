//! Log subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggerSettings};
use crate::error::{ConfigError, Result};

/// Build the filter for a logger configuration.
pub fn env_filter(settings: &LoggerSettings) -> Result<EnvFilter> {
    EnvFilter::try_new(&settings.level)
        .map_err(|e| ConfigError::Logger(format!("invalid level '{}': {e}", settings.level)).into())
}

/// Install the global tracing subscriber.
///
/// Fails if the level directive is invalid or a subscriber is already set.
pub fn init(settings: &LoggerSettings) -> Result<()> {
    let filter = env_filter(settings)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match settings.format {
        LogFormat::Console => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| ConfigError::Logger(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter() {
        let settings = LoggerSettings {
            level: "fixed_quota=debug,warn".into(),
            format: LogFormat::Json,
        };
        assert!(env_filter(&settings).is_ok());

        let settings = LoggerSettings {
            level: "fixed_quota=loud".into(),
            format: LogFormat::Console,
        };
        assert!(matches!(
            env_filter(&settings),
            Err(crate::RateLimitError::Config(ConfigError::Logger(_)))
        ));
    }

    #[test]
    fn test_init_only_once() {
        let settings = LoggerSettings::default();
        let _ = init(&settings);
        assert!(init(&settings).is_err());
    }
}
