//! Logging setup
//!
//! Installs a `tracing` fmt subscriber configured from [`LoggingSettings`].
//! `RUST_LOG` takes precedence over the configured level.

use crate::config::LoggingSettings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(settings.show_target)
                .with_thread_ids(settings.show_thread_ids)
                .with_file(settings.show_location)
                .with_line_number(settings.show_location),
        )
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_once() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            ..LoggingSettings::default()
        };
        assert!(init_logging(&settings).is_ok());
        assert!(init_logging(&settings).is_err());
    }
}
