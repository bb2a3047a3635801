//! Tracing subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Filter applied when `RUST_LOG` is unset: the configured level for our
/// crates, quieter defaults for sqlx and the HTTP stack.
fn default_filter(level: &str) -> String {
    format!("{level},sqlx=warn,hyper=warn,reqwest=warn,tower_http=info")
}

/// Installs the global subscriber. `json` for production, anything else pretty.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.level)));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .init();
    } else {
        registry.with(fmt::layer().pretty().with_target(true)).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        let filter = default_filter("debug");
        assert!(filter.starts_with("debug,"));
        assert!(EnvFilter::try_new(filter).is_ok());
    }
}
