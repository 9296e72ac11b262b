//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Install the default subscriber: JSON lines, `info` unless `RUST_LOG` says otherwise.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with("info", LogFormat::Json);
}

/// Install a subscriber with an explicit fallback filter and format.
///
/// `RUST_LOG` still takes precedence over `default_filter`.
pub fn init_with(default_filter: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let _ = match format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_can_be_called_repeatedly() {
        init();
        init_with("debug", LogFormat::Pretty);
        init();

        tracing::info!("still logging");
    }
}
