use std::sync::Once;

use env_logger::fmt::TimestampPrecision;
use env_logger::WriteStyle;
use log::LevelFilter;

/// Modules that log per draw call or per pipeline at `info`.
const NOISY_MODULES: [&str; 3] = ["wgpu_core", "wgpu_hal", "naga"];

/// Logger configuration.
///
/// `env_filter` uses the `env_logger` directive syntax, e.g.
/// `"nabu_engine::engine=trace,wgpu_core=warn"`. Without it `RUST_LOG` is
/// read, and without that the engine logs at `info` while the GPU stack is
/// held at `warn`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: WriteStyle,
    /// `None` drops timestamps, which keeps golden-image runs diffable.
    pub timestamps: Option<TimestampPrecision>,
    /// Route output through the test harness capture.
    pub capture_for_tests: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: WriteStyle::Auto,
            timestamps: Some(TimestampPrecision::Millis),
            capture_for_tests: false,
        }
    }
}

impl LoggingConfig {
    /// Configuration for `#[test]` functions: captured, uncolored, no
    /// timestamps, engine at `debug`.
    pub fn for_tests() -> Self {
        Self {
            env_filter: Some("nabu_engine=debug".to_owned()),
            write_style: WriteStyle::Never,
            timestamps: None,
            capture_for_tests: true,
        }
    }
}

static INIT: Once = Once::new();

/// Installs the global logger the first time it is called.
///
/// Later calls are ignored, as is a logger some other crate already set.
/// Call it before the first [`PaintEngine`](crate::PaintEngine) is created
/// so shader link failures are not lost.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        match config.env_filter.or_else(|| std::env::var("RUST_LOG").ok()) {
            Some(filter) => {
                builder.parse_filters(&filter);
            }
            None => {
                builder.filter_level(LevelFilter::Info);
                for module in NOISY_MODULES {
                    builder.filter_module(module, LevelFilter::Warn);
                }
            }
        }

        builder
            .write_style(config.write_style)
            .format_timestamp(config.timestamps)
            .is_test(config.capture_for_tests);

        if builder.try_init().is_err() {
            log::debug!("a logger was already installed; keeping it");
            return;
        }
        log::debug!("logging initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_logging(LoggingConfig::for_tests());
        init_logging(LoggingConfig::default());
        log::debug!("still logging");
    }

    #[test]
    fn test_config_is_quiet_and_captured() {
        let config = LoggingConfig::for_tests();
        assert!(config.capture_for_tests);
        assert!(config.timestamps.is_none());
        assert_eq!(config.env_filter.as_deref(), Some("nabu_engine=debug"));
    }
}
