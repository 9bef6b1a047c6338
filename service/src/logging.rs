use crate::config::Config;
use log::LevelFilter;
use simplelog::{self, ConfigBuilder};

/// Dependencies whose records are dropped unless the level is `TRACE`. The
/// Redis client and its pool log every command and checkout, which drowns
/// out connection and broadcast logs under load.
const FILTERED_MODULES: &[&str] = &[
    "tower", "tracing", "hyper", "axum", "redis", "deadpool", "mio",
];

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger at `config.log_level_filter`.
    /// A second call keeps the logger that is already installed.
    pub fn init_logger(config: &Config) {
        let level = config.log_level_filter;

        if let Err(e) = simplelog::TermLogger::init(
            level,
            Self::log_config(level),
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        ) {
            eprintln!("Logger already initialized, keeping the existing one: {e}");
        }
    }

    fn log_config(level: LevelFilter) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();

        if level != LevelFilter::Trace {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log, Record};
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn written(level: LevelFilter, target: &str) -> bool {
        let captured = Captured::default();
        let logger = simplelog::WriteLogger::new(level, Logger::log_config(level), captured.clone());

        logger.log(
            &Record::builder()
                .level(Level::Info)
                .target(target)
                .args(format_args!("checked out a connection"))
                .build(),
        );

        let written = !captured.0.lock().unwrap().is_empty();
        written
    }

    #[test]
    fn test_cache_client_records_are_dropped_below_trace() {
        assert!(written(LevelFilter::Debug, "sse::broadcaster"));
        assert!(!written(LevelFilter::Debug, "redis::aio::connection_manager"));
        assert!(!written(LevelFilter::Info, "deadpool_redis"));
    }

    #[test]
    fn test_trace_level_keeps_dependency_records() {
        assert!(written(LevelFilter::Trace, "redis::aio::connection_manager"));
        assert!(written(LevelFilter::Trace, "deadpool_redis"));
    }
}
