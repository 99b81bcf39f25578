use crate::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global subscriber.
///
/// Console output goes to stderr so stdout stays free for the balance report.
/// The returned guard must be held for the life of the process when file
/// logging is enabled, or buffered lines are lost.
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if config.json {
        let stderr_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr);
        registry.with(stderr_layer).init();
    } else {
        let stderr_layer = fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr);
        registry.with(stderr_layer).init();
    }

    guard
}
