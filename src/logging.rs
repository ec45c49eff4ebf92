//! Logging Module
//!
//! Structured logging with file output for hosts and the demo binary. The
//! library itself only emits `tracing` events and never installs a
//! subscriber.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with console and file output
pub fn init() {
    init_in(log_directory());
}

/// Initialize logging, writing daily log files into `log_dir`
pub fn init_in(log_dir: PathBuf) {
    // A host may already have installed its own subscriber
    let _ = tracing::subscriber::set_global_default(subscriber(log_dir));
}

/// Build the console and file subscriber without installing it
pub fn subscriber(log_dir: PathBuf) -> impl tracing::Subscriber + Send + Sync {
    let _ = std::fs::create_dir_all(&log_dir);

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "studyplus-sdk.log");

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(file_appender);

    // Console output in debug builds only
    #[cfg(debug_assertions)]
    let console_layer = Some(fmt::layer().with_target(true).pretty());

    #[cfg(not(debug_assertions))]
    let console_layer: Option<fmt::Layer<_>> = None;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            EnvFilter::new("debug,hyper=warn,reqwest=warn")
        }
        #[cfg(not(debug_assertions))]
        {
            EnvFilter::new("info,hyper=warn,reqwest=warn")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
}

/// `<data_local_dir>/StudyplusSDK/logs`
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("StudyplusSDK")
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_directory_is_namespaced() {
        let dir = log_directory();
        assert!(dir.ends_with("StudyplusSDK/logs"));
    }

    #[test]
    fn subscriber_creates_the_log_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("logs");

        // Scoped to this thread so other tests keep a silent dispatcher
        tracing::subscriber::with_default(subscriber(dir.clone()), || {
            tracing::info!("logging initialized");
        });

        assert!(dir.is_dir());
    }
}
