use std::path::Path;

use chrono::Local;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} - {l} - {m}{n}";

/// Route the `log` facade to a timestamped file under `log_dir`, plus warnings
/// and errors on stderr.
pub fn setup_logging(log_dir: &Path, level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;
    let timestamp = Local::now().format("%Y-%m-%d-%H_%M").to_string();
    let log_path = log_dir.join(format!("{timestamp}.log"));

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build(log_path)?;

    let stderr_appender = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{l} - {m}{n}")))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Warn)))
                .build("stderr", Box::new(stderr_appender)),
        )
        .build(
            Root::builder()
                .appender("file")
                .appender("stderr")
                .build(level),
        )?;

    log4rs::init_config(config)?;

    Ok(())
}

// Request-scoped macros: the first argument is the request id.

#[macro_export]
macro_rules! log_debug {
    ($request_id:expr, $($arg:tt)*) => {
        $crate::log::debug!("[{}] {}", $request_id, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($request_id:expr, $($arg:tt)*) => {
        $crate::log::info!("[{}] {}", $request_id, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($request_id:expr, $($arg:tt)*) => {
        $crate::log::warn!("[{}] {}", $request_id, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($request_id:expr, $($arg:tt)*) => {
        $crate::log::error!("[{}] {}", $request_id, format!($($arg)*))
    };
}

// Process-wide macros for code that is not tied to a request.

#[macro_export]
macro_rules! sys_debug {
    ($($arg:tt)*) => {
        $crate::log::debug!("[SYSTEM] {}", format!($($arg)*))
    };
}

#[macro_export]
macro_rules! sys_info {
    ($($arg:tt)*) => {
        $crate::log::info!("[SYSTEM] {}", format!($($arg)*))
    };
}

#[macro_export]
macro_rules! sys_warn {
    ($($arg:tt)*) => {
        $crate::log::warn!("[SYSTEM] {}", format!($($arg)*))
    };
}

#[macro_export]
macro_rules! sys_error {
    ($($arg:tt)*) => {
        $crate::log::error!("[SYSTEM] {}", format!($($arg)*))
    };
}
