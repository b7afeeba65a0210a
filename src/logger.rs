use chrono::Local;
use log::{LevelFilter, Metadata, Record, SetLoggerError};
use sentry_log::SentryLogger;


pub struct Logger {
    level: LevelFilter,
}

impl Logger {
    pub fn new(level: LevelFilter) -> Self {
        Logger { level }
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(), record.level(), record.args());
        }
    }

    fn flush(&self) {}
}


/// Installs the global logger. With `to_sentry`, records are also handed to Sentry.
pub fn init(level: LevelFilter, to_sentry: bool) -> Result<(), SetLoggerError> {
    let logger = Logger::new(level);

    if to_sentry {
        log::set_boxed_logger(Box::new(SentryLogger::with_dest(logger)))?;
    }
    else {
        log::set_boxed_logger(Box::new(logger))?;
    }

    log::set_max_level(level);
    Ok(())
}
