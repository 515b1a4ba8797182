pub mod severity;
pub mod time;

pub use severity::LogSeverity;
pub use time::{now, unix_timestamp};

pub fn log(msg: &str, log_severity: LogSeverity) {
    println!("[{}] {} {}", log_severity, now(), msg);
}

pub fn info(msg: &str) {
    log(msg, LogSeverity::Info);
}

pub fn warn(msg: &str) {
    log(msg, LogSeverity::Warning);
}

pub fn error(msg: &str) {
    log(msg, LogSeverity::Error);
}
