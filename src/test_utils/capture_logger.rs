//! Capturing logger so unit tests can assert emitted diagnostics.
//!
//! The logger is global: tests using it must be `#[serial]`.

use std::sync::{Mutex, Once, OnceLock};

use log::{Level, LevelFilter, Log, Metadata, Record};

#[derive(Clone, Debug)]
pub struct CapturedLog {
    pub level: Level,
    pub message: String,
}

struct TestLogger;

static LOGGER: TestLogger = TestLogger;
static INIT: Once = Once::new();
static LOGS: OnceLock<Mutex<Vec<CapturedLog>>> = OnceLock::new();

impl Log for TestLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let logs = LOGS.get_or_init(|| Mutex::new(Vec::new()));
        let mut guard = logs.lock().expect("logger mutex poisoned");
        guard.push(CapturedLog {
            level: record.level(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

/// Install the capturing logger (once) and clear anything captured so far.
pub fn install_test_logger() {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).expect("set test logger");
        log::set_max_level(LevelFilter::Trace);
    });
    clear_logs();
}

pub fn take_logged_messages() -> Vec<CapturedLog> {
    let logs = LOGS.get_or_init(|| Mutex::new(Vec::new()));
    let mut guard = logs.lock().expect("logger mutex poisoned");
    guard.drain(..).collect()
}

/// Captured warnings whose text contains `needle`.
pub fn warnings_containing(needle: &str) -> Vec<String> {
    take_logged_messages()
        .into_iter()
        .filter(|log| log.level == Level::Warn && log.message.contains(needle))
        .map(|log| log.message)
        .collect()
}

pub fn clear_logs() {
    if let Some(logs) = LOGS.get() {
        logs.lock().expect("logger mutex poisoned").clear();
    }
}
