use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::stream::DecodeStats;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (TRACE, DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let Some(directive) = tracing_directive(log_level) else {
        return;
    };
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}

fn tracing_directive(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Log counters for one fully consumed stream.
pub fn log_stream_complete(grammar: &str, stats: &DecodeStats, elapsed: Duration) {
    tracing::debug!(
        grammar,
        bytes = stats.bytes_received,
        frames = stats.frames_parsed,
        dropped = stats.frames_dropped,
        events = stats.events_emitted,
        elapsed_ms = elapsed.as_millis() as u64,
        "stream complete"
    );
    if stats.frames_dropped > 0 {
        tracing::info!(
            grammar,
            dropped = stats.frames_dropped,
            "stream contained malformed frames"
        );
    }
}
