//! Logging setup helpers.

use tracing_subscriber::fmt::time::UtcTime;

/// Initializes human-readable log output.
///
/// `env_filter` takes the usual directives, e.g. `"info,cachefront=debug"`.
pub fn init(env_filter: &str) {
    tracing_subscriber::fmt()
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .with_env_filter(env_filter)
        .init();
}

/// Initializes JSON-lines log output, for log collectors.
pub fn init_json(env_filter: &str) {
    tracing_subscriber::fmt()
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .with_env_filter(env_filter)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
