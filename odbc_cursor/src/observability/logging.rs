use log::Level;

const SECRET_KEYS: &[&str] = &["pwd", "password"];

/// Log front end for engine events.
///
/// Diagnostic lines go through a debug-gated sink: they are emitted at
/// `warn` while debug output is on and at `trace` otherwise, so they stay
/// available to a verbose logger without reaching the caller by default.
pub struct StructuredLogger {
    debug: bool,
}

impl StructuredLogger {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    fn sink_level(&self) -> Level {
        if self.debug {
            Level::Warn
        } else {
            Level::Trace
        }
    }

    /// Routes one rendered diagnostic through the debug-gated sink.
    pub fn diagnostic(&self, rendered: &str) {
        log::log!(self.sink_level(), "{}", rendered);
    }

    pub fn log_connection(&self, level: Level, connection_string: &str, action: &str) {
        log::log!(
            level,
            "Connection {}: {}",
            action,
            sanitize_connection_string(connection_string)
        );
    }

    pub fn log_statement(&self, cursor: u32, sql: &str) {
        log::debug!("Cursor {} executing: {}", cursor, sql);
    }

    pub fn log_rows_affected(&self, count: isize) {
        if count < 0 {
            return;
        }
        let noun = if count == 1 { "row" } else { "rows" };
        log::info!("{} {} affected", count, noun);
    }

    pub fn log_error(&self, operation: &str, error: &str) {
        log::error!("{} failed: {}", operation, error);
    }
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Replaces password attribute values with `***`.
pub fn sanitize_connection_string(connection_string: &str) -> String {
    let mut out = Vec::new();
    for part in split_connection_string_parts(connection_string) {
        match part.split_once('=') {
            Some((key, _)) if SECRET_KEYS.contains(&key.trim().to_ascii_lowercase().as_str()) => {
                out.push(format!("{}=***", key));
            }
            _ => out.push(part.to_string()),
        }
    }
    out.join(";")
}

fn split_connection_string_parts(connection_string: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut brace_depth = 0u32;

    for (idx, ch) in connection_string.char_indices() {
        match ch {
            '{' => brace_depth = brace_depth.saturating_add(1),
            '}' => brace_depth = brace_depth.saturating_sub(1),
            ';' if brace_depth == 0 => {
                parts.push(&connection_string[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&connection_string[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_logger_default() {
        let logger = StructuredLogger::default();
        assert!(!logger.debug_enabled());
        assert_eq!(logger.sink_level(), Level::Trace);
    }

    #[test]
    fn test_set_debug_switches_sink_level() {
        let mut logger = StructuredLogger::new(false);
        logger.set_debug(true);
        assert!(logger.debug_enabled());
        assert_eq!(logger.sink_level(), Level::Warn);
    }

    #[test]
    fn test_sanitize_hides_password() {
        assert_eq!(
            sanitize_connection_string("DSN=test;UID=sa;PWD=secret;"),
            "DSN=test;UID=sa;PWD=***;"
        );
        assert_eq!(
            sanitize_connection_string("Driver={x};Password={a;b}"),
            "Driver={x};Password=***"
        );
    }

    #[test]
    fn test_sanitize_plain_dsn_untouched() {
        assert_eq!(sanitize_connection_string("testdb"), "testdb");
    }

    #[test]
    fn test_logging_calls_do_not_panic() {
        let logger = StructuredLogger::new(true);
        logger.diagnostic("[42S02]Invalid object name / native code: 208");
        logger.log_connection(Level::Info, "DSN=test;PWD=x", "open");
        logger.log_statement(0, "SELECT 1");
        logger.log_rows_affected(1);
        logger.log_rows_affected(-1);
        logger.log_error("execute", "boom");
    }
}
