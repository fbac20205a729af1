use crate::error::{OdbcError, Result};
use serde::Deserialize;

pub const DEFAULT_MAX_CONNECTIONS: usize = 100;
pub const DEFAULT_MAX_CURSORS: usize = 100;
/// ASCII file separator, placed between fields of rows and headers.
pub const DEFAULT_FIELD_SEPARATOR: char = '\x1c';
/// Characters of a diagnostic message rendered without a re-fetch.
pub const DEFAULT_MESSAGE_BUFFER_LEN: usize = 1000;
/// Cap on the text a driver may hold for one buffered result set.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 64 * 1024 * 1024;

const MAX_CONNECTIONS_ENV: &str = "ODBC_MAX_CONNECTIONS";
const MAX_CURSORS_ENV: &str = "ODBC_MAX_CURSORS";
const DEBUG_ENV: &str = "ODBC_DEBUG";
const FIELD_SEPARATOR_ENV: &str = "ODBC_FIELD_SEPARATOR";
const MAX_RESULT_BYTES_ENV: &str = "ODBC_MAX_RESULT_BYTES";

/// Engine settings. Every field has a default, so partial JSON is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_connections: usize,
    pub max_cursors: usize,
    pub field_separator: char,
    pub debug: bool,
    pub message_buffer_len: usize,
    pub max_result_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_cursors: DEFAULT_MAX_CURSORS,
            field_separator: DEFAULT_FIELD_SEPARATOR,
            debug: false,
            message_buffer_len: DEFAULT_MESSAGE_BUFFER_LEN,
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `ODBC_*` environment variables. Unparsable
    /// values are ignored.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| OdbcError::ValidationError(format!("Invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(OdbcError::ValidationError(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.max_cursors == 0 {
            return Err(OdbcError::ValidationError(
                "max_cursors must be greater than zero".to_string(),
            ));
        }
        if self.message_buffer_len == 0 {
            return Err(OdbcError::ValidationError(
                "message_buffer_len must be greater than zero".to_string(),
            ));
        }
        if self.max_result_bytes == 0 {
            return Err(OdbcError::ValidationError(
                "max_result_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(n) = lookup(MAX_CONNECTIONS_ENV).and_then(|v| parse_capacity(&v)) {
            self.max_connections = n;
        }
        if let Some(n) = lookup(MAX_CURSORS_ENV).and_then(|v| parse_capacity(&v)) {
            self.max_cursors = n;
        }
        if let Some(flag) = lookup(DEBUG_ENV).and_then(|v| parse_bool_flag(&v)) {
            self.debug = flag;
        }
        if let Some(sep) = lookup(FIELD_SEPARATOR_ENV).and_then(|v| parse_separator(&v)) {
            self.field_separator = sep;
        }
        if let Some(n) = lookup(MAX_RESULT_BYTES_ENV).and_then(|v| parse_capacity(&v)) {
            self.max_result_bytes = n;
        }
        self
    }
}

fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_capacity(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

/// A single character, or its code point in decimal (`28`) or hex (`0x1c`).
fn parse_separator(value: &str) -> Option<char> {
    let mut chars = value.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(c);
    }
    let trimmed = value.trim();
    let code = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => trimmed.parse::<u32>().ok()?,
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_connections, 100);
        assert_eq!(config.max_cursors, 100);
        assert_eq!(config.field_separator, '\x1c');
        assert!(!config.debug);
        assert_eq!(config.message_buffer_len, 1000);
        assert_eq!(config.max_result_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_overrides_applied() {
        let config = EngineConfig::default().with_overrides(lookup_from(&[
            ("ODBC_MAX_CONNECTIONS", "4"),
            ("ODBC_MAX_CURSORS", " 8 "),
            ("ODBC_DEBUG", "yes"),
            ("ODBC_FIELD_SEPARATOR", "|"),
            ("ODBC_MAX_RESULT_BYTES", "4096"),
        ]));
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.max_cursors, 8);
        assert!(config.debug);
        assert_eq!(config.field_separator, '|');
        assert_eq!(config.max_result_bytes, 4096);
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let config = EngineConfig::default().with_overrides(lookup_from(&[
            ("ODBC_MAX_CONNECTIONS", "0"),
            ("ODBC_MAX_CURSORS", "many"),
            ("ODBC_DEBUG", "maybe"),
            ("ODBC_FIELD_SEPARATOR", ""),
        ]));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_parse_separator_code_points() {
        assert_eq!(parse_separator("0x1c"), Some('\x1c'));
        assert_eq!(parse_separator("9"), Some('9'));
        assert_eq!(parse_separator("44"), Some(','));
        assert_eq!(parse_separator("0xZZ"), None);
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json(r#"{"max_cursors": 2, "debug": true}"#).unwrap();
        assert_eq!(config.max_cursors, 2);
        assert!(config.debug);
        assert_eq!(config.max_connections, 100);
    }

    #[test]
    fn test_from_json_rejects_zero_capacity() {
        let err = EngineConfig::from_json(r#"{"max_connections": 0}"#).unwrap_err();
        assert!(matches!(err, OdbcError::ValidationError(_)));
        assert!(EngineConfig::from_json("not json").is_err());
        assert!(EngineConfig::from_json(r#"{"max_result_bytes": 0}"#).is_err());
    }
}
