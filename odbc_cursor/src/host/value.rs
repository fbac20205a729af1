//! Values exchanged with the embedding host.

use crate::error::{OdbcError, Result};
use indexmap::IndexMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Null,
    Number(f64),
    Str(String),
    Array(HostArray),
}

impl HostValue {
    /// The failure sentinel every host operation returns.
    pub const FAILURE: HostValue = HostValue::Number(-1.0);

    pub fn str(value: impl Into<String>) -> Self {
        HostValue::Str(value.into())
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, HostValue::Number(n) if *n == -1.0)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&HostArray> {
        match self {
            HostValue::Array(a) => Some(a),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Number(_) => "number",
            HostValue::Str(_) => "string",
            HostValue::Array(_) => "array",
        }
    }
}

impl From<usize> for HostValue {
    fn from(n: usize) -> Self {
        HostValue::Number(n as f64)
    }
}

impl From<u32> for HostValue {
    fn from(n: u32) -> Self {
        HostValue::Number(f64::from(n))
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(s)
    }
}

impl From<HostArray> for HostValue {
    fn from(a: HostArray) -> Self {
        HostValue::Array(a)
    }
}

/// Associative array with text subscripts, kept in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostArray {
    entries: IndexMap<String, HostValue>,
}

impl HostArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Sets `key`, replacing an existing entry in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<HostValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&HostValue> {
        self.entries.get(key)
    }

    /// Entry at integer subscript `index`.
    pub fn at(&self, index: usize) -> Option<&HostValue> {
        self.get(&index.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Builds `{"1": v1, "2": v2, ...}`.
    pub fn from_list<T: Into<HostValue>>(values: impl IntoIterator<Item = T>) -> Self {
        let values = values.into_iter();
        let mut array = Self::with_capacity(values.size_hint().0);
        for (i, value) in values.enumerate() {
            array.insert((i + 1).to_string(), value);
        }
        array
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => Ok(()),
            HostValue::Number(n) => write!(f, "{}", format_number(*n)),
            HostValue::Str(s) => f.write_str(s),
            HostValue::Array(_) => f.write_str("Array"),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// String argument; numbers are formatted.
pub fn string_arg(args: &[HostValue], position: usize) -> Result<String> {
    match args.get(position) {
        Some(HostValue::Str(s)) => Ok(s.clone()),
        Some(HostValue::Number(n)) => Ok(format_number(*n)),
        other => Err(argument_error(position, "string", other)),
    }
}

/// Numeric argument; numeric strings are parsed.
pub fn number_arg(args: &[HostValue], position: usize) -> Result<f64> {
    match args.get(position) {
        Some(HostValue::Number(n)) => Ok(*n),
        Some(HostValue::Str(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| argument_error(position, "number", args.get(position))),
        other => Err(argument_error(position, "number", other)),
    }
}

/// Handle argument: a non-negative integer that fits the handle range.
pub fn handle_arg(args: &[HostValue], position: usize) -> Result<u32> {
    let n = number_arg(args, position)?;
    if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) {
        Ok(n as u32)
    } else {
        Err(OdbcError::ValidationError(format!(
            "argument {}: {} is not a valid handle",
            position + 1,
            format_number(n)
        )))
    }
}

fn argument_error(position: usize, expected: &str, got: Option<&HostValue>) -> OdbcError {
    let got = got.map_or("nothing", HostValue::type_name);
    OdbcError::ValidationError(format!(
        "argument {}: expected {}, got {}",
        position + 1,
        expected,
        got
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_arg_accepts_numbers() {
        let args = [HostValue::Number(42.0), HostValue::Number(1.5), HostValue::str("x")];
        assert_eq!(string_arg(&args, 0).unwrap(), "42");
        assert_eq!(string_arg(&args, 1).unwrap(), "1.5");
        assert_eq!(string_arg(&args, 2).unwrap(), "x");
        assert!(string_arg(&args, 3).is_err());
    }

    #[test]
    fn test_number_arg_accepts_numeric_strings() {
        let args = [HostValue::str(" 7 "), HostValue::str("seven")];
        assert_eq!(number_arg(&args, 0).unwrap(), 7.0);
        assert!(matches!(
            number_arg(&args, 1),
            Err(OdbcError::ValidationError(_))
        ));
    }

    #[test]
    fn test_handle_arg_rejects_bad_values() {
        let args = [
            HostValue::Number(3.0),
            HostValue::Number(-1.0),
            HostValue::Number(2.5),
            HostValue::str("4"),
            HostValue::Array(HostArray::new()),
        ];
        assert_eq!(handle_arg(&args, 0).unwrap(), 3);
        assert!(handle_arg(&args, 1).is_err());
        assert!(handle_arg(&args, 2).is_err());
        assert_eq!(handle_arg(&args, 3).unwrap(), 4);
        assert!(handle_arg(&args, 4).is_err());
    }

    #[test]
    fn test_array_keeps_insertion_order() {
        let mut array = HostArray::new();
        array.insert("0", 2usize);
        array.insert("1", "a");
        array.insert("10", "b");
        array.insert("1", "c");
        let keys: Vec<&str> = array.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["0", "1", "10"]);
        assert_eq!(array.at(1), Some(&HostValue::str("c")));
    }

    #[test]
    fn test_large_array_replace_and_lookup() {
        let mut array = HostArray::from_list((0..1000).map(|i| i as u32));
        assert_eq!(array.len(), 1000);
        array.insert("500", "replaced");
        assert_eq!(array.len(), 1000);
        assert_eq!(array.at(500), Some(&HostValue::str("replaced")));
        assert_eq!(array.at(1000), Some(&HostValue::Number(999.0)));
        let position = array.iter().position(|(k, _)| k == "500");
        assert_eq!(position, Some(499));
    }

    #[test]
    fn test_from_list_is_one_based() {
        let array = HostArray::from_list(["a", "b"]);
        assert_eq!(array.at(1), Some(&HostValue::str("a")));
        assert_eq!(array.at(2), Some(&HostValue::str("b")));
        assert_eq!(array.at(0), None);
    }

    #[test]
    fn test_failure_sentinel() {
        assert!(HostValue::FAILURE.is_failure());
        assert!(!HostValue::Number(0.0).is_failure());
        assert_eq!(HostValue::FAILURE.to_string(), "-1");
    }
}
