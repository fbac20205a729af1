//! Connection and cursor handle manager over ODBC.
//!
//! [`OdbcEnvironment`] owns bounded tables of connection and cursor
//! handles and drives execute, describe, bind and fetch against a
//! [`driver::NativeDriver`]. Rows come back as field-separated text or as
//! ordered `(column, value)` pairs. [`host::OdbcExtension`] exposes the
//! script-level operations and [`ffi`] the C ABI.

pub mod config;
pub mod driver;
pub mod engine;
mod error;
pub mod ffi;
pub mod handles;
pub mod host;
pub mod observability;
pub mod security;

pub use config::EngineConfig;
pub use driver::{MemoryDriver, NativeDriver, OdbcDriver};
pub use engine::{ColumnInfo, CursorState, FetchedRow, OdbcEnvironment};
pub use error::{ErrorCategory, OdbcError, Result, StructuredError};
pub use handles::{Handle, HandleKind};
pub use host::{HostArray, HostValue, OdbcExtension};

#[cfg(feature = "test-helpers")]
pub mod test_helpers {
    use std::sync::Once;

    static DOTENV: Once = Once::new();

    /// Loads `.env` from the working directory or a parent, once per
    /// process. A missing file is not an error.
    pub fn load_dotenv() {
        DOTENV.call_once(|| {
            if let Ok(path) = dotenvy::dotenv() {
                log::debug!("Loaded environment from {}", path.display());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_creation() {
        let env = OdbcEnvironment::with_defaults(MemoryDriver::new()).unwrap();
        assert!(env.is_initialized());
        assert_eq!(env.field_separator(), '\x1c');
    }

    #[test]
    fn test_connection_empty_string() {
        let mut env = OdbcEnvironment::with_defaults(MemoryDriver::new()).unwrap();
        match env.connect("", "u", "p") {
            Err(OdbcError::EmptyConnectionString) => (),
            other => panic!("Expected EmptyConnectionString error, got {:?}", other),
        }
    }
}
