use crate::driver::DiagRecord;
use crate::handles::HandleKind;
use odbc_api::handles::Record as OdbcRecord;
use thiserror::Error;

/// Error category for decision-making (retry, abort, reconnect, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Handle pool or memory exhausted - releasing resources may resolve
    Resource,
    /// Fatal error - should abort operation
    Fatal,
    /// Validation error - invalid caller input
    Validation,
    /// Connection lost - should reconnect
    ConnectionLost,
}

#[derive(Error, Debug, Clone)]
pub enum OdbcError {
    #[error("ODBC error: {0}")]
    OdbcApi(String),

    #[error("maximum of open {kind}s [{max}] reached, no free handles !")]
    HandlesExhausted { kind: HandleKind, max: usize },

    #[error("Invalid {kind} handle: {handle}")]
    InvalidHandle { kind: HandleKind, handle: i64 },

    #[error("Invalid handle!")]
    InvalidNativeHandle,

    #[error("Connection handle {0} was closed while cursors still reference it")]
    StaleConnection(u32),

    #[error("Cursor {0} has no result set")]
    NoResultSet(u32),

    #[error("Connection string is empty")]
    EmptyConnectionString,

    #[error("Environment not initialized")]
    EnvironmentNotInitialized,

    #[error("Error in {function}")]
    Driver { function: &'static str },

    #[error("Structured error: {message}")]
    Structured {
        sqlstate: [u8; 5],
        native_code: i32,
        message: String,
    },

    #[error("Unexpected return code {0} !")]
    UnexpectedReturn(i16),

    #[error("Out of memory: {0}")]
    ResourceExhausted(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<odbc_api::Error> for OdbcError {
    fn from(err: odbc_api::Error) -> Self {
        if let Some(structured) = try_extract_structured(&err) {
            return structured;
        }
        OdbcError::OdbcApi(err.to_string())
    }
}

fn try_extract_structured(err: &odbc_api::Error) -> Option<OdbcError> {
    native_record(err).map(structured_from_odbc_record)
}

/// Diagnostic record carried by an odbc-api error, if any.
pub(crate) fn native_record(err: &odbc_api::Error) -> Option<&OdbcRecord> {
    use odbc_api::Error as OdbcErr;
    match err {
        OdbcErr::Diagnostics { record, .. } => Some(record),
        OdbcErr::UnsupportedOdbcApiVersion(record) => Some(record),
        OdbcErr::InvalidRowArraySize { record, .. } => Some(record),
        OdbcErr::UnableToRepresentNull(record) => Some(record),
        OdbcErr::OracleOdbcDriverDoesNotSupport64Bit(record) => Some(record),
        _ => None,
    }
}

fn structured_from_odbc_record(record: &OdbcRecord) -> OdbcError {
    OdbcError::Structured {
        sqlstate: record.state.0,
        native_code: record.native_error,
        message: record.to_string(),
    }
}

impl OdbcError {
    /// Builds the error returned for a failed native call: the first
    /// reportable diagnostic record if the driver left one, otherwise a
    /// plain error naming the failing function.
    pub fn from_diagnostics(function: &'static str, records: &[DiagRecord]) -> Self {
        match records.first() {
            Some(record) if &record.state == b"HY001" => {
                OdbcError::ResourceExhausted(record.message.clone())
            }
            Some(record) => OdbcError::Structured {
                sqlstate: record.state,
                native_code: record.native_error,
                message: record.message.clone(),
            },
            None => OdbcError::Driver { function },
        }
    }

    pub fn sqlstate(&self) -> [u8; 5] {
        match self {
            OdbcError::Structured { sqlstate, .. } => *sqlstate,
            _ => [0u8; 5],
        }
    }

    pub fn native_code(&self) -> i32 {
        match self {
            OdbcError::Structured { native_code, .. } => *native_code,
            _ => 0,
        }
    }

    pub fn message(&self) -> String {
        match self {
            OdbcError::Structured { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }

    pub fn to_structured(&self) -> StructuredError {
        StructuredError {
            sqlstate: self.sqlstate(),
            native_code: self.native_code(),
            message: self.message(),
        }
    }

    /// Returns true if this is a connection-related error
    pub fn is_connection_error(&self) -> bool {
        match self {
            OdbcError::EmptyConnectionString
            | OdbcError::EnvironmentNotInitialized
            | OdbcError::StaleConnection(_) => true,
            OdbcError::Structured { sqlstate, .. } => sqlstate[0] == b'0' && sqlstate[1] == b'8',
            _ => false,
        }
    }

    /// Returns the error category for decision-making
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            OdbcError::ValidationError(_)
            | OdbcError::InvalidHandle { .. }
            | OdbcError::NoResultSet(_) => ErrorCategory::Validation,
            OdbcError::HandlesExhausted { .. } | OdbcError::ResourceExhausted(_) => {
                ErrorCategory::Resource
            }
            _ if self.is_connection_error() => ErrorCategory::ConnectionLost,
            _ => ErrorCategory::Fatal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredError {
    pub sqlstate: [u8; 5],
    pub native_code: i32,
    pub message: String,
}

impl StructuredError {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&self.sqlstate);
        buffer.extend_from_slice(&self.native_code.to_le_bytes());
        let msg_bytes = self.message.as_bytes();
        buffer.extend_from_slice(&(msg_bytes.len() as u32).to_le_bytes());
        buffer.extend_from_slice(msg_bytes);
        buffer
    }

    pub fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < 13 {
            return None;
        }

        let mut sqlstate = [0u8; 5];
        sqlstate.copy_from_slice(&data[0..5]);

        let native_code = i32::from_le_bytes([data[5], data[6], data[7], data[8]]);

        let msg_len = u32::from_le_bytes([data[9], data[10], data[11], data[12]]) as usize;

        if data.len() < 13 + msg_len {
            return None;
        }

        let message = String::from_utf8(data[13..13 + msg_len].to_vec()).ok()?;

        Some(Self {
            sqlstate,
            native_code,
            message,
        })
    }
}

pub type Result<T> = std::result::Result<T, OdbcError>;
