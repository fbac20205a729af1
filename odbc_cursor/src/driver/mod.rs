//! Call-level interface the engine drives.
//!
//! [`NativeDriver`] mirrors the subset of ODBC the cursor engine needs:
//! environment/connection/statement allocation, direct execution, column
//! attributes, bound output buffers, fetch/scroll and diagnostic records.
//! Every call reports a native-style status through [`SqlResult`].

pub mod buffered;
pub mod memory;
pub mod odbc;

pub use buffered::{ResultBudget, ResultColumn, ResultTable};
pub use memory::MemoryDriver;
pub use odbc::OdbcDriver;

/// Length/indicator value marking a NULL column value.
pub const NULL_DATA: isize = -1;

/// SQLSTATE of the "string data, right truncated" informational record.
pub const SQLSTATE_TRUNCATED: [u8; 5] = *b"01004";

/// Concise SQL type codes the engine cares about.
pub mod sql_type {
    pub const CHAR: i16 = 1;
    pub const NUMERIC: i16 = 2;
    pub const DECIMAL: i16 = 3;
    pub const INTEGER: i16 = 4;
    pub const SMALLINT: i16 = 5;
    pub const FLOAT: i16 = 6;
    pub const REAL: i16 = 7;
    pub const DOUBLE: i16 = 8;
    pub const VARCHAR: i16 = 12;
    pub const TYPE_DATE: i16 = 91;
    pub const TYPE_TIME: i16 = 92;
    pub const TYPE_TIMESTAMP: i16 = 93;
    pub const LONGVARCHAR: i16 = -1;
    pub const BINARY: i16 = -2;
    pub const VARBINARY: i16 = -3;
    pub const LONGVARBINARY: i16 = -4;
    pub const BIGINT: i16 = -5;
    pub const TINYINT: i16 = -6;
    pub const BIT: i16 = -7;
    pub const WCHAR: i16 = -8;
    pub const WVARCHAR: i16 = -9;
    pub const WLONGVARCHAR: i16 = -10;

    /// True for the character family (narrow and wide).
    pub fn is_character(code: i16) -> bool {
        matches!(
            code,
            CHAR | VARCHAR | LONGVARCHAR | WCHAR | WVARCHAR | WLONGVARCHAR
        )
    }
}

/// Outcome of a native call, shaped after the ODBC return codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlResult<T> {
    Success(T),
    SuccessWithInfo(T),
    NoData,
    NeedData,
    StillExecuting,
    Error { function: &'static str },
    InvalidHandle,
    Unrecognized(i16),
}

impl<T> SqlResult<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SqlResult<U> {
        match self {
            SqlResult::Success(v) => SqlResult::Success(f(v)),
            SqlResult::SuccessWithInfo(v) => SqlResult::SuccessWithInfo(f(v)),
            SqlResult::NoData => SqlResult::NoData,
            SqlResult::NeedData => SqlResult::NeedData,
            SqlResult::StillExecuting => SqlResult::StillExecuting,
            SqlResult::Error { function } => SqlResult::Error { function },
            SqlResult::InvalidHandle => SqlResult::InvalidHandle,
            SqlResult::Unrecognized(code) => SqlResult::Unrecognized(code),
        }
    }

    pub fn status(&self) -> SqlStatus {
        match self {
            SqlResult::Success(_) => SqlStatus::Success,
            SqlResult::SuccessWithInfo(_) => SqlStatus::SuccessWithInfo,
            SqlResult::NoData => SqlStatus::NoData,
            SqlResult::NeedData => SqlStatus::NeedData,
            SqlResult::StillExecuting => SqlStatus::StillExecuting,
            SqlResult::Error { .. } => SqlStatus::Error,
            SqlResult::InvalidHandle => SqlStatus::InvalidHandle,
            SqlResult::Unrecognized(code) => SqlStatus::Other(*code),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SqlResult::Success(_))
    }
}

/// Bare status code, detached from any payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlStatus {
    Success,
    SuccessWithInfo,
    NoData,
    NeedData,
    StillExecuting,
    Error,
    InvalidHandle,
    Other(i16),
}

impl SqlStatus {
    pub fn code(self) -> i16 {
        match self {
            SqlStatus::Success => 0,
            SqlStatus::SuccessWithInfo => 1,
            SqlStatus::StillExecuting => 2,
            SqlStatus::NeedData => 99,
            SqlStatus::NoData => 100,
            SqlStatus::Error => -1,
            SqlStatus::InvalidHandle => -2,
            SqlStatus::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleType {
    Environment,
    Connection,
    Statement,
}

/// Numeric column attributes read during description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAttribute {
    DisplaySize,
    ConciseType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrientation {
    Next,
    First,
    Last,
    Prior,
    Absolute(isize),
    Relative(isize),
}

/// One diagnostic record as handed out by the driver.
///
/// `message` holds at most the capacity requested by the caller;
/// `text_length` is the full length the driver had available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagRecord {
    pub state: [u8; 5],
    pub native_error: i32,
    pub message: String,
    pub text_length: usize,
}

impl DiagRecord {
    pub fn new(state: &[u8; 5], native_error: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        let text_length = message.chars().count();
        Self {
            state: *state,
            native_error,
            message,
            text_length,
        }
    }

    pub fn state_str(&self) -> String {
        String::from_utf8_lossy(&self.state).into_owned()
    }

    /// Copy of the record with the message cut to `capacity` characters,
    /// leaving `text_length` untouched so callers can detect the cut.
    pub fn truncated(&self, capacity: usize) -> Self {
        let message = self.message.chars().take(capacity).collect();
        Self {
            state: self.state,
            native_error: self.native_error,
            message,
            text_length: self.text_length,
        }
    }
}

/// Which native object a diagnostic request is about.
pub enum DiagTarget<'a, D: NativeDriver + ?Sized> {
    Environment,
    Connection(&'a D::Connection),
    Statement(&'a D::Statement),
}

impl<D: NativeDriver + ?Sized> Clone for DiagTarget<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: NativeDriver + ?Sized> Copy for DiagTarget<'_, D> {}

impl<D: NativeDriver + ?Sized> DiagTarget<'_, D> {
    pub fn handle_type(&self) -> HandleType {
        match self {
            DiagTarget::Environment => HandleType::Environment,
            DiagTarget::Connection(_) => HandleType::Connection,
            DiagTarget::Statement(_) => HandleType::Statement,
        }
    }
}

/// Display buffer bound to one result column.
///
/// The driver writes UTF-16 text plus a terminator into `data` and the
/// byte length of the full value (or [`NULL_DATA`]) into `indicator`.
#[derive(Debug, Clone)]
pub struct ColumnBuffer {
    data: Vec<u16>,
    indicator: isize,
}

impl ColumnBuffer {
    /// Allocates room for `chars` wide characters, reporting allocation
    /// failure instead of aborting.
    pub fn with_capacity(chars: usize) -> Option<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(chars).ok()?;
        data.resize(chars, 0);
        Some(Self {
            data,
            indicator: NULL_DATA,
        })
    }

    /// Capacity in characters, terminator included.
    pub fn capacity_chars(&self) -> usize {
        self.data.len()
    }

    pub fn capacity_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<u16>()
    }

    pub fn indicator(&self) -> isize {
        self.indicator
    }

    pub fn is_null(&self) -> bool {
        self.indicator == NULL_DATA
    }

    /// Effective byte length of the last value; NULL counts as zero.
    pub fn effective_len(&self) -> usize {
        self.indicator.max(0) as usize
    }

    pub fn set_null(&mut self) {
        self.indicator = NULL_DATA;
        if let Some(first) = self.data.first_mut() {
            *first = 0;
        }
    }

    /// Writes `value` the way a driver fills a bound buffer. Returns
    /// `true` when the value had to be truncated.
    pub fn write_text(&mut self, value: &str) -> bool {
        let units: Vec<u16> = value.encode_utf16().collect();
        self.indicator = (units.len() * std::mem::size_of::<u16>()) as isize;
        let room = self.data.len().saturating_sub(1);
        let copied = units.len().min(room);
        self.data[..copied].copy_from_slice(&units[..copied]);
        if let Some(terminator) = self.data.get_mut(copied) {
            *terminator = 0;
        }
        copied < units.len()
    }

    /// Current value as text, `None` for NULL. Truncated values yield the
    /// part that fit in the buffer.
    pub fn text(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        let chars = self.effective_len() / std::mem::size_of::<u16>();
        let room = self.data.len().saturating_sub(1);
        Some(String::from_utf16_lossy(&self.data[..chars.min(room)]))
    }
}

/// The native SQL client library, as seen by the engine.
pub trait NativeDriver {
    type Connection;
    type Statement;

    /// Short name used in log lines.
    fn name(&self) -> &str;

    fn allocate_environment(&mut self) -> SqlResult<()>;

    fn free_environment(&mut self) -> SqlResult<()>;

    fn allocate_connection(&mut self) -> SqlResult<Self::Connection>;

    fn connect(
        &mut self,
        conn: &mut Self::Connection,
        server: &str,
        user: &str,
        password: &str,
    ) -> SqlResult<()>;

    /// Disconnects (if connected) and frees the connection object.
    fn disconnect(&mut self, conn: Self::Connection) -> SqlResult<()>;

    fn allocate_statement(&mut self, conn: &mut Self::Connection) -> SqlResult<Self::Statement>;

    fn set_scrollable(&mut self, stmt: &mut Self::Statement) -> SqlResult<()>;

    fn exec_direct(&mut self, stmt: &mut Self::Statement, sql: &str) -> SqlResult<()>;

    fn num_result_cols(&mut self, stmt: &mut Self::Statement) -> SqlResult<i16>;

    /// Rows affected by the last statement, `-1` when unknown.
    fn row_count(&mut self, stmt: &mut Self::Statement) -> SqlResult<isize>;

    fn col_attribute(
        &mut self,
        stmt: &mut Self::Statement,
        column: u16,
        attribute: ColumnAttribute,
    ) -> SqlResult<isize>;

    fn col_name(&mut self, stmt: &mut Self::Statement, column: u16) -> SqlResult<String>;

    /// Declares an output buffer of `capacity_bytes` for `column`.
    fn bind_col(
        &mut self,
        stmt: &mut Self::Statement,
        column: u16,
        capacity_bytes: usize,
    ) -> SqlResult<()>;

    /// Advances one row, writing into the bound buffers (one per bound
    /// column, in column order).
    fn fetch(
        &mut self,
        stmt: &mut Self::Statement,
        targets: &mut [&mut ColumnBuffer],
    ) -> SqlResult<()>;

    fn fetch_scroll(
        &mut self,
        stmt: &mut Self::Statement,
        orientation: FetchOrientation,
        targets: &mut [&mut ColumnBuffer],
    ) -> SqlResult<()>;

    /// Closes the open result set, keeping the statement allocated.
    fn close_cursor(&mut self, stmt: &mut Self::Statement) -> SqlResult<()>;

    fn free_statement(&mut self, stmt: Self::Statement) -> SqlResult<()>;

    /// Diagnostic record `rec_number` (1-based) with the message cut to
    /// `message_capacity` characters, `None` once the chain is exhausted.
    fn diag_record(
        &self,
        target: DiagTarget<'_, Self>,
        rec_number: i16,
        message_capacity: usize,
    ) -> Option<DiagRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_result_status_codes() {
        assert_eq!(SqlResult::Success(()).status().code(), 0);
        assert_eq!(SqlResult::SuccessWithInfo(()).status().code(), 1);
        assert_eq!(SqlResult::<()>::NoData.status().code(), 100);
        assert_eq!(
            SqlResult::<()>::Error { function: "SQLFetch" }.status().code(),
            -1
        );
        assert_eq!(SqlResult::<()>::InvalidHandle.status().code(), -2);
        assert_eq!(SqlResult::<()>::Unrecognized(42).status().code(), 42);
    }

    #[test]
    fn test_sql_result_map_keeps_status() {
        let r = SqlResult::SuccessWithInfo(3).map(|v| v * 2);
        assert_eq!(r, SqlResult::SuccessWithInfo(6));
        let r: SqlResult<i32> = SqlResult::<i32>::NoData.map(|v| v * 2);
        assert_eq!(r, SqlResult::NoData);
    }

    #[test]
    fn test_is_character() {
        assert!(sql_type::is_character(sql_type::CHAR));
        assert!(sql_type::is_character(sql_type::VARCHAR));
        assert!(sql_type::is_character(sql_type::LONGVARCHAR));
        assert!(sql_type::is_character(sql_type::WVARCHAR));
        assert!(!sql_type::is_character(sql_type::INTEGER));
        assert!(!sql_type::is_character(sql_type::TYPE_TIMESTAMP));
        assert!(!sql_type::is_character(sql_type::BINARY));
    }

    #[test]
    fn test_column_buffer_write_and_read() {
        let mut buf = ColumnBuffer::with_capacity(6).unwrap();
        assert!(buf.is_null());
        assert_eq!(buf.text(), None);

        assert!(!buf.write_text("hello"));
        assert_eq!(buf.indicator(), 10);
        assert_eq!(buf.effective_len(), 10);
        assert_eq!(buf.text().as_deref(), Some("hello"));

        buf.set_null();
        assert!(buf.is_null());
        assert_eq!(buf.effective_len(), 0);
    }

    #[test]
    fn test_column_buffer_truncates() {
        let mut buf = ColumnBuffer::with_capacity(4).unwrap();
        assert!(buf.write_text("abcdef"));
        assert_eq!(buf.indicator(), 12);
        assert_eq!(buf.text().as_deref(), Some("abc"));
        assert_eq!(buf.capacity_bytes(), 8);
    }

    #[test]
    fn test_diag_record_truncated_keeps_length() {
        let rec = DiagRecord::new(b"HY000", 7, "general error text");
        let cut = rec.truncated(7);
        assert_eq!(cut.message, "general");
        assert_eq!(cut.text_length, 18);
        assert_eq!(cut.state_str(), "HY000");
    }
}
