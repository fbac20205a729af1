//! [`NativeDriver`] backed by the system ODBC driver manager via odbc-api.
//!
//! One process-wide ODBC environment serves every engine instance. Result
//! sets are read to the end at execute time, which makes every cursor
//! scrollable regardless of what the data source supports. The text held
//! for one result set is capped (see [`OdbcDriver::with_result_limit`]);
//! a larger result fails the execute with `HY001`.

use super::buffered::{OpenResult, ResultBudget, ResultColumn, ResultTable};
use super::{
    sql_type, ColumnAttribute, ColumnBuffer, DiagRecord, DiagTarget, FetchOrientation,
    NativeDriver, SqlResult, SQLSTATE_TRUNCATED,
};
use crate::config::DEFAULT_MAX_RESULT_BYTES;
use crate::error::native_record;
use odbc_api::{
    escape_attribute_value, Connection, ConnectionOptions, Cursor, DataType, Environment,
    ResultSetMetadata,
};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, OnceLock};
use zeroize::Zeroizing;

static NATIVE_ENV: OnceLock<std::result::Result<Environment, String>> = OnceLock::new();

fn native_environment() -> std::result::Result<&'static Environment, String> {
    let env = NATIVE_ENV.get_or_init(|| {
        Environment::new().map_err(|e| format!("Failed to create ODBC environment: {}", e))
    });
    match env {
        Ok(environment) => Ok(environment),
        Err(msg) => Err(msg.clone()),
    }
}

fn diag_from_error(err: &odbc_api::Error) -> DiagRecord {
    match native_record(err) {
        Some(record) => {
            let text = record.to_string();
            let message = text
                .split_once("Message: ")
                .map_or(text.as_str(), |(_, m)| m)
                .to_string();
            DiagRecord::new(&record.state.0, record.native_error, message)
        }
        None => DiagRecord::new(b"HY000", 0, err.to_string()),
    }
}

type SharedConnection = Arc<Mutex<Connection<'static>>>;

pub struct OdbcConnection {
    inner: Option<SharedConnection>,
    diagnostics: Vec<DiagRecord>,
}

pub struct OdbcStatement {
    connection: SharedConnection,
    result: Option<OpenResult>,
    row_count: isize,
    diagnostics: Vec<DiagRecord>,
}

impl OdbcStatement {
    fn fail(&mut self, record: DiagRecord, function: &'static str) -> SqlResult<()> {
        self.diagnostics.push(record);
        SqlResult::Error { function }
    }

    fn column(&mut self, column: u16, function: &'static str) -> SqlResult<ResultColumn> {
        match self.result.as_ref().and_then(|r| r.column(column)).cloned() {
            Some(col) => SqlResult::Success(col),
            None => {
                self.diagnostics.push(DiagRecord::new(
                    b"07009",
                    0,
                    "Invalid descriptor index",
                ));
                SqlResult::Error { function }
            }
        }
    }
}

/// Driver talking to real data sources.
pub struct OdbcDriver {
    diagnostics: Vec<DiagRecord>,
    result_limit: usize,
}

impl Default for OdbcDriver {
    fn default() -> Self {
        Self {
            diagnostics: Vec::new(),
            result_limit: DEFAULT_MAX_RESULT_BYTES,
        }
    }
}

impl OdbcDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the text one result set may buffer.
    pub fn with_result_limit(mut self, bytes: usize) -> Self {
        self.result_limit = bytes;
        self
    }
}

/// Connection string for `server`: taken verbatim when it already holds
/// attributes, with credentials appended when given; otherwise `None` and
/// `server` is used as a data source name.
fn connection_string(server: &str, user: &str, password: &str) -> Option<Zeroizing<String>> {
    if !server.contains('=') {
        return None;
    }
    let mut out = Zeroizing::new(server.trim_end_matches(';').to_string());
    if !user.is_empty() {
        out.push_str(";UID=");
        out.push_str(&escape_attribute_value(user));
        out.push_str(";PWD=");
        out.push_str(&escape_attribute_value(password));
    }
    out.push(';');
    Some(out)
}

/// Concise type code and display width for a described column. The width
/// is `None` when the driver reports no bound (long or unsized types).
fn describe(data_type: &DataType) -> (i16, Option<usize>) {
    match data_type {
        DataType::Char { length } => (sql_type::CHAR, length.map(NonZeroUsize::get)),
        DataType::Varchar { length } => (sql_type::VARCHAR, length.map(NonZeroUsize::get)),
        DataType::LongVarchar { .. } => (sql_type::LONGVARCHAR, None),
        DataType::WChar { .. } => (sql_type::WCHAR, None),
        DataType::WVarchar { .. } => (sql_type::WVARCHAR, None),
        DataType::Integer => (sql_type::INTEGER, Some(11)),
        DataType::SmallInt => (sql_type::SMALLINT, Some(6)),
        DataType::TinyInt => (sql_type::TINYINT, Some(4)),
        DataType::BigInt => (sql_type::BIGINT, Some(20)),
        DataType::Bit => (sql_type::BIT, Some(1)),
        DataType::Numeric { precision, .. } => (sql_type::NUMERIC, Some(*precision as usize + 2)),
        DataType::Decimal { precision, .. } => (sql_type::DECIMAL, Some(*precision as usize + 2)),
        DataType::Real => (sql_type::REAL, Some(14)),
        DataType::Float { .. } | DataType::Double => (sql_type::DOUBLE, Some(24)),
        DataType::Date => (sql_type::TYPE_DATE, Some(10)),
        DataType::Time { precision } => (
            sql_type::TYPE_TIME,
            Some(fraction_width(8, *precision as usize)),
        ),
        DataType::Timestamp { precision } => (
            sql_type::TYPE_TIMESTAMP,
            Some(fraction_width(19, *precision as usize)),
        ),
        DataType::Binary { length } => (sql_type::BINARY, length.map(|l| l.get() * 2)),
        DataType::Varbinary { length } => (sql_type::VARBINARY, length.map(|l| l.get() * 2)),
        DataType::LongVarbinary { .. } => (sql_type::LONGVARBINARY, None),
        _ => (sql_type::VARCHAR, None),
    }
}

fn fraction_width(base: usize, precision: usize) -> usize {
    if precision > 0 {
        base + 1 + precision
    } else {
        base
    }
}

/// Runs `sql` and reads any result set to the end, failing with `HY001`
/// once the buffered text passes the budget.
fn execute_buffered(
    conn: &Connection<'static>,
    sql: &str,
    mut budget: ResultBudget,
) -> std::result::Result<(Option<ResultTable>, isize), DiagRecord> {
    let native = |e: odbc_api::Error| diag_from_error(&e);
    let mut statement = conn.preallocate().map_err(native)?;
    let table = match statement.execute(sql, ()).map_err(native)? {
        Some(mut cursor) => {
            let cols = u16::try_from(cursor.num_result_cols().map_err(native)?).unwrap_or(0);
            let mut columns = Vec::with_capacity(usize::from(cols));
            for col in 1..=cols {
                let name = cursor.col_name(col).map_err(native)?.to_string();
                let data_type = cursor.col_data_type(col).map_err(native)?;
                let (concise_type, width) = describe(&data_type);
                columns.push(ResultColumn {
                    name,
                    concise_type,
                    display_size: width.unwrap_or(0),
                });
            }

            let mut table = ResultTable::new(columns);
            let mut buf = Vec::new();
            while let Some(mut row) = cursor.next_row().map_err(native)? {
                let mut values = Vec::with_capacity(usize::from(cols));
                for col in 1..=cols {
                    buf.clear();
                    let value = if row.get_text(col, &mut buf).map_err(native)? {
                        Some(String::from_utf8_lossy(&buf).into_owned())
                    } else {
                        None
                    };
                    values.push(value);
                }
                if !budget.charge(&values) {
                    return Err(budget.exceeded());
                }
                table.rows.push(values);
            }
            // Declared sizes count characters; buffers hold UTF-16 units.
            table.widen_to_values();
            Some(table)
        }
        None => None,
    };
    let affected = match table {
        Some(_) => -1,
        None => statement
            .row_count()
            .map_err(native)?
            .map_or(-1, |n| isize::try_from(n).unwrap_or(isize::MAX)),
    };
    Ok((table, affected))
}

impl NativeDriver for OdbcDriver {
    type Connection = OdbcConnection;
    type Statement = OdbcStatement;

    fn name(&self) -> &str {
        "odbc"
    }

    fn allocate_environment(&mut self) -> SqlResult<()> {
        self.diagnostics.clear();
        match native_environment() {
            Ok(_) => SqlResult::Success(()),
            Err(msg) => {
                self.diagnostics.push(DiagRecord::new(b"HY000", 0, msg));
                SqlResult::Error {
                    function: "SQLAllocHandle",
                }
            }
        }
    }

    fn free_environment(&mut self) -> SqlResult<()> {
        // The environment lives for the whole process.
        self.diagnostics.clear();
        SqlResult::Success(())
    }

    fn allocate_connection(&mut self) -> SqlResult<OdbcConnection> {
        self.diagnostics.clear();
        if NATIVE_ENV.get().is_none() {
            return SqlResult::InvalidHandle;
        }
        SqlResult::Success(OdbcConnection {
            inner: None,
            diagnostics: Vec::new(),
        })
    }

    fn connect(
        &mut self,
        conn: &mut OdbcConnection,
        server: &str,
        user: &str,
        password: &str,
    ) -> SqlResult<()> {
        conn.diagnostics.clear();
        let env = match native_environment() {
            Ok(env) => env,
            Err(_) => return SqlResult::InvalidHandle,
        };
        let connected = match connection_string(server, user, password) {
            Some(conn_str) => {
                env.connect_with_connection_string(&conn_str, ConnectionOptions::default())
            }
            None => env.connect(server, user, password, ConnectionOptions::default()),
        };
        match connected {
            Ok(connection) => {
                conn.inner = Some(Arc::new(Mutex::new(connection)));
                SqlResult::Success(())
            }
            Err(e) => {
                conn.diagnostics.push(diag_from_error(&e));
                SqlResult::Error {
                    function: "SQLConnect",
                }
            }
        }
    }

    fn disconnect(&mut self, conn: OdbcConnection) -> SqlResult<()> {
        // Statements share the connection; the native handle disconnects
        // when the last owner drops it.
        drop(conn);
        SqlResult::Success(())
    }

    fn allocate_statement(&mut self, conn: &mut OdbcConnection) -> SqlResult<OdbcStatement> {
        conn.diagnostics.clear();
        let Some(shared) = conn.inner.as_ref() else {
            conn.diagnostics
                .push(DiagRecord::new(b"08003", 0, "Connection not open"));
            return SqlResult::Error {
                function: "SQLAllocHandle",
            };
        };
        SqlResult::Success(OdbcStatement {
            connection: Arc::clone(shared),
            result: None,
            row_count: -1,
            diagnostics: Vec::new(),
        })
    }

    fn set_scrollable(&mut self, stmt: &mut OdbcStatement) -> SqlResult<()> {
        stmt.diagnostics.clear();
        SqlResult::Success(())
    }

    fn exec_direct(&mut self, stmt: &mut OdbcStatement, sql: &str) -> SqlResult<()> {
        stmt.diagnostics.clear();
        if stmt.result.is_some() {
            return stmt.fail(
                DiagRecord::new(b"24000", 0, "Invalid cursor state"),
                "SQLExecDirect",
            );
        }
        let budget = ResultBudget::new(self.result_limit);
        let outcome = match stmt.connection.lock() {
            Ok(connection) => execute_buffered(&connection, sql, budget),
            Err(_) => {
                return stmt.fail(
                    DiagRecord::new(b"HY000", 0, "Connection lock poisoned"),
                    "SQLExecDirect",
                )
            }
        };
        match outcome {
            Ok((table, affected)) => {
                stmt.result = table.map(OpenResult::new);
                stmt.row_count = affected;
                SqlResult::Success(())
            }
            Err(record) => stmt.fail(record, "SQLExecDirect"),
        }
    }

    fn num_result_cols(&mut self, stmt: &mut OdbcStatement) -> SqlResult<i16> {
        stmt.diagnostics.clear();
        let count = stmt.result.as_ref().map_or(0, OpenResult::column_count);
        SqlResult::Success(i16::try_from(count).unwrap_or(i16::MAX))
    }

    fn row_count(&mut self, stmt: &mut OdbcStatement) -> SqlResult<isize> {
        stmt.diagnostics.clear();
        SqlResult::Success(stmt.row_count)
    }

    fn col_attribute(
        &mut self,
        stmt: &mut OdbcStatement,
        column: u16,
        attribute: ColumnAttribute,
    ) -> SqlResult<isize> {
        stmt.diagnostics.clear();
        stmt.column(column, "SQLColAttribute")
            .map(|col| match attribute {
                ColumnAttribute::DisplaySize => {
                    isize::try_from(col.display_size).unwrap_or(isize::MAX)
                }
                ColumnAttribute::ConciseType => isize::from(col.concise_type),
            })
    }

    fn col_name(&mut self, stmt: &mut OdbcStatement, column: u16) -> SqlResult<String> {
        stmt.diagnostics.clear();
        stmt.column(column, "SQLColAttribute").map(|col| col.name)
    }

    fn bind_col(
        &mut self,
        stmt: &mut OdbcStatement,
        column: u16,
        _capacity_bytes: usize,
    ) -> SqlResult<()> {
        stmt.diagnostics.clear();
        stmt.column(column, "SQLBindCol").map(|_| ())
    }

    fn fetch(
        &mut self,
        stmt: &mut OdbcStatement,
        targets: &mut [&mut ColumnBuffer],
    ) -> SqlResult<()> {
        self.fetch_scroll(stmt, FetchOrientation::Next, targets)
    }

    fn fetch_scroll(
        &mut self,
        stmt: &mut OdbcStatement,
        orientation: FetchOrientation,
        targets: &mut [&mut ColumnBuffer],
    ) -> SqlResult<()> {
        stmt.diagnostics.clear();
        let Some(result) = stmt.result.as_mut() else {
            return stmt.fail(
                DiagRecord::new(b"24000", 0, "Invalid cursor state"),
                "SQLFetchScroll",
            );
        };
        if !result.advance(orientation) {
            return SqlResult::NoData;
        }
        if result.write_current(targets) {
            stmt.diagnostics.push(DiagRecord::new(
                &SQLSTATE_TRUNCATED,
                0,
                "String data, right truncated",
            ));
            return SqlResult::SuccessWithInfo(());
        }
        SqlResult::Success(())
    }

    fn close_cursor(&mut self, stmt: &mut OdbcStatement) -> SqlResult<()> {
        stmt.diagnostics.clear();
        stmt.result = None;
        SqlResult::Success(())
    }

    fn free_statement(&mut self, stmt: OdbcStatement) -> SqlResult<()> {
        drop(stmt);
        SqlResult::Success(())
    }

    fn diag_record(
        &self,
        target: DiagTarget<'_, Self>,
        rec_number: i16,
        message_capacity: usize,
    ) -> Option<DiagRecord> {
        let records = match target {
            DiagTarget::Environment => &self.diagnostics,
            DiagTarget::Connection(conn) => &conn.diagnostics,
            DiagTarget::Statement(stmt) => &stmt.diagnostics,
        };
        let index = usize::try_from(rec_number).ok()?.checked_sub(1)?;
        records.get(index).map(|r| r.truncated(message_capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_for_dsn() {
        assert!(connection_string("testdb", "sa", "secret").is_none());
    }

    #[test]
    fn test_connection_string_appends_credentials() {
        let s = connection_string("Driver={SQLite3};Database=:memory:;", "sa", "p;w").unwrap();
        assert_eq!(
            s.as_str(),
            "Driver={SQLite3};Database=:memory:;UID=sa;PWD={p;w};"
        );
    }

    #[test]
    fn test_connection_string_without_user() {
        let s = connection_string("DSN=testdb", "", "").unwrap();
        assert_eq!(s.as_str(), "DSN=testdb;");
    }

    #[test]
    fn test_describe_sized_and_unsized() {
        assert_eq!(
            describe(&DataType::Varchar {
                length: NonZeroUsize::new(40)
            }),
            (sql_type::VARCHAR, Some(40))
        );
        assert_eq!(describe(&DataType::Integer), (sql_type::INTEGER, Some(11)));
        assert_eq!(describe(&DataType::Date), (sql_type::TYPE_DATE, Some(10)));
        assert_eq!(
            describe(&DataType::Varchar { length: None }),
            (sql_type::VARCHAR, None)
        );
    }

    #[test]
    fn test_fraction_width() {
        assert_eq!(fraction_width(19, 0), 19);
        assert_eq!(fraction_width(19, 3), 23);
    }

    #[test]
    fn test_result_limit_defaults_to_config() {
        assert_eq!(OdbcDriver::new().result_limit, DEFAULT_MAX_RESULT_BYTES);
        assert_eq!(OdbcDriver::new().with_result_limit(512).result_limit, 512);
    }

    #[test]
    fn test_statement_needs_connected_handle() {
        let mut driver = OdbcDriver::new();
        let mut conn = OdbcConnection {
            inner: None,
            diagnostics: Vec::new(),
        };
        let result = driver.allocate_statement(&mut conn);
        assert_eq!(result.status().code(), -1);
        let record = driver
            .diag_record(DiagTarget::Connection(&conn), 1, 1000)
            .unwrap();
        assert_eq!(&record.state, b"08003");
    }
}
