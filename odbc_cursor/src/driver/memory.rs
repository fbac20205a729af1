//! In-memory [`NativeDriver`] with scriptable data sources and results.
//!
//! Useful wherever no ODBC driver manager is at hand: unit and integration
//! tests, benchmarks, and host-side development. It follows ODBC call
//! semantics closely enough that the engine cannot tell the difference:
//! per-handle diagnostic chains cleared on every call, bound buffers
//! written on fetch with `01004` truncation warnings, scroll support only
//! after the scrollable attribute was accepted, and `24000` when a
//! statement is executed while its previous result set is still open.
//! Result sets larger than the configured limit fail with `HY001`, as the
//! ODBC driver does.

use super::buffered::{display_width, OpenResult, ResultBudget, ResultColumn, ResultTable};
use super::{
    sql_type, ColumnAttribute, ColumnBuffer, DiagRecord, DiagTarget, FetchOrientation,
    NativeDriver, SqlResult, SQLSTATE_TRUNCATED,
};
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum QueryOutcome {
    Rows(ResultTable),
    Affected(isize),
    Fail(DiagRecord),
}

#[derive(Debug, Clone)]
struct RegisteredQuery {
    outcome: QueryOutcome,
    warnings: Vec<DiagRecord>,
    failing_column: Option<u16>,
}

#[derive(Debug, Clone)]
struct DataSource {
    credentials: Option<(String, String)>,
}

pub struct MemoryConnection {
    id: u64,
    data_source: Option<String>,
    diagnostics: Vec<DiagRecord>,
}

impl MemoryConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.data_source.is_some()
    }
}

pub struct MemoryStatement {
    id: u64,
    data_source: String,
    scrollable: bool,
    result: Option<OpenResult>,
    failing_column: Option<u16>,
    row_count: isize,
    bound: Vec<Option<usize>>,
    diagnostics: Vec<DiagRecord>,
}

impl MemoryStatement {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    fn fail(&mut self, state: &[u8; 5], message: &str, function: &'static str) -> SqlResult<()> {
        self.diagnostics
            .push(DiagRecord::new(state, 0, format!("[Memory]{}", message)));
        SqlResult::Error { function }
    }

    fn column(&mut self, column: u16, function: &'static str) -> SqlResult<ResultColumn> {
        if self.failing_column == Some(column) {
            self.diagnostics.push(DiagRecord::new(
                b"HY000",
                0,
                format!("[Memory]Cannot describe column {}", column),
            ));
            return SqlResult::Error { function };
        }
        let found = self.result.as_ref().and_then(|r| r.column(column)).cloned();
        match found {
            Some(col) => SqlResult::Success(col),
            None => {
                self.diagnostics.push(DiagRecord::new(
                    b"07009",
                    0,
                    "[Memory]Invalid descriptor index",
                ));
                SqlResult::Error { function }
            }
        }
    }

    /// Repositions the open result and fills `targets` from the new row.
    fn scroll(
        &mut self,
        orientation: FetchOrientation,
        targets: &mut [&mut ColumnBuffer],
        function: &'static str,
    ) -> SqlResult<()> {
        let Some(result) = self.result.as_mut() else {
            return self.fail(b"24000", "Invalid cursor state", function);
        };
        if !result.advance(orientation) {
            return SqlResult::NoData;
        }
        if result.write_current(targets) {
            self.diagnostics.push(DiagRecord::new(
                &SQLSTATE_TRUNCATED,
                0,
                "[Memory]String data, right truncated",
            ));
            SqlResult::SuccessWithInfo(())
        } else {
            SqlResult::Success(())
        }
    }
}

/// Scriptable in-memory driver.
pub struct MemoryDriver {
    environment: bool,
    environment_generation: u32,
    data_sources: HashMap<String, DataSource>,
    queries: HashMap<String, RegisteredQuery>,
    scroll_support: bool,
    result_limit: usize,
    failing_release: bool,
    next_id: u64,
    live_connections: usize,
    live_statements: usize,
    executed: Vec<String>,
    diagnostics: Vec<DiagRecord>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            environment: false,
            environment_generation: 0,
            data_sources: HashMap::new(),
            queries: HashMap::new(),
            scroll_support: true,
            result_limit: usize::MAX,
            failing_release: false,
            next_id: 1,
            live_connections: 0,
            live_statements: 0,
            executed: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Data source accepting any user name and password.
    pub fn with_data_source(mut self, name: &str) -> Self {
        self.data_sources
            .insert(name.to_string(), DataSource { credentials: None });
        self
    }

    /// Data source requiring exactly these credentials.
    pub fn with_secured_data_source(mut self, name: &str, user: &str, password: &str) -> Self {
        self.data_sources.insert(
            name.to_string(),
            DataSource {
                credentials: Some((user.to_string(), password.to_string())),
            },
        );
        self
    }

    pub fn with_scroll_support(mut self, supported: bool) -> Self {
        self.scroll_support = supported;
        self
    }

    /// Caps the text one result set may hold.
    pub fn with_result_limit(mut self, bytes: usize) -> Self {
        self.result_limit = bytes;
        self
    }

    /// Makes freeing statements and connections report `HY000`. The handle
    /// is still released.
    pub fn with_failing_release(mut self) -> Self {
        self.failing_release = true;
        self
    }

    pub fn register_rows(&mut self, sql: &str, table: ResultTable) {
        self.register(sql, QueryOutcome::Rows(table));
    }

    pub fn register_affected(&mut self, sql: &str, rows: isize) {
        self.register(sql, QueryOutcome::Affected(rows));
    }

    pub fn register_failure(&mut self, sql: &str, state: &[u8; 5], native_error: i32, message: &str) {
        self.register(
            sql,
            QueryOutcome::Fail(DiagRecord::new(state, native_error, message)),
        );
    }

    /// Makes a registered statement succeed with one more informational
    /// record.
    pub fn attach_warning(&mut self, sql: &str, state: &[u8; 5], message: &str) {
        if let Some(query) = self.queries.get_mut(sql.trim()) {
            query.warnings.push(DiagRecord::new(state, 0, message));
        }
    }

    /// Makes describing `column` of a registered result set fail.
    pub fn fail_describe(&mut self, sql: &str, column: u16) {
        if let Some(query) = self.queries.get_mut(sql.trim()) {
            query.failing_column = Some(column);
        }
    }

    pub fn live_connections(&self) -> usize {
        self.live_connections
    }

    pub fn live_statements(&self) -> usize {
        self.live_statements
    }

    pub fn environment_generation(&self) -> u32 {
        self.environment_generation
    }

    pub fn has_environment(&self) -> bool {
        self.environment
    }

    /// Statement texts passed to `exec_direct`, in call order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    fn register(&mut self, sql: &str, outcome: QueryOutcome) {
        self.queries.insert(
            sql.trim().to_string(),
            RegisteredQuery {
                outcome,
                warnings: Vec::new(),
                failing_column: None,
            },
        );
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn lookup(&self, sql: &str) -> RegisteredQuery {
        let key = sql.trim();
        if let Some(query) = self.queries.get(key) {
            return query.clone();
        }
        let outcome = match evaluate_literal_select(key) {
            Some(table) => QueryOutcome::Rows(table),
            None => QueryOutcome::Fail(DiagRecord::new(
                b"42000",
                0,
                format!("[Memory]Syntax error or access violation: {}", key),
            )),
        };
        RegisteredQuery {
            outcome,
            warnings: Vec::new(),
            failing_column: None,
        }
    }

    fn released(&mut self) -> SqlResult<()> {
        self.diagnostics.clear();
        if !self.failing_release {
            return SqlResult::Success(());
        }
        self.diagnostics.push(DiagRecord::new(
            b"HY000",
            0,
            "[Memory]Handle release failed",
        ));
        SqlResult::Error {
            function: "SQLFreeHandle",
        }
    }
}

impl NativeDriver for MemoryDriver {
    type Connection = MemoryConnection;
    type Statement = MemoryStatement;

    fn name(&self) -> &str {
        "memory"
    }

    fn allocate_environment(&mut self) -> SqlResult<()> {
        self.diagnostics.clear();
        self.environment = true;
        self.environment_generation += 1;
        SqlResult::Success(())
    }

    fn free_environment(&mut self) -> SqlResult<()> {
        self.diagnostics.clear();
        if !self.environment {
            return SqlResult::InvalidHandle;
        }
        if self.live_connections > 0 {
            self.diagnostics.push(DiagRecord::new(
                b"HY010",
                0,
                "[Memory]Function sequence error",
            ));
            return SqlResult::Error {
                function: "SQLFreeHandle",
            };
        }
        self.environment = false;
        SqlResult::Success(())
    }

    fn allocate_connection(&mut self) -> SqlResult<MemoryConnection> {
        self.diagnostics.clear();
        if !self.environment {
            return SqlResult::InvalidHandle;
        }
        self.live_connections += 1;
        SqlResult::Success(MemoryConnection {
            id: self.next_id(),
            data_source: None,
            diagnostics: Vec::new(),
        })
    }

    fn connect(
        &mut self,
        conn: &mut MemoryConnection,
        server: &str,
        user: &str,
        password: &str,
    ) -> SqlResult<()> {
        conn.diagnostics.clear();
        let Some(source) = self.data_sources.get(server) else {
            conn.diagnostics.push(DiagRecord::new(
                b"IM002",
                0,
                "[Memory]Data source name not found and no default driver specified",
            ));
            return SqlResult::Error {
                function: "SQLConnect",
            };
        };
        if let Some((expected_user, expected_password)) = &source.credentials {
            if expected_user != user || expected_password != password {
                conn.diagnostics.push(DiagRecord::new(
                    b"28000",
                    18456,
                    format!("[Memory]Login failed for user '{}'.", user),
                ));
                return SqlResult::Error {
                    function: "SQLConnect",
                };
            }
        }
        conn.data_source = Some(server.to_string());
        SqlResult::Success(())
    }

    fn disconnect(&mut self, conn: MemoryConnection) -> SqlResult<()> {
        drop(conn);
        self.live_connections = self.live_connections.saturating_sub(1);
        self.released()
    }

    fn allocate_statement(&mut self, conn: &mut MemoryConnection) -> SqlResult<MemoryStatement> {
        conn.diagnostics.clear();
        let Some(data_source) = conn.data_source.clone() else {
            conn.diagnostics.push(DiagRecord::new(
                b"08003",
                0,
                "[Memory]Connection not open",
            ));
            return SqlResult::Error {
                function: "SQLAllocHandle",
            };
        };
        self.live_statements += 1;
        SqlResult::Success(MemoryStatement {
            id: self.next_id(),
            data_source,
            scrollable: false,
            result: None,
            failing_column: None,
            row_count: -1,
            bound: Vec::new(),
            diagnostics: Vec::new(),
        })
    }

    fn set_scrollable(&mut self, stmt: &mut MemoryStatement) -> SqlResult<()> {
        stmt.diagnostics.clear();
        if !self.scroll_support {
            return stmt.fail(
                b"HYC00",
                "Optional feature not implemented",
                "SQLSetStmtAttr",
            );
        }
        stmt.scrollable = true;
        SqlResult::Success(())
    }

    fn exec_direct(&mut self, stmt: &mut MemoryStatement, sql: &str) -> SqlResult<()> {
        stmt.diagnostics.clear();
        if stmt.result.is_some() {
            return stmt.fail(b"24000", "Invalid cursor state", "SQLExecDirect");
        }
        self.executed.push(sql.to_string());
        let query = self.lookup(sql);
        stmt.bound.clear();
        stmt.failing_column = query.failing_column;
        match query.outcome {
            QueryOutcome::Rows(table) => {
                let mut budget = ResultBudget::new(self.result_limit);
                if !table.rows.iter().all(|row| budget.charge(row)) {
                    stmt.diagnostics.push(budget.exceeded());
                    return SqlResult::Error {
                        function: "SQLExecDirect",
                    };
                }
                stmt.result = Some(OpenResult::new(table));
                stmt.row_count = -1;
            }
            QueryOutcome::Affected(rows) => {
                stmt.result = None;
                stmt.row_count = rows;
            }
            QueryOutcome::Fail(record) => {
                stmt.diagnostics.push(record);
                return SqlResult::Error {
                    function: "SQLExecDirect",
                };
            }
        }
        if query.warnings.is_empty() {
            return SqlResult::Success(());
        }
        stmt.diagnostics.extend(query.warnings);
        SqlResult::SuccessWithInfo(())
    }

    fn num_result_cols(&mut self, stmt: &mut MemoryStatement) -> SqlResult<i16> {
        stmt.diagnostics.clear();
        let count = stmt.result.as_ref().map_or(0, OpenResult::column_count);
        SqlResult::Success(count as i16)
    }

    fn row_count(&mut self, stmt: &mut MemoryStatement) -> SqlResult<isize> {
        stmt.diagnostics.clear();
        SqlResult::Success(stmt.row_count)
    }

    fn col_attribute(
        &mut self,
        stmt: &mut MemoryStatement,
        column: u16,
        attribute: ColumnAttribute,
    ) -> SqlResult<isize> {
        stmt.diagnostics.clear();
        stmt.column(column, "SQLColAttribute").map(|col| match attribute {
            ColumnAttribute::DisplaySize => col.display_size as isize,
            ColumnAttribute::ConciseType => isize::from(col.concise_type),
        })
    }

    fn col_name(&mut self, stmt: &mut MemoryStatement, column: u16) -> SqlResult<String> {
        stmt.diagnostics.clear();
        stmt.column(column, "SQLColAttribute").map(|col| col.name)
    }

    fn bind_col(
        &mut self,
        stmt: &mut MemoryStatement,
        column: u16,
        capacity_bytes: usize,
    ) -> SqlResult<()> {
        stmt.diagnostics.clear();
        let count = stmt.result.as_ref().map_or(0, OpenResult::column_count);
        if column == 0 || usize::from(column) > count {
            return stmt.fail(b"07009", "Invalid descriptor index", "SQLBindCol");
        }
        let slot = usize::from(column) - 1;
        if stmt.bound.len() <= slot {
            stmt.bound.resize(slot + 1, None);
        }
        stmt.bound[slot] = Some(capacity_bytes);
        SqlResult::Success(())
    }

    fn fetch(
        &mut self,
        stmt: &mut MemoryStatement,
        targets: &mut [&mut ColumnBuffer],
    ) -> SqlResult<()> {
        stmt.diagnostics.clear();
        stmt.scroll(FetchOrientation::Next, targets, "SQLFetch")
    }

    fn fetch_scroll(
        &mut self,
        stmt: &mut MemoryStatement,
        orientation: FetchOrientation,
        targets: &mut [&mut ColumnBuffer],
    ) -> SqlResult<()> {
        stmt.diagnostics.clear();
        if orientation != FetchOrientation::Next && !stmt.scrollable {
            return stmt.fail(b"HY106", "Fetch type out of range", "SQLFetchScroll");
        }
        stmt.scroll(orientation, targets, "SQLFetchScroll")
    }

    fn close_cursor(&mut self, stmt: &mut MemoryStatement) -> SqlResult<()> {
        stmt.diagnostics.clear();
        stmt.result = None;
        stmt.bound.clear();
        SqlResult::Success(())
    }

    fn free_statement(&mut self, stmt: MemoryStatement) -> SqlResult<()> {
        drop(stmt);
        self.live_statements = self.live_statements.saturating_sub(1);
        self.released()
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

/// Evaluates `SELECT <literal> [AS name], ...` without a FROM clause.
fn evaluate_literal_select(sql: &str) -> Option<ResultTable> {
    let body = strip_keyword(sql.trim().trim_end_matches(';'), "select")?;
    if find_keyword(body, "from").is_some() {
        return None;
    }
    let mut columns = Vec::new();
    let mut row = Vec::new();
    for (position, item) in split_top_level(body).into_iter().enumerate() {
        let (expr, alias) = match find_keyword(item, "as") {
            Some(at) => (item[..at].trim(), Some(item[at + 2..].trim())),
            None => (item.trim(), None),
        };
        let (concise_type, value) = parse_literal(expr)?;
        let name = match alias {
            Some(alias) => alias.trim_matches('"').to_string(),
            None if expr.is_empty() => format!("col{}", position + 1),
            None => expr.to_string(),
        };
        let display_size = match (&value, concise_type) {
            (_, sql_type::INTEGER) => 11,
            (Some(text), _) => display_width(text).max(1),
            (None, _) => 1,
        };
        columns.push(ResultColumn {
            name,
            concise_type,
            display_size,
        });
        row.push(value);
    }
    if columns.is_empty() {
        return None;
    }
    Some(ResultTable {
        columns,
        rows: vec![row],
    })
}

fn parse_literal(expr: &str) -> Option<(i16, Option<String>)> {
    if expr.eq_ignore_ascii_case("null") {
        return Some((sql_type::VARCHAR, None));
    }
    if expr.len() >= 2 && expr.starts_with('\'') && expr.ends_with('\'') {
        let inner = &expr[1..expr.len() - 1];
        return Some((sql_type::VARCHAR, Some(inner.replace("''", "'"))));
    }
    if expr.parse::<i32>().is_ok() {
        return Some((sql_type::INTEGER, Some(expr.to_string())));
    }
    if expr.parse::<i64>().is_ok() {
        return Some((sql_type::BIGINT, Some(expr.to_string())));
    }
    if expr.parse::<f64>().is_ok() {
        return Some((sql_type::DECIMAL, Some(expr.to_string())));
    }
    None
}

/// Byte offset of `keyword` as a whole word outside quotes.
fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut in_quotes = false;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\'' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        let end = i + keyword.len();
        if end > bytes.len() || !bytes[i..end].eq_ignore_ascii_case(keyword.as_bytes()) {
            continue;
        }
        let before_ok = i == 0 || bytes[i - 1].is_ascii_whitespace();
        let after_ok = end == bytes.len() || bytes[end].is_ascii_whitespace();
        if before_ok && after_ok {
            return Some(i);
        }
    }
    None
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    match find_keyword(text, keyword) {
        Some(0) => Some(&text[keyword.len()..]),
        _ => None,
    }
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, ch) in text.char_indices() {
        match ch {
            '\'' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
