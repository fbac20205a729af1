use crate::driver::{DiagTarget, NativeDriver};
use crate::engine::binding::{allocate_bindings, ColumnDescriptor};
use crate::engine::environment::OdbcEnvironment;
use crate::engine::fetch::FetchedRow;
use crate::error::{OdbcError, Result};
use crate::handles::{Handle, HandleKind};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Statement allocated, no result set to read.
    Allocated,
    /// Row-returning statement executed and its columns bound.
    Described,
    /// At least one fetch or rewind done on the current result set.
    Fetching,
}

/// Occupied cursor slot.
pub struct CursorSlot<D: NativeDriver> {
    pub(crate) connection: Handle,
    pub(crate) statement: D::Statement,
    pub(crate) columns: Vec<ColumnDescriptor>,
    pub(crate) header_length: usize,
    pub(crate) row_length: usize,
    pub(crate) state: CursorState,
    pub(crate) last_row: Option<FetchedRow>,
    executed: bool,
}

impl<D: NativeDriver> CursorSlot<D> {
    fn new(connection: Handle, statement: D::Statement) -> Self {
        Self {
            connection,
            statement,
            columns: Vec::new(),
            header_length: 0,
            row_length: 0,
            state: CursorState::Allocated,
            last_row: None,
            executed: false,
        }
    }

    fn clear_result(&mut self) {
        self.columns.clear();
        self.header_length = 0;
        self.row_length = 0;
        self.state = CursorState::Allocated;
        self.last_row = None;
    }
}

impl<D: NativeDriver> OdbcEnvironment<D> {
    /// Allocates a statement on `connection` and returns the cursor handle.
    pub fn allocate_cursor(&mut self, connection: u32) -> Result<u32> {
        self.ensure_initialized()?;
        let owner = self
            .connections
            .resolve(connection)
            .ok_or(OdbcError::InvalidHandle {
                kind: HandleKind::Connection,
                handle: i64::from(connection),
            })?;
        if !self.cursors.has_free() {
            return Err(OdbcError::HandlesExhausted {
                kind: HandleKind::Cursor,
                max: self.cursors.capacity(),
            });
        }

        let slot = self.connections.get_mut(connection)?;
        let native = slot.native.as_mut().ok_or(OdbcError::InvalidHandle {
            kind: HandleKind::Connection,
            handle: i64::from(connection),
        })?;
        let result = self.driver.allocate_statement(native);
        let mut statement = self
            .reporter
            .check(&self.driver, DiagTarget::Connection(&*native), result, &mut self.metrics)?
            .ok_or(OdbcError::Driver {
                function: "SQLAllocHandle",
            })?;

        if !self.driver.set_scrollable(&mut statement).is_success() {
            log::debug!(
                "{} driver refused scrollable cursors on connection {}",
                self.driver.name(),
                connection
            );
        }

        let handle = self.cursors.acquire(CursorSlot::new(owner, statement))?;
        self.metrics.cursors_opened += 1;
        Ok(handle.index)
    }

    /// Runs `sql` on the cursor and returns the number of bound result
    /// columns, `0` for statements without a result set.
    pub fn execute(&mut self, cursor: u32, sql: &str) -> Result<usize> {
        self.ensure_initialized()?;
        if sql.trim().is_empty() {
            return Err(OdbcError::ValidationError("SQL text is empty".to_string()));
        }
        self.check_cursor_connection(cursor)?;
        self.discard_result(cursor);

        self.reporter.logger().log_statement(cursor, sql);
        let slot = self.cursors.get_mut(cursor)?;
        let started = Instant::now();
        let result = self.driver.exec_direct(&mut slot.statement, sql);
        self.metrics.record_execute(started.elapsed());
        slot.executed = true;
        if self
            .reporter
            .check(&self.driver, DiagTarget::Statement(&slot.statement), result, &mut self.metrics)?
            .is_none()
        {
            self.reporter.logger().log_rows_affected(0);
            return Ok(0);
        }

        let result = self.driver.num_result_cols(&mut slot.statement);
        let count = self
            .reporter
            .check(&self.driver, DiagTarget::Statement(&slot.statement), result, &mut self.metrics)?
            .unwrap_or(0);

        if count <= 0 {
            let result = self.driver.row_count(&mut slot.statement);
            let affected = self
                .reporter
                .check(&self.driver, DiagTarget::Statement(&slot.statement), result, &mut self.metrics)?
                .unwrap_or(-1);
            self.reporter.logger().log_rows_affected(affected);
            return Ok(0);
        }

        let count = u16::try_from(count).unwrap_or(0);
        let bindings = match allocate_bindings(
            &mut self.driver,
            &self.reporter,
            &mut self.metrics,
            &mut slot.statement,
            count,
        ) {
            Ok(bindings) => bindings,
            Err(e) => {
                self.discard_result(cursor);
                return Err(e);
            }
        };
        if bindings.columns.is_empty() {
            if let Some(e) = bindings.stopped_by {
                self.discard_result(cursor);
                return Err(e);
            }
        }
        if let Some(e) = &bindings.stopped_by {
            log::warn!(
                "Cursor {}: bound {} of {} columns ({})",
                cursor,
                bindings.columns.len(),
                count,
                e
            );
        }
        slot.columns = bindings.columns;
        slot.header_length = bindings.header_length;
        slot.state = CursorState::Described;
        Ok(slot.columns.len())
    }

    /// Closes the cursor and frees its statement. Unknown handles are
    /// ignored.
    pub fn close_cursor(&mut self, cursor: u32) -> Result<()> {
        let Some(mut slot) = self.cursors.release(cursor) else {
            return Ok(());
        };
        self.metrics.cursors_closed += 1;

        let result = self.driver.close_cursor(&mut slot.statement);
        if let Err(e) = self.reporter.check(
            &self.driver,
            DiagTarget::Statement(&slot.statement),
            result,
            &mut self.metrics,
        ) {
            log::debug!("Cursor {} close: {}", cursor, e);
        }
        let result = self.driver.free_statement(slot.statement);
        self.reporter
            .check(&self.driver, DiagTarget::Environment, result, &mut self.metrics)?;
        Ok(())
    }

    pub fn cursor_state(&self, cursor: u32) -> Result<CursorState> {
        Ok(self.cursors.get(cursor)?.state)
    }

    /// Fails when the cursor's connection was closed, even if its handle
    /// has since been reused.
    pub(crate) fn check_cursor_connection(&self, cursor: u32) -> Result<()> {
        let owner = self.cursors.get(cursor)?.connection;
        if self.connections.contains(owner) {
            Ok(())
        } else {
            Err(OdbcError::StaleConnection(owner.index))
        }
    }

    /// Closes whatever the last execute left open and drops its
    /// descriptors.
    fn discard_result(&mut self, cursor: u32) {
        let Ok(slot) = self.cursors.get_mut(cursor) else {
            return;
        };
        slot.clear_result();
        if !slot.executed {
            return;
        }
        slot.executed = false;
        let result = self.driver.close_cursor(&mut slot.statement);
        if let Err(e) = self.reporter.check(
            &self.driver,
            DiagTarget::Statement(&slot.statement),
            result,
            &mut self.metrics,
        ) {
            log::debug!("Cursor {} close: {}", cursor, e);
        }
    }
}
