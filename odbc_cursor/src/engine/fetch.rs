//! Row retrieval and marshaling of bound buffers into text rows.

use crate::driver::{ColumnBuffer, DiagTarget, FetchOrientation, NativeDriver};
use crate::engine::binding::ColumnDescriptor;
use crate::engine::environment::OdbcEnvironment;
use crate::engine::statement::CursorState;
use crate::error::{OdbcError, Result};
use serde::Serialize;

/// One fetched row, flat and per column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRow {
    text: String,
    fields: Vec<(String, Option<String>)>,
}

impl FetchedRow {
    /// Values joined by the field separator, NULL as an empty field.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// `(column name, value)` in column order, `None` for NULL.
    pub fn fields(&self) -> &[(String, Option<String>)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub width: usize,
    pub is_char: bool,
}

impl From<&ColumnDescriptor> for ColumnInfo {
    fn from(column: &ColumnDescriptor) -> Self {
        Self {
            name: column.name.clone(),
            width: column.width,
            is_char: column.is_char,
        }
    }
}

impl<D: NativeDriver> OdbcEnvironment<D> {
    /// Fetches the next row. `None` once the result set is exhausted, as
    /// many times as it is asked.
    pub fn fetch(&mut self, cursor: u32) -> Result<Option<FetchedRow>> {
        self.ensure_initialized()?;
        self.check_cursor_connection(cursor)?;
        let separator = self.config().field_separator;

        let slot = self.cursors.get_mut(cursor)?;
        if slot.state == CursorState::Allocated {
            return Err(OdbcError::NoResultSet(cursor));
        }
        let result = {
            let mut targets: Vec<&mut ColumnBuffer> =
                slot.columns.iter_mut().map(|c| &mut c.buffer).collect();
            self.driver.fetch(&mut slot.statement, &mut targets)
        };
        let fetched = self.reporter.check(
            &self.driver,
            DiagTarget::Statement(&slot.statement),
            result,
            &mut self.metrics,
        )?;
        slot.state = CursorState::Fetching;
        if fetched.is_none() {
            return Ok(None);
        }

        slot.row_length = slot.columns.iter().map(ColumnDescriptor::effective_len).sum();
        let row = marshal_row(&slot.columns, separator);
        slot.last_row = Some(row.clone());
        self.metrics.rows_fetched += 1;
        Ok(Some(row))
    }

    /// Repositions the cursor before its first row.
    pub fn rewind(&mut self, cursor: u32) -> Result<()> {
        self.ensure_initialized()?;
        self.check_cursor_connection(cursor)?;

        let slot = self.cursors.get_mut(cursor)?;
        if slot.state == CursorState::Allocated {
            return Err(OdbcError::NoResultSet(cursor));
        }
        for orientation in [FetchOrientation::First, FetchOrientation::Prior] {
            let result = {
                let mut targets: Vec<&mut ColumnBuffer> =
                    slot.columns.iter_mut().map(|c| &mut c.buffer).collect();
                self.driver
                    .fetch_scroll(&mut slot.statement, orientation, &mut targets)
            };
            self.reporter.check(
                &self.driver,
                DiagTarget::Statement(&slot.statement),
                result,
                &mut self.metrics,
            )?;
        }
        slot.state = CursorState::Fetching;
        slot.last_row = None;
        Ok(())
    }

    /// Column names joined by the field separator; empty when nothing is
    /// bound.
    pub fn get_column_headers(&self, cursor: u32) -> Result<String> {
        let slot = self.cursors.get(cursor)?;
        let mut headers = String::with_capacity(slot.header_length + slot.columns.len());
        for (i, column) in slot.columns.iter().enumerate() {
            if i > 0 {
                headers.push(self.field_separator());
            }
            headers.push_str(&column.name);
        }
        Ok(headers)
    }

    pub fn column_info(&self, cursor: u32) -> Result<Vec<ColumnInfo>> {
        let slot = self.cursors.get(cursor)?;
        Ok(slot.columns.iter().map(ColumnInfo::from).collect())
    }

    pub fn column_count(&self, cursor: u32) -> Result<usize> {
        Ok(self.cursors.get(cursor)?.columns.len())
    }

    /// Text of the most recently fetched row.
    pub fn last_row(&self, cursor: u32) -> Result<Option<&str>> {
        Ok(self.last_fetched(cursor)?.map(FetchedRow::text))
    }

    /// Most recently fetched row; cleared by rewind and re-execute.
    pub fn last_fetched(&self, cursor: u32) -> Result<Option<&FetchedRow>> {
        Ok(self.cursors.get(cursor)?.last_row.as_ref())
    }

    /// Byte length of the values in the most recently fetched row.
    pub fn row_length(&self, cursor: u32) -> Result<usize> {
        Ok(self.cursors.get(cursor)?.row_length)
    }
}

fn marshal_row(columns: &[ColumnDescriptor], separator: char) -> FetchedRow {
    let mut text = String::new();
    let mut fields = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            text.push(separator);
        }
        let value = column.value();
        if let Some(v) = &value {
            text.push_str(v);
        }
        fields.push((column.name.clone(), value));
    }
    FetchedRow { text, fields }
}
