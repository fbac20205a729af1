//! Materialized result sets with scrollable positioning.
//!
//! Both drivers hold a result set fully in memory once it is produced;
//! [`OpenResult`] tracks the cursor position over it and copies the
//! current row into bound column buffers.

use super::{ColumnBuffer, DiagRecord, FetchOrientation};

/// Column metadata of a materialized result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    pub name: String,
    pub concise_type: i16,
    pub display_size: usize,
}

impl ResultColumn {
    pub fn new(name: &str, concise_type: i16, display_size: usize) -> Self {
        Self {
            name: name.to_string(),
            concise_type,
            display_size,
        }
    }

    pub fn varchar(name: &str, display_size: usize) -> Self {
        Self::new(name, super::sql_type::VARCHAR, display_size)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, super::sql_type::INTEGER, 11)
    }
}

/// Width of `value` in UTF-16 code units, the unit bound buffers are
/// sized in.
pub fn display_width(value: &str) -> usize {
    value.encode_utf16().count()
}

/// Columns plus rows of text values, `None` standing for NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultTable {
    pub fn new(columns: Vec<ResultColumn>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Widens every column to its longest value so each value fits the
    /// buffer bound from the display size.
    pub fn widen_to_values(&mut self) {
        for (index, column) in self.columns.iter_mut().enumerate() {
            let widest = self
                .rows
                .iter()
                .filter_map(|row| row.get(index)?.as_deref())
                .map(display_width)
                .max()
                .unwrap_or(0);
            column.display_size = column.display_size.max(widest).max(1);
        }
    }

    /// Appends a row; missing trailing cells are NULL.
    pub fn row(mut self, values: &[Option<&str>]) -> Self {
        let mut row: Vec<Option<String>> = values.iter().map(|v| v.map(str::to_string)).collect();
        row.resize(self.columns.len(), None);
        self.rows.push(row);
        self
    }
}

/// Running byte count of buffered values against a cap.
#[derive(Debug, Clone, Copy)]
pub struct ResultBudget {
    limit: usize,
    used: usize,
}

impl ResultBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Charges one row; `false` once the running total passes the cap.
    pub fn charge(&mut self, row: &[Option<String>]) -> bool {
        let bytes: usize = row.iter().flatten().map(String::len).sum();
        self.used = self.used.saturating_add(bytes);
        self.used <= self.limit
    }

    /// `HY001` record reported when a result set does not fit.
    pub fn exceeded(&self) -> DiagRecord {
        DiagRecord::new(
            b"HY001",
            0,
            format!("Result set exceeds {} bytes", self.limit),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeStart,
    Row(usize),
    AfterEnd,
}

/// Result set currently open on a statement.
#[derive(Debug, Clone)]
pub struct OpenResult {
    table: ResultTable,
    position: Position,
}

impl OpenResult {
    pub fn new(table: ResultTable) -> Self {
        Self {
            table,
            position: Position::BeforeStart,
        }
    }

    pub fn column_count(&self) -> usize {
        self.table.columns.len()
    }

    /// 1-based column lookup.
    pub fn column(&self, column: u16) -> Option<&ResultColumn> {
        let index = usize::from(column).checked_sub(1)?;
        self.table.columns.get(index)
    }

    /// Moves the cursor; returns `false` when it ends up outside the rows.
    pub fn advance(&mut self, orientation: FetchOrientation) -> bool {
        let len = self.table.rows.len() as isize;
        let current = match self.position {
            Position::BeforeStart => -1,
            Position::Row(i) => i as isize,
            Position::AfterEnd => len,
        };
        let target = match orientation {
            FetchOrientation::Next => (current + 1).min(len),
            FetchOrientation::First => 0,
            FetchOrientation::Last => len - 1,
            FetchOrientation::Prior => (current - 1).max(-1),
            FetchOrientation::Absolute(n) if n > 0 => n - 1,
            FetchOrientation::Absolute(n) if n < 0 => len + n,
            FetchOrientation::Absolute(_) => -1,
            FetchOrientation::Relative(n) => current + n,
        };
        self.position = if target < 0 {
            Position::BeforeStart
        } else if target >= len {
            Position::AfterEnd
        } else {
            Position::Row(target as usize)
        };
        matches!(self.position, Position::Row(_))
    }

    /// Copies the current row into `targets`, one buffer per column in
    /// order. Returns `true` if any value was truncated.
    pub fn write_current(&self, targets: &mut [&mut ColumnBuffer]) -> bool {
        let Position::Row(index) = self.position else {
            return false;
        };
        let Some(row) = self.table.rows.get(index) else {
            return false;
        };
        let mut truncated = false;
        for (target, value) in targets.iter_mut().zip(row.iter()) {
            match value {
                Some(text) => truncated |= target.write_text(text),
                None => target.set_null(),
            }
        }
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_rows() -> OpenResult {
        OpenResult::new(
            ResultTable::new(vec![ResultColumn::integer("n")])
                .row(&[Some("1")])
                .row(&[Some("2")]),
        )
    }

    #[test]
    fn test_next_stops_after_end() {
        let mut result = two_rows();
        assert!(result.advance(FetchOrientation::Next));
        assert!(result.advance(FetchOrientation::Next));
        assert!(!result.advance(FetchOrientation::Next));
        assert!(!result.advance(FetchOrientation::Next));
        assert!(result.advance(FetchOrientation::Prior));
    }

    #[test]
    fn test_first_then_prior_rewinds() {
        let mut result = two_rows();
        result.advance(FetchOrientation::Last);
        assert!(result.advance(FetchOrientation::First));
        assert!(!result.advance(FetchOrientation::Prior));

        let mut buf = ColumnBuffer::with_capacity(4).unwrap();
        assert!(result.advance(FetchOrientation::Next));
        result.write_current(&mut [&mut buf]);
        assert_eq!(buf.text().as_deref(), Some("1"));
    }

    #[test]
    fn test_empty_result() {
        let mut result = OpenResult::new(ResultTable::new(vec![ResultColumn::integer("n")]));
        assert!(!result.advance(FetchOrientation::First));
        assert!(!result.advance(FetchOrientation::Next));
        assert_eq!(result.column_count(), 1);
        assert!(result.column(0).is_none());
        assert_eq!(result.column(1).map(|c| c.name.as_str()), Some("n"));
    }

    #[test]
    fn test_budget_stops_past_limit() {
        let mut budget = ResultBudget::new(6);
        assert!(budget.charge(&[Some("abc".to_string()), None]));
        assert!(budget.charge(&[Some("def".to_string())]));
        assert!(!budget.charge(&[Some("g".to_string())]));
        assert_eq!(&budget.exceeded().state, b"HY001");
    }

    #[test]
    fn test_widen_counts_utf16_units() {
        assert_eq!(display_width("a\u{1F600}"), 3);
        let mut table = ResultTable::new(vec![
            ResultColumn::new("s", super::super::sql_type::WVARCHAR, 0),
            ResultColumn::varchar("fixed", 10),
        ])
        .row(&[Some("a\u{1F600}"), Some("x")])
        .row(&[None, None]);
        table.widen_to_values();
        assert_eq!(table.columns[0].display_size, 3);
        assert_eq!(table.columns[1].display_size, 10);

        let mut result = OpenResult::new(table);
        result.advance(FetchOrientation::Next);
        let mut s = ColumnBuffer::with_capacity(4).unwrap();
        let mut fixed = ColumnBuffer::with_capacity(11).unwrap();
        assert!(!result.write_current(&mut [&mut s, &mut fixed]));
        assert_eq!(s.text().as_deref(), Some("a\u{1F600}"));
    }

    #[test]
    fn test_write_current_nulls_and_truncation() {
        let mut result = OpenResult::new(
            ResultTable::new(vec![
                ResultColumn::varchar("a", 10),
                ResultColumn::varchar("b", 10),
            ])
            .row(&[Some("abcdef")]),
        );
        result.advance(FetchOrientation::Next);
        let mut a = ColumnBuffer::with_capacity(4).unwrap();
        let mut b = ColumnBuffer::with_capacity(4).unwrap();
        b.write_text("old");
        assert!(result.write_current(&mut [&mut a, &mut b]));
        assert_eq!(a.text().as_deref(), Some("abc"));
        assert!(b.is_null());
    }
}
