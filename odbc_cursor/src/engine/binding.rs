use crate::driver::{sql_type, ColumnAttribute, ColumnBuffer, DiagTarget, NativeDriver};
use crate::engine::diagnostics::DiagnosticsReporter;
use crate::error::{OdbcError, Result};
use crate::observability::EngineMetrics;

/// One bound result column.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Wider of the data display size and the name length.
    pub width: usize,
    pub display_size: usize,
    pub concise_type: i16,
    pub is_char: bool,
    pub buffer: ColumnBuffer,
}

impl ColumnDescriptor {
    /// Text of the last fetched value, `None` for NULL.
    pub fn value(&self) -> Option<String> {
        self.buffer.text()
    }

    pub fn effective_len(&self) -> usize {
        self.buffer.effective_len()
    }
}

/// Descriptors bound so far, and the error that stopped binding early.
pub struct Bindings {
    pub columns: Vec<ColumnDescriptor>,
    pub header_length: usize,
    pub stopped_by: Option<OdbcError>,
}

/// Describes and binds columns `1..=count` in order.
///
/// A failing attribute query or bind stops at that column and keeps the
/// descriptors already built. Buffer allocation failure is returned as an
/// error instead.
pub fn allocate_bindings<D: NativeDriver>(
    driver: &mut D,
    reporter: &DiagnosticsReporter,
    metrics: &mut EngineMetrics,
    stmt: &mut D::Statement,
    count: u16,
) -> Result<Bindings> {
    let mut bindings = Bindings {
        columns: Vec::new(),
        header_length: 0,
        stopped_by: None,
    };
    bindings
        .columns
        .try_reserve_exact(usize::from(count))
        .map_err(|_| OdbcError::ResourceExhausted(format!("{} column descriptors", count)))?;

    for column in 1..=count {
        match bind_column(driver, reporter, metrics, stmt, column) {
            Ok(descriptor) => {
                bindings.header_length += descriptor.name.chars().count();
                bindings.columns.push(descriptor);
            }
            Err(e @ OdbcError::ResourceExhausted(_)) => return Err(e),
            Err(e) => {
                log::debug!("Binding stopped at column {}: {}", column, e);
                bindings.stopped_by = Some(e);
                break;
            }
        }
    }
    Ok(bindings)
}

fn bind_column<D: NativeDriver>(
    driver: &mut D,
    reporter: &DiagnosticsReporter,
    metrics: &mut EngineMetrics,
    stmt: &mut D::Statement,
    column: u16,
) -> Result<ColumnDescriptor> {
    let display = attribute(driver, reporter, metrics, stmt, column, ColumnAttribute::DisplaySize)?;
    let display_size = usize::try_from(display).unwrap_or(0);
    let concise = attribute(driver, reporter, metrics, stmt, column, ColumnAttribute::ConciseType)?;
    let concise_type = i16::try_from(concise).unwrap_or(0);

    let chars = display_size.checked_add(1).ok_or_else(|| {
        OdbcError::ResourceExhausted(format!("display size {} of column {}", display_size, column))
    })?;
    let buffer = ColumnBuffer::with_capacity(chars).ok_or_else(|| {
        OdbcError::ResourceExhausted(format!(
            "could not allocate {} characters for column {}",
            chars, column
        ))
    })?;

    let result = driver.bind_col(stmt, column, buffer.capacity_bytes());
    reporter.check(&*driver, DiagTarget::Statement(&*stmt), result, metrics)?;

    let result = driver.col_name(stmt, column);
    let name = reporter
        .check(&*driver, DiagTarget::Statement(&*stmt), result, metrics)?
        .unwrap_or_default();

    let width = display_size.max(name.chars().count());
    Ok(ColumnDescriptor {
        name,
        width,
        display_size,
        concise_type,
        is_char: sql_type::is_character(concise_type),
        buffer,
    })
}

fn attribute<D: NativeDriver>(
    driver: &mut D,
    reporter: &DiagnosticsReporter,
    metrics: &mut EngineMetrics,
    stmt: &mut D::Statement,
    column: u16,
    which: ColumnAttribute,
) -> Result<isize> {
    let result = driver.col_attribute(stmt, column, which);
    reporter
        .check(&*driver, DiagTarget::Statement(&*stmt), result, metrics)?
        .ok_or(OdbcError::Driver {
            function: "SQLColAttribute",
        })
}
