//! Host-facing operations.
//!
//! [`OdbcExtension`] wraps an [`OdbcEnvironment`] and exposes the eight
//! script functions through a name/arity table. Every operation returns a
//! [`HostValue`]; failures are logged and turned into `-1`.

pub mod value;

pub use value::{handle_arg, number_arg, string_arg, HostArray, HostValue};

use crate::driver::NativeDriver;
use crate::engine::OdbcEnvironment;
use crate::error::{OdbcError, Result};

/// Name and arity of one exposed function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionEntry {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
}

const fn entry(name: &'static str, min_args: usize, max_args: usize) -> FunctionEntry {
    FunctionEntry {
        name,
        min_args,
        max_args,
    }
}

pub const FUNCTIONS: &[FunctionEntry] = &[
    entry("connect", 3, 3),
    entry("cursor", 1, 1),
    entry("execute", 2, 2),
    entry("get_column_headers", 1, 2),
    entry("fetch", 1, 2),
    entry("rewind", 1, 1),
    entry("close_cursor", 1, 1),
    entry("disconnect", 1, 1),
];

pub struct OdbcExtension<D: NativeDriver> {
    env: OdbcEnvironment<D>,
}

impl<D: NativeDriver> OdbcExtension<D> {
    pub fn new(env: OdbcEnvironment<D>) -> Self {
        Self { env }
    }

    pub fn functions(&self) -> &'static [FunctionEntry] {
        FUNCTIONS
    }

    pub fn environment(&self) -> &OdbcEnvironment<D> {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut OdbcEnvironment<D> {
        &mut self.env
    }

    pub fn into_environment(self) -> OdbcEnvironment<D> {
        self.env
    }

    /// Dispatches `name` with arity checking. Output arguments (the
    /// optional second argument of `get_column_headers` and `fetch`) are
    /// replaced in `args` only when the call succeeds.
    pub fn call(&mut self, name: &str, args: &mut [HostValue]) -> HostValue {
        let Some(function) = FUNCTIONS.iter().find(|f| f.name == name) else {
            log::error!("Unknown function {}()", name);
            return HostValue::FAILURE;
        };
        if args.len() < function.min_args || args.len() > function.max_args {
            log::error!(
                "{}() expects {} to {} arguments, {} given",
                name,
                function.min_args,
                function.max_args,
                args.len()
            );
            return HostValue::FAILURE;
        }

        let result = match function.name {
            "connect" => self.connect(args),
            "cursor" => self.cursor(args),
            "execute" => self.execute(args),
            "get_column_headers" => self.get_column_headers(args),
            "fetch" => self.fetch(args),
            "rewind" => self.rewind(args),
            "close_cursor" => self.close_cursor(args),
            "disconnect" => self.disconnect(args),
            other => Err(OdbcError::InternalError(format!("no handler for {}", other))),
        };
        match result {
            Ok(value) => value,
            Err(e) => {
                self.env.reporter.logger().log_error(name, &e.to_string());
                HostValue::FAILURE
            }
        }
    }

    /// `connect(connection_string, user, password)` → connection handle.
    pub fn connect(&mut self, args: &[HostValue]) -> Result<HostValue> {
        let server = string_arg(args, 0)?;
        let user = string_arg(args, 1)?;
        let password = zeroize::Zeroizing::new(string_arg(args, 2)?);
        let handle = self.env.connect(&server, &user, &password)?;
        Ok(handle.into())
    }

    /// `cursor(connection)` → cursor handle.
    pub fn cursor(&mut self, args: &[HostValue]) -> Result<HostValue> {
        let connection = handle_arg(args, 0)?;
        Ok(self.env.allocate_cursor(connection)?.into())
    }

    /// `execute(cursor, sql)` → number of result columns.
    pub fn execute(&mut self, args: &[HostValue]) -> Result<HostValue> {
        let cursor = handle_arg(args, 0)?;
        let sql = string_arg(args, 1)?;
        Ok(self.env.execute(cursor, &sql)?.into())
    }

    /// `get_column_headers(cursor)` → header string;
    /// `get_column_headers(cursor, out)` → column count, with `out`
    /// holding `nb_cols`, `col_names`, `col_widths` and `bis_char`.
    pub fn get_column_headers(&mut self, args: &mut [HostValue]) -> Result<HostValue> {
        let cursor = handle_arg(args, 0)?;
        let Some(out) = args.get_mut(1) else {
            return Ok(self.env.get_column_headers(cursor)?.into());
        };

        let columns = self.env.column_info(cursor)?;
        let mut info = HostArray::new();
        info.insert("nb_cols", columns.len());
        info.insert(
            "col_names",
            HostArray::from_list(columns.iter().map(|c| c.name.as_str())),
        );
        info.insert(
            "col_widths",
            HostArray::from_list(columns.iter().map(|c| c.width)),
        );
        info.insert(
            "bis_char",
            HostArray::from_list(columns.iter().map(|c| usize::from(c.is_char))),
        );
        *out = info.into();
        Ok(columns.len().into())
    }

    /// `fetch(cursor)` → row string, `""` at end of data;
    /// `fetch(cursor, out)` → same, with `out[0]` the column count and
    /// `out[i]` a single-entry `{name: value}` array.
    pub fn fetch(&mut self, args: &mut [HostValue]) -> Result<HostValue> {
        let cursor = handle_arg(args, 0)?;
        let row = self.env.fetch(cursor)?;

        if let Some(out) = args.get_mut(1) {
            let mut nested = HostArray::new();
            match &row {
                Some(row) => {
                    nested.insert("0", row.len());
                    for (i, (name, value)) in row.fields().iter().enumerate() {
                        let mut field = HostArray::new();
                        field.insert(name.as_str(), value.as_deref().unwrap_or(""));
                        nested.insert((i + 1).to_string(), field);
                    }
                }
                None => nested.insert("0", 0usize),
            }
            *out = nested.into();
        }
        Ok(row.map(|r| r.into_text()).unwrap_or_default().into())
    }

    /// `rewind(cursor)` → `1`.
    pub fn rewind(&mut self, args: &[HostValue]) -> Result<HostValue> {
        let cursor = handle_arg(args, 0)?;
        self.env.rewind(cursor)?;
        Ok(HostValue::Number(1.0))
    }

    /// `close_cursor(cursor)` → `0`. The handle is released even when the
    /// driver reports a failure, which is only logged.
    pub fn close_cursor(&mut self, args: &[HostValue]) -> Result<HostValue> {
        let cursor = handle_arg(args, 0)?;
        if let Err(e) = self.env.close_cursor(cursor) {
            self.env
                .reporter
                .logger()
                .log_error("close_cursor", &e.to_string());
        }
        Ok(HostValue::Number(0.0))
    }

    /// `disconnect(connection)` → `0`, logging driver failures like
    /// `close_cursor`.
    pub fn disconnect(&mut self, args: &[HostValue]) -> Result<HostValue> {
        let connection = handle_arg(args, 0)?;
        if let Err(e) = self.env.disconnect(connection) {
            self.env
                .reporter
                .logger()
                .log_error("disconnect", &e.to_string());
        }
        Ok(HostValue::Number(0.0))
    }
}
