// Allow FFI functions to dereference raw pointers without being marked unsafe
// This is expected and safe for extern "C" FFI boundaries
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use crate::config::EngineConfig;
use crate::driver::OdbcDriver;
use crate::engine::OdbcEnvironment;
use crate::error::{OdbcError, Result, StructuredError};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint};
use std::sync::{Mutex, MutexGuard};

/// Returned by `odbc_fetch`/`odbc_last_row` when there is no row.
pub const ODBC_NO_ROW: c_int = 1;
/// Returned when the output buffer cannot hold the value; `out_written`
/// then carries the size needed.
pub const ODBC_BUFFER_TOO_SMALL: c_int = -2;

struct FfiState {
    env: Option<OdbcEnvironment<OdbcDriver>>,
    last_error: Option<String>,
    last_structured_error: Option<StructuredError>,
}

impl FfiState {
    fn new() -> Self {
        Self {
            env: None,
            last_error: None,
            last_structured_error: None,
        }
    }

    fn record_error(&mut self, operation: &str, error: &OdbcError) {
        log::error!("{} failed: {}", operation, error);
        self.last_error = Some(error.to_string());
        self.last_structured_error = match error {
            OdbcError::Structured { .. } => Some(error.to_structured()),
            _ => None,
        };
    }
}

lazy_static::lazy_static! {
    static ref STATE: Mutex<FfiState> = Mutex::new(FfiState::new());
}

/// Helper to safely lock the global state.
/// Returns None if the mutex is poisoned, avoiding panic in FFI.
fn try_lock_state() -> Option<MutexGuard<'static, FfiState>> {
    STATE.lock().ok()
}

/// Runs `f` against the initialized environment. Errors are recorded for
/// `odbc_get_error` and come back as `-1`.
fn with_env<T>(
    operation: &str,
    f: impl FnOnce(&mut OdbcEnvironment<OdbcDriver>) -> Result<T>,
) -> std::result::Result<T, c_int> {
    let Some(mut state) = try_lock_state() else {
        return Err(-1);
    };
    let result = match state.env.as_mut() {
        Some(env) => f(env),
        None => Err(OdbcError::EnvironmentNotInitialized),
    };
    result.map_err(|e| {
        state.record_error(operation, &e);
        -1
    })
}

fn record_error(operation: &str, error: OdbcError) -> c_int {
    if let Some(mut state) = try_lock_state() {
        state.record_error(operation, &error);
    }
    -1
}

fn handle_to_c(handle: u32) -> c_int {
    c_int::try_from(handle).unwrap_or(-1)
}

/// Reads a NUL-terminated UTF-8 argument. Null pointers read as `None`.
fn read_str<'a>(ptr: *const c_char, name: &str) -> Result<Option<&'a str>> {
    if ptr.is_null() {
        return Ok(None);
    }
    // Safety: non-null `ptr` must be a valid NUL-terminated string that
    // outlives this call
    let c_str = unsafe { CStr::from_ptr(ptr) };
    c_str
        .to_str()
        .map(Some)
        .map_err(|_| OdbcError::ValidationError(format!("{} is not valid UTF-8", name)))
}

fn required_str<'a>(ptr: *const c_char, name: &str) -> Result<&'a str> {
    read_str(ptr, name)?.ok_or_else(|| OdbcError::ValidationError(format!("{} is null", name)))
}

/// Copies `data` into the caller's buffer, NUL-terminated when `text`.
fn write_out(
    data: &[u8],
    text: bool,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    if buffer.is_null() || out_written.is_null() {
        return -1;
    }
    let needed = data.len() + usize::from(text);
    // Safety: `out_written` is non-null and must be valid for a c_uint write
    unsafe {
        if needed > buffer_len as usize {
            *out_written = c_uint::try_from(needed).unwrap_or(c_uint::MAX);
            return ODBC_BUFFER_TOO_SMALL;
        }
        // Safety: `buffer` must be valid for writes of `buffer_len` bytes
        std::ptr::copy_nonoverlapping(data.as_ptr(), buffer, data.len());
        if text {
            *buffer.add(data.len()) = 0;
        }
        *out_written = data.len() as c_uint;
    }
    0
}

/// Initialize the process-wide environment from `ODBC_*` variables.
/// Idempotent. Returns: 0 on success, -1 on failure
#[no_mangle]
pub extern "C" fn odbc_init() -> c_int {
    let Some(mut state) = try_lock_state() else {
        return -1;
    };
    if state.env.is_some() {
        return 0;
    }
    let config = EngineConfig::from_env();
    let driver = OdbcDriver::new().with_result_limit(config.max_result_bytes);
    match OdbcEnvironment::new(driver, config) {
        Ok(env) => {
            state.env = Some(env);
            0
        }
        Err(e) => {
            state.record_error("odbc_init", &e);
            -1
        }
    }
}

/// Close every cursor and connection and start over with a fresh native
/// environment. Returns: 0 on success, -1 on failure
#[no_mangle]
pub extern "C" fn odbc_reinit() -> c_int {
    match with_env("odbc_reinit", |env| env.reinit()) {
        Ok(()) => 0,
        Err(code) => code,
    }
}

/// Toggle diagnostic output. Returns: 0 on success, -1 if not initialized
#[no_mangle]
pub extern "C" fn odbc_set_debug(enabled: c_int) -> c_int {
    match with_env("odbc_set_debug", |env| {
        env.set_debug(enabled != 0);
        Ok(())
    }) {
        Ok(()) => 0,
        Err(code) => code,
    }
}

/// Connect to a data source.
/// conn_str: DSN or full connection string; user/password may be null
/// Returns: connection handle (>= 0) on success, -1 on failure
#[no_mangle]
pub extern "C" fn odbc_connect(
    conn_str: *const c_char,
    user: *const c_char,
    password: *const c_char,
) -> c_int {
    let args = required_str(conn_str, "conn_str").and_then(|server| {
        let user = read_str(user, "user")?.unwrap_or("");
        let password = read_str(password, "password")?.unwrap_or("");
        Ok((server, user, password))
    });
    let (server, user, password) = match args {
        Ok(args) => args,
        Err(e) => return record_error("odbc_connect", e),
    };
    match with_env("odbc_connect", |env| env.connect(server, user, password)) {
        Ok(handle) => handle_to_c(handle),
        Err(code) => code,
    }
}

/// Allocate a cursor on a connection.
/// Returns: cursor handle (>= 0) on success, -1 on failure
#[no_mangle]
pub extern "C" fn odbc_cursor(conn_id: c_uint) -> c_int {
    match with_env("odbc_cursor", |env| env.allocate_cursor(conn_id)) {
        Ok(handle) => handle_to_c(handle),
        Err(code) => code,
    }
}

/// Execute SQL text on a cursor.
/// Returns: number of bound result columns (0 for statements without a
/// result set), -1 on failure
#[no_mangle]
pub extern "C" fn odbc_execute(cursor_id: c_uint, sql: *const c_char) -> c_int {
    let sql = match required_str(sql, "sql") {
        Ok(sql) => sql,
        Err(e) => return record_error("odbc_execute", e),
    };
    match with_env("odbc_execute", |env| env.execute(cursor_id, sql)) {
        Ok(count) => c_int::try_from(count).unwrap_or(c_int::MAX),
        Err(code) => code,
    }
}

/// Column names joined by the field separator, NUL-terminated.
/// Returns: 0 on success, -1 on error, -2 if buffer too small
#[no_mangle]
pub extern "C" fn odbc_get_column_headers(
    cursor_id: c_uint,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    match with_env("odbc_get_column_headers", |env| {
        env.get_column_headers(cursor_id)
    }) {
        Ok(headers) => write_out(headers.as_bytes(), true, buffer, buffer_len, out_written),
        Err(code) => code,
    }
}

/// Column metadata as a JSON array of `{name, width, is_char}`.
/// Returns: 0 on success, -1 on error, -2 if buffer too small
#[no_mangle]
pub extern "C" fn odbc_get_column_headers_json(
    cursor_id: c_uint,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    match with_env("odbc_get_column_headers_json", |env| {
        let columns = env.column_info(cursor_id)?;
        serde_json::to_vec(&columns).map_err(|e| OdbcError::InternalError(e.to_string()))
    }) {
        Ok(json) => write_out(&json, true, buffer, buffer_len, out_written),
        Err(code) => code,
    }
}

/// Fetch the next row as separator-joined text.
/// Returns: 0 when a row was written, 1 at end of data, -1 on error,
/// -2 if buffer too small (the row stays available via `odbc_last_row`)
#[no_mangle]
pub extern "C" fn odbc_fetch(
    cursor_id: c_uint,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    if buffer.is_null() || out_written.is_null() {
        return -1;
    }
    match with_env("odbc_fetch", |env| env.fetch(cursor_id)) {
        Ok(Some(row)) => write_out(row.text().as_bytes(), true, buffer, buffer_len, out_written),
        Ok(None) => {
            // Safety: `out_written` checked non-null above
            unsafe { *out_written = 0 };
            ODBC_NO_ROW
        }
        Err(code) => code,
    }
}

/// `{"nb_cols": n, "fields": [{name: value}]}` with `null` for NULL values.
fn row_json(fields: &[(String, Option<String>)]) -> Result<Vec<u8>> {
    let fields: Vec<serde_json::Value> = fields
        .iter()
        .map(|(name, value)| {
            let mut field = serde_json::Map::new();
            field.insert(name.clone(), serde_json::json!(value));
            serde_json::Value::Object(field)
        })
        .collect();
    let json = serde_json::json!({ "nb_cols": fields.len(), "fields": fields });
    serde_json::to_vec(&json).map_err(|e| OdbcError::InternalError(e.to_string()))
}

/// Fetch the next row as JSON (see `row_json`).
/// Returns: 0 when a row was written, 1 at end of data, -1 on error,
/// -2 if buffer too small (the row stays available via `odbc_last_row_json`)
#[no_mangle]
pub extern "C" fn odbc_fetch_json(
    cursor_id: c_uint,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    if buffer.is_null() || out_written.is_null() {
        return -1;
    }
    let fetched = with_env("odbc_fetch_json", |env| {
        env.fetch(cursor_id)?
            .map(|row| row_json(row.fields()))
            .transpose()
    });
    match fetched {
        Ok(Some(json)) => write_out(&json, true, buffer, buffer_len, out_written),
        Ok(None) => {
            // Safety: `out_written` checked non-null above
            unsafe { *out_written = 0 };
            ODBC_NO_ROW
        }
        Err(code) => code,
    }
}

/// Most recently fetched row as JSON, in the `odbc_fetch_json` layout.
/// Returns: 0 on success, 1 if nothing was fetched yet, -1 on error,
/// -2 if buffer too small
#[no_mangle]
pub extern "C" fn odbc_last_row_json(
    cursor_id: c_uint,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    if buffer.is_null() || out_written.is_null() {
        return -1;
    }
    let last = with_env("odbc_last_row_json", |env| {
        env.last_fetched(cursor_id)?
            .map(|row| row_json(row.fields()))
            .transpose()
    });
    match last {
        Ok(Some(json)) => write_out(&json, true, buffer, buffer_len, out_written),
        Ok(None) => {
            // Safety: `out_written` checked non-null above
            unsafe { *out_written = 0 };
            ODBC_NO_ROW
        }
        Err(code) => code,
    }
}

/// Text of the most recently fetched row.
/// Returns: 0 on success, 1 if nothing was fetched yet, -1 on error,
/// -2 if buffer too small
#[no_mangle]
pub extern "C" fn odbc_last_row(
    cursor_id: c_uint,
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    if buffer.is_null() || out_written.is_null() {
        return -1;
    }
    match with_env("odbc_last_row", |env| {
        Ok(env.last_row(cursor_id)?.map(str::to_string))
    }) {
        Ok(Some(row)) => write_out(row.as_bytes(), true, buffer, buffer_len, out_written),
        Ok(None) => {
            // Safety: `out_written` checked non-null above
            unsafe { *out_written = 0 };
            ODBC_NO_ROW
        }
        Err(code) => code,
    }
}

/// Reposition before the first row.
/// Returns: 0 on success, -1 on failure
#[no_mangle]
pub extern "C" fn odbc_rewind(cursor_id: c_uint) -> c_int {
    match with_env("odbc_rewind", |env| env.rewind(cursor_id)) {
        Ok(()) => 0,
        Err(code) => code,
    }
}

/// Close a cursor. Unknown handles are ignored.
/// Returns: 0 on success, -1 on failure
#[no_mangle]
pub extern "C" fn odbc_close_cursor(cursor_id: c_uint) -> c_int {
    match with_env("odbc_close_cursor", |env| env.close_cursor(cursor_id)) {
        Ok(()) => 0,
        Err(code) => code,
    }
}

/// Close a connection. Unknown handles are ignored.
/// Returns: 0 on success, -1 on failure
#[no_mangle]
pub extern "C" fn odbc_disconnect(conn_id: c_uint) -> c_int {
    match with_env("odbc_disconnect", |env| env.disconnect(conn_id)) {
        Ok(()) => 0,
        Err(code) => code,
    }
}

/// Copy the last error message, truncated to fit and NUL-terminated.
/// Returns: bytes copied (without the terminator), -1 on error
#[no_mangle]
pub extern "C" fn odbc_get_error(buffer: *mut c_char, buffer_len: c_uint) -> c_int {
    if buffer.is_null() || buffer_len == 0 {
        return -1;
    }

    let Some(state) = try_lock_state() else {
        return -1;
    };

    let error_msg = state
        .last_error
        .clone()
        .unwrap_or_else(|| "No error".to_string());
    let msg_bytes = error_msg.as_bytes();
    let copy_len = (msg_bytes.len() as c_uint).min(buffer_len - 1);

    // Safety: `buffer` must be valid for writes of `copy_len + 1` bytes
    // Caller ensures buffer is large enough (buffer_len > 0 verified above)
    unsafe {
        std::ptr::copy_nonoverlapping(msg_bytes.as_ptr(), buffer as *mut u8, copy_len as usize);
        *buffer.add(copy_len as usize) = 0;
    }

    copy_len as c_int
}

/// Get last structured error
/// buffer: output buffer for serialized error
/// buffer_len: buffer size in bytes
/// out_written: actual bytes written
/// Returns: 0 on success, -1 on error, -2 if buffer too small
#[no_mangle]
pub extern "C" fn odbc_get_structured_error(
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    let Some(state) = try_lock_state() else {
        return -1;
    };

    let error_data = match &state.last_structured_error {
        Some(err) => err.serialize(),
        None => StructuredError {
            sqlstate: [0u8; 5],
            native_code: 0,
            message: state
                .last_error
                .clone()
                .unwrap_or_else(|| "No error".to_string()),
        }
        .serialize(),
    };
    write_out(&error_data, false, buffer, buffer_len, out_written)
}

/// Engine counters as JSON.
/// Returns: 0 on success, -1 on error, -2 if buffer too small
#[no_mangle]
pub extern "C" fn odbc_get_metrics_json(
    buffer: *mut u8,
    buffer_len: c_uint,
    out_written: *mut c_uint,
) -> c_int {
    match with_env("odbc_get_metrics_json", |env| {
        serde_json::to_vec(&env.metrics()).map_err(|e| OdbcError::InternalError(e.to_string()))
    }) {
        Ok(json) => write_out(&json, true, buffer, buffer_len, out_written),
        Err(code) => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::ffi::CString;

    /// Helper to get error message after FFI call fails
    fn get_last_error() -> String {
        let mut buffer = vec![0u8; 1024];
        let result = odbc_get_error(buffer.as_mut_ptr() as *mut c_char, buffer.len() as c_uint);

        if result < 0 {
            return "Failed to get error".to_string();
        }

        let len = result as usize;
        String::from_utf8_lossy(&buffer[..len]).to_string()
    }

    #[test]
    #[serial]
    fn test_ffi_init() {
        assert_eq!(odbc_init(), 0, "odbc_init should succeed");
        assert_eq!(odbc_init(), 0, "odbc_init should be idempotent");
    }

    #[test]
    #[serial]
    fn test_ffi_connect_empty_string() {
        odbc_init();
        let empty = CString::new("").unwrap();
        assert_eq!(
            odbc_connect(empty.as_ptr(), std::ptr::null(), std::ptr::null()),
            -1
        );
        assert_eq!(get_last_error(), "Connection string is empty");
    }

    #[test]
    #[serial]
    fn test_ffi_connect_null_pointer() {
        odbc_init();
        let result = odbc_connect(std::ptr::null(), std::ptr::null(), std::ptr::null());
        assert_eq!(result, -1);
        assert!(get_last_error().contains("conn_str is null"));
    }

    #[test]
    #[serial]
    fn test_ffi_cursor_invalid_connection() {
        odbc_init();
        assert_eq!(odbc_cursor(4242), -1);
        assert_eq!(get_last_error(), "Invalid connection handle: 4242");
    }

    #[test]
    #[serial]
    fn test_ffi_execute_invalid_cursor() {
        odbc_init();
        let sql = CString::new("SELECT 1").unwrap();
        assert_eq!(odbc_execute(4242, sql.as_ptr()), -1);
        assert_eq!(odbc_execute(0, std::ptr::null()), -1);
    }

    #[test]
    #[serial]
    fn test_ffi_close_unknown_handles_is_noop() {
        odbc_init();
        assert_eq!(odbc_close_cursor(4242), 0);
        assert_eq!(odbc_disconnect(4242), 0);
    }

    #[test]
    fn test_row_json_layout() {
        let fields = vec![
            ("id".to_string(), Some("2".to_string())),
            ("name".to_string(), None),
        ];
        let json: serde_json::Value = serde_json::from_slice(&row_json(&fields).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "nb_cols": 2, "fields": [{ "id": "2" }, { "name": null }] })
        );
    }

    #[test]
    #[serial]
    fn test_ffi_last_row_json_unknown_cursor() {
        odbc_init();
        let mut buffer = vec![0u8; 64];
        let mut written: c_uint = 0;
        assert_eq!(
            odbc_last_row_json(4242, buffer.as_mut_ptr(), buffer.len() as c_uint, &mut written),
            -1
        );
        assert_eq!(get_last_error(), "Invalid cursor handle: 4242");
        assert_eq!(odbc_last_row_json(0, std::ptr::null_mut(), 16, &mut written), -1);
    }

    #[test]
    #[serial]
    fn test_ffi_fetch_null_buffer() {
        odbc_init();
        let mut written: c_uint = 0;
        assert_eq!(odbc_fetch(0, std::ptr::null_mut(), 16, &mut written), -1);
        assert_eq!(odbc_fetch_json(0, std::ptr::null_mut(), 16, &mut written), -1);
    }

    #[test]
    #[serial]
    fn test_ffi_get_error_truncates() {
        odbc_init();
        let _ = odbc_cursor(4242);
        let mut buffer = vec![0u8; 8];
        let result = odbc_get_error(buffer.as_mut_ptr() as *mut c_char, buffer.len() as c_uint);
        assert_eq!(result, 7);
        assert_eq!(&buffer[..8], b"Invalid\0");
    }

    #[test]
    fn test_ffi_get_error_null_buffer() {
        assert_eq!(odbc_get_error(std::ptr::null_mut(), 100), -1);
        let mut buffer = vec![0u8; 10];
        assert_eq!(
            odbc_get_error(buffer.as_mut_ptr() as *mut c_char, 0),
            -1,
            "Zero-length buffer should return -1"
        );
    }

    #[test]
    #[serial]
    fn test_ffi_structured_error_without_sqlstate() {
        odbc_init();
        let _ = odbc_cursor(4242);
        let mut buffer = vec![0u8; 256];
        let mut written: c_uint = 0;
        let result =
            odbc_get_structured_error(buffer.as_mut_ptr(), buffer.len() as c_uint, &mut written);
        assert_eq!(result, 0);
        let error = StructuredError::deserialize(&buffer[..written as usize]).unwrap();
        assert_eq!(error.sqlstate, [0u8; 5]);
        assert_eq!(error.message, "Invalid connection handle: 4242");

        let mut small = vec![0u8; 4];
        let result =
            odbc_get_structured_error(small.as_mut_ptr(), small.len() as c_uint, &mut written);
        assert_eq!(result, ODBC_BUFFER_TOO_SMALL);
        assert_eq!(written as usize, 13 + error.message.len());
    }

    #[test]
    #[serial]
    fn test_ffi_metrics_json() {
        odbc_init();
        let mut buffer = vec![0u8; 1024];
        let mut written: c_uint = 0;
        let result = odbc_get_metrics_json(buffer.as_mut_ptr(), buffer.len() as c_uint, &mut written);
        assert_eq!(result, 0);
        let json: serde_json::Value =
            serde_json::from_slice(&buffer[..written as usize]).unwrap();
        assert!(json.get("connections_opened").is_some());
        assert!(json.get("rows_fetched").is_some());
    }

    #[test]
    #[serial]
    fn test_ffi_set_debug_and_reinit() {
        odbc_init();
        assert_eq!(odbc_set_debug(1), 0);
        assert_eq!(odbc_reinit(), 0);
        assert_eq!(odbc_set_debug(0), 0);
    }
}
