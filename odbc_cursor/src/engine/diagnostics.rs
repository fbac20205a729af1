//! Draining and rendering of native diagnostic records.

use crate::driver::{
    DiagRecord, DiagTarget, NativeDriver, SqlResult, SqlStatus, SQLSTATE_TRUNCATED,
};
use crate::error::{OdbcError, Result};
use crate::observability::{EngineMetrics, StructuredLogger};

const INVALID_HANDLE_MESSAGE: &str = "Invalid handle!";

pub struct DiagnosticsReporter {
    logger: StructuredLogger,
    message_buffer_len: usize,
}

impl DiagnosticsReporter {
    pub fn new(debug: bool, message_buffer_len: usize) -> Self {
        Self {
            logger: StructuredLogger::new(debug),
            message_buffer_len,
        }
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.logger.set_debug(debug);
    }

    pub fn debug_enabled(&self) -> bool {
        self.logger.debug_enabled()
    }

    /// Reports every pending record of `target` after a call returned
    /// `status`, skipping truncation notices. Returns what was reported.
    pub fn report<D: NativeDriver>(
        &self,
        driver: &D,
        target: DiagTarget<'_, D>,
        status: SqlStatus,
    ) -> Vec<DiagRecord> {
        match status {
            SqlStatus::InvalidHandle => {
                self.logger.diagnostic(INVALID_HANDLE_MESSAGE);
                return Vec::new();
            }
            SqlStatus::Other(code) => {
                self.logger
                    .diagnostic(&OdbcError::UnexpectedReturn(code).to_string());
            }
            _ => {}
        }

        let mut records = Vec::new();
        let mut rec_number: i16 = 1;
        while let Some(mut record) =
            driver.diag_record(target, rec_number, self.message_buffer_len)
        {
            if record.state != SQLSTATE_TRUNCATED {
                if record.text_length > self.message_buffer_len {
                    if let Some(full) =
                        driver.diag_record(target, rec_number, record.text_length + 1)
                    {
                        record = full;
                    }
                }
                self.logger.diagnostic(&render(&record));
                records.push(record);
            }
            rec_number = match rec_number.checked_add(1) {
                Some(n) => n,
                None => break,
            };
        }
        records
    }

    /// Turns a native result into `Ok(Some(value))`, `Ok(None)` for no
    /// data, or the error built from the reported diagnostics. Warnings are
    /// reported and pass through as success.
    pub fn check<D: NativeDriver, T>(
        &self,
        driver: &D,
        target: DiagTarget<'_, D>,
        result: SqlResult<T>,
        metrics: &mut EngineMetrics,
    ) -> Result<Option<T>> {
        let status = result.status();
        match result {
            SqlResult::Success(value) => Ok(Some(value)),
            SqlResult::SuccessWithInfo(value) => {
                metrics.driver_warnings += 1;
                self.report(driver, target, status);
                Ok(Some(value))
            }
            SqlResult::NoData => Ok(None),
            SqlResult::Error { function } => {
                metrics.driver_errors += 1;
                let records = self.report(driver, target, status);
                Err(OdbcError::from_diagnostics(function, &records))
            }
            SqlResult::InvalidHandle => {
                metrics.driver_errors += 1;
                self.report(driver, target, status);
                Err(OdbcError::InvalidNativeHandle)
            }
            SqlResult::NeedData | SqlResult::StillExecuting | SqlResult::Unrecognized(_) => {
                metrics.driver_errors += 1;
                let code = status.code();
                let records = self.report(driver, target, SqlStatus::Other(code));
                Err(match records.first() {
                    Some(record) => OdbcError::Structured {
                        sqlstate: record.state,
                        native_code: record.native_error,
                        message: record.message.clone(),
                    },
                    None => OdbcError::UnexpectedReturn(code),
                })
            }
        }
    }
}

/// `[STATE]message / native code: N`
pub fn render(record: &DiagRecord) -> String {
    format!(
        "[{}]{} / native code: {}",
        record.state_str(),
        record.message,
        record.native_error
    )
}
