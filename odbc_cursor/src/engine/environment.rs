use crate::config::EngineConfig;
use crate::driver::{DiagTarget, NativeDriver};
use crate::engine::connection::ConnectionSlot;
use crate::engine::diagnostics::DiagnosticsReporter;
use crate::engine::statement::CursorSlot;
use crate::error::{OdbcError, Result};
use crate::handles::{HandleKind, HandleTable};
use crate::observability::{EngineMetrics, MetricsSnapshot};

/// Owning context for one driver: the native environment, both handle
/// tables and everything that reports on them.
///
/// Operations take `&mut self`, so a single value serializes all native
/// calls. Dropping it closes every cursor, then every connection, then
/// frees the native environment.
pub struct OdbcEnvironment<D: NativeDriver> {
    pub(crate) driver: D,
    pub(crate) connections: HandleTable<ConnectionSlot<D>>,
    pub(crate) cursors: HandleTable<CursorSlot<D>>,
    pub(crate) reporter: DiagnosticsReporter,
    pub(crate) metrics: EngineMetrics,
    config: EngineConfig,
    initialized: bool,
}

impl<D: NativeDriver> OdbcEnvironment<D> {
    /// Builds the context and allocates the native environment.
    pub fn new(driver: D, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut env = Self {
            driver,
            connections: HandleTable::new(HandleKind::Connection, config.max_connections),
            cursors: HandleTable::new(HandleKind::Cursor, config.max_cursors),
            reporter: DiagnosticsReporter::new(config.debug, config.message_buffer_len),
            metrics: EngineMetrics::new(),
            config,
            initialized: false,
        };
        env.init()?;
        Ok(env)
    }

    pub fn with_defaults(driver: D) -> Result<Self> {
        Self::new(driver, EngineConfig::default())
    }

    /// Allocates the native environment if it is not already there.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let result = self.driver.allocate_environment();
        self.reporter
            .check(&self.driver, DiagTarget::Environment, result, &mut self.metrics)?;
        self.initialized = true;
        log::debug!("{} environment allocated", self.driver.name());
        Ok(())
    }

    /// Closes all cursors, then all connections, frees the native
    /// environment and allocates a fresh one.
    pub fn reinit(&mut self) -> Result<()> {
        self.release_all();
        self.free_native_environment();
        self.init()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.config.debug = debug;
        self.reporter.set_debug(debug);
    }

    pub fn debug_enabled(&self) -> bool {
        self.reporter.debug_enabled()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn field_separator(&self) -> char {
        self.config.field_separator
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn open_connections(&self) -> usize {
        self.connections.live_count()
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.live_count()
    }

    pub(crate) fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(OdbcError::EnvironmentNotInitialized)
        }
    }

    fn release_all(&mut self) {
        for cursor in self.cursors.live_indices() {
            if let Err(e) = self.close_cursor(cursor) {
                log::warn!("Closing cursor {} failed: {}", cursor, e);
            }
        }
        for connection in self.connections.live_indices() {
            if let Err(e) = self.disconnect(connection) {
                log::warn!("Closing connection {} failed: {}", connection, e);
            }
        }
    }

    fn free_native_environment(&mut self) {
        if !self.initialized {
            return;
        }
        let result = self.driver.free_environment();
        if let Err(e) =
            self.reporter
                .check(&self.driver, DiagTarget::Environment, result, &mut self.metrics)
        {
            log::warn!("Freeing {} environment failed: {}", self.driver.name(), e);
        }
        self.initialized = false;
    }
}

impl<D: NativeDriver> Drop for OdbcEnvironment<D> {
    fn drop(&mut self) {
        self.release_all();
        self.free_native_environment();
    }
}
