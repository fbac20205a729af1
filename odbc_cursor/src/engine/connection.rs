use crate::driver::{DiagTarget, NativeDriver};
use crate::engine::environment::OdbcEnvironment;
use crate::error::{OdbcError, Result};
use crate::observability::sanitize_connection_string;
use crate::security::Credentials;
use log::Level;

/// Occupied connection slot. `native` is only empty while a connect is in
/// progress.
pub struct ConnectionSlot<D: NativeDriver> {
    pub(crate) native: Option<D::Connection>,
    pub(crate) description: String,
}

impl<D: NativeDriver> OdbcEnvironment<D> {
    /// Opens a connection and returns its handle.
    ///
    /// On failure nothing stays allocated: the native object is freed and
    /// the handle goes back to the pool.
    pub fn connect(&mut self, connection_string: &str, user: &str, password: &str) -> Result<u32> {
        self.ensure_initialized()?;
        if connection_string.is_empty() {
            return Err(OdbcError::EmptyConnectionString);
        }
        let credentials = Credentials::new(connection_string, user, password);
        let description = sanitize_connection_string(credentials.connection_string());

        let handle = self.connections.acquire(ConnectionSlot {
            native: None,
            description: description.clone(),
        })?;
        match self.open_native(&credentials) {
            Ok(native) => {
                let slot = self.connections.get_mut(handle.index)?;
                slot.native = Some(native);
                self.metrics.connections_opened += 1;
                self.reporter
                    .logger()
                    .log_connection(Level::Debug, &description, "opened");
                Ok(handle.index)
            }
            Err(e) => {
                self.connections.release(handle.index);
                self.reporter
                    .logger()
                    .log_connection(Level::Debug, &description, "failed");
                Err(e)
            }
        }
    }

    fn open_native(&mut self, credentials: &Credentials) -> Result<D::Connection> {
        let result = self.driver.allocate_connection();
        let mut native = self
            .reporter
            .check(&self.driver, DiagTarget::Environment, result, &mut self.metrics)?
            .ok_or(OdbcError::Driver {
                function: "SQLAllocHandle",
            })?;

        let result = self.driver.connect(
            &mut native,
            credentials.connection_string(),
            credentials.user(),
            credentials.password(),
        );
        let connected =
            self.reporter
                .check(&self.driver, DiagTarget::Connection(&native), result, &mut self.metrics);
        match connected {
            Ok(_) => Ok(native),
            Err(e) => {
                let freed = self.driver.disconnect(native);
                if let Err(free_error) = self.reporter.check(
                    &self.driver,
                    DiagTarget::Environment,
                    freed,
                    &mut self.metrics,
                ) {
                    log::warn!("Freeing failed connection: {}", free_error);
                }
                Err(e)
            }
        }
    }

    /// Closes a connection. Unknown or already closed handles are ignored.
    pub fn disconnect(&mut self, connection: u32) -> Result<()> {
        let Some(slot) = self.connections.release(connection) else {
            return Ok(());
        };
        self.metrics.connections_closed += 1;
        let Some(native) = slot.native else {
            return Ok(());
        };
        let result = self.driver.disconnect(native);
        self.reporter
            .check(&self.driver, DiagTarget::Environment, result, &mut self.metrics)?;
        self.reporter
            .logger()
            .log_connection(Level::Debug, &slot.description, "closed");
        Ok(())
    }

    /// Sanitized connection string of a live connection.
    pub fn connection_description(&self, connection: u32) -> Result<&str> {
        Ok(&self.connections.get(connection)?.description)
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::MemoryDriver;
    use crate::engine::OdbcEnvironment;
    use crate::error::OdbcError;
    use crate::config::EngineConfig;

    fn env_with(driver: MemoryDriver, max_connections: usize) -> OdbcEnvironment<MemoryDriver> {
        let config = EngineConfig {
            max_connections,
            ..EngineConfig::default()
        };
        OdbcEnvironment::new(driver, config).unwrap()
    }

    #[test]
    fn test_connect_returns_first_free_handle() {
        let mut env = env_with(MemoryDriver::new().with_data_source("testdb"), 4);
        assert_eq!(env.connect("testdb", "u", "p").unwrap(), 0);
        assert_eq!(env.connect("testdb", "u", "p").unwrap(), 1);
        env.disconnect(0).unwrap();
        assert_eq!(env.connect("testdb", "u", "p").unwrap(), 0);
        assert_eq!(env.driver().live_connections(), 2);
    }

    #[test]
    fn test_connect_failure_releases_slot() {
        let mut env = env_with(
            MemoryDriver::new().with_secured_data_source("hr", "scott", "tiger"),
            1,
        );
        let err = env.connect("hr", "scott", "wrong").unwrap_err();
        assert_eq!(&err.sqlstate(), b"28000");
        assert_eq!(env.open_connections(), 0);
        assert_eq!(env.driver().live_connections(), 0);

        assert_eq!(env.connect("hr", "scott", "tiger").unwrap(), 0);
    }

    #[test]
    fn test_connect_exhausted() {
        let mut env = env_with(MemoryDriver::new().with_data_source("testdb"), 1);
        env.connect("testdb", "", "").unwrap();
        match env.connect("testdb", "", "") {
            Err(OdbcError::HandlesExhausted { max, .. }) => assert_eq!(max, 1),
            other => panic!("Expected HandlesExhausted, got {:?}", other),
        }
        assert_eq!(env.driver().live_connections(), 1);
    }

    #[test]
    fn test_connect_empty_string() {
        let mut env = env_with(MemoryDriver::new(), 1);
        assert!(matches!(
            env.connect("", "u", "p"),
            Err(OdbcError::EmptyConnectionString)
        ));
        assert_eq!(env.open_connections(), 0);
    }

    #[test]
    fn test_disconnect_twice_is_noop() {
        let mut env = env_with(MemoryDriver::new().with_data_source("testdb"), 2);
        let conn = env.connect("testdb", "", "").unwrap();
        env.disconnect(conn).unwrap();
        env.disconnect(conn).unwrap();
        env.disconnect(42).unwrap();
        assert_eq!(env.open_connections(), 0);
        assert_eq!(env.metrics().connections_closed, 1);
    }

    #[test]
    fn test_description_is_sanitized() {
        let mut env = env_with(MemoryDriver::new().with_data_source("DSN=x;PWD=secret"), 2);
        let conn = env.connect("DSN=x;PWD=secret", "", "").unwrap();
        assert_eq!(env.connection_description(conn).unwrap(), "DSN=x;PWD=***");
    }
}
