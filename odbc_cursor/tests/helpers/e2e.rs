/// Helper functions for E2E tests.
/// Provides utilities to check whether E2E tests can run (connection available).
use super::env::{get_test_credentials, get_test_dsn};
use odbc_cursor::test_helpers::load_dotenv;
use odbc_cursor::{OdbcDriver, OdbcEnvironment};

/// Checks whether a connection to ODBC_TEST_DSN can be established.
#[allow(dead_code)] // Test helper API; used by e2e tests when ODBC is configured
pub fn can_connect() -> bool {
    load_dotenv();

    let Some(dsn) = get_test_dsn() else {
        return false;
    };
    let (user, password) = get_test_credentials();

    let mut env = match OdbcEnvironment::with_defaults(OdbcDriver::new()) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("[ERROR] ODBC environment unavailable: {}", e);
            return false;
        }
    };
    match env.connect(&dsn, &user, &password) {
        Ok(conn) => {
            let _ = env.disconnect(conn);
            true
        }
        Err(e) => {
            eprintln!("[ERROR] Connection failed: {}", e);
            false
        }
    }
}

/// Checks whether E2E tests should run.
/// Runs only when ENABLE_E2E_TESTS is explicitly enabled.
#[allow(dead_code)] // Test helper API; used by e2e tests when ENABLE_E2E_TESTS is set
pub fn should_run_e2e_tests() -> bool {
    load_dotenv();

    fn parse_env_bool(raw: &str) -> Option<bool> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        match normalized.as_str() {
            "1" | "true" | "yes" | "y" => Some(true),
            "0" | "false" | "no" | "n" => Some(false),
            _ => None,
        }
    }

    let enabled = std::env::var("ENABLE_E2E_TESTS")
        .ok()
        .as_deref()
        .and_then(parse_env_bool)
        == Some(true);

    if !enabled {
        return false;
    }

    can_connect()
}
