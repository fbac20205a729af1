//! Helper functions for reading environment variables in tests

/// Get the ODBC_TEST_DSN connection string from environment
/// Returns None if not set (tests should be ignored in this case)
pub fn get_test_dsn() -> Option<String> {
    std::env::var("ODBC_TEST_DSN")
        .ok()
        .filter(|s| !s.is_empty())
}

/// User name and password for the test data source.
/// Both default to empty (credentials inside the DSN).
#[allow(dead_code)]
pub fn get_test_credentials() -> (String, String) {
    let user = std::env::var("ODBC_TEST_USER").unwrap_or_default();
    let password = std::env::var("ODBC_TEST_PASSWORD").unwrap_or_default();
    (user, password)
}
