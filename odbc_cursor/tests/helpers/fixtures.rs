//! Scripted in-memory data sources shared by the integration tests.

use odbc_cursor::driver::{ResultColumn, ResultTable};
use odbc_cursor::{EngineConfig, MemoryDriver, OdbcEnvironment};

#[allow(dead_code)]
pub const PEOPLE_SQL: &str = "SELECT id, name, city FROM people ORDER BY id";

/// `testdb` with a three-row `people` table, one NULL city.
#[allow(dead_code)]
pub fn people_driver() -> MemoryDriver {
    let mut driver = MemoryDriver::new().with_data_source("testdb");
    driver.register_rows(
        PEOPLE_SQL,
        ResultTable::new(vec![
            ResultColumn::integer("id"),
            ResultColumn::varchar("name", 20),
            ResultColumn::varchar("city", 30),
        ])
        .row(&[Some("1"), Some("Ada"), Some("London")])
        .row(&[Some("2"), Some("Grace"), None])
        .row(&[Some("3"), Some("Edsger"), Some("Nuenen")]),
    );
    driver.register_affected("UPDATE people SET city = 'Paris'", 3);
    driver.register_affected("DELETE FROM people WHERE id = 1", 1);
    driver
}

#[allow(dead_code)]
pub fn memory_environment(driver: MemoryDriver, config: EngineConfig) -> OdbcEnvironment<MemoryDriver> {
    OdbcEnvironment::new(driver, config).expect("in-memory environment")
}
