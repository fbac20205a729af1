pub mod e2e;
pub mod env;
pub mod fixtures;

#[allow(unused_imports)]
pub use e2e::{can_connect, should_run_e2e_tests};
#[allow(unused_imports)]
pub use env::{get_test_credentials, get_test_dsn};
#[allow(unused_imports)]
pub use fixtures::{memory_environment, people_driver, PEOPLE_SQL};
