pub mod binding;
pub mod connection;
pub mod diagnostics;
pub mod environment;
pub mod fetch;
pub mod statement;

pub use binding::ColumnDescriptor;
pub use connection::ConnectionSlot;
pub use diagnostics::DiagnosticsReporter;
pub use environment::OdbcEnvironment;
pub use fetch::{ColumnInfo, FetchedRow};
pub use statement::{CursorSlot, CursorState};
