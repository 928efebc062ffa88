/// Scriptable in-memory driver for exercising the helpers without a database
pub mod mock;

pub use mock::{MockDriver, MockRows, MockStats, MockStatement, MockTx};
