pub mod query;
pub mod store;
pub mod term;

#[cfg(test)]
mod tests;

pub use query::{Evaluator, Options, Query, QueryError};
pub use store::{Connection, DriverError, Handle, MemoryStore};
pub use term::TermType;
