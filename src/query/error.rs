use serde_json::Value;
use thiserror::Error;

use crate::store::DriverError;
use crate::term::TermType;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown term {0}")]
    UnknownTerm(Value),
    #[error("illegal query {}", .0.name())]
    UnsupportedOperation(TermType),
    #[error("cannot resolve {0}")]
    ScopeResolution(String),
    #[error("{term} expects {expected} arguments, found {found}")]
    Arity {
        term: TermType,
        expected: String,
        found: usize,
    },
    #[error("malformed term: {0}")]
    Malformed(String),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

pub type Result<T> = std::result::Result<T, QueryError>;
