//! Capability surface of the backing store.
//!
//! Evaluating a term produces a [`Handle`]: a composed, not yet executed
//! query. A [`Connection`] runs a handle and yields a JSON result.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{json, Value};
use thiserror::Error;

use crate::query::{Function, QueryError};
use crate::term::{Options, TermType};

mod execute;
pub mod memory;
pub mod time;
pub mod value;

pub use memory::{MemoryStore, TableRef};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{0}")]
    Runtime(String),
    #[error("{0} is not supported by this store")]
    Unsupported(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Evaluation(Box<QueryError>),
}

impl From<QueryError> for DriverError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::Driver(driver) => driver,
            other => DriverError::Evaluation(Box::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Runs composed queries. This is the only place where I/O happens.
pub trait Connection {
    fn run(&self, query: &Handle) -> Result<Value>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Handle {
    Datum(Value),
    Array(Vec<Handle>),
    Object(BTreeMap<String, Handle>),
    Call(Box<Call>),
    Func(Function),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub term_type: TermType,
    pub args: Vec<Handle>,
    pub optargs: Options,
}

impl Call {
    pub fn arg(&self, index: usize) -> Result<&Handle> {
        self.args.get(index).ok_or_else(|| {
            DriverError::Runtime(format!("{} is missing argument {}", self.term_type, index))
        })
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.optargs.get(name)
    }
}

impl Handle {
    pub fn expr(value: Value) -> Handle {
        Handle::Datum(value)
    }

    pub fn construct(term_type: TermType, args: Vec<Handle>, optargs: Options) -> Handle {
        Handle::Call(Box::new(Call { term_type, args, optargs }))
    }

    pub fn db(name: impl Into<String>) -> Handle {
        Handle::construct(TermType::Db, vec![Handle::expr(Value::String(name.into()))], Options::new())
    }

    pub fn now() -> Handle {
        Handle::construct(TermType::Now, vec![], Options::new())
    }

    pub fn time(args: Vec<Handle>) -> Handle {
        Handle::construct(TermType::Time, args, Options::new())
    }

    pub fn range(args: Vec<Handle>) -> Handle {
        Handle::construct(TermType::Range, args, Options::new())
    }

    pub fn object(args: Vec<Handle>) -> Handle {
        Handle::construct(TermType::Object, args, Options::new())
    }

    pub fn uuid() -> Handle {
        Handle::construct(TermType::Uuid, vec![], Options::new())
    }

    pub fn random(args: Vec<Handle>, optargs: Options) -> Handle {
        Handle::construct(TermType::Random, args, optargs)
    }

    /// Chains `term_type` onto this handle, which becomes the receiver.
    pub fn invoke(self, term_type: TermType, args: Vec<Handle>, optargs: Options) -> Handle {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(self);
        all.extend(args);
        Handle::construct(term_type, all, optargs)
    }

    pub fn term_type(&self) -> Option<TermType> {
        match self {
            Handle::Call(call) => Some(call.term_type),
            _ => None,
        }
    }

    /// Renders the handle back into the array wire format.
    pub fn to_wire(&self) -> Value {
        match self {
            Handle::Datum(Value::Array(items)) => json!([TermType::MakeArray.code(), items]),
            Handle::Datum(value) => value.clone(),
            Handle::Array(items) => {
                let items: Vec<Value> = items.iter().map(Handle::to_wire).collect();
                json!([TermType::MakeArray.code(), items])
            }
            Handle::Object(fields) => {
                let fields: serde_json::Map<String, Value> =
                    fields.iter().map(|(key, value)| (key.clone(), value.to_wire())).collect();
                json!([TermType::MakeObj.code(), [], fields])
            }
            Handle::Call(call) => {
                let args: Vec<Value> = call.args.iter().map(Handle::to_wire).collect();
                if call.optargs.is_empty() {
                    json!([call.term_type.code(), args])
                } else {
                    json!([call.term_type.code(), args, call.optargs])
                }
            }
            Handle::Func(function) => json!([
                TermType::Func.code(),
                [[TermType::MakeArray.code(), function.params()], function.body()]
            ]),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}
