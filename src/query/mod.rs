//! Term-tree interpreter.
//!
//! [`Evaluator::evaluate`] walks a wire term and composes a [`Handle`] by
//! calling into the store's capability surface. Function scopes travel as
//! an explicit [`Scope`] argument through every recursive call.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace};
use serde_json::Value;

use crate::store::{Connection, DriverError, Handle};
use crate::term::{check, classify, Args, Consumption, Operator, Options as OptArgs, Term, TermType};

mod error;
pub mod scope;

pub use error::{QueryError, Result};
pub use scope::{Function, Scope, VarId};

pub const DEFAULT_DATABASE: &str = "test";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Database used by `TABLE` terms without an explicit database.
    pub database: String,
    /// Rewrite every `DB` term to `database`, whatever name it asks for.
    pub pin_database: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            database: DEFAULT_DATABASE.to_string(),
            pin_database: true,
        }
    }
}

impl Options {
    pub fn database(name: impl Into<String>) -> Self {
        Options {
            database: name.into(),
            ..Options::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    options: Arc<Options>,
}

impl Evaluator {
    pub fn new(options: Options) -> Self {
        Evaluator { options: Arc::new(options) }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn evaluate(&self, term: &Value, scope: &Scope) -> Result<Handle> {
        let operator = match classify(term)? {
            Term::Literal(value) => return Ok(Handle::expr(value.clone())),
            Term::Operator(operator) => operator,
        };

        let descriptor = operator.descriptor();
        trace!("dispatching {} with {} args in scope {:?}", descriptor.name, operator.args.len(), scope.id());

        if descriptor.consumption == Consumption::Forbidden {
            return Err(QueryError::UnsupportedOperation(operator.term_type));
        }
        if !descriptor.accepts(operator.args.len()) {
            let expected = match descriptor.max_args {
                Some(max) if max == descriptor.min_args => max.to_string(),
                Some(max) => format!("{} to {}", descriptor.min_args, max),
                None => format!("at least {}", descriptor.min_args),
            };
            return Err(QueryError::Arity {
                term: operator.term_type,
                expected,
                found: operator.args.len(),
            });
        }
        if !descriptor.takes_options() && operator.optargs.map_or(false, |o| !o.is_empty()) {
            return Err(QueryError::Malformed(format!("{} does not take optional arguments", descriptor.name)));
        }

        match descriptor.consumption {
            Consumption::Nullary => Ok(self.nullary(operator.term_type)),
            Consumption::Constructor => self.constructor(&operator, scope),
            Consumption::Fixed | Consumption::Variadic => self.method(&operator, scope, OptArgs::new()),
            Consumption::Keyed => self.method(&operator, scope, options(&operator)),
            Consumption::Special => self.special(&operator, scope),
            Consumption::Forbidden => Err(QueryError::UnsupportedOperation(operator.term_type)),
        }
    }

    fn evaluate_all(&self, terms: &[Value], scope: &Scope) -> Result<Vec<Handle>> {
        terms.iter().map(|term| self.evaluate(term, scope)).collect()
    }

    fn nullary(&self, term_type: TermType) -> Handle {
        match term_type {
            TermType::Now => Handle::now(),
            other => Handle::construct(other, vec![], OptArgs::new()),
        }
    }

    fn constructor(&self, operator: &Operator, scope: &Scope) -> Result<Handle> {
        let args = self.evaluate_all(operator.args.terms(), scope)?;
        Ok(match operator.term_type {
            TermType::Time => Handle::time(args),
            TermType::Range => Handle::range(args),
            TermType::Object => Handle::object(args),
            TermType::Uuid if args.is_empty() => Handle::uuid(),
            TermType::Random => Handle::random(args, options(operator)),
            other => Handle::construct(other, args, options(operator)),
        })
    }

    /// Evaluates the receiver, then the remaining arguments left to right,
    /// and chains the operation onto the receiver.
    fn method(&self, operator: &Operator, scope: &Scope, optargs: OptArgs) -> Result<Handle> {
        let (head, rest) = operator
            .args
            .terms()
            .split_first()
            .ok_or_else(|| QueryError::Malformed(format!("{} needs a receiver", operator.term_type)))?;
        let receiver = self.evaluate(head, scope)?;
        let args = self.evaluate_all(rest, scope)?;
        Ok(receiver.invoke(operator.term_type, args, optargs))
    }

    fn special(&self, operator: &Operator, scope: &Scope) -> Result<Handle> {
        match operator.term_type {
            TermType::Datum => Ok(Handle::expr(operator.arg(0).cloned().unwrap_or(Value::Null))),
            TermType::MakeArray => self.make_array(operator, scope),
            TermType::MakeObj => self.make_object(operator, scope),
            TermType::Var => scope.resolve(var_id(operator)?),
            TermType::ImplicitVar => scope.implicit(),
            TermType::Func => self.function(operator, scope),
            TermType::Funcall => {
                let args = self.evaluate_all(operator.args.terms(), scope)?;
                Ok(Handle::construct(TermType::Funcall, args, OptArgs::new()))
            }
            TermType::Db => self.db(operator, scope),
            TermType::Table => self.table(operator, scope),
            other => Err(QueryError::Malformed(format!("{} has no dedicated routine", other))),
        }
    }

    /// Make-array elements stay literal unless they are make-array nodes themselves.
    fn make_array(&self, operator: &Operator, scope: &Scope) -> Result<Handle> {
        let elements = match operator.args {
            Args::Terms(_) => return Ok(Handle::Array(vec![])),
            Args::Opaque(Value::Array(elements)) => elements,
            Args::Opaque(other) => {
                return Err(QueryError::Malformed(format!("MAKE_ARRAY payload must be an array, found {}", other)))
            }
        };
        let items = elements
            .iter()
            .map(|element| match element.as_array().map(Vec::as_slice) {
                Some([code, Value::Array(_), ..]) if code.as_u64() == Some(TermType::MakeArray.code()) => {
                    self.evaluate(element, scope)
                }
                _ => Ok(Handle::expr(element.clone())),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Handle::Array(items))
    }

    fn make_object(&self, operator: &Operator, scope: &Scope) -> Result<Handle> {
        let fields = options(operator)
            .iter()
            .map(|(key, term)| Ok((key.clone(), self.evaluate(term, scope)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Handle::Object(fields))
    }

    fn function(&self, operator: &Operator, scope: &Scope) -> Result<Handle> {
        let (Some(params), Some(body)) = (operator.arg(0), operator.arg(1)) else {
            return Err(QueryError::Malformed("FUNC needs a parameter list and a body".to_string()));
        };
        let params = parameter_ids(params)?;
        check(body)?;
        debug!("defining function of {} parameters in scope {:?}", params.len(), scope.id());
        Ok(Handle::Func(Function::new(params, body.clone(), scope.clone(), self.clone())))
    }

    fn db(&self, operator: &Operator, scope: &Scope) -> Result<Handle> {
        if self.options.pin_database {
            return Ok(Handle::db(self.options.database.clone()));
        }
        let args = self.evaluate_all(operator.args.terms(), scope)?;
        Ok(Handle::construct(TermType::Db, args, OptArgs::new()))
    }

    /// A single-argument `TABLE` reads from the evaluator's database.
    fn table(&self, operator: &Operator, scope: &Scope) -> Result<Handle> {
        let (db, name) = match operator.args.terms() {
            [name] => (Handle::db(self.options.database.clone()), name),
            [db, name] => (self.evaluate(db, scope)?, name),
            _ => return Err(QueryError::Malformed("TABLE needs a table name".to_string())),
        };
        let name = self.evaluate(name, scope)?;
        Ok(db.invoke(TermType::Table, vec![name], options(operator)))
    }
}

fn options(operator: &Operator) -> OptArgs {
    operator.optargs.cloned().unwrap_or_default()
}

fn var_id(operator: &Operator) -> Result<VarId> {
    let payload = operator.payload().or_else(|| operator.arg(0));
    let id = match payload {
        Some(Value::Array(ids)) => ids.first().and_then(Value::as_u64),
        Some(id) => id.as_u64(),
        None => None,
    };
    id.ok_or_else(|| QueryError::Malformed(format!("VAR payload must be a variable id, found {:?}", payload)))
}

/// Parameter ids of a `FUNC` term, written as `[2, [id, ...]]`.
fn parameter_ids(params: &Value) -> Result<Vec<VarId>> {
    let ids = match classify(params)? {
        Term::Operator(Operator { term_type: TermType::MakeArray, args: Args::Opaque(Value::Array(ids)), .. }) => ids,
        Term::Operator(Operator { term_type: TermType::MakeArray, args: Args::Terms(_), .. }) => return Ok(vec![]),
        _ => return Err(QueryError::Malformed(format!("FUNC parameters must be a MAKE_ARRAY of ids, found {}", params))),
    };
    ids.iter()
        .map(|id| id.as_u64().ok_or_else(|| QueryError::Malformed(format!("invalid parameter id {}", id))))
        .collect()
}

/// A raw term paired with the options it is evaluated under.
#[derive(Debug, Clone)]
pub struct Query {
    term: Value,
    evaluator: Evaluator,
}

impl Query {
    pub fn new(term: Value, options: Options) -> Self {
        Query {
            term,
            evaluator: Evaluator::new(options),
        }
    }

    pub fn term(&self) -> &Value {
        &self.term
    }

    pub fn build(&self) -> Result<Handle> {
        debug!("evaluating {}", self.term);
        self.evaluator.evaluate(&self.term, &Scope::root())
    }

    pub fn run<C: Connection + ?Sized>(&self, connection: &C) -> Result<Value> {
        let handle = self.build()?;
        debug!("running {}", handle);
        connection.run(&handle).map_err(|error| match error {
            DriverError::Evaluation(inner) => *inner,
            other => QueryError::Driver(other),
        })
    }
}
