use std::borrow::Cow;
use std::cell::OnceCell;
use std::cmp::Ordering;

use log::{trace, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::memory::{Conflict, MemoryStore, TableRef, Write, WriteSummary};
use super::time;
use super::value::{
    self, array_len, as_array, as_integer, as_number, as_object, as_str, compare, equals, number, pseudo_type, truthy, type_name,
    REQL_TYPE,
};
use super::{Call, DriverError, Handle, Result};
use crate::query::Function;
use crate::term::TermType;

const GROUPED_DATA: &str = "GROUPED_DATA";

/// Namespace of name-based `uuid(name)` values.
const UUID_NAMESPACE: Uuid = Uuid::from_u128(0x91461c99_f89d_49d2_af96_d8e2e14e9b58);

/// Operations that run once per group when their receiver is grouped data.
const PER_GROUP: &[TermType] = &[
    TermType::Count,
    TermType::Sum,
    TermType::Avg,
    TermType::Min,
    TermType::Max,
    TermType::Reduce,
    TermType::Fold,
    TermType::Map,
    TermType::ConcatMap,
    TermType::Filter,
    TermType::Distinct,
    TermType::Pluck,
    TermType::Without,
    TermType::Merge,
    TermType::OrderBy,
    TermType::Skip,
    TermType::Limit,
    TermType::Slice,
    TermType::Nth,
    TermType::IsEmpty,
    TermType::Contains,
    TermType::WithFields,
    TermType::HasFields,
    TermType::GetField,
    TermType::Bracket,
];

/// Intermediate result of executing a handle.
#[derive(Debug, Clone)]
pub(crate) enum Datum {
    Value(Value),
    Database(String),
    Table(TableRef),
    /// Rows read from a table, still writable.
    Selection { table: TableRef, rows: Vec<Value> },
    /// A single row looked up by primary key.
    Row { table: TableRef, row: Option<Value> },
    Function(Function),
}

impl Datum {
    fn type_name(&self) -> &'static str {
        match self {
            Datum::Value(value) => type_name(value),
            Datum::Database(_) => "DB",
            Datum::Table(_) => "TABLE",
            Datum::Selection { .. } => "SELECTION<STREAM>",
            Datum::Row { .. } => "SELECTION<OBJECT>",
            Datum::Function(_) => "FUNCTION",
        }
    }
}

fn rewrap(table: Option<TableRef>, rows: Vec<Value>) -> Datum {
    match table {
        Some(table) => Datum::Selection { table, rows },
        None => Datum::Value(Value::Array(rows)),
    }
}

fn grouped_data(groups: Vec<Value>) -> Value {
    json!({ REQL_TYPE: GROUPED_DATA, "data": groups })
}

fn runtime(message: impl Into<String>) -> DriverError {
    DriverError::Runtime(message.into())
}

/// Index name of an `index` optional argument: a bare name, or a raw
/// `asc`/`desc` term wrapping one.
fn ordering_key(index: &Value) -> Result<(&str, bool)> {
    match index {
        Value::String(name) => Ok((name, false)),
        Value::Array(node) => match node.as_slice() {
            [code, Value::Array(args), ..] => {
                let name = args.first().and_then(Value::as_str);
                match (code.as_u64().and_then(TermType::from_code), name) {
                    (Some(TermType::Asc), Some(name)) => Ok((name, false)),
                    (Some(TermType::Desc), Some(name)) => Ok((name, true)),
                    _ => Err(runtime(format!("Invalid index `{}`.", index))),
                }
            }
            _ => Err(runtime(format!("Invalid index `{}`.", index))),
        },
        other => Err(runtime(format!("Invalid index `{}`.", other))),
    }
}

fn bound_is_closed(call: &Call, name: &str, default: &str) -> Result<bool> {
    let bound = match call.option(name) {
        Some(value) => as_str(value)?,
        None => default,
    };
    match bound {
        "closed" => Ok(true),
        "open" => Ok(false),
        other => Err(runtime(format!("Expected `open` or `closed` for {} (got `{}`).", name, other))),
    }
}

/// Runs composed handles against a [`MemoryStore`].
pub(crate) struct Executor<'s> {
    store: &'s MemoryStore,
    now: OnceCell<Value>,
}

impl<'s> Executor<'s> {
    pub(crate) fn new(store: &'s MemoryStore) -> Self {
        Executor {
            store,
            now: OnceCell::new(),
        }
    }

    pub(crate) fn run(&self, handle: &Handle) -> Result<Value> {
        let datum = self.execute(handle)?;
        self.materialize(datum)
    }

    pub(crate) fn execute(&self, handle: &Handle) -> Result<Datum> {
        match handle {
            Handle::Datum(value) => Ok(Datum::Value(value.clone())),
            Handle::Array(items) => Ok(Datum::Value(Value::Array(self.values(items)?))),
            Handle::Object(fields) => {
                let object = fields
                    .iter()
                    .map(|(key, field)| Ok((key.clone(), self.value(field)?)))
                    .collect::<Result<Map<_, _>>>()?;
                Ok(Datum::Value(Value::Object(object)))
            }
            Handle::Func(function) => Ok(Datum::Function(function.clone())),
            Handle::Call(call) => self.call(call),
        }
    }

    pub(crate) fn materialize(&self, datum: Datum) -> Result<Value> {
        match datum {
            Datum::Value(value) => Ok(value),
            Datum::Table(table) => Ok(Value::Array(self.store.documents(&table)?)),
            Datum::Selection { rows, .. } => Ok(Value::Array(rows)),
            Datum::Row { row, .. } => Ok(row.unwrap_or(Value::Null)),
            other => Err(runtime(format!(
                "Query result must be of type DATUM, GROUPED_DATA, or STREAM (got {}).",
                other.type_name()
            ))),
        }
    }

    fn value(&self, handle: &Handle) -> Result<Value> {
        let datum = self.execute(handle)?;
        self.materialize(datum)
    }

    fn values(&self, handles: &[Handle]) -> Result<Vec<Value>> {
        handles.iter().map(|handle| self.value(handle)).collect()
    }

    fn string(&self, handle: &Handle) -> Result<String> {
        Ok(as_str(&self.value(handle)?)?.to_string())
    }

    fn integer(&self, handle: &Handle) -> Result<i64> {
        as_integer(&self.value(handle)?)
    }

    fn now(&self) -> Result<Value> {
        if let Some(now) = self.now.get() {
            return Ok(now.clone());
        }
        let now = time::now()?;
        Ok(self.now.get_or_init(|| now).clone())
    }

    fn sequence(&self, datum: Datum) -> Result<Vec<Value>> {
        match datum {
            Datum::Table(table) => self.store.documents(&table),
            Datum::Selection { rows, .. } => Ok(rows),
            Datum::Value(Value::Array(items)) => Ok(items),
            other => Err(runtime(format!("Cannot convert {} to SEQUENCE", other.type_name()))),
        }
    }

    /// Rows of a sequence, keeping the table they were read from.
    fn rows(&self, datum: Datum) -> Result<(Option<TableRef>, Vec<Value>)> {
        match datum {
            Datum::Table(table) => {
                let rows = self.store.documents(&table)?;
                Ok((Some(table), rows))
            }
            Datum::Selection { table, rows } => Ok((Some(table), rows)),
            other => Ok((None, self.sequence(other)?)),
        }
    }

    fn table(&self, datum: Datum) -> Result<TableRef> {
        match datum {
            Datum::Table(table) => Ok(table),
            other => Err(runtime(format!("Expected type TABLE but found {}.", other.type_name()))),
        }
    }

    /// Rows a write applies to; `None` for a missing single-row lookup.
    fn targets(&self, datum: Datum) -> Result<(TableRef, Vec<Option<Value>>)> {
        match datum {
            Datum::Table(table) => {
                let rows = self.store.documents(&table)?;
                Ok((table, rows.into_iter().map(Some).collect()))
            }
            Datum::Selection { table, rows } => Ok((table, rows.into_iter().map(Some).collect())),
            Datum::Row { table, row } => Ok((table, vec![row])),
            other => Err(runtime(format!("Expected type SELECTION but found {}.", other.type_name()))),
        }
    }

    fn apply(&self, function: &Handle, args: &[Value]) -> Result<Value> {
        match function {
            Handle::Func(function) => {
                let body = function.call(args.iter().cloned().map(Handle::expr).collect())?;
                self.value(&body)
            }
            constant => self.value(constant),
        }
    }

    /// A field name or a function of the row.
    fn select(&self, selector: &Handle, row: &Value) -> Result<Value> {
        match selector {
            Handle::Func(_) => self.apply(selector, std::slice::from_ref(row)),
            other => match self.value(other)? {
                Value::String(field) => Ok(value::get_field(row, &field)?.clone()),
                found => Err(runtime(format!("Expected a field name or a function but found {}.", found))),
            },
        }
    }

    /// A function predicate, an object pattern, or a constant.
    fn test(&self, predicate: &Handle, row: &Value) -> Result<bool> {
        match predicate {
            Handle::Func(_) => Ok(truthy(&self.apply(predicate, std::slice::from_ref(row))?)),
            other => match self.value(other)? {
                pattern @ Value::Object(_) => Ok(value::matches_pattern(row, &pattern)),
                constant => Ok(truthy(&constant)),
            },
        }
    }

    /// Expands `args(array)` arguments in place.
    fn splice_args<'c>(&self, call: &'c Call) -> Result<Cow<'c, Call>> {
        if !call.args.iter().any(|arg| arg.term_type() == Some(TermType::Args)) {
            return Ok(Cow::Borrowed(call));
        }
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            match arg {
                Handle::Call(inner) if inner.term_type == TermType::Args => {
                    let spliced = self.value(inner.arg(0)?)?;
                    args.extend(as_array(&spliced)?.iter().cloned().map(Handle::expr));
                }
                other => args.push(other.clone()),
            }
        }
        Ok(Cow::Owned(Call {
            term_type: call.term_type,
            args,
            optargs: call.optargs.clone(),
        }))
    }

    fn call(&self, call: &Call) -> Result<Datum> {
        let call = self.splice_args(call)?;
        let call: &Call = &call;
        trace!("executing {} with {} args", call.term_type, call.args.len());

        use TermType as T;
        match call.term_type {
            T::Db => {
                let name = self.string(call.arg(0)?)?;
                if !self.store.has_database(&name)? {
                    return Err(DriverError::NotFound(format!("Database `{}` does not exist.", name)));
                }
                Ok(Datum::Database(name))
            }
            T::Now => Ok(Datum::Value(self.now()?)),
            T::Time => Ok(Datum::Value(time::time(&self.values(&call.args)?)?)),
            T::EpochTime => Ok(Datum::Value(time::epoch_time(&self.value(call.arg(0)?)?)?)),
            T::Iso8601 => Ok(Datum::Value(time::iso8601(
                &self.value(call.arg(0)?)?,
                call.option("default_timezone"),
            )?)),
            day @ (T::Monday | T::Tuesday | T::Wednesday | T::Thursday | T::Friday | T::Saturday | T::Sunday) => {
                Ok(Datum::Value(Value::from(day.code() - T::Monday.code() + 1)))
            }
            month @ (T::January
            | T::February
            | T::March
            | T::April
            | T::May
            | T::June
            | T::July
            | T::August
            | T::September
            | T::October
            | T::November
            | T::December) => Ok(Datum::Value(Value::from(month.code() - T::January.code() + 1))),
            T::MinVal | T::MaxVal => Err(runtime(format!(
                "Cannot use r.{} outside of BETWEEN.",
                call.term_type.descriptor().method
            ))),
            T::Asc | T::Desc => Err(runtime(format!("{} may only be used as an argument to ORDER_BY.", call.term_type))),
            T::Literal => Ok(Datum::Value(match call.args.first() {
                Some(inner) => json!({ REQL_TYPE: "LITERAL", "value": self.value(inner)? }),
                None => json!({ REQL_TYPE: "LITERAL" }),
            })),
            T::Object => self.object(call),
            T::Range => self.range(call),
            T::Random => self.random(call),
            T::Uuid => Ok(Datum::Value(Value::String(match call.args.first() {
                Some(name) => Uuid::new_v5(&UUID_NAMESPACE, self.string(name)?.as_bytes()).to_string(),
                None => Uuid::new_v4().to_string(),
            }))),
            T::Json => Ok(Datum::Value(serde_json::from_str(&self.string(call.arg(0)?)?)?)),
            T::Args => Ok(Datum::Value(self.value(call.arg(0)?)?)),
            T::Error => Err(runtime(match call.args.first() {
                Some(message) => self.string(message)?,
                None => "User error.".to_string(),
            })),
            T::Branch => self.branch(call),
            T::Funcall => {
                let (function, args) = call
                    .args
                    .split_first()
                    .ok_or_else(|| runtime("FUNCALL needs a function"))?;
                let args = self.values(args)?;
                Ok(Datum::Value(self.apply(function, &args)?))
            }
            T::And => {
                let mut last = Value::Bool(true);
                for arg in &call.args {
                    last = self.value(arg)?;
                    if !truthy(&last) {
                        break;
                    }
                }
                Ok(Datum::Value(last))
            }
            T::Or => {
                for arg in &call.args {
                    let value = self.value(arg)?;
                    if truthy(&value) {
                        return Ok(Datum::Value(value));
                    }
                }
                Ok(Datum::Value(Value::Bool(false)))
            }
            T::Default => self.default(call),
            T::Http => Err(DriverError::Unsupported(call.term_type.name().to_string())),
            _ => self.method(call),
        }
    }

    fn method(&self, call: &Call) -> Result<Datum> {
        let receiver = self.execute(call.arg(0)?)?;
        if PER_GROUP.contains(&call.term_type) {
            if let Datum::Value(grouped) = &receiver {
                if pseudo_type(grouped) == Some(GROUPED_DATA) {
                    return self.per_group(call, grouped);
                }
            }
        }
        self.dispatch(call, receiver)
    }

    fn per_group(&self, call: &Call, grouped: &Value) -> Result<Datum> {
        let data = grouped
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| runtime("GROUPED_DATA is missing `data`."))?;
        let mut groups = Vec::with_capacity(data.len());
        for group in data {
            let (key, rows) = match group.as_array().map(Vec::as_slice) {
                Some([key, rows]) => (key, rows),
                _ => return Err(runtime(format!("Malformed group `{}`.", group))),
            };
            let reduced = self.dispatch(call, Datum::Value(rows.clone()))?;
            groups.push(json!([key, self.materialize(reduced)?]));
        }
        Ok(Datum::Value(grouped_data(groups)))
    }

    /// Operations whose result may stay attached to a table.
    fn dispatch(&self, call: &Call, receiver: Datum) -> Result<Datum> {
        use TermType as T;
        match call.term_type {
            T::Table => {
                let db = match receiver {
                    Datum::Database(db) => db,
                    other => return Err(runtime(format!("Expected type DB but found {}.", other.type_name()))),
                };
                let table = TableRef::new(db, self.string(call.arg(1)?)?);
                self.store.primary_key(&table)?;
                Ok(Datum::Table(table))
            }
            T::Get => {
                let table = self.table(receiver)?;
                let key = self.value(call.arg(1)?)?;
                let row = self.store.get(&table, &key)?;
                Ok(Datum::Row { table, row })
            }
            T::GetAll => {
                let table = self.table(receiver)?;
                let keys = self.values(&call.args[1..])?;
                let index = self.index_name(call, &table)?;
                let documents = self.store.documents(&table)?;
                let mut rows = Vec::new();
                for key in &keys {
                    rows.extend(
                        documents
                            .iter()
                            .filter(|row| row.get(&index).map_or(false, |found| equals(found, key)))
                            .cloned(),
                    );
                }
                Ok(Datum::Selection { table, rows })
            }
            T::Between | T::BetweenDeprecated => self.between(call, receiver),
            T::Filter => {
                let (table, rows) = self.rows(receiver)?;
                let predicate = call.arg(1)?;
                let default = call.option("default").map_or(false, truthy);
                let mut kept = Vec::new();
                for row in rows {
                    let keep = match self.test(predicate, &row) {
                        Ok(keep) => keep,
                        Err(DriverError::NotFound(_)) => default,
                        Err(error) => return Err(error),
                    };
                    if keep {
                        kept.push(row);
                    }
                }
                Ok(rewrap(table, kept))
            }
            T::OrderBy => self.order_by(call, receiver),
            T::Skip => {
                let (table, rows) = self.rows(receiver)?;
                let skip = self.integer(call.arg(1)?)?.max(0) as usize;
                Ok(rewrap(table, rows.into_iter().skip(skip).collect()))
            }
            T::Limit => {
                let (table, rows) = self.rows(receiver)?;
                let limit = self.integer(call.arg(1)?)?.max(0) as usize;
                Ok(rewrap(table, rows.into_iter().take(limit).collect()))
            }
            T::Slice => self.slice(call, receiver),
            T::Nth => {
                let (table, rows) = self.rows(receiver)?;
                let at = value::index(self.integer(call.arg(1)?)?, rows.len())
                    .ok_or_else(|| DriverError::NotFound("Index out of bounds.".to_string()))?;
                let row = rows[at].clone();
                Ok(match table {
                    Some(table) => Datum::Row { table, row: Some(row) },
                    None => Datum::Value(row),
                })
            }
            T::Insert => {
                let table = self.table(receiver)?;
                let documents = match self.value(call.arg(1)?)? {
                    Value::Array(documents) => documents,
                    document => vec![document],
                };
                let conflict = match call.option("conflict") {
                    Some(conflict) => Conflict::parse(as_str(conflict)?)?,
                    None => Conflict::Error,
                };
                let return_changes = call.option("return_changes").map_or(false, truthy);
                let summary = self.store.insert(&table, documents, conflict, return_changes)?;
                Ok(Datum::Value(serde_json::to_value(summary)?))
            }
            T::Update | T::Replace | T::Delete => self.write(call, receiver),
            T::TypeOf => Ok(Datum::Value(Value::String(receiver.type_name().to_string()))),
            T::Info => self.info(receiver).map(Datum::Value),
            _ => {
                let receiver = self.materialize(receiver)?;
                self.compute(call, receiver).map(Datum::Value)
            }
        }
    }

    fn index_name(&self, call: &Call, table: &TableRef) -> Result<String> {
        match call.option("index") {
            Some(index) => ordering_key(index).map(|(name, _)| name.to_string()),
            None => self.store.primary_key(table),
        }
    }

    /// `None` for `minval`/`maxval`, which leave that side unbounded.
    fn bound(&self, handle: &Handle) -> Result<Option<Value>> {
        match handle.term_type() {
            Some(TermType::MinVal | TermType::MaxVal) => Ok(None),
            _ => self.value(handle).map(Some),
        }
    }

    fn between(&self, call: &Call, receiver: Datum) -> Result<Datum> {
        let (table, mut rows) = self.rows(receiver)?;
        let table = table.ok_or_else(|| runtime("Expected type TABLE_SLICE but found ARRAY."))?;
        let index = self.index_name(call, &table)?;
        let lower = self.bound(call.arg(1)?)?;
        let upper = self.bound(call.arg(2)?)?;
        let left_closed = bound_is_closed(call, "left_bound", "closed")?;
        let right_closed = bound_is_closed(call, "right_bound", "open")?;

        rows.retain(|row| {
            let Some(key) = row.get(&index) else { return false };
            let above = lower.as_ref().map_or(true, |lower| match compare(key, lower) {
                Ordering::Greater => true,
                Ordering::Equal => left_closed,
                Ordering::Less => false,
            });
            let below = upper.as_ref().map_or(true, |upper| match compare(key, upper) {
                Ordering::Less => true,
                Ordering::Equal => right_closed,
                Ordering::Greater => false,
            });
            above && below
        });
        Ok(Datum::Selection { table, rows })
    }

    fn order_by(&self, call: &Call, receiver: Datum) -> Result<Datum> {
        let (table, rows) = self.rows(receiver)?;
        let mut keys: Vec<(Handle, bool)> = Vec::new();
        if let Some(index) = call.option("index") {
            let (name, descending) = ordering_key(index)?;
            keys.push((Handle::expr(Value::String(name.to_string())), descending));
        }
        for arg in &call.args[1..] {
            keys.push(match arg {
                Handle::Call(inner) if inner.term_type == TermType::Asc => (inner.arg(0)?.clone(), false),
                Handle::Call(inner) if inner.term_type == TermType::Desc => (inner.arg(0)?.clone(), true),
                other => (other.clone(), false),
            });
        }
        if keys.is_empty() {
            return Err(runtime("ORDER_BY needs at least one ordering."));
        }

        let mut decorated = rows
            .into_iter()
            .map(|row| {
                let sort_values = keys
                    .iter()
                    .map(|(key, _)| match self.select(key, &row) {
                        Err(DriverError::NotFound(_)) => Ok(Value::Null),
                        other => other,
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok((sort_values, row))
            })
            .collect::<Result<Vec<_>>>()?;
        decorated.sort_by(|(a, _), (b, _)| {
            a.iter()
                .zip(b)
                .zip(&keys)
                .map(|((x, y), (_, descending))| {
                    let ordering = compare(x, y);
                    if *descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(rewrap(table, decorated.into_iter().map(|(_, row)| row).collect()))
    }

    fn slice(&self, call: &Call, receiver: Datum) -> Result<Datum> {
        if let Datum::Value(Value::String(text)) = &receiver {
            let chars: Vec<char> = text.chars().collect();
            let (from, to) = self.slice_bounds(call, chars.len())?;
            return Ok(Datum::Value(Value::String(chars[from..to].iter().collect())));
        }
        let (table, rows) = self.rows(receiver)?;
        let (from, to) = self.slice_bounds(call, rows.len())?;
        Ok(rewrap(table, rows[from..to].to_vec()))
    }

    fn slice_bounds(&self, call: &Call, len: usize) -> Result<(usize, usize)> {
        let len = len as i64;
        let resolve = |at: i64| if at < 0 { (len + at).max(0) } else { at.min(len) };
        let mut from = resolve(self.integer(call.arg(1)?)?);
        let mut to = match call.args.get(2) {
            Some(end) => resolve(self.integer(end)?),
            None => len,
        };
        if !bound_is_closed(call, "left_bound", "closed")? {
            from += 1;
        }
        if bound_is_closed(call, "right_bound", "open")? {
            to += 1;
        }
        let (from, to) = (from.min(len) as usize, to.min(len) as usize);
        Ok((from.min(to), to))
    }

    fn write(&self, call: &Call, receiver: Datum) -> Result<Datum> {
        let (table, rows) = self.targets(receiver)?;
        let primary_key = self.store.primary_key(&table)?;
        let mut summary = WriteSummary {
            changes: call.option("return_changes").map_or(false, truthy).then(Vec::new),
            ..WriteSummary::default()
        };
        let mut writes = Vec::new();

        for row in rows {
            if call.term_type == TermType::Delete {
                match row {
                    Some(old) => {
                        summary.change(Some(&old), None);
                        writes.push(Write::Remove(old.get(&primary_key).cloned().unwrap_or(Value::Null)));
                        summary.deleted += 1;
                    }
                    None => summary.skipped += 1,
                }
                continue;
            }

            let Some(old) = row.clone().or_else(|| (call.term_type == TermType::Replace).then_some(Value::Null)) else {
                summary.skipped += 1;
                continue;
            };
            let computed = match self.apply(call.arg(1)?, std::slice::from_ref(&old)) {
                Ok(computed) => computed,
                Err(error @ (DriverError::Runtime(_) | DriverError::NotFound(_))) => {
                    summary.error(error.to_string());
                    continue;
                }
                Err(error) => return Err(error),
            };
            let new = match call.term_type {
                TermType::Update if computed.is_null() => old.clone(),
                TermType::Update => value::merge(old.clone(), computed),
                _ => computed,
            };

            match (old.is_null(), new.is_null()) {
                (true, true) => summary.skipped += 1,
                (false, true) => {
                    summary.change(Some(&old), None);
                    writes.push(Write::Remove(old.get(&primary_key).cloned().unwrap_or(Value::Null)));
                    summary.deleted += 1;
                }
                (was_missing, false) => {
                    if !new.is_object() {
                        summary.error(format!("Expected type OBJECT but found {}.", type_name(&new)));
                        continue;
                    }
                    if !was_missing && new.get(&primary_key) != old.get(&primary_key) {
                        summary.error(format!("Primary key `{}` cannot be changed.", primary_key));
                        continue;
                    }
                    if new == old {
                        summary.unchanged += 1;
                        continue;
                    }
                    summary.change((!was_missing).then_some(&old), Some(&new));
                    writes.push(Write::Put(new));
                    if was_missing {
                        summary.inserted += 1;
                    } else {
                        summary.replaced += 1;
                    }
                }
            }
        }

        self.store.apply(&table, writes)?;
        Ok(Datum::Value(serde_json::to_value(summary)?))
    }

    fn info(&self, receiver: Datum) -> Result<Value> {
        let kind = receiver.type_name();
        Ok(match receiver {
            Datum::Database(name) => json!({ "name": name, "type": "DB" }),
            Datum::Table(table) => json!({
                "type": "TABLE",
                "name": table.table,
                "primary_key": self.store.primary_key(&table)?,
                "db": { "name": table.db, "type": "DB" },
            }),
            Datum::Function(function) => json!({ "type": "FUNCTION", "params": function.arity() }),
            Datum::Selection { table, .. } | Datum::Row { table, .. } => json!({
                "type": kind,
                "table": { "name": table.table, "db": table.db },
            }),
            Datum::Value(value) => json!({
                "type": type_name(&value),
                "value": serde_json::to_string(&value)?,
            }),
        })
    }

    fn object(&self, call: &Call) -> Result<Datum> {
        let values = self.values(&call.args)?;
        if values.len() % 2 != 0 {
            return Err(runtime("OBJECT expects an even number of arguments."));
        }
        let mut object = Map::new();
        for pair in values.chunks(2) {
            let key = as_str(&pair[0])?;
            if object.insert(key.to_string(), pair[1].clone()).is_some() {
                return Err(runtime(format!("Duplicate key `{}` in object.", key)));
            }
        }
        Ok(Datum::Value(Value::Object(object)))
    }

    fn range(&self, call: &Call) -> Result<Datum> {
        let (start, end) = match call.args.as_slice() {
            [] => return Err(runtime("Cannot use an infinite stream with an aggregation function or in this context.")),
            [end] => (0, self.integer(end)?),
            [start, end, ..] => (self.integer(start)?, self.integer(end)?),
        };
        let len = end.checked_sub(start).map(|len| usize::try_from(len.max(0)).unwrap_or(usize::MAX));
        array_len(len)?;
        Ok(Datum::Value(Value::Array((start..end).map(Value::from).collect())))
    }

    fn random(&self, call: &Call) -> Result<Datum> {
        let args = self.values(&call.args)?;
        let float = call.option("float").map_or(false, truthy);
        let mut rng = rand::thread_rng();
        let (lower, upper) = match args.as_slice() {
            [] => return Ok(Datum::Value(number(rng.gen::<f64>())?)),
            [upper] => (Value::from(0), upper.clone()),
            [lower, upper, ..] => (lower.clone(), upper.clone()),
        };
        if float {
            let (lower, upper) = (as_number(&lower)?, as_number(&upper)?);
            if lower >= upper {
                return Err(runtime("Lower bound of RANDOM must be smaller than the upper bound."));
            }
            return Ok(Datum::Value(number(rng.gen_range(lower..upper))?));
        }
        let (lower, upper) = (as_integer(&lower)?, as_integer(&upper)?);
        if lower >= upper {
            return Err(runtime("Lower bound of RANDOM must be smaller than the upper bound."));
        }
        Ok(Datum::Value(Value::from(rng.gen_range(lower..upper))))
    }

    /// Only the taken branch is executed.
    fn branch(&self, call: &Call) -> Result<Datum> {
        let (otherwise, cases) = call
            .args
            .split_last()
            .ok_or_else(|| runtime("BRANCH needs an else branch."))?;
        if cases.is_empty() || cases.len() % 2 != 0 {
            return Err(runtime("BRANCH expects an odd number of arguments."));
        }
        for case in cases.chunks(2) {
            if truthy(&self.value(&case[0])?) {
                return self.execute(&case[1]);
            }
        }
        self.execute(otherwise)
    }

    /// Replaces `null` and missing-data errors, never other failures.
    fn default(&self, call: &Call) -> Result<Datum> {
        let fallback = call.arg(1)?;
        let error = match self.value(call.arg(0)?) {
            Ok(Value::Null) => Value::Null,
            Ok(value) => return Ok(Datum::Value(value)),
            Err(DriverError::NotFound(message)) => Value::String(message),
            Err(error) => return Err(error),
        };
        Ok(Datum::Value(self.apply(fallback, &[error])?))
    }

    /// Operations over plain values.
    fn compute(&self, call: &Call, receiver: Value) -> Result<Value> {
        use TermType as T;
        let args = &call.args[1..];
        match call.term_type {
            T::Map => {
                let (function, extras) = args.split_last().ok_or_else(|| runtime("MAP needs a function."))?;
                let mut columns = vec![as_array(&receiver)?.clone()];
                for extra in extras {
                    let datum = self.execute(extra)?;
                    columns.push(self.sequence(datum)?);
                }
                let length = columns.iter().map(Vec::len).min().unwrap_or(0);
                (0..length)
                    .map(|at| {
                        let row: Vec<Value> = columns.iter().map(|column| column[at].clone()).collect();
                        self.apply(function, &row)
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }
            T::ConcatMap => {
                let function = call.arg(1)?;
                let mut flattened = Vec::new();
                for row in as_array(&receiver)? {
                    match self.apply(function, std::slice::from_ref(row))? {
                        Value::Array(items) => flattened.extend(items),
                        other => return Err(runtime(format!("Cannot convert {} to SEQUENCE", type_name(&other)))),
                    }
                }
                Ok(Value::Array(flattened))
            }
            T::OffsetsOf => {
                let needle = call.arg(1)?;
                let constant = match needle {
                    Handle::Func(_) => None,
                    other => Some(self.value(other)?),
                };
                let mut offsets = Vec::new();
                for (at, row) in as_array(&receiver)?.iter().enumerate() {
                    let found = match &constant {
                        Some(constant) => equals(row, constant),
                        None => truthy(&self.apply(needle, std::slice::from_ref(row))?),
                    };
                    if found {
                        offsets.push(Value::from(at));
                    }
                }
                Ok(Value::Array(offsets))
            }
            T::IsEmpty => Ok(Value::Bool(as_array(&receiver)?.is_empty())),
            T::Union => {
                let mut all = as_array(&receiver)?.clone();
                for arg in args {
                    let datum = self.execute(arg)?;
                    all.extend(self.sequence(datum)?);
                }
                Ok(Value::Array(all))
            }
            T::Sample => {
                let count = self.integer(call.arg(1)?)?.max(0) as usize;
                let rows = as_array(&receiver)?;
                Ok(Value::Array(rows.choose_multiple(&mut rand::thread_rng(), count).cloned().collect()))
            }
            T::ForEach => self.for_each(call, receiver),
            T::WithFields => {
                let selectors = self.values(args)?;
                as_array(&receiver)?
                    .iter()
                    .filter(|row| value::has_fields(row, &selectors))
                    .map(|row| value::pluck(row, &selectors))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }
            T::Reduce => {
                let function = call.arg(1)?;
                let mut rows = as_array(&receiver)?.iter().cloned();
                let first = rows.next().ok_or_else(|| runtime("Cannot reduce over an empty stream."))?;
                rows.try_fold(first, |acc, row| self.apply(function, &[acc, row]))
            }
            T::Fold => {
                if call.option("emit").is_some() {
                    return Err(DriverError::Unsupported("FOLD with `emit`".to_string()));
                }
                let base = self.value(call.arg(1)?)?;
                let function = call.arg(2)?;
                as_array(&receiver)?
                    .iter()
                    .try_fold(base, |acc, row| self.apply(function, &[acc, row.clone()]))
            }
            T::Count => self.count(call, receiver),
            T::Sum | T::Avg => {
                let projected = self.projected(call, &receiver)?;
                let total = projected.iter().map(as_number).sum::<Result<f64>>()?;
                if call.term_type == T::Sum {
                    return number(total);
                }
                if projected.is_empty() {
                    return Err(runtime("Cannot take the average of an empty stream."));
                }
                number(total / projected.len() as f64)
            }
            T::Min | T::Max => self.extreme(call, receiver),
            T::Distinct => match call.option("index") {
                Some(index) => {
                    let (name, _) = ordering_key(index)?;
                    let keys = as_array(&receiver)?.iter().filter_map(|row| row.get(name).cloned()).collect();
                    Ok(Value::Array(value::distinct(keys)))
                }
                None => Ok(Value::Array(value::distinct(as_array(&receiver)?.clone()))),
            },
            T::Group => self.group(call, receiver),
            T::Ungroup => {
                if pseudo_type(&receiver) != Some(GROUPED_DATA) {
                    return Err(runtime(format!("Expected type GROUPED_DATA but found {}.", type_name(&receiver))));
                }
                let data = receiver.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
                Ok(Value::Array(
                    data.into_iter()
                        .filter_map(|group| match group {
                            Value::Array(pair) if pair.len() == 2 => {
                                let mut pair = pair.into_iter();
                                Some(json!({ "group": pair.next(), "reduction": pair.next() }))
                            }
                            _ => None,
                        })
                        .collect(),
                ))
            }
            T::Contains => {
                let rows = as_array(&receiver)?;
                for needle in args {
                    let found = match needle {
                        Handle::Func(_) => {
                            let mut found = false;
                            for row in rows {
                                if truthy(&self.apply(needle, std::slice::from_ref(row))?) {
                                    found = true;
                                    break;
                                }
                            }
                            found
                        }
                        other => value::contains(rows, &self.value(other)?),
                    };
                    if !found {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }

            T::Pluck => {
                let selectors = self.values(args)?;
                self.each_document(receiver, |document| value::pluck(document, &selectors))
            }
            T::Without => {
                let selectors = self.values(args)?;
                self.each_document(receiver, |document| value::without(document, &selectors))
            }
            T::Merge => self.each_document(receiver, |document| {
                let mut merged = document.clone();
                for patch in args {
                    merged = value::merge(merged, self.apply(patch, std::slice::from_ref(document))?);
                }
                Ok(merged)
            }),
            T::HasFields => {
                let selectors = self.values(args)?;
                match receiver {
                    Value::Array(rows) => Ok(Value::Array(
                        rows.into_iter().filter(|row| value::has_fields(row, &selectors)).collect(),
                    )),
                    document => Ok(Value::Bool(value::has_fields(&document, &selectors))),
                }
            }
            T::GetField => {
                let field = self.string(call.arg(1)?)?;
                self.get_field(receiver, &field)
            }
            T::Bracket => match self.value(call.arg(1)?)? {
                Value::String(field) => self.get_field(receiver, &field),
                Value::Number(at) => {
                    let rows = as_array(&receiver)?;
                    let at = at.as_i64().ok_or_else(|| runtime(format!("Number not an integer: {}", at)))?;
                    value::index(at, rows.len())
                        .map(|at| rows[at].clone())
                        .ok_or_else(|| DriverError::NotFound("Index out of bounds.".to_string()))
                }
                other => Err(runtime(format!("Expected NUMBER or STRING as second argument to BRACKET but found {}.", type_name(&other)))),
            },
            T::Keys | T::Values => {
                let object = self.non_null(&receiver).and_then(|document| as_object(document))?;
                Ok(Value::Array(if call.term_type == T::Keys {
                    object.keys().cloned().map(Value::String).collect()
                } else {
                    object.values().cloned().collect()
                }))
            }

            T::Append | T::Prepend | T::Difference | T::SetInsert | T::SetIntersection | T::SetUnion | T::SetDifference => {
                let items = as_array(&receiver)?.clone();
                let operand = self.value(call.arg(1)?)?;
                self.array_op(call.term_type, items, operand)
            }
            T::InsertAt | T::DeleteAt | T::ChangeAt | T::SpliceAt => self.splice(call, receiver),

            T::Add | T::Sub | T::Mul | T::Div | T::Mod => {
                let operation: fn(Value, Value) -> Result<Value> = match call.term_type {
                    T::Add => value::add,
                    T::Sub => value::sub,
                    T::Mul => value::mul,
                    T::Div => value::div,
                    _ => value::modulo,
                };
                args.iter().try_fold(receiver, |acc, arg| operation(acc, self.value(arg)?))
            }
            T::Floor | T::Ceil | T::Round => {
                let n = as_number(&receiver)?;
                number(match call.term_type {
                    T::Floor => n.floor(),
                    T::Ceil => n.ceil(),
                    _ => n.round(),
                })
            }
            T::Eq | T::Ne | T::Lt | T::Le | T::Gt | T::Ge => {
                let mut operands = vec![receiver];
                operands.extend(self.values(args)?);
                let all_equal = operands.windows(2).all(|pair| equals(&pair[0], &pair[1]));
                let holds = |wanted: &dyn Fn(Ordering) -> bool| operands.windows(2).all(|pair| wanted(compare(&pair[0], &pair[1])));
                Ok(Value::Bool(match call.term_type {
                    T::Eq => all_equal,
                    T::Ne => !all_equal,
                    T::Lt => holds(&|o| o == Ordering::Less),
                    T::Le => holds(&|o| o != Ordering::Greater),
                    T::Gt => holds(&|o| o == Ordering::Greater),
                    _ => holds(&|o| o != Ordering::Less),
                }))
            }
            T::Not => Ok(Value::Bool(!truthy(&receiver))),

            T::InTimezone => time::in_timezone(&receiver, &self.value(call.arg(1)?)?),
            T::Timezone => {
                time::epoch(&receiver)?;
                Ok(receiver.get("timezone").cloned().unwrap_or_else(|| Value::String("+00:00".to_string())))
            }
            T::During => time::during(
                &receiver,
                &self.value(call.arg(1)?)?,
                &self.value(call.arg(2)?)?,
                !bound_is_closed(call, "left_bound", "closed")?,
                bound_is_closed(call, "right_bound", "open")?,
            ),
            T::Date => time::date(&receiver),
            T::TimeOfDay => time::time_of_day(&receiver),
            T::Year | T::Month | T::Day | T::DayOfWeek | T::DayOfYear | T::Hours | T::Minutes | T::Seconds => {
                time::component(&receiver, call.term_type.descriptor().method)
            }
            T::ToIso8601 => time::to_iso8601(&receiver),
            T::ToEpochTime => number(time::epoch(&receiver)?),

            T::Match => regex_match(as_str(&receiver)?, &self.string(call.arg(1)?)?),
            T::Split => {
                let separator = match args.first() {
                    Some(separator) => match self.value(separator)? {
                        Value::Null => None,
                        separator => Some(as_str(&separator)?.to_string()),
                    },
                    None => None,
                };
                let limit = match args.get(1) {
                    Some(limit) => Some(self.integer(limit)?.max(0) as usize),
                    None => None,
                };
                Ok(split(as_str(&receiver)?, separator.as_deref(), limit))
            }
            T::Upcase => Ok(Value::String(as_str(&receiver)?.to_uppercase())),
            T::Downcase => Ok(Value::String(as_str(&receiver)?.to_lowercase())),

            T::CoerceTo => coerce(receiver, &self.string(call.arg(1)?)?),
            T::ToJsonString => Ok(Value::String(serde_json::to_string(&receiver)?)),

            other => {
                warn!("no in-memory implementation of {}", other);
                Err(DriverError::Unsupported(other.name().to_string()))
            }
        }
    }

    fn non_null<'v>(&self, value: &'v Value) -> Result<&'v Value> {
        match value {
            Value::Null => Err(DriverError::NotFound(
                "Cannot perform this operation on a non-object non-sequence `null`.".to_string(),
            )),
            value => Ok(value),
        }
    }

    /// Applies `f` to an object, or to every object of a sequence.
    fn each_document(&self, receiver: Value, f: impl Fn(&Value) -> Result<Value>) -> Result<Value> {
        match self.non_null(&receiver)? {
            Value::Array(rows) => rows.iter().map(f).collect::<Result<Vec<_>>>().map(Value::Array),
            document => f(document),
        }
    }

    /// Field of an object; over a sequence, the field of every row that has it.
    fn get_field(&self, receiver: Value, field: &str) -> Result<Value> {
        match self.non_null(&receiver)? {
            Value::Array(rows) => Ok(Value::Array(rows.iter().filter_map(|row| row.get(field).cloned()).collect())),
            document => value::get_field(document, field).cloned(),
        }
    }

    fn count(&self, call: &Call, receiver: Value) -> Result<Value> {
        let rows = match receiver {
            Value::String(text) => return Ok(Value::from(text.chars().count())),
            Value::Object(object) if !object.contains_key(REQL_TYPE) => return Ok(Value::from(object.len())),
            Value::Array(rows) => rows,
            other => return Err(runtime(format!("Cannot convert {} to SEQUENCE", type_name(&other)))),
        };
        let Some(needle) = call.args.get(1) else { return Ok(Value::from(rows.len())) };
        let mut count = 0usize;
        match needle {
            Handle::Func(_) => {
                for row in &rows {
                    if truthy(&self.apply(needle, std::slice::from_ref(row))?) {
                        count += 1;
                    }
                }
            }
            other => {
                let needle = self.value(other)?;
                count = rows.iter().filter(|row| equals(row, &needle)).count();
            }
        }
        Ok(Value::from(count))
    }

    /// Values selected for `sum` and `avg`; rows missing the field are skipped.
    fn projected(&self, call: &Call, receiver: &Value) -> Result<Vec<Value>> {
        let rows = as_array(receiver)?;
        let Some(selector) = call.args.get(1) else { return Ok(rows.clone()) };
        let mut projected = Vec::with_capacity(rows.len());
        for row in rows {
            match self.select(selector, row) {
                Ok(found) => projected.push(found),
                Err(DriverError::NotFound(_)) => {}
                Err(error) => return Err(error),
            }
        }
        Ok(projected)
    }

    /// The row whose selected value is smallest (`min`) or largest (`max`).
    fn extreme(&self, call: &Call, receiver: Value) -> Result<Value> {
        let wanted = if call.term_type == TermType::Min { Ordering::Less } else { Ordering::Greater };
        let selector = match (call.args.get(1), call.option("index")) {
            (Some(selector), _) => Some(selector.clone()),
            (None, Some(index)) => Some(Handle::expr(Value::String(ordering_key(index)?.0.to_string()))),
            (None, None) => None,
        };
        let mut best: Option<(Value, Value)> = None;
        for row in as_array(&receiver)? {
            let key = match &selector {
                Some(selector) => match self.select(selector, row) {
                    Ok(key) => key,
                    Err(DriverError::NotFound(_)) => continue,
                    Err(error) => return Err(error),
                },
                None => row.clone(),
            };
            if best.as_ref().map_or(true, |(current, _)| compare(&key, current) == wanted) {
                best = Some((key, row.clone()));
            }
        }
        best.map(|(_, row)| row).ok_or_else(|| {
            runtime(format!(
                "Cannot take the {} of an empty stream. (If you passed `{}` a field name, it may be that no elements of the stream had that field.)",
                call.term_type.descriptor().method,
                call.term_type.descriptor().method
            ))
        })
    }

    fn group(&self, call: &Call, receiver: Value) -> Result<Value> {
        let mut selectors: Vec<Handle> = call.args[1..].to_vec();
        if let Some(index) = call.option("index") {
            selectors.insert(0, Handle::expr(Value::String(ordering_key(index)?.0.to_string())));
        }
        if selectors.is_empty() {
            return Err(runtime("GROUP needs at least one field or function."));
        }

        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        for row in as_array(&receiver)? {
            let mut keys = selectors
                .iter()
                .map(|selector| match self.select(selector, row) {
                    Err(DriverError::NotFound(_)) => Ok(Value::Null),
                    other => other,
                })
                .collect::<Result<Vec<_>>>()?;
            let key = if keys.len() == 1 { keys.remove(0) } else { Value::Array(keys) };
            match groups.iter_mut().find(|(existing, _)| equals(existing, &key)) {
                Some((_, members)) => members.push(row.clone()),
                None => groups.push((key, vec![row.clone()])),
            }
        }
        groups.sort_by(|(a, _), (b, _)| compare(a, b));
        Ok(grouped_data(groups.into_iter().map(|(key, rows)| json!([key, rows])).collect()))
    }

    /// Sums the write summaries produced for every row.
    fn for_each(&self, call: &Call, receiver: Value) -> Result<Value> {
        let function = call.arg(1)?;
        let mut total = WriteSummary::default();
        for row in as_array(&receiver)? {
            let results = match self.apply(function, std::slice::from_ref(row))? {
                Value::Array(results) => results,
                single => vec![single],
            };
            for result in results {
                if !result.is_object() {
                    return Err(runtime(format!("FOR_EACH expects write queries, found {}.", type_name(&result))));
                }
                total.absorb(serde_json::from_value(result)?);
            }
        }
        Ok(serde_json::to_value(total)?)
    }

    fn array_op(&self, term_type: TermType, mut items: Vec<Value>, operand: Value) -> Result<Value> {
        use TermType as T;
        Ok(Value::Array(match term_type {
            T::Append => {
                items.push(operand);
                items
            }
            T::Prepend => {
                items.insert(0, operand);
                items
            }
            T::SetInsert => {
                items.push(operand);
                value::distinct(items)
            }
            T::Difference => {
                let operand = as_array(&operand)?;
                items.into_iter().filter(|item| !value::contains(operand, item)).collect()
            }
            T::SetIntersection => {
                let operand = as_array(&operand)?;
                value::distinct(items.into_iter().filter(|item| value::contains(operand, item)).collect())
            }
            T::SetUnion => {
                items.extend(as_array(&operand)?.iter().cloned());
                value::distinct(items)
            }
            _ => {
                let operand = as_array(&operand)?;
                value::distinct(items.into_iter().filter(|item| !value::contains(operand, item)).collect())
            }
        }))
    }

    fn splice(&self, call: &Call, receiver: Value) -> Result<Value> {
        use TermType as T;
        let mut items = as_array(&receiver)?.clone();
        let len = items.len();
        let at = self.integer(call.arg(1)?)?;
        let out_of_bounds = || runtime(format!("Index `{}` out of bounds for array of size: `{}`.", at, len));
        match call.term_type {
            T::InsertAt | T::SpliceAt => {
                let position = if at < 0 { len as i64 + 1 + at } else { at };
                if !(0..=len as i64).contains(&position) {
                    return Err(out_of_bounds());
                }
                let inserted = self.value(call.arg(2)?)?;
                let position = position as usize;
                if call.term_type == T::InsertAt {
                    items.insert(position, inserted);
                } else {
                    let tail = items.split_off(position);
                    items.extend(as_array(&inserted)?.iter().cloned());
                    items.extend(tail);
                }
            }
            T::DeleteAt => {
                let start = value::index(at, len).ok_or_else(out_of_bounds)?;
                let end = match call.args.get(2) {
                    Some(end) => {
                        let end = self.integer(end)?;
                        if end < 0 { (len as i64 + end).max(0) as usize } else { (end as usize).min(len) }
                    }
                    None => start + 1,
                };
                if start < end {
                    items.drain(start..end);
                }
            }
            _ => {
                let position = value::index(at, len).ok_or_else(out_of_bounds)?;
                items[position] = self.value(call.arg(2)?)?;
            }
        }
        Ok(Value::Array(items))
    }
}

fn regex_match(text: &str, pattern: &str) -> Result<Value> {
    let regex = Regex::new(pattern).map_err(|error| runtime(format!("Error in regexp `{}`: {}", pattern, error)))?;
    let Some(captures) = regex.captures(text) else { return Ok(Value::Null) };
    let Some(whole) = captures.get(0) else { return Ok(Value::Null) };
    let offset = |byte: usize| text[..byte].chars().count();
    let groups: Vec<Value> = captures
        .iter()
        .skip(1)
        .map(|group| {
            group.map_or(Value::Null, |found| {
                json!({ "str": found.as_str(), "start": offset(found.start()), "end": offset(found.end()) })
            })
        })
        .collect();
    Ok(json!({
        "str": whole.as_str(),
        "start": offset(whole.start()),
        "end": offset(whole.end()),
        "groups": groups,
    }))
}

fn split(text: &str, separator: Option<&str>, limit: Option<usize>) -> Value {
    let pieces: Vec<String> = match (separator, limit) {
        (None, None) => text.split_whitespace().map(str::to_string).collect(),
        (None, Some(limit)) => text
            .splitn(limit + 1, char::is_whitespace)
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect(),
        (Some(""), limit) => {
            let chars: Vec<char> = text.chars().collect();
            let cut = limit.unwrap_or(chars.len()).min(chars.len());
            let mut pieces: Vec<String> = chars[..cut].iter().map(char::to_string).collect();
            if cut < chars.len() {
                pieces.push(chars[cut..].iter().collect());
            }
            pieces
        }
        (Some(separator), None) => text.split(separator).map(str::to_string).collect(),
        (Some(separator), Some(limit)) => text.splitn(limit + 1, separator).map(str::to_string).collect(),
    };
    Value::Array(pieces.into_iter().map(Value::String).collect())
}

fn coerce(value: Value, target: &str) -> Result<Value> {
    let target = target.to_uppercase();
    let from = type_name(&value);
    let failed = || runtime(format!("Cannot coerce {} to {}.", from, target));
    match (target.as_str(), value) {
        ("STRING", Value::String(text)) => Ok(Value::String(text)),
        ("STRING", Value::Number(n)) => Ok(Value::String(n.to_string())),
        ("STRING", other) => Ok(Value::String(serde_json::to_string(&other)?)),
        ("NUMBER", Value::String(text)) => number(text.trim().parse::<f64>().map_err(|_| failed())?),
        ("NUMBER", n @ Value::Number(_)) => Ok(n),
        ("BOOL", Value::Bool(b)) => Ok(Value::Bool(b)),
        ("NULL", Value::Null) => Ok(Value::Null),
        ("ARRAY", Value::Array(items)) => Ok(Value::Array(items)),
        ("ARRAY", Value::Object(object)) => Ok(Value::Array(
            object.into_iter().map(|(key, value)| json!([key, value])).collect(),
        )),
        ("OBJECT", Value::Object(object)) => Ok(Value::Object(object)),
        ("OBJECT", Value::Array(pairs)) => {
            let mut object = Map::new();
            for pair in pairs {
                match pair.as_array().map(Vec::as_slice) {
                    Some([Value::String(key), value]) => {
                        object.insert(key.clone(), value.clone());
                    }
                    _ => return Err(failed()),
                }
            }
            Ok(Value::Object(object))
        }
        _ => Err(failed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_groups() {
        let matched = regex_match("name: stan", r"(\w+): (\w+)").unwrap();
        assert_eq!(matched["str"], json!("name: stan"));
        assert_eq!(matched["groups"][1], json!({"str": "stan", "start": 6, "end": 10}));
        assert_eq!(regex_match("abc", "z").unwrap(), Value::Null);
    }

    #[test]
    fn splitting() {
        assert_eq!(split("  a b  c ", None, None), json!(["a", "b", "c"]));
        assert_eq!(split("a,b,c", Some(","), Some(1)), json!(["a", "b,c"]));
        assert_eq!(split("abc", Some(""), None), json!(["a", "b", "c"]));
    }

    #[test]
    fn coercion() {
        assert_eq!(coerce(json!("12"), "number").unwrap(), json!(12));
        assert_eq!(coerce(json!(1), "STRING").unwrap(), json!("1"));
        assert_eq!(coerce(json!({"a": 1}), "array").unwrap(), json!([["a", 1]]));
        assert_eq!(coerce(json!([["a", 1]]), "object").unwrap(), json!({"a": 1}));
        assert!(coerce(json!("x"), "number").is_err());
    }

    #[test]
    fn index_options() {
        assert_eq!(ordering_key(&json!("num")).unwrap(), ("num", false));
        assert_eq!(ordering_key(&json!([74, ["num"]])).unwrap(), ("num", true));
        assert!(ordering_key(&json!(3)).is_err());
    }
}
