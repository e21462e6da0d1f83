use reql_query_lib::{MemoryStore, Options, Query, QueryError};
use serde_json::Value;

pub fn store() -> MemoryStore {
    MemoryStore::from_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures")).expect("fixtures load")
}

pub fn run(input: &str) -> Result<Value, QueryError> {
    let term: Value = serde_json::from_str(input).expect("query is JSON");
    Query::new(term, Options::default()).run(&store())
}

pub fn process(input: &str) -> Vec<String> {
    match run(input).expect("query runs") {
        Value::Array(items) => items.iter().map(Value::to_string).collect(),
        value => vec![value.to_string()],
    }
}
