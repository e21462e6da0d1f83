mod catalog;
mod functions;
mod selection;

#[cfg(test)]
pub mod test_util {
    use serde_json::{json, Value};

    use crate::query::{Options, Query, QueryError};
    use crate::store::MemoryStore;

    pub const NAMES: [&str; 8] = ["sunny", "noel", "wei", "victor", "tc", "stan", "annie", "tyler"];

    /// `test.sequence` holds 100 rows `{id: n, num: n, name: NAMES[n % 8]}`,
    /// `test.bills` three small documents.
    pub fn fixture() -> MemoryStore {
        let sequence = (0..100)
            .map(|n| json!({"id": n, "num": n, "name": NAMES[n % 8]}))
            .collect();
        let bills = vec![
            json!({"id": 1, "amount": 10, "credit": true}),
            json!({"id": 2, "amount": 25, "credit": false}),
            json!({"id": 3, "amount": 5, "credit": true}),
        ];
        MemoryStore::new()
            .with_table("test", "sequence", sequence)
            .and_then(|store| store.with_table("test", "bills", bills))
            .expect("fixture")
    }

    pub fn run_on(store: &MemoryStore, input: &str) -> Result<Value, QueryError> {
        let term: Value = serde_json::from_str(input).expect("query is JSON");
        println!("Input: {}", input);
        Query::new(term, Options::default()).run(store)
    }

    pub fn run(input: &str) -> Result<Value, QueryError> {
        run_on(&fixture(), input)
    }

    /// Serialized result; sequences yield one entry per element.
    pub fn process(input: &str) -> Vec<String> {
        let value = run(input).expect("query runs");
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| serde_json::to_string(item).expect("serialized"))
                .collect(),
            _ => vec![serde_json::to_string(&value).expect("serialized")],
        }
    }
}
