mod common;
use common::{process, run};
use reql_query_lib::{DriverError, QueryError};

#[test]
fn filter() {
    let result = process(r#"[43, [[39, [[15, ["bills"]], {"credit": true}]]]]"#);
    assert_eq!(result, vec!["2"]);

    let result = process(r#"[33, [[39, [[15, ["bills"]], [69, [[2, [1]], [21, [[170, [[10, [1]], "amount"]], 20]]]]]], "id"]]"#);
    assert_eq!(result, vec![r#"{"id":2}"#, r#"{"id":4}"#]);
}

#[test]
fn implicit_var() {
    let result = process(r#"[43, [[39, [[15, ["bills"]], [69, [[2, [1]], [17, [[170, [[13, []], "owner"]], "noel"]]]]]]]]"#);
    assert_eq!(result, vec!["2"]);
}

#[test]
fn string_keys() {
    let result = process(r#"[170, [[16, [[15, ["people"]], "wei"]], "age"]]"#);
    assert_eq!(result, vec!["44"]);
}

#[test]
fn grouped_sum() {
    let result = process(r#"[150, [[145, [[144, [[15, ["bills"]], "owner"]], "amount"]]]]"#);
    assert_eq!(
        result,
        vec![
            r#"{"group":"noel","reduction":30}"#,
            r#"{"group":"sunny","reduction":10}"#,
            r#"{"group":"wei","reduction":40}"#
        ]
    );
}

#[test]
fn contains_tag() {
    let query = r#"[43, [[39, [[15, ["people"]], [69, [[2, [1]], [93, [[170, [[10, [1]], "tags"]], "admin"]]]]]]]]"#;
    assert_eq!(process(query), vec!["2"]);
}

#[test]
fn missing_table() {
    let result = run(r#"[43, [[15, ["nothing"]]]]"#);
    assert!(matches!(result, Err(QueryError::Driver(DriverError::NotFound(_)))));
}

#[test]
fn unknown_term() {
    let result = run("[9999, []]");
    assert!(matches!(result, Err(QueryError::UnknownTerm(_))));
}
