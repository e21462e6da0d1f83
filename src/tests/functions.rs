#[cfg(test)]
mod functions {
    use serde_json::json;

    use crate::query::{Evaluator, QueryError, Scope};
    use crate::store::Handle;
    use crate::tests::test_util::{process, run};

    const TABLE: &str = r#"[15, [[14, ["test"]], "sequence"]]"#;

    #[test]
    fn fresh_scope_per_call() {
        let identity = Evaluator::default()
            .evaluate(&json!([69, [[2, [1]], [10, [1]]]]), &Scope::root())
            .unwrap();
        let function = match identity {
            Handle::Func(function) => function,
            other => panic!("expected a function, got {:?}", other),
        };

        assert_eq!(function.call(vec![Handle::expr(json!(1))]).unwrap(), Handle::expr(json!(1)));
        assert_eq!(function.call(vec![Handle::expr(json!(2))]).unwrap(), Handle::expr(json!(2)));
        assert!(matches!(function.call(vec![]), Err(QueryError::Arity { .. })));
    }

    #[test]
    fn map() {
        let result = process(r#"[38, [[2, [1, 2, 3]], [69, [[2, [1]], [26, [[10, [1]], 2]]]]]]"#);
        assert_eq!(result, vec!["2", "4", "6"]);
    }

    #[test]
    fn map_reduce() {
        let query = format!(
            r#"[37, [[38, [{}, [69, [[2, [1]], [170, [[10, [1]], "num"]]]]]], [69, [[2, [1, 2]], [24, [[10, [1]], [10, [2]]]]]]]]"#,
            TABLE
        );
        assert_eq!(process(&query), vec!["4950"]);
    }

    #[test]
    fn filter_with_function() {
        let query = format!(
            r#"[43, [[39, [{}, [69, [[2, [1]], [17, [[28, [[170, [[10, [1]], "num"]], 2]], 0]]]]]]]]"#,
            TABLE
        );
        assert_eq!(process(&query), vec!["50"]);
    }

    #[test]
    fn implicit_variable() {
        let query = format!(
            r#"[43, [[39, [{}, [69, [[2, [1]], [17, [[170, [[13, []], "name"]], "wei"]]]]]]]]"#,
            TABLE
        );
        assert_eq!(process(&query), vec!["13"]);
    }

    #[test]
    fn closures_see_enclosing_parameters() {
        let query = r#"[64, [[69, [[2, [1]], [64, [[69, [[2, [2]], [24, [[10, [1]], [10, [2]]]]]], 5]]]], 10]]"#;
        assert_eq!(process(query), vec!["15"]);
    }

    #[test]
    fn inner_parameters_shadow_outer() {
        let query = r#"[64, [[69, [[2, [1]], [64, [[69, [[2, [1]], [10, [1]]]], "inner"]]]], "outer"]]"#;
        assert_eq!(process(query), vec![r#""inner""#]);
    }

    #[test]
    fn unresolved_variables() {
        assert!(matches!(run(r#"[10, [5]]"#), Err(QueryError::ScopeResolution(name)) if name == "var_5"));
        assert!(matches!(run(r#"[170, [[13, []], "a"]]"#), Err(QueryError::ScopeResolution(_))));
    }

    #[test]
    fn call_arity_mismatch() {
        let query = r#"[38, [[2, [1, 2]], [69, [[2, [1, 2]], [10, [1]]]]]]"#;
        assert!(matches!(run(query), Err(QueryError::Arity { found: 1, .. })));
    }

    #[test]
    fn branch_and_default() {
        assert_eq!(process(r#"[65, [[21, [3, 2]], "big", "small"]]"#), vec![r#""big""#]);
        assert_eq!(process(r#"[65, [false, [12, ["never"]], "small"]]"#), vec![r#""small""#]);
        assert_eq!(process(r#"[92, [[170, [{"a": 1}, "b"]], "missing"]]"#), vec![r#""missing""#]);
        assert_eq!(process(r#"[92, [[170, [{"a": 1}, "a"]], "missing"]]"#), vec!["1"]);
    }

    #[test]
    fn user_error() {
        let error = run(r#"[12, ["boom"]]"#).unwrap_err();
        assert_eq!(error.to_string(), "boom");
    }
}
