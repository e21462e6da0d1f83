#[cfg(test)]
mod catalog {
    use serde_json::json;

    use crate::query::{Evaluator, Options, Query, QueryError, Scope};
    use crate::term::TermType;
    use crate::tests::test_util::run;

    #[test]
    fn every_known_code_is_recognized() {
        let evaluator = Evaluator::default();
        for term_type in TermType::ALL.iter().filter(|term_type| !term_type.is_forbidden()) {
            let result = evaluator.evaluate(&json!([term_type.code(), []]), &Scope::root());
            assert!(
                !matches!(result, Err(QueryError::UnknownTerm(_))),
                "{} was not recognized",
                term_type
            );
        }
    }

    #[test]
    fn forbidden_codes_are_rejected_by_name() {
        let evaluator = Evaluator::default();
        for term_type in TermType::ALL.iter().filter(|term_type| term_type.is_forbidden()) {
            let error = evaluator
                .evaluate(&json!([term_type.code(), ["anything"]]), &Scope::root())
                .unwrap_err();
            assert!(matches!(error, QueryError::UnsupportedOperation(found) if found == *term_type));
            assert_eq!(error.to_string(), format!("illegal query {}", term_type.name()));
        }
    }

    #[test]
    fn db_create() {
        let error = run(r#"[57, ["foo"]]"#).unwrap_err();
        assert_eq!(error.to_string(), "illegal query DB_CREATE");
    }

    #[test]
    fn unknown_code() {
        assert!(matches!(run(r#"[999, []]"#), Err(QueryError::UnknownTerm(_))));
        assert!(matches!(run(r#"[]"#), Err(QueryError::UnknownTerm(_))));
        assert!(matches!(run(r#"["ADD", [1, 2]]"#), Err(QueryError::UnknownTerm(_))));
    }

    #[test]
    fn arity_is_checked_before_dispatch() {
        assert!(matches!(run(r#"[24, [1]]"#), Err(QueryError::Arity { term: TermType::Add, found: 1, .. })));
        assert!(matches!(run(r#"[24, [1, 2], {"x": 1}]"#), Err(QueryError::Malformed(_))));
    }

    #[test]
    fn function_bodies_are_checked_when_defined() {
        let forbidden = json!([39, [[15, ["bills"]], [69, [[2, [1]], [48, [[10, [1]], 1, 2]]]]]]);
        let result = Query::new(forbidden, Options::default()).build();
        assert!(matches!(result, Err(QueryError::UnsupportedOperation(TermType::InnerJoin))));

        let unknown = json!([39, [[15, ["bills"]], [69, [[2, [1]], [999, []]]]]]);
        let result = Query::new(unknown, Options::default()).build();
        assert!(matches!(result, Err(QueryError::UnknownTerm(_))));

        assert!(matches!(
            run(r#"[39, [[2, []], [69, [[2, [1]], [999, []]]]]]"#),
            Err(QueryError::UnknownTerm(_))
        ));
        assert!(matches!(
            run(r#"[38, [[2, []], [69, [[2, [1]], [24, [[10, [1]], [69, [[2, [2]], [11, ["x"]]]]]]]]]]"#),
            Err(QueryError::UnsupportedOperation(TermType::Javascript))
        ));
    }

    #[test]
    fn unbound_variables_wait_for_the_call() {
        let term = json!([69, [[2, [1]], [24, [[10, [7]], 1]]]]);
        assert!(Evaluator::default().evaluate(&term, &Scope::root()).is_ok());
    }
}
