#[cfg(test)]
mod selection {
    use serde_json::{json, Value};

    use crate::query::{Options, Query, QueryError};
    use crate::store::DriverError;
    use crate::tests::test_util::{fixture, process};

    const TABLE: &str = r#"[15, [[14, ["test"]], "sequence"]]"#;

    fn on_table(template: &str) -> Vec<String> {
        process(&template.replace("TABLE", TABLE))
    }

    #[test]
    fn count() {
        assert_eq!(on_table("[43, [TABLE]]"), vec!["100"]);
        assert_eq!(process(r#"[43, [[15, ["sequence"]]]]"#), vec!["100"]);
    }

    #[test]
    fn database_is_pinned() {
        assert_eq!(process(r#"[43, [[15, [[14, ["elsewhere"]], "sequence"]]]]"#), vec!["100"]);

        let term: Value = serde_json::from_str(r#"[43, [[15, [[14, ["elsewhere"]], "sequence"]]]]"#).unwrap();
        let options = Options {
            pin_database: false,
            ..Options::default()
        };
        let result = Query::new(term, options).run(&fixture());
        assert!(matches!(result, Err(QueryError::Driver(DriverError::NotFound(_)))));
    }

    #[test]
    fn composes_without_running() {
        let term = json!([39, [[15, ["bills"]], {"credit": true}]]);
        let handle = Query::new(term, Options::default()).build().unwrap();
        assert_eq!(handle.to_wire(), json!([39, [[15, [[14, ["test"]], "bills"]], {"credit": true}]]));
    }

    #[test]
    fn get() {
        assert_eq!(on_table("[16, [TABLE, 7]]"), vec![r#"{"id":7,"name":"tyler","num":7}"#]);
        assert_eq!(on_table("[16, [TABLE, 700]]"), vec!["null"]);
    }

    #[test]
    fn get_all() {
        assert_eq!(on_table(r#"[43, [[78, [TABLE, "wei"], {"index": "name"}]]]"#), vec!["13"]);
        assert_eq!(
            on_table(r#"[33, [[78, [TABLE, 3, 5]], "name"]]"#),
            vec![r#"{"name":"victor"}"#, r#"{"name":"stan"}"#]
        );
    }

    #[test]
    fn between() {
        assert_eq!(on_table("[43, [[182, [TABLE, 10, 20]]]]"), vec!["10"]);
        assert_eq!(on_table(r#"[43, [[182, [TABLE, 10, 20], {"right_bound": "closed"}]]]"#), vec!["11"]);
        assert_eq!(on_table("[43, [[182, [TABLE, [180, []], 5]]]]"), vec!["5"]);
        assert_eq!(on_table("[43, [[182, [TABLE, 95, [181, []]]]]]"), vec!["5"]);
    }

    #[test]
    fn filter_with_object_pattern() {
        let result = process(r#"[43, [[39, [[15, [[14, ["test"]], "bills"]], {"credit": true}]]]]"#);
        assert_eq!(result, vec!["2"]);
    }

    #[test]
    fn order_by() {
        assert_eq!(
            on_table(r#"[33, [[71, [[41, [TABLE, [74, ["num"]]]], 3]], "num"]]"#),
            vec![r#"{"num":99}"#, r#"{"num":98}"#, r#"{"num":97}"#]
        );
        assert_eq!(
            on_table(r#"[33, [[71, [[41, [TABLE], {"index": [74, ["num"]]}], 2]], "id"]]"#),
            vec![r#"{"id":99}"#, r#"{"id":98}"#]
        );
    }

    #[test]
    fn aggregation() {
        assert_eq!(on_table(r#"[145, [TABLE, "num"]]"#), vec!["4950"]);
        assert_eq!(on_table(r#"[146, [TABLE, "num"]]"#), vec!["49.5"]);
        assert_eq!(on_table(r#"[148, [TABLE, "num"]]"#), vec![r#"{"id":99,"name":"victor","num":99}"#]);
        assert_eq!(on_table(r#"[43, [[42, [[170, [TABLE, "name"]]]]]]"#), vec!["8"]);
    }

    #[test]
    fn group_then_count() {
        let result = on_table(r#"[150, [[43, [[144, [TABLE, "name"]]]]]]"#);
        assert_eq!(result.len(), 8);
        assert_eq!(result[0], r#"{"group":"annie","reduction":12}"#);
        assert_eq!(result[7], r#"{"group":"wei","reduction":13}"#);
    }

    #[test]
    fn skip_slice_nth() {
        assert_eq!(on_table(r#"[43, [[70, [TABLE, 90]]]]"#), vec!["10"]);
        assert_eq!(process(r#"[30, [[2, [0, 1, 2, 3, 4]], 1, -1]]"#), vec!["1", "2", "3"]);
        assert_eq!(process(r#"[45, [[2, [5, 6, 7]], -1]]"#), vec!["7"]);
        assert_eq!(on_table("[43, [[81, [TABLE, 3]]]]"), vec!["3"]);
    }
}
