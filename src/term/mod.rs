//! Wire-level term model.
//!
//! A term is either a bare JSON value (a literal) or an array
//! `[code, args, optargs?]` naming an operation from the [`catalog`].
//! [`shape`] is the only place that splits a node into head and payload;
//! [`classify`] and the tree view both build on it.

use serde_json::{Map, Value};

use crate::query::QueryError;

pub mod catalog;
pub mod tree;

pub use catalog::{lookup, translate, Consumption, OperationDescriptor, TermType};

pub type Options = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Term<'a> {
    Literal(&'a Value),
    Operator(Operator<'a>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operator<'a> {
    pub term_type: TermType,
    pub args: Args<'a>,
    pub optargs: Option<&'a Options>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Args<'a> {
    /// Child terms, classified lazily by whoever consumes them.
    Terms(&'a [Value]),
    /// A single payload passed through untouched.
    Opaque(&'a Value),
}

impl<'a> Args<'a> {
    pub fn len(&self) -> usize {
        match self {
            Args::Terms(terms) => terms.len(),
            Args::Opaque(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn terms(&self) -> &'a [Value] {
        match self {
            Args::Terms(terms) => terms,
            Args::Opaque(payload) => std::slice::from_ref(*payload),
        }
    }
}

impl<'a> Operator<'a> {
    pub fn descriptor(&self) -> OperationDescriptor {
        self.term_type.descriptor()
    }

    /// The raw payload of an opaque-payload node.
    pub fn payload(&self) -> Option<&'a Value> {
        match self.args {
            Args::Opaque(payload) => Some(payload),
            Args::Terms(_) => None,
        }
    }

    pub fn arg(&self, index: usize) -> Option<&'a Value> {
        self.args.terms().get(index)
    }
}

/// Unvalidated view of an array node: its head, the term type the head
/// names (if any), and the raw args and optargs elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shape<'a> {
    pub head: Option<&'a Value>,
    pub term_type: Option<TermType>,
    pub payload: Option<&'a Value>,
    pub optargs: Option<&'a Value>,
}

impl<'a> Shape<'a> {
    pub fn is_opaque(&self) -> bool {
        self.term_type.map_or(false, TermType::has_opaque_payload)
    }
}

/// Never fails: `None` means `node` is not an array and is a literal.
pub fn shape(node: &Value) -> Option<Shape<'_>> {
    let elements = node.as_array()?;
    let head = elements.first();
    Some(Shape {
        head,
        term_type: head.and_then(Value::as_u64).and_then(TermType::from_code),
        payload: elements.get(1),
        optargs: elements.get(2),
    })
}

pub fn classify(node: &Value) -> Result<Term<'_>, QueryError> {
    let shape = match shape(node) {
        Some(shape) => shape,
        None => return Ok(Term::Literal(node)),
    };

    let head = shape.head.ok_or_else(|| QueryError::UnknownTerm(Value::Null))?;
    let term_type = shape.term_type.ok_or_else(|| QueryError::UnknownTerm(head.clone()))?;

    let args = match shape.payload {
        None => Args::Terms(&[]),
        Some(payload) if shape.is_opaque() => Args::Opaque(payload),
        Some(Value::Array(terms)) => Args::Terms(terms),
        Some(payload) => Args::Opaque(payload),
    };

    let optargs = match shape.optargs {
        None | Some(Value::Null) => None,
        Some(Value::Object(options)) => Some(options),
        Some(other) => {
            return Err(QueryError::Malformed(format!(
                "optional arguments of {} must be an object, found {}",
                term_type, other
            )))
        }
    };

    Ok(Term::Operator(Operator { term_type, args, optargs }))
}

/// Rejects unknown and forbidden codes anywhere below `node` without
/// evaluating it. Opaque payloads and the optargs of anything but MAKE_OBJ
/// are data and are not inspected.
pub fn check(node: &Value) -> Result<(), QueryError> {
    let operator = match classify(node)? {
        Term::Literal(_) => return Ok(()),
        Term::Operator(operator) => operator,
    };
    if operator.term_type.is_forbidden() {
        return Err(QueryError::UnsupportedOperation(operator.term_type));
    }
    if let Args::Terms(terms) = operator.args {
        terms.iter().try_for_each(check)?;
    }
    if operator.term_type == TermType::MakeObj {
        operator.optargs.into_iter().flat_map(Map::values).try_for_each(check)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn non_arrays_are_literals() {
        let node = json!({"credit": true});
        assert_eq!(classify(&node).unwrap(), Term::Literal(&node));

        let node = json!("bills");
        assert!(matches!(classify(&node).unwrap(), Term::Literal(_)));
    }

    #[test]
    fn variable_payload_is_opaque() {
        let node = json!([10, [1]]);
        let Term::Operator(operator) = classify(&node).unwrap() else {
            panic!("expected operator");
        };
        assert_eq!(operator.term_type, TermType::Var);
        assert_eq!(operator.payload(), Some(&json!([1])));
    }

    #[test]
    fn make_array_payload_is_opaque() {
        let node = json!([2, [10, 20, 30]]);
        let Term::Operator(operator) = classify(&node).unwrap() else {
            panic!("expected operator");
        };
        assert_eq!(operator.term_type, TermType::MakeArray);
        assert_eq!(operator.payload(), Some(&json!([10, 20, 30])));
        assert_eq!(operator.args.len(), 1);
    }

    #[test]
    fn operator_args_stay_unclassified() {
        let node = json!([15, [[14, ["test"]], "bills"]]);
        let Term::Operator(operator) = classify(&node).unwrap() else {
            panic!("expected operator");
        };
        assert_eq!(operator.args, Args::Terms(&[json!([14, ["test"]]), json!("bills")]));
        assert_eq!(operator.optargs, None);
    }

    #[test]
    fn optional_arguments() {
        let node = json!([78, [[15, ["sequence"]], "stan"], {"index": "name"}]);
        let Term::Operator(operator) = classify(&node).unwrap() else {
            panic!("expected operator");
        };
        assert_eq!(operator.optargs.and_then(|o| o.get("index")), Some(&json!("name")));
    }

    #[test]
    fn unknown_codes() {
        assert!(matches!(classify(&json!([999, []])), Err(QueryError::UnknownTerm(_))));
        assert!(matches!(classify(&json!(["a", "b"])), Err(QueryError::UnknownTerm(_))));
        assert!(matches!(classify(&json!([])), Err(QueryError::UnknownTerm(_))));
    }

    #[test]
    fn shapes_never_fail() {
        assert_eq!(shape(&json!("bills")), None);

        let node = json!([999, []]);
        let found = shape(&node).unwrap();
        assert_eq!(found.head, Some(&json!(999)));
        assert_eq!(found.term_type, None);

        let node = json!([10, [1]]);
        assert!(shape(&node).unwrap().is_opaque());
        assert_eq!(shape(&json!([])).unwrap().head, None);
    }

    #[test]
    fn check_walks_nested_terms() {
        assert!(check(&json!([39, [[15, ["bills"]], {"credit": true}]])).is_ok());
        assert!(matches!(
            check(&json!([24, [1, [48, [[2, []], [2, []], 1]]]])),
            Err(QueryError::UnsupportedOperation(TermType::InnerJoin))
        ));
        assert!(matches!(check(&json!([24, [1, [999, []]]])), Err(QueryError::UnknownTerm(_))));
        assert!(matches!(check(&json!([3, [], {"a": [11, ["x"]]}])), Err(QueryError::UnsupportedOperation(_))));
    }

    #[test]
    fn check_leaves_payloads_alone() {
        assert!(check(&json!([2, [[999, []], 1]])).is_ok());
        assert!(check(&json!([10, [999]])).is_ok());
        assert!(check(&json!([78, [[15, ["t"]], 1], {"index": [999, []]}])).is_ok());
    }
}
