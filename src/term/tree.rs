use std::collections::VecDeque;

use serde_json::{json, Value};

use super::{shape, Shape};

/// Positional binary view of a term array, used for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryTree {
    pub value: Value,
    pub left: Option<Box<BinaryTree>>,
    pub right: Option<Box<BinaryTree>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    Postorder,
    Preorder,
    Inorder,
    Levelorder,
}

#[derive(Clone, Copy)]
enum Visit {
    Left,
    Node,
    Right,
}

impl BinaryTree {
    pub fn new(value: Value, left: Option<BinaryTree>, right: Option<BinaryTree>) -> Self {
        BinaryTree {
            value,
            left: left.map(Box::new),
            right: right.map(Box::new),
        }
    }

    pub fn leaf(value: Value) -> Self {
        BinaryTree::new(value, None, None)
    }

    pub fn postorder<F: FnMut(&Value)>(&self, mut visitor: F) {
        self.walk(&mut visitor, &[Visit::Left, Visit::Right, Visit::Node]);
    }

    pub fn preorder<F: FnMut(&Value)>(&self, mut visitor: F) {
        self.walk(&mut visitor, &[Visit::Node, Visit::Left, Visit::Right]);
    }

    pub fn inorder<F: FnMut(&Value)>(&self, mut visitor: F) {
        self.walk(&mut visitor, &[Visit::Left, Visit::Node, Visit::Right]);
    }

    pub fn levelorder<F: FnMut(&Value)>(&self, mut visitor: F) {
        let mut queue = VecDeque::from([self]);
        while let Some(node) = queue.pop_front() {
            visitor(&node.value);
            if let Some(left) = &node.left {
                queue.push_back(left);
            }
            if let Some(right) = &node.right {
                queue.push_back(right);
            }
        }
    }

    pub fn traverse<F: FnMut(&Value)>(&self, order: Traversal, visitor: F) {
        match order {
            Traversal::Postorder => self.postorder(visitor),
            Traversal::Preorder => self.preorder(visitor),
            Traversal::Inorder => self.inorder(visitor),
            Traversal::Levelorder => self.levelorder(visitor),
        }
    }

    /// Nested-array view of the tree. A node with two children reads
    /// `[left, value, right]`, a node with only a left child `[value, left]`,
    /// and array payloads are tagged as `{"array": [...]}`.
    pub fn nested(&self) -> Value {
        let value = match &self.value {
            array @ Value::Array(_) => json!({ "array": array }),
            other => other.clone(),
        };
        let mut nested = vec![value];
        match (&self.left, &self.right) {
            (Some(left), Some(_)) => nested.insert(0, left.nested()),
            (Some(left), None) => nested.push(left.nested()),
            _ => {}
        }
        if let Some(right) = &self.right {
            nested.push(right.nested());
        }
        Value::Array(nested)
    }

    fn walk(&self, visitor: &mut dyn FnMut(&Value), order: &[Visit]) {
        for step in order {
            match step {
                Visit::Node => visitor(&self.value),
                Visit::Left => {
                    if let Some(left) = &self.left {
                        left.walk(visitor, order)
                    }
                }
                Visit::Right => {
                    if let Some(right) = &self.right {
                        right.walk(visitor, order)
                    }
                }
            }
        }
    }
}

/// Builds the binary view of `node`.
///
/// An operator's first two children become `left` and `right`. The payload
/// of make-array and variable nodes becomes a single literal leaf.
pub fn parse(node: &Value) -> BinaryTree {
    let (found, head) = match shape(node) {
        Some(found @ Shape { head: Some(head), .. }) => (found, head),
        _ => return BinaryTree::leaf(node.clone()),
    };

    match found.payload {
        Some(payload @ Value::Array(_)) if found.is_opaque() => {
            BinaryTree::new(head.clone(), Some(BinaryTree::leaf(payload.clone())), None)
        }
        Some(Value::Array(children)) => BinaryTree::new(
            head.clone(),
            children.first().map(parse),
            children.get(1).map(parse),
        ),
        _ => BinaryTree::leaf(head.clone()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::term::translate;

    fn reql() -> Value {
        json!([39, [[15, [[14, ["test"]], "bills"]], {"credit": true}]])
    }

    fn collect(order: Traversal) -> Vec<Value> {
        let mut values = Vec::new();
        parse(&reql()).traverse(order, |value| {
            let named = value
                .as_u64()
                .and_then(translate)
                .map(|name| Value::String(name.to_string()));
            values.push(named.unwrap_or_else(|| value.clone()));
        });
        values
    }

    #[test]
    fn simple_case() {
        let tree = parse(&json!([15, [[14, ["test"]], "meals"]]));
        let expected = BinaryTree::new(
            json!(15),
            Some(BinaryTree::new(json!(14), Some(BinaryTree::leaf(json!("test"))), None)),
            Some(BinaryTree::leaf(json!("meals"))),
        );
        assert_eq!(tree, expected);
    }

    #[test]
    fn make_array_keeps_payload() {
        let tree = parse(&json!([2, [10, 20, 30]]));
        assert_eq!(
            tree,
            BinaryTree::new(json!(2), Some(BinaryTree::leaf(json!([10, 20, 30]))), None)
        );
    }

    #[test]
    fn var_keeps_payload() {
        let tree = parse(&json!([10, [1]]));
        assert_eq!(tree, BinaryTree::new(json!(10), Some(BinaryTree::leaf(json!([1]))), None));
    }

    #[test]
    fn postorder() {
        assert_eq!(
            collect(Traversal::Postorder),
            vec![json!("test"), json!("DB"), json!("bills"), json!("TABLE"), json!({"credit": true}), json!("FILTER")]
        );
    }

    #[test]
    fn preorder() {
        assert_eq!(
            collect(Traversal::Preorder),
            vec![json!("FILTER"), json!("TABLE"), json!("DB"), json!("test"), json!("bills"), json!({"credit": true})]
        );
    }

    #[test]
    fn inorder() {
        assert_eq!(
            collect(Traversal::Inorder),
            vec![json!("test"), json!("DB"), json!("TABLE"), json!("bills"), json!("FILTER"), json!({"credit": true})]
        );
    }

    #[test]
    fn levelorder() {
        assert_eq!(
            collect(Traversal::Levelorder),
            vec![json!("FILTER"), json!("TABLE"), json!({"credit": true}), json!("DB"), json!("bills"), json!("test")]
        );
    }

    #[test]
    fn nested_view() {
        let tree = parse(&json!([15, [[14, ["test"]], "meals"]]));
        assert_eq!(tree.nested(), json!([[14, ["test"]], 15, ["meals"]]));

        let tree = parse(&json!([2, [10, 20, 30]]));
        assert_eq!(tree.nested(), json!([2, [{"array": [10, 20, 30]}]]));
    }

    #[test]
    fn unknown_heads_still_parse() {
        let tree = parse(&json!([999, ["a", "b"]]));
        assert_eq!(tree, BinaryTree::new(json!(999), Some(BinaryTree::leaf(json!("a"))), Some(BinaryTree::leaf(json!("b")))));
        assert_eq!(parse(&json!([])), BinaryTree::leaf(json!([])));
    }

    #[test]
    fn parsing_twice_is_structurally_equal() {
        let raw = reql();
        assert_eq!(parse(&raw), parse(&raw));
    }
}
