use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::trace;
use serde_json::Value;

use super::{Evaluator, QueryError, Result};
use crate::store::Handle;
use crate::term::TermType;

pub type VarId = u64;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct Frame {
    id: u64,
    bindings: Vec<(VarId, Handle)>,
    parent: Option<Arc<Frame>>,
}

/// Chain of immutable binding frames, innermost first.
///
/// Binding never mutates an existing frame: it returns a new scope whose
/// innermost frame points at the current one, so clones handed to other
/// callers never observe each other's bindings.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    frame: Option<Arc<Frame>>,
}

impl Scope {
    pub fn root() -> Self {
        Scope::default()
    }

    pub fn id(&self) -> Option<u64> {
        self.frame.as_ref().map(|frame| frame.id)
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut frame = self.frame.as_deref();
        while let Some(current) = frame {
            depth += 1;
            frame = current.parent.as_deref();
        }
        depth
    }

    pub fn bind(&self, params: &[VarId], args: Vec<Handle>) -> Result<Scope> {
        if params.len() != args.len() {
            return Err(QueryError::Arity {
                term: TermType::Func,
                expected: params.len().to_string(),
                found: args.len(),
            });
        }
        let frame = Frame {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            bindings: params.iter().copied().zip(args).collect(),
            parent: self.frame.clone(),
        };
        trace!("scope {} binds {:?}", frame.id, params.iter().map(|id| parameter_name(*id)).collect::<Vec<_>>());
        Ok(Scope { frame: Some(Arc::new(frame)) })
    }

    /// Looks `id` up in the innermost frame, then outward.
    pub fn resolve(&self, id: VarId) -> Result<Handle> {
        let mut frame = self.frame.as_deref();
        while let Some(current) = frame {
            if let Some((_, value)) = current.bindings.iter().find(|(bound, _)| *bound == id) {
                return Ok(value.clone());
            }
            frame = current.parent.as_deref();
        }
        Err(QueryError::ScopeResolution(parameter_name(id)))
    }

    /// The sole argument of the innermost one-parameter scope.
    pub fn implicit(&self) -> Result<Handle> {
        match self.frame.as_deref() {
            Some(Frame { bindings, .. }) if bindings.len() == 1 => Ok(bindings[0].1.clone()),
            Some(frame) => Err(QueryError::ScopeResolution(format!(
                "implicit variable in a scope of {} parameters",
                frame.bindings.len()
            ))),
            None => Err(QueryError::ScopeResolution("implicit variable outside of a function".to_string())),
        }
    }
}

pub fn parameter_name(id: VarId) -> String {
    format!("var_{}", id)
}

/// An anonymous function produced by evaluating a `FUNC` term.
///
/// The body stays a raw term; every [`Function::call`] binds a fresh frame
/// on top of the scope the function was defined in and evaluates the body
/// there.
#[derive(Clone)]
pub struct Function {
    params: Arc<[VarId]>,
    body: Arc<Value>,
    env: Scope,
    evaluator: Evaluator,
}

impl Function {
    pub(crate) fn new(params: Vec<VarId>, body: Value, env: Scope, evaluator: Evaluator) -> Self {
        Function {
            params: params.into(),
            body: Arc::new(body),
            env,
            evaluator,
        }
    }

    pub fn params(&self) -> &[VarId] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn call(&self, args: Vec<Handle>) -> Result<Handle> {
        let scope = self.env.bind(&self.params, args)?;
        self.evaluator.evaluate(&self.body, &scope)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params && self.body == other.body
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|id| parameter_name(*id)).collect();
        write!(f, "Function({}) {}", params.join(", "), self.body)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn inner_bindings_shadow_outer() {
        let outer = Scope::root().bind(&[1], vec![Handle::expr(json!("outer"))]).unwrap();
        let inner = outer.bind(&[1, 2], vec![Handle::expr(json!("inner")), Handle::expr(json!(2))]).unwrap();

        assert_eq!(inner.resolve(1).unwrap(), Handle::expr(json!("inner")));
        assert_eq!(outer.resolve(1).unwrap(), Handle::expr(json!("outer")));
        assert_eq!(inner.depth(), 2);
    }

    #[test]
    fn falls_back_to_enclosing_scope() {
        let outer = Scope::root().bind(&[7], vec![Handle::expr(json!(7))]).unwrap();
        let inner = outer.bind(&[8], vec![Handle::expr(json!(8))]).unwrap();
        assert_eq!(inner.resolve(7).unwrap(), Handle::expr(json!(7)));
    }

    #[test]
    fn siblings_are_invisible() {
        let root = Scope::root();
        let first = root.bind(&[1], vec![Handle::expr(json!("first"))]).unwrap();
        let second = root.bind(&[2], vec![Handle::expr(json!("second"))]).unwrap();

        assert!(matches!(second.resolve(1), Err(QueryError::ScopeResolution(_))));
        assert!(matches!(first.resolve(2), Err(QueryError::ScopeResolution(_))));
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn implicit_requires_single_parameter() {
        assert!(matches!(Scope::root().implicit(), Err(QueryError::ScopeResolution(_))));

        let pair = Scope::root().bind(&[1, 2], vec![Handle::expr(json!(1)), Handle::expr(json!(2))]).unwrap();
        assert!(matches!(pair.implicit(), Err(QueryError::ScopeResolution(_))));

        let single = Scope::root().bind(&[3], vec![Handle::expr(json!("row"))]).unwrap();
        assert_eq!(single.implicit().unwrap(), Handle::expr(json!("row")));
    }

    #[test]
    fn arity_mismatch() {
        let result = Scope::root().bind(&[1, 2], vec![Handle::expr(json!(1))]);
        assert!(matches!(result, Err(QueryError::Arity { found: 1, .. })));
    }
}
