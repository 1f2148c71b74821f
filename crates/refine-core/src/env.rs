//! Variable environments.
//!
//! Unlike the teacher's `ScopeTree`/`Rib` (a mutable arena mutated in
//! place as scopes open and close), `Environment` here is persistent:
//! extending it never mutates the parent, it allocates a new frame that
//! points back to the old one. That's required because a `Closure`
//! captures an `Environment` by value (cheap — it's an `Rc` chain) and
//! the same parent environment may go on to be extended differently in
//! sibling branches (e.g. the two arms of an `if`) without those
//! extensions being visible to each other.

use crate::value::SValue;
use refine_util::Symbol;
use std::rc::Rc;

#[derive(Debug)]
struct Frame {
    name: Symbol,
    value: SValue,
    parent: Environment,
}

/// A persistent, singly-linked environment. Cloning is `O(1)` (bumps an
/// `Rc` refcount); extending never mutates `self`.
#[derive(Debug, Clone)]
pub struct Environment(Option<Rc<Frame>>);

impl Environment {
    pub fn empty() -> Self {
        Environment(None)
    }

    /// Bind `name` to `value`, shadowing any existing binding of the same
    /// name, without touching `self`.
    pub fn extend(&self, name: Symbol, value: SValue) -> Environment {
        Environment(Some(Rc::new(Frame {
            name,
            value,
            parent: self.clone(),
        })))
    }

    /// Bind several names at once, innermost-last (later entries shadow
    /// earlier ones), in a single pass.
    pub fn extend_many(&self, bindings: impl IntoIterator<Item = (Symbol, SValue)>) -> Environment {
        let mut env = self.clone();
        for (name, value) in bindings {
            env = env.extend(name, value);
        }
        env
    }

    pub fn lookup(&self, name: Symbol) -> Option<SValue> {
        let mut cursor = &self.0;
        while let Some(frame) = cursor {
            if frame.name == name {
                return Some(frame.value.clone());
            }
            cursor = &frame.parent.0;
        }
        None
    }

    pub fn is_bound(&self, name: Symbol) -> bool {
        self.lookup(name).is_some()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn lookup_finds_nearest_binding() {
        let env = Environment::empty()
            .extend(Symbol::intern("x"), SValue::now(Value::Number(1.0)))
            .extend(Symbol::intern("x"), SValue::now(Value::Number(2.0)));
        match env.lookup(Symbol::intern("x")).unwrap() {
            SValue::Now(Value::Number(n)) => assert_eq!(n, 2.0),
            _ => panic!("expected Now(2.0)"),
        }
    }

    #[test]
    fn extending_does_not_mutate_parent() {
        let base = Environment::empty().extend(Symbol::intern("x"), SValue::now(Value::Number(1.0)));
        let _child = base.extend(Symbol::intern("y"), SValue::now(Value::Number(2.0)));
        assert!(base.lookup(Symbol::intern("y")).is_none());
        assert!(base.lookup(Symbol::intern("x")).is_some());
    }

    #[test]
    fn unbound_lookup_is_none() {
        let env = Environment::empty();
        assert!(env.lookup(Symbol::intern("missing")).is_none());
    }

    #[test]
    fn sibling_extensions_are_independent() {
        let base = Environment::empty().extend(Symbol::intern("x"), SValue::now(Value::Number(0.0)));
        let left = base.extend(Symbol::intern("x"), SValue::now(Value::Number(1.0)));
        let right = base.extend(Symbol::intern("x"), SValue::now(Value::Number(2.0)));
        match left.lookup(Symbol::intern("x")).unwrap() {
            SValue::Now(Value::Number(n)) => assert_eq!(n, 1.0),
            _ => panic!(),
        }
        match right.lookup(Symbol::intern("x")).unwrap() {
            SValue::Now(Value::Number(n)) => assert_eq!(n, 2.0),
            _ => panic!(),
        }
    }
}
