//! The builtin registry (C5): declarative registration of the small
//! standard library the evaluator exposes to programs — arithmetic
//! helpers, string/array operations, and the higher-order array
//! operations (`map`/`filter`/`reduce`) that are the evaluator's main
//! showcase for specializing through a callback.
//!
//! Each entry is a [`BuiltinDef`]: a name, arity/variadic shape, whether
//! it's called as `x.name(...)` (`is_method`) or `name(...)`, and a
//! function pointer. A builtin decides for itself whether it can compute
//! a `Now` result or must residualize — that's the "Pure vs Staged
//! evaluator shape" split spec.md §5 describes, expressed here as a
//! convention inside the function body rather than as two separate enum
//! arms, since every builtin needs the same fallback-to-residual path.

mod array;
mod numeric;
mod object;
mod string;

use crate::constraint::Constraint;
use crate::context::RefinementContext;
use crate::error::EvalResult;
use crate::eval::Evaluator;
use crate::expr::Expression;
use crate::value::{Provenance, SValue};
use refine_util::{FxHashMap, Symbol};
use std::sync::Arc;

/// Build the residual for a builtin that can't run now because one of its
/// arguments is `Later`. `receiver_is_arg0` distinguishes `f(a, b)` from
/// `a.f(b)` when reifying back into an expression.
pub(crate) fn residualize(
    name: Symbol,
    is_method: bool,
    args: &[SValue],
    constraint: Constraint,
) -> SValue {
    let provenances: Vec<_> = args.iter().map(SValue::provenance).collect();
    let residual = if is_method {
        let (receiver, rest) = args.split_first().expect("method builtin needs a receiver");
        Expression::MethodCall {
            receiver: Arc::new(receiver.clone().into_expr()),
            name,
            args: rest.iter().cloned().map(SValue::into_expr).collect(),
        }
    } else {
        Expression::Call {
            callee: Arc::new(Expression::Var(name)),
            args: args.iter().cloned().map(SValue::into_expr).collect(),
        }
    };
    let provenance = provenances
        .into_iter()
        .next()
        .unwrap_or_else(|| Arc::new(Provenance::Opaque));
    SValue::later(residual, constraint, provenance)
}

pub type BuiltinFn = fn(&[SValue], &RefinementContext, &mut Evaluator) -> EvalResult<SValue>;

#[derive(Clone, Copy)]
pub struct BuiltinDef {
    pub name: Symbol,
    pub is_method: bool,
    pub variadic: bool,
    pub arity: Option<usize>,
    pub call: BuiltinFn,
}

#[derive(Clone)]
pub struct BuiltinRegistry {
    defs: FxHashMap<Symbol, BuiltinDef>,
}

impl BuiltinRegistry {
    pub fn empty() -> Self {
        Self {
            defs: FxHashMap::default(),
        }
    }

    pub fn register(&mut self, def: BuiltinDef) {
        self.defs.insert(def.name, def);
    }

    pub fn get(&self, name: Symbol) -> Option<&BuiltinDef> {
        self.defs.get(&name)
    }

    pub fn with_defaults() -> Self {
        let mut reg = Self::empty();
        numeric::register(&mut reg);
        string::register(&mut reg);
        array::register(&mut reg);
        object::register(&mut reg);
        reg
    }
}
