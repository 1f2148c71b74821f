//! Array builtins, including the higher-order trio (`map`/`filter`/
//! `reduce`) that exercises the evaluator's core specialization story:
//! when both the array and the callback are `Now`, the whole call
//! inlines away into a concrete array, element by element, even when
//! individual elements are themselves `Later`.

use super::{residualize, BuiltinDef, BuiltinRegistry};
use crate::constraint::Constraint;
use crate::context::RefinementContext;
use crate::error::{EvalError, EvalResult};
use crate::eval::{call_closure, Evaluator};
use crate::value::{Closure, SValue, Value};
use refine_util::Symbol;

fn as_array<'a>(sv: &'a SValue, site: &'static str) -> EvalResult<Option<&'a [SValue]>> {
    match sv {
        SValue::Now(Value::Array(items)) => Ok(Some(items)),
        SValue::Now(other) => Err(EvalError::TypeMismatch {
            expected: Constraint::IsArray,
            actual: other.constraint(),
            site,
        }),
        SValue::Later { .. } => Ok(None),
    }
}

fn as_closure<'a>(sv: &'a SValue, site: &'static str) -> EvalResult<Option<&'a Closure>> {
    match sv {
        SValue::Now(Value::Closure(c)) => Ok(Some(c)),
        SValue::Now(other) => Err(EvalError::TypeMismatch {
            expected: Constraint::IsFunction,
            actual: other.constraint(),
            site,
        }),
        SValue::Later { .. } => Ok(None),
    }
}

fn map(args: &[SValue], ctx: &RefinementContext, ev: &mut Evaluator) -> EvalResult<SValue> {
    let items = as_array(&args[0], "map")?;
    let closure = as_closure(&args[1], "map")?;
    match (items, closure) {
        (Some(items), Some(closure)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(call_closure(closure, vec![item.clone()], ctx, ev)?);
            }
            Ok(SValue::now(Value::Array(out)))
        }
        _ => Ok(residualize(Symbol::intern("map"), true, args, Constraint::IsArray)),
    }
}

fn filter(args: &[SValue], ctx: &RefinementContext, ev: &mut Evaluator) -> EvalResult<SValue> {
    let items = as_array(&args[0], "filter")?;
    let closure = as_closure(&args[1], "filter")?;
    match (items, closure) {
        (Some(items), Some(closure)) => {
            let mut kept = Vec::new();
            for item in items {
                let predicate = call_closure(closure, vec![item.clone()], ctx, ev)?;
                match predicate {
                    SValue::Now(Value::Bool(true)) => kept.push(item.clone()),
                    SValue::Now(Value::Bool(false)) => {}
                    SValue::Now(other) => {
                        return Err(EvalError::TypeMismatch {
                            expected: Constraint::IsBool,
                            actual: other.constraint(),
                            site: "filter-predicate",
                        })
                    }
                    SValue::Later { .. } => {
                        // The predicate depends on unknown data: we cannot
                        // decide membership for any element without
                        // running the program, so the whole call residualizes.
                        return Ok(residualize(Symbol::intern("filter"), true, args, Constraint::IsArray));
                    }
                }
            }
            Ok(SValue::now(Value::Array(kept)))
        }
        _ => Ok(residualize(Symbol::intern("filter"), true, args, Constraint::IsArray)),
    }
}

fn reduce(args: &[SValue], ctx: &RefinementContext, ev: &mut Evaluator) -> EvalResult<SValue> {
    let items = as_array(&args[0], "reduce")?;
    let closure = as_closure(&args[1], "reduce")?;
    match (items, closure) {
        (Some(items), Some(closure)) => {
            let mut acc = args[2].clone();
            for item in items {
                acc = call_closure(closure, vec![acc, item.clone()], ctx, ev)?;
            }
            Ok(acc)
        }
        _ => Ok(residualize(Symbol::intern("reduce"), true, args, Constraint::Any)),
    }
}

fn push(args: &[SValue], _ctx: &RefinementContext, _ev: &mut Evaluator) -> EvalResult<SValue> {
    match as_array(&args[0], "push")? {
        Some(items) => {
            let mut out = items.to_vec();
            out.push(args[1].clone());
            Ok(SValue::now(Value::Array(out)))
        }
        None => Ok(residualize(Symbol::intern("push"), true, args, Constraint::IsArray)),
    }
}

pub(super) fn register(reg: &mut BuiltinRegistry) {
    reg.register(BuiltinDef {
        name: Symbol::intern("map"),
        is_method: true,
        variadic: false,
        arity: Some(2),
        call: map,
    });
    reg.register(BuiltinDef {
        name: Symbol::intern("filter"),
        is_method: true,
        variadic: false,
        arity: Some(2),
        call: filter,
    });
    reg.register(BuiltinDef {
        name: Symbol::intern("reduce"),
        is_method: true,
        variadic: false,
        arity: Some(3),
        call: reduce,
    });
    reg.register(BuiltinDef {
        name: Symbol::intern("push"),
        is_method: true,
        variadic: false,
        arity: Some(2),
        call: push,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinOp, Expression};
    use crate::module_resolver::NullResolver;
    use std::sync::Arc;

    fn add_one_closure() -> Closure {
        Closure {
            params: vec![Symbol::intern("x")],
            body: Arc::new(Expression::Binary {
                op: BinOp::Add,
                left: Arc::new(Expression::var("x")),
                right: Arc::new(Expression::num(1.0)),
            }),
            env: crate::env::Environment::empty(),
            self_name: None,
        }
    }

    #[test]
    fn map_specializes_fully_known_array() {
        let mut ev = Evaluator::new(Box::new(NullResolver));
        let arr = SValue::now(Value::Array(vec![
            SValue::now(Value::Number(1.0)),
            SValue::now(Value::Number(2.0)),
        ]));
        let f = SValue::now(Value::Closure(add_one_closure()));
        let result = map(&[arr, f], &RefinementContext::empty(), &mut ev).unwrap();
        match result {
            SValue::Now(Value::Array(items)) => {
                assert!(matches!(items[0], SValue::Now(Value::Number(n)) if n == 2.0));
                assert!(matches!(items[1], SValue::Now(Value::Number(n)) if n == 3.0));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn push_appends_without_mutating_input() {
        let mut ev = Evaluator::new(Box::new(NullResolver));
        let arr = SValue::now(Value::Array(vec![SValue::now(Value::Number(1.0))]));
        let result = push(&[arr, SValue::now(Value::Number(2.0))], &RefinementContext::empty(), &mut ev).unwrap();
        match result {
            SValue::Now(Value::Array(items)) => assert_eq!(items.len(), 2),
            other => panic!("expected array, got {other:?}"),
        }
    }
}
