//! String/array builtins that don't need a callback: `length`,
//! `toUpperCase`, `toLowerCase`, `concat`. `length` is the one builtin
//! that dispatches on either receiver shape, which is why it isn't a
//! `unary_numeric!`-style macro instance like its `refine-core` siblings.

use super::{residualize, BuiltinDef, BuiltinRegistry};
use crate::constraint::{ConstLit, Constraint};
use crate::context::RefinementContext;
use crate::error::{EvalError, EvalResult};
use crate::eval::Evaluator;
use crate::value::{SValue, Value};
use refine_util::Symbol;

fn length(args: &[SValue], _ctx: &RefinementContext, _ev: &mut Evaluator) -> EvalResult<SValue> {
    match &args[0] {
        SValue::Now(Value::String(s)) => Ok(SValue::now(Value::Number(s.chars().count() as f64))),
        SValue::Now(Value::Array(items)) => Ok(SValue::now(Value::Number(items.len() as f64))),
        SValue::Now(other) => Err(EvalError::TypeMismatch {
            expected: Constraint::Or(vec![Constraint::IsString, Constraint::IsArray]),
            actual: other.constraint(),
            site: "length",
        }),
        SValue::Later { constraint, .. } => {
            if let Some(len) = constraint.clone().field_constraint_length() {
                Ok(SValue::now(Value::Number(len)))
            } else {
                Ok(residualize(Symbol::intern("length"), true, args, Constraint::IsNumber))
            }
        }
    }
}

fn to_upper_case(args: &[SValue], _ctx: &RefinementContext, _ev: &mut Evaluator) -> EvalResult<SValue> {
    match &args[0] {
        SValue::Now(Value::String(s)) => Ok(SValue::now(Value::String(s.to_uppercase()))),
        SValue::Now(other) => Err(EvalError::TypeMismatch {
            expected: Constraint::IsString,
            actual: other.constraint(),
            site: "toUpperCase",
        }),
        SValue::Later { .. } => Ok(residualize(Symbol::intern("toUpperCase"), true, args, Constraint::IsString)),
    }
}

fn to_lower_case(args: &[SValue], _ctx: &RefinementContext, _ev: &mut Evaluator) -> EvalResult<SValue> {
    match &args[0] {
        SValue::Now(Value::String(s)) => Ok(SValue::now(Value::String(s.to_lowercase()))),
        SValue::Now(other) => Err(EvalError::TypeMismatch {
            expected: Constraint::IsString,
            actual: other.constraint(),
            site: "toLowerCase",
        }),
        SValue::Later { .. } => Ok(residualize(Symbol::intern("toLowerCase"), true, args, Constraint::IsString)),
    }
}

fn concat(args: &[SValue], _ctx: &RefinementContext, _ev: &mut Evaluator) -> EvalResult<SValue> {
    match (&args[0], &args[1]) {
        (SValue::Now(Value::String(a)), SValue::Now(Value::String(b))) => {
            Ok(SValue::now(Value::String(format!("{a}{b}"))))
        }
        (SValue::Now(other), _) if !matches!(other, Value::String(_)) => Err(EvalError::TypeMismatch {
            expected: Constraint::IsString,
            actual: other.constraint(),
            site: "concat",
        }),
        (_, SValue::Now(other)) if !matches!(other, Value::String(_)) => Err(EvalError::TypeMismatch {
            expected: Constraint::IsString,
            actual: other.constraint(),
            site: "concat",
        }),
        _ => Ok(residualize(Symbol::intern("concat"), true, args, Constraint::IsString)),
    }
}

/// Small extension trait so `length`'s residual path can ask "do we
/// already know the length from the constraint?" without `string.rs`
/// reaching into `constraint.rs`'s internals.
trait LengthHint {
    fn field_constraint_length(self) -> Option<f64>;
}

impl LengthHint for Constraint {
    fn field_constraint_length(self) -> Option<f64> {
        match self {
            Constraint::And(parts) => parts.into_iter().find_map(|p| p.field_constraint_length()),
            Constraint::Length(inner) => match *inner {
                Constraint::Equals(ConstLit::Number(n)) => Some(n),
                _ => None,
            },
            _ => None,
        }
    }
}

pub(super) fn register(reg: &mut BuiltinRegistry) {
    reg.register(BuiltinDef {
        name: Symbol::intern("length"),
        is_method: true,
        variadic: false,
        arity: Some(1),
        call: length,
    });
    reg.register(BuiltinDef {
        name: Symbol::intern("toUpperCase"),
        is_method: true,
        variadic: false,
        arity: Some(1),
        call: to_upper_case,
    });
    reg.register(BuiltinDef {
        name: Symbol::intern("toLowerCase"),
        is_method: true,
        variadic: false,
        arity: Some(1),
        call: to_lower_case,
    });
    reg.register(BuiltinDef {
        name: Symbol::intern("concat"),
        is_method: true,
        variadic: false,
        arity: Some(2),
        call: concat,
    });
}
