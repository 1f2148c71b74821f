//! Object builtins: just `keys` for now. Field access itself goes
//! through `Expression::Field`, not a builtin — `keys` is the one
//! reflective operation that needs the whole object rather than one
//! named member.

use super::{residualize, BuiltinDef, BuiltinRegistry};
use crate::constraint::Constraint;
use crate::context::RefinementContext;
use crate::error::{EvalError, EvalResult};
use crate::eval::Evaluator;
use crate::value::{SValue, Value};
use refine_util::Symbol;

fn keys(args: &[SValue], _ctx: &RefinementContext, _ev: &mut Evaluator) -> EvalResult<SValue> {
    match &args[0] {
        SValue::Now(Value::Object(fields)) => Ok(SValue::now(Value::Array(
            fields
                .keys()
                .map(|k| SValue::now(Value::String(k.as_str().to_string())))
                .collect(),
        ))),
        SValue::Now(other) => Err(EvalError::TypeMismatch {
            expected: Constraint::IsObject,
            actual: other.constraint(),
            site: "keys",
        }),
        SValue::Later { constraint, .. } => {
            let names = constraint.all_field_names();
            if names.is_empty() {
                Ok(residualize(Symbol::intern("keys"), true, args, Constraint::IsArray))
            } else {
                Ok(SValue::now(Value::Array(
                    names
                        .into_iter()
                        .map(|n| SValue::now(Value::String(n.as_str().to_string())))
                        .collect(),
                )))
            }
        }
    }
}

pub(super) fn register(reg: &mut BuiltinRegistry) {
    reg.register(BuiltinDef {
        name: Symbol::intern("keys"),
        is_method: true,
        variadic: false,
        arity: Some(1),
        call: keys,
    });
}
