//! Numeric builtins: free functions over `Number` values. Each one runs
//! now if its arguments are known, and residualizes to a call expression
//! otherwise — none of them can ever narrow what's known about a `Later`
//! argument beyond "still a number", so the residual constraint is
//! always just `isNumber`.

use super::{residualize, BuiltinDef, BuiltinRegistry};
use crate::constraint::Constraint;
use crate::context::RefinementContext;
use crate::error::{EvalError, EvalResult};
use crate::eval::Evaluator;
use crate::value::{SValue, Value};
use refine_util::Symbol;

fn as_number(sv: &SValue, site: &'static str) -> EvalResult<Option<f64>> {
    match sv {
        SValue::Now(Value::Number(n)) => Ok(Some(*n)),
        SValue::Now(other) => Err(EvalError::TypeMismatch {
            expected: Constraint::IsNumber,
            actual: other.constraint(),
            site,
        }),
        SValue::Later { .. } => Ok(None),
    }
}

macro_rules! unary_numeric {
    ($fn_name:ident, $op_name:literal, $math:expr) => {
        fn $fn_name(args: &[SValue], _ctx: &RefinementContext, _ev: &mut Evaluator) -> EvalResult<SValue> {
            match as_number(&args[0], $op_name)? {
                Some(n) => Ok(SValue::now(Value::Number($math(n)))),
                None => Ok(residualize(Symbol::intern($op_name), false, args, Constraint::IsNumber)),
            }
        }
    };
}

unary_numeric!(abs, "abs", f64::abs);
unary_numeric!(floor, "floor", f64::floor);
unary_numeric!(ceil, "ceil", f64::ceil);
unary_numeric!(round, "round", f64::round);
unary_numeric!(sqrt, "sqrt", f64::sqrt);

fn min(args: &[SValue], _ctx: &RefinementContext, _ev: &mut Evaluator) -> EvalResult<SValue> {
    match (as_number(&args[0], "min")?, as_number(&args[1], "min")?) {
        (Some(a), Some(b)) => Ok(SValue::now(Value::Number(a.min(b)))),
        _ => Ok(residualize(Symbol::intern("min"), false, args, Constraint::IsNumber)),
    }
}

fn max(args: &[SValue], _ctx: &RefinementContext, _ev: &mut Evaluator) -> EvalResult<SValue> {
    match (as_number(&args[0], "max")?, as_number(&args[1], "max")?) {
        (Some(a), Some(b)) => Ok(SValue::now(Value::Number(a.max(b)))),
        _ => Ok(residualize(Symbol::intern("max"), false, args, Constraint::IsNumber)),
    }
}

pub(super) fn register(reg: &mut BuiltinRegistry) {
    let unary = |name: &str, call| BuiltinDef {
        name: Symbol::intern(name),
        is_method: false,
        variadic: false,
        arity: Some(1),
        call,
    };
    let binary = |name: &str, call| BuiltinDef {
        name: Symbol::intern(name),
        is_method: false,
        variadic: false,
        arity: Some(2),
        call,
    };
    reg.register(unary("abs", abs));
    reg.register(unary("floor", floor));
    reg.register(unary("ceil", ceil));
    reg.register(unary("round", round));
    reg.register(unary("sqrt", sqrt));
    reg.register(binary("min", min));
    reg.register(binary("max", max));
}
