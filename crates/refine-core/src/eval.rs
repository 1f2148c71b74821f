//! The evaluator (C4): `evaluate(expr, env, ctx) -> SValue`, staged so
//! that a fully-known subtree specializes away and a residual subtree is
//! carried forward faithfully. See spec.md §4.2–§4.3 for the per-form
//! contracts this module implements.

use crate::builtins::BuiltinRegistry;
use crate::constraint::{ConstLit, Constraint};
use crate::context::{ProofResult, RefinementContext};
use crate::env::Environment;
use crate::error::{EvalError, EvalResult};
use crate::expr::{BinOp, Expression, Literal, Pattern, UnOp};
use crate::module_resolver::ModuleResolver;
use crate::value::{Closure, Provenance, SValue, Value};
use indexmap::IndexMap;
use refine_util::Symbol;
use std::sync::Arc;

/// Holds the evaluator's module-local state (spec.md §9): the builtin
/// registry and the fresh-inference-variable counter. One `Evaluator`
/// per top-level run; `reset_var_ids` exists purely so tests get
/// deterministic variable ids across runs.
pub struct Evaluator {
    builtins: BuiltinRegistry,
    resolver: Box<dyn ModuleResolver>,
    next_var_id: u32,
}

impl Evaluator {
    pub fn new(resolver: Box<dyn ModuleResolver>) -> Self {
        Self {
            builtins: BuiltinRegistry::with_defaults(),
            resolver,
            next_var_id: 0,
        }
    }

    pub fn fresh_var(&mut self) -> Constraint {
        let id = self.next_var_id;
        self.next_var_id += 1;
        Constraint::Var(id)
    }

    pub fn reset_var_ids(&mut self) {
        self.next_var_id = 0;
    }

    /// Seed the inference-variable counter at a fixed starting point —
    /// used to make `solve` traces reproducible across runs rather than
    /// depending on incidental call order.
    pub fn seed_var_ids(&mut self, seed: u32) {
        self.next_var_id = seed;
    }

    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }
}

pub fn evaluate(
    expr: &Expression,
    env: &Environment,
    ctx: &RefinementContext,
    evaluator: &mut Evaluator,
) -> EvalResult<SValue> {
    match expr {
        Expression::Literal(lit) => Ok(SValue::now(literal_to_value(lit))),

        Expression::Var(name) => env
            .lookup(*name)
            .ok_or(EvalError::UnboundVariable(*name)),

        Expression::Binary { op, left, right } => eval_binary(*op, left, right, env, ctx, evaluator),

        Expression::Unary { op, operand } => eval_unary(*op, operand, env, ctx, evaluator),

        Expression::If {
            cond,
            then_branch,
            else_branch,
        } => eval_if(cond, then_branch, else_branch, env, ctx, evaluator),

        Expression::Let { pattern, value, body } => {
            let value_sv = evaluate(value, env, ctx, evaluator)?;
            let env2 = bind_pattern(pattern, value_sv, env)?;
            let ctx2 = extend_ctx_with_statement(value, ctx, env);
            evaluate(body, &env2, &ctx2, evaluator)
        }

        Expression::Fn { params, body } => Ok(SValue::now(Value::Closure(Closure {
            params: params.clone(),
            body: body.clone(),
            env: env.clone(),
            self_name: None,
        }))),

        Expression::RecFn {
            self_name,
            params,
            body,
        } => Ok(SValue::now(Value::Closure(Closure {
            params: params.clone(),
            body: body.clone(),
            env: env.clone(),
            self_name: Some(*self_name),
        }))),

        Expression::Call { callee, args } => eval_call(callee, args, env, ctx, evaluator),

        Expression::Object(fields) => {
            let mut map = IndexMap::new();
            for (name, e) in fields {
                map.insert(*name, evaluate(e, env, ctx, evaluator)?);
            }
            Ok(SValue::now(Value::Object(map)))
        }

        Expression::Field { object, name } => eval_field(object, *name, env, ctx, evaluator),

        Expression::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for e in items {
                out.push(evaluate(e, env, ctx, evaluator)?);
            }
            Ok(SValue::now(Value::Array(out)))
        }

        Expression::Index { array, index } => eval_index(array, index, env, ctx, evaluator),

        Expression::Block(items) => eval_block(items, env, ctx, evaluator),

        Expression::ForceNow(inner) => {
            let sv = evaluate(inner, env, ctx, evaluator)?;
            match sv {
                SValue::Now(_) => Ok(sv),
                SValue::Later { constraint, .. } => Err(EvalError::ForceNowFailed(constraint)),
            }
        }

        Expression::ForceLater(inner) => {
            // Never evaluate `inner` for its value — only for its constraint,
            // by syntactic analysis — and carry the expression through
            // verbatim as the residual (spec.md §4: "do not evaluate the
            // inner for its value").
            let constraint = infer_syntactic_constraint(inner, env, evaluator)?;
            let provenance = static_provenance(inner, env).unwrap_or_else(|| Arc::new(Provenance::Opaque));
            Ok(SValue::later((**inner).clone(), constraint, provenance))
        }

        Expression::Assert {
            expr: inner,
            constraint,
            message,
        } => {
            let sv = evaluate(inner, env, ctx, evaluator)?;
            match ctx.prove_value(&sv, constraint) {
                ProofResult::True => Ok(sv),
                ProofResult::False | ProofResult::Unknown => Err(EvalError::AssertionFailed {
                    constraint: constraint.clone(),
                    message: message.clone(),
                }),
            }
        }

        Expression::Trust {
            expr: inner,
            constraint,
        } => {
            let sv = evaluate(inner, env, ctx, evaluator)?;
            Ok(match sv {
                SValue::Now(v) => SValue::Now(v),
                SValue::Later {
                    residual, provenance, ..
                } => SValue::Later {
                    residual,
                    constraint: constraint.clone(),
                    provenance,
                },
            })
        }

        Expression::MethodCall { receiver, name, args } => {
            eval_method_call(receiver, *name, args, env, ctx, evaluator)
        }

        Expression::TypeOf(inner) => {
            let sv = evaluate(inner, env, ctx, evaluator)?;
            Ok(SValue::now(Value::Type(sv.constraint())))
        }

        Expression::Import { names, module, body } => {
            let bindings = evaluator
                .resolver
                .resolve(module, names)
                .map_err(EvalError::Unimplemented)?;
            let env2 = env.extend_many(bindings);
            evaluate(body, &env2, ctx, evaluator)
        }
    }
}

fn literal_to_value(lit: &Literal) -> Value {
    match lit {
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

// ---------------------------------------------------------------------
// let-binding
// ---------------------------------------------------------------------

fn bind_pattern(pattern: &Pattern, value: SValue, env: &Environment) -> EvalResult<Environment> {
    match pattern {
        Pattern::Var(name) => Ok(env.extend(*name, value)),
        Pattern::Positional(patterns) => match value {
            SValue::Now(Value::Array(items)) => {
                if items.len() != patterns.len() {
                    return Err(EvalError::TypeMismatch {
                        expected: Constraint::Length(Box::new(Constraint::Equals(ConstLit::Number(
                            patterns.len() as f64,
                        )))),
                        actual: Constraint::Length(Box::new(Constraint::Equals(ConstLit::Number(
                            items.len() as f64,
                        )))),
                        site: "let-destructure",
                    });
                }
                let mut env2 = env.clone();
                for (p, v) in patterns.iter().zip(items) {
                    env2 = bind_pattern(p, v, &env2)?;
                }
                Ok(env2)
            }
            SValue::Now(other) => Err(EvalError::TypeMismatch {
                expected: Constraint::IsArray,
                actual: other.constraint(),
                site: "let-destructure",
            }),
            SValue::Later { constraint, .. } => Err(EvalError::ForceNowFailed(constraint)),
        },
        Pattern::Named(fields) => match value {
            SValue::Now(Value::Object(mut map)) => {
                let mut env2 = env.clone();
                for (name, p) in fields {
                    let field_value = map.shift_remove(name).ok_or_else(|| EvalError::TypeMismatch {
                        expected: Constraint::HasField(*name, Box::new(Constraint::Any)),
                        actual: Constraint::IsObject,
                        site: "let-destructure",
                    })?;
                    env2 = bind_pattern(p, field_value, &env2)?;
                }
                Ok(env2)
            }
            SValue::Now(other) => Err(EvalError::TypeMismatch {
                expected: Constraint::IsObject,
                actual: other.constraint(),
                site: "let-destructure",
            }),
            SValue::Later { constraint, .. } => Err(EvalError::ForceNowFailed(constraint)),
        },
    }
}

/// If `stmt` was an `assert`, strengthen `ctx` with the fact it proved so
/// later statements in the same block/let-chain benefit from it.
fn extend_ctx_with_statement(
    stmt: &Expression,
    ctx: &RefinementContext,
    env: &Environment,
) -> RefinementContext {
    if let Expression::Assert {
        expr: inner,
        constraint,
        ..
    } = stmt
    {
        if let Some(provenance) = static_provenance(inner, env) {
            return ctx.assume((*provenance).clone(), constraint.clone());
        }
    }
    ctx.clone()
}

/// Best-effort provenance of an expression without fully evaluating it —
/// used only to decide what an `assert` statement strengthens in `ctx`.
fn static_provenance(expr: &Expression, env: &Environment) -> Option<Arc<Provenance>> {
    match expr {
        Expression::Var(name) => {
            if env.is_bound(*name) {
                Some(Arc::new(Provenance::Variable(*name)))
            } else {
                None
            }
        }
        Expression::Field { object, name } => {
            let base = static_provenance(object, env)?;
            Some(base.field(*name))
        }
        _ => None,
    }
}

/// The constraint an expression would have, derived without evaluating it
/// for its value (spec.md §4: `forceLater`'s directive). Literals get
/// their singleton constraint, variables the constraint already on file in
/// `env`, builtins their declared result constraint, and every compound
/// form recurses the same way rather than computing an actual value.
fn infer_syntactic_constraint(
    expr: &Expression,
    env: &Environment,
    evaluator: &Evaluator,
) -> EvalResult<Constraint> {
    let c = match expr {
        Expression::Literal(lit) => literal_to_value(lit).constraint(),

        Expression::Var(name) => env
            .lookup(*name)
            .ok_or(EvalError::UnboundVariable(*name))?
            .constraint(),

        Expression::Binary { op, .. } => match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => Constraint::IsNumber,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::And | BinOp::Or => {
                Constraint::IsBool
            }
        },

        Expression::Unary { op, .. } => match op {
            UnOp::Neg => Constraint::IsNumber,
            UnOp::Not => Constraint::IsBool,
        },

        Expression::If {
            then_branch,
            else_branch,
            ..
        } => Constraint::Or(vec![
            infer_syntactic_constraint(then_branch, env, evaluator)?,
            infer_syntactic_constraint(else_branch, env, evaluator)?,
        ])
        .simplify(),

        // The value a `let` binds isn't known without evaluating it; the
        // body's constraint under the unextended environment is a sound
        // (if sometimes imprecise) over-approximation.
        Expression::Let { body, .. } => infer_syntactic_constraint(body, env, evaluator)?,

        Expression::Fn { .. } | Expression::RecFn { .. } => Constraint::IsFunction,

        Expression::Call { callee, .. } => {
            if let Expression::Var(name) = callee.as_ref() {
                if !env.is_bound(*name) && evaluator.builtins().get(*name).is_none() {
                    return Err(EvalError::UnboundVariable(*name));
                }
            }
            // No declared per-builtin result constraint to consult (the
            // registry only carries a call function); this matches the
            // `Constraint::Any` a residual call through a Later callee
            // already gets in `eval_call`.
            Constraint::Any
        }

        Expression::Object(fields) => {
            let mut parts = vec![Constraint::IsObject];
            for (name, e) in fields {
                parts.push(Constraint::HasField(
                    *name,
                    Box::new(infer_syntactic_constraint(e, env, evaluator)?),
                ));
            }
            Constraint::And(parts).simplify()
        }

        Expression::Field { object, name } => infer_syntactic_constraint(object, env, evaluator)?
            .field_constraint(*name)
            .unwrap_or(Constraint::Any),

        Expression::Array(items) => {
            let mut parts = vec![
                Constraint::IsArray,
                Constraint::Length(Box::new(Constraint::Equals(ConstLit::Number(items.len() as f64)))),
            ];
            for (i, e) in items.iter().enumerate() {
                parts.push(Constraint::ElementAt(
                    i,
                    Box::new(infer_syntactic_constraint(e, env, evaluator)?),
                ));
            }
            Constraint::And(parts).simplify()
        }

        Expression::Index { array, .. } => infer_syntactic_constraint(array, env, evaluator)?
            .elements_constraint()
            .unwrap_or(Constraint::Any),

        Expression::Block(items) => match items.last() {
            Some(last) => infer_syntactic_constraint(last, env, evaluator)?,
            None => Constraint::Equals(ConstLit::Null),
        },

        Expression::ForceNow(inner) | Expression::ForceLater(inner) => {
            infer_syntactic_constraint(inner, env, evaluator)?
        }

        Expression::Assert { constraint, .. } | Expression::Trust { constraint, .. } => constraint.clone(),

        Expression::MethodCall { .. } => Constraint::Any,

        Expression::TypeOf(_) => Constraint::IsType(Box::new(Constraint::Any)),

        Expression::Import { body, .. } => infer_syntactic_constraint(body, env, evaluator)?,
    };
    Ok(c)
}

// ---------------------------------------------------------------------
// binary / unary operators
// ---------------------------------------------------------------------

fn eval_binary(
    op: BinOp,
    left: &Expression,
    right: &Expression,
    env: &Environment,
    ctx: &RefinementContext,
    evaluator: &mut Evaluator,
) -> EvalResult<SValue> {
    let lsv = evaluate(left, env, ctx, evaluator)?;

    // Short-circuit: a known boolean on the left of `&&`/`||` can decide
    // the result without evaluating the right operand at all, even in a
    // partial evaluator — this is an elimination, not just an optimization.
    if let SValue::Now(Value::Bool(b)) = &lsv {
        match (op, *b) {
            (BinOp::And, false) => return Ok(SValue::now(Value::Bool(false))),
            (BinOp::Or, true) => return Ok(SValue::now(Value::Bool(true))),
            _ => {}
        }
    }

    let rsv = evaluate(right, env, ctx, evaluator)?;

    if let (SValue::Now(lv), SValue::Now(rv)) = (&lsv, &rsv) {
        return apply_binop_now(op, lv, rv);
    }

    let constraint = match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => Constraint::IsNumber,
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::And | BinOp::Or => {
            Constraint::IsBool
        }
    };
    let residual = Expression::Binary {
        op,
        left: Arc::new(lsv.clone().into_expr()),
        right: Arc::new(rsv.clone().into_expr()),
    };
    let provenance = Arc::new(Provenance::BinaryOp(op, lsv.provenance(), rsv.provenance()));
    Ok(SValue::later(residual, constraint, provenance))
}

fn apply_binop_now(op: BinOp, lv: &Value, rv: &Value) -> EvalResult<SValue> {
    use Value::*;
    match (op, lv, rv) {
        (BinOp::Add, Number(a), Number(b)) => Ok(SValue::now(Number(a + b))),
        (BinOp::Add, String(a), String(b)) => Ok(SValue::now(String(format!("{a}{b}")))),
        (BinOp::Sub, Number(a), Number(b)) => Ok(SValue::now(Number(a - b))),
        (BinOp::Mul, Number(a), Number(b)) => Ok(SValue::now(Number(a * b))),
        (BinOp::Div, Number(a), Number(b)) => Ok(SValue::now(Number(a / b))),
        (BinOp::Mod, Number(a), Number(b)) => Ok(SValue::now(Number(a % b))),
        (BinOp::Eq, a, b) => Ok(SValue::now(Bool(a == b))),
        (BinOp::Ne, a, b) => Ok(SValue::now(Bool(a != b))),
        (BinOp::Lt, Number(a), Number(b)) => Ok(SValue::now(Bool(a < b))),
        (BinOp::Gt, Number(a), Number(b)) => Ok(SValue::now(Bool(a > b))),
        (BinOp::Le, Number(a), Number(b)) => Ok(SValue::now(Bool(a <= b))),
        (BinOp::Ge, Number(a), Number(b)) => Ok(SValue::now(Bool(a >= b))),
        (BinOp::And, Bool(a), Bool(b)) => Ok(SValue::now(Bool(*a && *b))),
        (BinOp::Or, Bool(a), Bool(b)) => Ok(SValue::now(Bool(*a || *b))),
        _ => Err(EvalError::TypeMismatch {
            expected: expected_operand_constraint(op),
            actual: lv.constraint(),
            site: "binary-operator",
        }),
    }
}

fn expected_operand_constraint(op: BinOp) -> Constraint {
    match op {
        BinOp::And | BinOp::Or => Constraint::IsBool,
        BinOp::Eq | BinOp::Ne => Constraint::Any,
        _ => Constraint::IsNumber,
    }
}

fn eval_unary(
    op: UnOp,
    operand: &Expression,
    env: &Environment,
    ctx: &RefinementContext,
    evaluator: &mut Evaluator,
) -> EvalResult<SValue> {
    let sv = evaluate(operand, env, ctx, evaluator)?;
    match (&sv, op) {
        (SValue::Now(Value::Number(n)), UnOp::Neg) => Ok(SValue::now(Value::Number(-n))),
        (SValue::Now(Value::Bool(b)), UnOp::Not) => Ok(SValue::now(Value::Bool(!b))),
        (SValue::Now(other), _) => Err(EvalError::TypeMismatch {
            expected: match op {
                UnOp::Neg => Constraint::IsNumber,
                UnOp::Not => Constraint::IsBool,
            },
            actual: other.constraint(),
            site: "unary-operator",
        }),
        (SValue::Later { .. }, _) => {
            let constraint = match op {
                UnOp::Neg => Constraint::IsNumber,
                UnOp::Not => Constraint::IsBool,
            };
            let provenance = Arc::new(Provenance::UnaryOp(op, sv.provenance()));
            let residual = Expression::Unary {
                op,
                operand: Arc::new(sv.into_expr()),
            };
            Ok(SValue::later(residual, constraint, provenance))
        }
    }
}

// ---------------------------------------------------------------------
// if
// ---------------------------------------------------------------------

fn eval_if(
    cond: &Expression,
    then_branch: &Expression,
    else_branch: &Expression,
    env: &Environment,
    ctx: &RefinementContext,
    evaluator: &mut Evaluator,
) -> EvalResult<SValue> {
    let cond_sv = evaluate(cond, env, ctx, evaluator)?;

    if let SValue::Now(Value::Bool(b)) = &cond_sv {
        return if *b {
            evaluate(then_branch, env, ctx, evaluator)
        } else {
            evaluate(else_branch, env, ctx, evaluator)
        };
    }
    if let SValue::Now(other) = &cond_sv {
        return Err(EvalError::TypeMismatch {
            expected: Constraint::IsBool,
            actual: other.constraint(),
            site: "if-condition",
        });
    }

    let true_goal = Constraint::Equals(ConstLit::Bool(true));
    match ctx.prove_value(&cond_sv, &true_goal) {
        ProofResult::True => return evaluate(then_branch, env, ctx, evaluator),
        ProofResult::False => return evaluate(else_branch, env, ctx, evaluator),
        ProofResult::Unknown => {}
    }

    let provenance = cond_sv.provenance();
    let then_ctx = ctx.assume((*provenance).clone(), true_goal.clone());
    let else_ctx = ctx.assume((*provenance).clone(), true_goal.negate());

    let then_sv = evaluate(then_branch, env, &then_ctx, evaluator)?;
    let else_sv = evaluate(else_branch, env, &else_ctx, evaluator)?;

    let constraint = Constraint::Or(vec![then_sv.constraint(), else_sv.constraint()]).simplify();
    let residual = Expression::If {
        cond: Arc::new(cond_sv.into_expr()),
        then_branch: Arc::new(then_sv.into_expr()),
        else_branch: Arc::new(else_sv.into_expr()),
    };
    Ok(SValue::later(residual, constraint, Arc::new(Provenance::Opaque)))
}

// ---------------------------------------------------------------------
// function calls
// ---------------------------------------------------------------------

fn eval_call(
    callee: &Expression,
    args: &[Expression],
    env: &Environment,
    ctx: &RefinementContext,
    evaluator: &mut Evaluator,
) -> EvalResult<SValue> {
    if let Expression::Var(name) = callee {
        if !env.is_bound(*name) {
            if evaluator.builtins().get(*name).is_some() {
                let arg_values = eval_args(args, env, ctx, evaluator)?;
                return dispatch_builtin(*name, None, &arg_values, ctx, evaluator);
            }
            return Err(EvalError::UnboundVariable(*name));
        }
    }

    let callee_sv = evaluate(callee, env, ctx, evaluator)?;
    let arg_values = eval_args(args, env, ctx, evaluator)?;

    match callee_sv {
        SValue::Now(Value::Closure(closure)) => call_closure(&closure, arg_values, ctx, evaluator),
        SValue::Now(other) => Err(EvalError::TypeMismatch {
            expected: Constraint::IsFunction,
            actual: other.constraint(),
            site: "call",
        }),
        later @ SValue::Later { .. } => {
            let residual = Expression::Call {
                callee: Arc::new(later.clone().into_expr()),
                args: arg_values.iter().cloned().map(SValue::into_expr).collect(),
            };
            Ok(SValue::later(residual, Constraint::Any, Arc::new(Provenance::Opaque)))
        }
    }
}

fn eval_args(
    args: &[Expression],
    env: &Environment,
    ctx: &RefinementContext,
    evaluator: &mut Evaluator,
) -> EvalResult<Vec<SValue>> {
    args.iter().map(|a| evaluate(a, env, ctx, evaluator)).collect()
}

pub(crate) fn call_closure(
    closure: &Closure,
    args: Vec<SValue>,
    ctx: &RefinementContext,
    evaluator: &mut Evaluator,
) -> EvalResult<SValue> {
    if args.len() != closure.params.len() {
        return Err(EvalError::TypeMismatch {
            expected: Constraint::Length(Box::new(Constraint::Equals(ConstLit::Number(
                closure.params.len() as f64,
            )))),
            actual: Constraint::Length(Box::new(Constraint::Equals(ConstLit::Number(args.len() as f64)))),
            site: "call-arity",
        });
    }
    let mut call_env = closure.env.extend_many(closure.params.iter().copied().zip(args));
    if let Some(self_name) = closure.self_name {
        call_env = call_env.extend(self_name, SValue::now(Value::Closure(closure.clone())));
    }
    evaluate(&closure.body, &call_env, ctx, evaluator)
}

// ---------------------------------------------------------------------
// field / index access
// ---------------------------------------------------------------------

fn eval_field(
    object: &Expression,
    name: Symbol,
    env: &Environment,
    ctx: &RefinementContext,
    evaluator: &mut Evaluator,
) -> EvalResult<SValue> {
    let obj_sv = evaluate(object, env, ctx, evaluator)?;
    match obj_sv {
        SValue::Now(Value::Object(mut map)) => map.shift_remove(&name).ok_or_else(|| EvalError::TypeMismatch {
            expected: Constraint::HasField(name, Box::new(Constraint::Any)),
            actual: Constraint::IsObject,
            site: "field-access",
        }),
        SValue::Now(other) => Err(EvalError::TypeMismatch {
            expected: Constraint::HasField(name, Box::new(Constraint::Any)),
            actual: other.constraint(),
            site: "field-access",
        }),
        later @ SValue::Later { .. } => {
            let constraint = later
                .constraint()
                .field_constraint(name)
                .unwrap_or(Constraint::Any);
            let provenance = later.provenance().field(name);
            let residual = Expression::Field {
                object: Arc::new(later.into_expr()),
                name,
            };
            Ok(SValue::later(residual, constraint, provenance))
        }
    }
}

fn eval_index(
    array: &Expression,
    index: &Expression,
    env: &Environment,
    ctx: &RefinementContext,
    evaluator: &mut Evaluator,
) -> EvalResult<SValue> {
    let arr_sv = evaluate(array, env, ctx, evaluator)?;
    let idx_sv = evaluate(index, env, ctx, evaluator)?;

    if let SValue::Now(Value::Array(items)) = &arr_sv {
        if let SValue::Now(Value::Number(n)) = &idx_sv {
            let i = *n as usize;
            if (*n - i as f64).abs() < f64::EPSILON && i < items.len() {
                return Ok(items[i].clone());
            }
            return Err(EvalError::TypeMismatch {
                expected: Constraint::ElementAt(i, Box::new(Constraint::Any)),
                actual: Constraint::Length(Box::new(Constraint::Equals(ConstLit::Number(items.len() as f64)))),
                site: "index",
            });
        }
        // Index unknown but array concrete: constraint is the union of the
        // element constraints we already know.
        let constraint = Constraint::Or(items.iter().map(SValue::constraint).collect()).simplify();
        let residual = Expression::Index {
            array: Arc::new(arr_sv.clone().into_expr()),
            index: Arc::new(idx_sv.into_expr()),
        };
        return Ok(SValue::later(residual, constraint, Arc::new(Provenance::Opaque)));
    }

    if let SValue::Now(other) = &arr_sv {
        return Err(EvalError::TypeMismatch {
            expected: Constraint::IsArray,
            actual: other.constraint(),
            site: "index",
        });
    }

    let elements_constraint = arr_sv.constraint().elements_constraint().unwrap_or(Constraint::Any);
    let provenance = if let SValue::Now(Value::Number(n)) = &idx_sv {
        Arc::new(Provenance::Index(arr_sv.provenance(), *n as usize))
    } else {
        Arc::new(Provenance::Opaque)
    };
    let residual = Expression::Index {
        array: Arc::new(arr_sv.into_expr()),
        index: Arc::new(idx_sv.into_expr()),
    };
    Ok(SValue::later(residual, elements_constraint, provenance))
}

// ---------------------------------------------------------------------
// block
// ---------------------------------------------------------------------

fn eval_block(
    items: &[Expression],
    env: &Environment,
    ctx: &RefinementContext,
    evaluator: &mut Evaluator,
) -> EvalResult<SValue> {
    if items.is_empty() {
        return Ok(SValue::now(Value::Null));
    }
    let mut cur_ctx = ctx.clone();
    let mut last = SValue::now(Value::Null);
    for (i, stmt) in items.iter().enumerate() {
        last = evaluate(stmt, env, &cur_ctx, evaluator)?;
        if i + 1 < items.len() {
            cur_ctx = extend_ctx_with_statement(stmt, &cur_ctx, env);
        }
    }
    Ok(last)
}

// ---------------------------------------------------------------------
// method calls / builtins
// ---------------------------------------------------------------------

fn eval_method_call(
    receiver: &Expression,
    name: Symbol,
    args: &[Expression],
    env: &Environment,
    ctx: &RefinementContext,
    evaluator: &mut Evaluator,
) -> EvalResult<SValue> {
    let receiver_sv = evaluate(receiver, env, ctx, evaluator)?;
    let arg_values = eval_args(args, env, ctx, evaluator)?;
    dispatch_builtin(name, Some(receiver_sv), &arg_values, ctx, evaluator)
}

fn dispatch_builtin(
    name: Symbol,
    receiver: Option<SValue>,
    args: &[SValue],
    ctx: &RefinementContext,
    evaluator: &mut Evaluator,
) -> EvalResult<SValue> {
    let def = evaluator
        .builtins()
        .get(name)
        .ok_or(EvalError::UnboundVariable(name))?
        .clone();

    let mut full_args: Vec<SValue> = Vec::with_capacity(args.len() + 1);
    if let Some(r) = receiver {
        full_args.push(r);
    }
    full_args.extend_from_slice(args);

    if !def.variadic {
        if let Some(arity) = def.arity {
            if full_args.len() != arity {
                return Err(EvalError::TypeMismatch {
                    expected: Constraint::Length(Box::new(Constraint::Equals(ConstLit::Number(arity as f64)))),
                    actual: Constraint::Length(Box::new(Constraint::Equals(ConstLit::Number(
                        full_args.len() as f64,
                    )))),
                    site: "builtin-arity",
                });
            }
        }
    }

    (def.call)(&full_args, ctx, evaluator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_resolver::{MockModuleResolver, NullResolver};

    fn eval(expr: &Expression) -> EvalResult<SValue> {
        let mut evaluator = Evaluator::new(Box::new(NullResolver));
        evaluate(expr, &Environment::empty(), &RefinementContext::empty(), &mut evaluator)
    }

    #[test]
    fn import_binds_names_from_resolver() {
        let mut mock = MockModuleResolver::new();
        mock.expect_resolve().times(1).returning(|module, names| {
            assert_eq!(module, "std/math");
            assert_eq!(names, &[Symbol::intern("pi")]);
            Ok(vec![(Symbol::intern("pi"), SValue::now(Value::Number(3.14)))])
        });

        let mut evaluator = Evaluator::new(Box::new(mock));
        let expr = Expression::Import {
            names: vec![Symbol::intern("pi")],
            module: "std/math".to_string(),
            body: Arc::new(Expression::var("pi")),
        };
        let sv = evaluate(&expr, &Environment::empty(), &RefinementContext::empty(), &mut evaluator).unwrap();
        assert!(matches!(sv, SValue::Now(Value::Number(n)) if n == 3.14));
    }

    #[test]
    fn import_propagates_resolver_failure() {
        let mut mock = MockModuleResolver::new();
        mock.expect_resolve()
            .times(1)
            .returning(|_, _| Err("no such module".to_string()));

        let mut evaluator = Evaluator::new(Box::new(mock));
        let expr = Expression::Import {
            names: vec![],
            module: "nowhere".to_string(),
            body: Arc::new(Expression::num(1.0)),
        };
        let err = evaluate(&expr, &Environment::empty(), &RefinementContext::empty(), &mut evaluator).unwrap_err();
        assert!(matches!(err, EvalError::Unimplemented(_)));
    }

    #[test]
    fn literal_numbers_evaluate_to_now() {
        let sv = eval(&Expression::num(3.0)).unwrap();
        assert!(matches!(sv, SValue::Now(Value::Number(n)) if n == 3.0));
    }

    #[test]
    fn unbound_variable_errors() {
        let err = eval(&Expression::var("x")).unwrap_err();
        assert!(matches!(err, EvalError::UnboundVariable(_)));
    }

    #[test]
    fn add_specializes_constants() {
        let expr = Expression::Binary {
            op: BinOp::Add,
            left: Arc::new(Expression::num(1.0)),
            right: Arc::new(Expression::num(2.0)),
        };
        let sv = eval(&expr).unwrap();
        assert!(matches!(sv, SValue::Now(Value::Number(n)) if n == 3.0));
    }

    #[test]
    fn and_short_circuits_on_false() {
        let expr = Expression::Binary {
            op: BinOp::And,
            left: Arc::new(Expression::boolean(false)),
            right: Arc::new(Expression::var("undefined_var")),
        };
        let sv = eval(&expr).unwrap();
        assert!(matches!(sv, SValue::Now(Value::Bool(false))));
    }

    #[test]
    fn if_with_known_condition_eliminates_branch() {
        let expr = Expression::If {
            cond: Arc::new(Expression::boolean(true)),
            then_branch: Arc::new(Expression::num(1.0)),
            else_branch: Arc::new(Expression::var("unreachable")),
        };
        let sv = eval(&expr).unwrap();
        assert!(matches!(sv, SValue::Now(Value::Number(n)) if n == 1.0));
    }

    #[test]
    fn forcenow_on_residual_fails() {
        let mut evaluator = Evaluator::new(Box::new(NullResolver));
        let env = Environment::empty().extend(
            Symbol::intern("x"),
            SValue::later(
                Expression::var("x"),
                Constraint::IsNumber,
                Arc::new(Provenance::Variable(Symbol::intern("x"))),
            ),
        );
        let result = evaluate(
            &Expression::ForceNow(Arc::new(Expression::var("x"))),
            &env,
            &RefinementContext::empty(),
            &mut evaluator,
        );
        assert!(matches!(result, Err(EvalError::ForceNowFailed(_))));
    }

    #[test]
    fn assert_true_passes_through() {
        let expr = Expression::Assert {
            expr: Arc::new(Expression::num(5.0)),
            constraint: Constraint::IsNumber,
            message: None,
        };
        let sv = eval(&expr).unwrap();
        assert!(matches!(sv, SValue::Now(Value::Number(n)) if n == 5.0));
    }

    #[test]
    fn assert_false_fails() {
        let expr = Expression::Assert {
            expr: Arc::new(Expression::num(5.0)),
            constraint: Constraint::IsString,
            message: Some("must be a string".into()),
        };
        let err = eval(&expr).unwrap_err();
        assert!(matches!(err, EvalError::AssertionFailed { .. }));
    }

    #[test]
    fn closure_call_specializes_add3() {
        let params = vec![Symbol::intern("x")];
        let body = Arc::new(Expression::Binary {
            op: BinOp::Add,
            left: Arc::new(Expression::var("x")),
            right: Arc::new(Expression::num(3.0)),
        });
        let closure_expr = Expression::Fn { params, body };
        let call = Expression::Call {
            callee: Arc::new(closure_expr),
            args: vec![Expression::num(4.0)],
        };
        let sv = eval(&call).unwrap();
        assert!(matches!(sv, SValue::Now(Value::Number(n)) if n == 7.0));
    }

    #[test]
    fn residual_binary_carries_provenance() {
        let mut evaluator = Evaluator::new(Box::new(NullResolver));
        let env = Environment::empty().extend(
            Symbol::intern("x"),
            SValue::later(
                Expression::var("x"),
                Constraint::IsNumber,
                Arc::new(Provenance::Variable(Symbol::intern("x"))),
            ),
        );
        let expr = Expression::Binary {
            op: BinOp::Add,
            left: Arc::new(Expression::var("x")),
            right: Arc::new(Expression::num(1.0)),
        };
        let sv = evaluate(&expr, &env, &RefinementContext::empty(), &mut evaluator).unwrap();
        assert!(sv.is_later());
        assert_eq!(sv.constraint(), Constraint::IsNumber);
    }
}
