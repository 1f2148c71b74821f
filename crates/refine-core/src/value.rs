//! Runtime values (C2): what expressions evaluate to, and the staged
//! wrapper — `Now` or `Later` — that tracks whether a value is fully
//! known at specialization time or must be residualized.

use crate::constraint::{ConstLit, Constraint};
use crate::env::Environment;
use crate::expr::{BinOp, Expression, Pattern, UnOp};
use indexmap::IndexMap;
use refine_util::{FxHashSet, Symbol};
use std::fmt;
use std::sync::Arc;

/// A fully-known runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Object(IndexMap<Symbol, SValue>),
    Array(Vec<SValue>),
    Closure(Closure),
    /// A constraint, reified as a value — what `typeOf` on a `Now` value
    /// produces, and what `isType(C)` classifies.
    Type(Constraint),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            // Closures are compared by reference identity of their captured
            // environment and body, never structurally.
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(&a.body, &b.body),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "null"),
            Value::Object(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Closure(_) => write!(f, "<closure>"),
            Value::Type(c) => write!(f, "<type {c}>"),
        }
    }
}

impl Value {
    /// The most precise constraint describing this concrete value — the
    /// basis of every `Now` value's implicit type.
    pub fn constraint(&self) -> Constraint {
        match self {
            Value::Number(n) => Constraint::Equals(ConstLit::Number(*n)),
            Value::String(s) => Constraint::Equals(ConstLit::String(s.clone())),
            Value::Bool(b) => Constraint::Equals(ConstLit::Bool(*b)),
            Value::Null => Constraint::Equals(ConstLit::Null),
            Value::Object(fields) => {
                let mut parts = vec![Constraint::IsObject];
                for (name, v) in fields {
                    parts.push(Constraint::HasField(*name, Box::new(v.constraint())));
                }
                Constraint::And(parts).simplify()
            }
            Value::Array(items) => {
                let mut parts = vec![Constraint::IsArray, Constraint::Length(Box::new(
                    Constraint::Equals(ConstLit::Number(items.len() as f64)),
                ))];
                for (i, v) in items.iter().enumerate() {
                    parts.push(Constraint::ElementAt(i, Box::new(v.constraint())));
                }
                Constraint::And(parts).simplify()
            }
            Value::Closure(_) => Constraint::IsFunction,
            Value::Type(_) => Constraint::IsType(Box::new(Constraint::Any)),
        }
    }
}

/// A closure captures its defining environment, not just its body — the
/// environment is persistent (see `env.rs`), so this is a cheap `Rc` clone.
#[derive(Debug, Clone)]
pub struct Closure {
    pub params: Vec<Symbol>,
    pub body: Arc<Expression>,
    pub env: Environment,
    /// `Some(name)` for a `recfn`, bound to the closure itself inside `env`
    /// at call time.
    pub self_name: Option<Symbol>,
}

/// Where a residual value's constraint came from — the bridge between
/// staged values and the refinement prover's fact base (spec.md §4.4).
/// A `RefinementContext` records facts about *provenances*, and the
/// prover consults them when asked about a `Later` value carrying that
/// same provenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Introduced by referencing a bound variable directly.
    Variable(Symbol),
    /// Introduced by `<base>.<field>` where `base` has this provenance.
    FieldAccess(Arc<Provenance>, Symbol),
    /// Introduced by `<base>[<index>]`.
    Index(Arc<Provenance>, usize),
    /// Introduced by a binary or unary operator applied to operand(s)
    /// that may themselves carry provenance; used by the prover to relate
    /// a residual's constraint to its syntactic origin without re-deriving
    /// it from scratch.
    BinaryOp(BinOp, Arc<Provenance>, Arc<Provenance>),
    UnaryOp(UnOp, Arc<Provenance>),
    /// A concrete operand identified by its rendered value. Without this,
    /// every `Now` operand would collapse to the same `Opaque` provenance,
    /// so `x >= 90` and `x >= 80` would produce identical `BinaryOp`
    /// provenances and the prover would wrongly treat a fact learned about
    /// one as a fact about the other.
    Literal(String),
    /// No traceable origin narrower than the value's own constraint —
    /// the common case for freshly-synthesized residuals.
    Opaque,
}

impl Provenance {
    pub fn field(self: &Arc<Self>, name: Symbol) -> Arc<Provenance> {
        Arc::new(Provenance::FieldAccess(self.clone(), name))
    }
}

/// A staged value (spec.md §2, §4.2): either fully known now, or a
/// residual expression with a known constraint to be evaluated later.
#[derive(Debug, Clone)]
pub enum SValue {
    Now(Value),
    Later {
        residual: Arc<Expression>,
        constraint: Constraint,
        provenance: Arc<Provenance>,
    },
}

impl PartialEq for SValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SValue::Now(a), SValue::Now(b)) => a == b,
            (
                SValue::Later { residual: r1, constraint: c1, .. },
                SValue::Later { residual: r2, constraint: c2, .. },
            ) => r1 == r2 && c1 == c2,
            _ => false,
        }
    }
}

impl fmt::Display for SValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SValue::Now(v) => write!(f, "{v}"),
            SValue::Later { constraint, .. } => write!(f, "<residual: {constraint}>"),
        }
    }
}

impl SValue {
    pub fn now(v: Value) -> Self {
        SValue::Now(v)
    }

    pub fn later(residual: Expression, constraint: Constraint, provenance: Arc<Provenance>) -> Self {
        debug_assert!(
            crate::expr::is_residual_safe(&residual),
            "residual expression must not contain forceNow/forceLater/typeOf or shape-destructuring lets"
        );
        SValue::Later {
            residual: Arc::new(residual),
            constraint,
            provenance,
        }
    }

    pub fn is_now(&self) -> bool {
        matches!(self, SValue::Now(_))
    }

    pub fn is_later(&self) -> bool {
        matches!(self, SValue::Later { .. })
    }

    /// The constraint describing this staged value, whether known or residual.
    pub fn constraint(&self) -> Constraint {
        match self {
            SValue::Now(v) => v.constraint(),
            SValue::Later { constraint, .. } => constraint.clone(),
        }
    }

    /// The provenance of this value, used to key facts in the refinement
    /// context. `Now` values have no syntactic origin worth tracking.
    pub fn provenance(&self) -> Arc<Provenance> {
        match self {
            SValue::Now(v) => Arc::new(Provenance::Literal(v.to_string())),
            SValue::Later { provenance, .. } => provenance.clone(),
        }
    }

    /// Re-express this staged value as an expression — a `Now` value is
    /// reified into a literal/object/array tree, a `Later` value is
    /// already an expression.
    pub fn into_expr(self) -> Expression {
        match self {
            SValue::Now(v) => value_to_expr(&v),
            SValue::Later { residual, .. } => (*residual).clone(),
        }
    }
}

fn value_to_expr(v: &Value) -> Expression {
    use crate::expr::Literal;
    match v {
        Value::Number(n) => Expression::Literal(Literal::Number(*n)),
        Value::String(s) => Expression::Literal(Literal::String(s.clone())),
        Value::Bool(b) => Expression::Literal(Literal::Bool(*b)),
        Value::Null => Expression::Literal(Literal::Null),
        Value::Object(fields) => Expression::Object(
            fields
                .iter()
                .map(|(k, v)| (*k, v.clone().into_expr()))
                .collect(),
        ),
        Value::Array(items) => {
            Expression::Array(items.iter().map(|v| v.clone().into_expr()).collect())
        }
        Value::Closure(c) => {
            let mut bound: FxHashSet<Symbol> = c.params.iter().copied().collect();
            if let Some(self_name) = c.self_name {
                bound.insert(self_name);
            }
            Expression::Fn {
                params: c.params.clone(),
                body: Arc::new(fold_captures(&c.body, &c.env, &mut bound)),
            }
        }
        Value::Type(_) => Expression::Literal(Literal::Null),
    }
}

/// Fold a closure's captured bindings for its body's free variables into
/// the body itself, so a reified closure carries no reference to an
/// environment that won't exist once it's embedded in a residual — a `Now`
/// capture becomes a literal, a `Later` capture becomes its residual.
/// `bound` tracks names the closure's own params/patterns already shadow,
/// which must be left alone rather than resolved against `env`.
fn fold_captures(body: &Expression, env: &Environment, bound: &mut FxHashSet<Symbol>) -> Expression {
    match body {
        Expression::Literal(_) => body.clone(),

        Expression::Var(name) => {
            if bound.contains(name) {
                return body.clone();
            }
            match env.lookup(*name) {
                Some(SValue::Now(v)) => value_to_expr(&v),
                Some(SValue::Later { residual, .. }) => (*residual).clone(),
                None => body.clone(),
            }
        }

        Expression::Binary { op, left, right } => Expression::Binary {
            op: *op,
            left: Arc::new(fold_captures(left, env, bound)),
            right: Arc::new(fold_captures(right, env, bound)),
        },

        Expression::Unary { op, operand } => Expression::Unary {
            op: *op,
            operand: Arc::new(fold_captures(operand, env, bound)),
        },

        Expression::If {
            cond,
            then_branch,
            else_branch,
        } => Expression::If {
            cond: Arc::new(fold_captures(cond, env, bound)),
            then_branch: Arc::new(fold_captures(then_branch, env, bound)),
            else_branch: Arc::new(fold_captures(else_branch, env, bound)),
        },

        Expression::Let { pattern, value, body: let_body } => {
            let folded_value = fold_captures(value, env, bound);
            let mut inner_bound = bound.clone();
            add_pattern_names(pattern, &mut inner_bound);
            Expression::Let {
                pattern: pattern.clone(),
                value: Arc::new(folded_value),
                body: Arc::new(fold_captures(let_body, env, &mut inner_bound)),
            }
        }

        Expression::Fn { params, body: fn_body } => {
            let mut inner_bound = bound.clone();
            inner_bound.extend(params.iter().copied());
            Expression::Fn {
                params: params.clone(),
                body: Arc::new(fold_captures(fn_body, env, &mut inner_bound)),
            }
        }

        Expression::RecFn {
            self_name,
            params,
            body: fn_body,
        } => {
            let mut inner_bound = bound.clone();
            inner_bound.insert(*self_name);
            inner_bound.extend(params.iter().copied());
            Expression::RecFn {
                self_name: *self_name,
                params: params.clone(),
                body: Arc::new(fold_captures(fn_body, env, &mut inner_bound)),
            }
        }

        Expression::Call { callee, args } => Expression::Call {
            callee: Arc::new(fold_captures(callee, env, bound)),
            args: args.iter().map(|a| fold_captures(a, env, bound)).collect(),
        },

        Expression::Object(fields) => Expression::Object(
            fields.iter().map(|(n, e)| (*n, fold_captures(e, env, bound))).collect(),
        ),

        Expression::Field { object, name } => Expression::Field {
            object: Arc::new(fold_captures(object, env, bound)),
            name: *name,
        },

        Expression::Array(items) => {
            Expression::Array(items.iter().map(|e| fold_captures(e, env, bound)).collect())
        }

        Expression::Index { array, index } => Expression::Index {
            array: Arc::new(fold_captures(array, env, bound)),
            index: Arc::new(fold_captures(index, env, bound)),
        },

        Expression::Block(items) => {
            Expression::Block(items.iter().map(|e| fold_captures(e, env, bound)).collect())
        }

        Expression::ForceNow(inner) => Expression::ForceNow(Arc::new(fold_captures(inner, env, bound))),
        Expression::ForceLater(inner) => Expression::ForceLater(Arc::new(fold_captures(inner, env, bound))),

        Expression::Assert {
            expr,
            constraint,
            message,
        } => Expression::Assert {
            expr: Arc::new(fold_captures(expr, env, bound)),
            constraint: constraint.clone(),
            message: message.clone(),
        },

        Expression::Trust { expr, constraint } => Expression::Trust {
            expr: Arc::new(fold_captures(expr, env, bound)),
            constraint: constraint.clone(),
        },

        Expression::MethodCall { receiver, name, args } => Expression::MethodCall {
            receiver: Arc::new(fold_captures(receiver, env, bound)),
            name: *name,
            args: args.iter().map(|a| fold_captures(a, env, bound)).collect(),
        },

        Expression::TypeOf(inner) => Expression::TypeOf(Arc::new(fold_captures(inner, env, bound))),

        Expression::Import { names, module, body: import_body } => {
            let mut inner_bound = bound.clone();
            inner_bound.extend(names.iter().copied());
            Expression::Import {
                names: names.clone(),
                module: module.clone(),
                body: Arc::new(fold_captures(import_body, env, &mut inner_bound)),
            }
        }
    }
}

fn add_pattern_names(pattern: &Pattern, set: &mut FxHashSet<Symbol>) {
    match pattern {
        Pattern::Var(name) => {
            set.insert(*name);
        }
        Pattern::Positional(patterns) => patterns.iter().for_each(|p| add_pattern_names(p, set)),
        Pattern::Named(fields) => fields.iter().for_each(|(_, p)| add_pattern_names(p, set)),
    }
}
