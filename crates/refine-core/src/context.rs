//! The refinement context (C3): an accumulator of facts the prover can
//! draw on, and the sound-but-incomplete `prove` algorithm (spec.md §4.4).
//!
//! Structured the same way as `Environment` (`env.rs`) and for the same
//! reason: a `RefinementContext` is captured by closures and branched at
//! every `if`, so extending it must not disturb any other branch holding
//! a reference to the same parent.

use crate::constraint::Constraint;
use crate::value::{Provenance, SValue};
use std::rc::Rc;
use tracing::debug;

#[derive(Debug)]
struct Fact {
    provenance: Provenance,
    constraint: Constraint,
    parent: RefinementContext,
}

#[derive(Debug, Clone)]
pub struct RefinementContext(Option<Rc<Fact>>);

/// The result of [`RefinementContext::prove`]: the prover is sound but
/// incomplete, so `Unknown` is a legitimate, expected answer, not a
/// failure — it means "consult the caller's fallback", not "error".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofResult {
    True,
    False,
    Unknown,
}

impl RefinementContext {
    pub fn empty() -> Self {
        RefinementContext(None)
    }

    /// Record that `provenance` satisfies `constraint`, in addition to
    /// whatever was already known about it.
    pub fn assume(&self, provenance: Provenance, constraint: Constraint) -> RefinementContext {
        RefinementContext(Some(Rc::new(Fact {
            provenance,
            constraint,
            parent: self.clone(),
        })))
    }

    /// The conjunction of every fact recorded about `provenance`, walking
    /// the whole chain. `Any` if nothing is known.
    pub fn facts_for(&self, provenance: &Provenance) -> Constraint {
        let mut acc = Constraint::Any;
        let mut cursor = &self.0;
        while let Some(fact) = cursor {
            if &fact.provenance == provenance {
                acc = acc.unify(&fact.constraint);
            }
            cursor = &fact.parent.0;
        }
        acc
    }

    /// Ask whether `goal` holds, given everything currently known about
    /// `provenance`. Sound: a `True`/`False` answer is guaranteed correct.
    /// Incomplete: `Unknown` may mean the goal does hold but the prover
    /// can't see it (spec.md §4.4).
    pub fn prove(&self, provenance: &Provenance, goal: &Constraint) -> ProofResult {
        let known = self.facts_for(provenance);
        let result = if known.implies(goal) {
            ProofResult::True
        } else if known.implies(&goal.negate()) {
            ProofResult::False
        } else {
            ProofResult::Unknown
        };
        debug!(?provenance, %goal, ?result, "prove");
        result
    }

    /// Prove a goal about a staged value directly: its own constraint
    /// (from being `Now`, or from being a `Later` residual) is unified
    /// with whatever the context separately knows about its provenance.
    pub fn prove_value(&self, value: &SValue, goal: &Constraint) -> ProofResult {
        let own = value.constraint();
        let contextual = self.facts_for(&value.provenance());
        let known = own.unify(&contextual);
        let result = if known.implies(goal) {
            ProofResult::True
        } else if known.implies(&goal.negate()) {
            ProofResult::False
        } else {
            ProofResult::Unknown
        };
        debug!(%known, %goal, ?result, "prove_value");
        result
    }
}

impl Default for RefinementContext {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refine_util::Symbol;

    fn var(name: &str) -> Provenance {
        Provenance::Variable(Symbol::intern(name))
    }

    #[test]
    fn empty_context_knows_nothing() {
        let ctx = RefinementContext::empty();
        assert_eq!(ctx.prove(&var("x"), &Constraint::IsNumber), ProofResult::Unknown);
    }

    #[test]
    fn assumed_fact_proves_itself() {
        let ctx = RefinementContext::empty().assume(var("x"), Constraint::IsNumber);
        assert_eq!(ctx.prove(&var("x"), &Constraint::IsNumber), ProofResult::True);
    }

    #[test]
    fn assumed_fact_disproves_contradiction() {
        let ctx = RefinementContext::empty().assume(var("x"), Constraint::IsNumber);
        assert_eq!(ctx.prove(&var("x"), &Constraint::IsString), ProofResult::False);
    }

    #[test]
    fn unrelated_provenance_is_unaffected() {
        let ctx = RefinementContext::empty().assume(var("x"), Constraint::IsNumber);
        assert_eq!(ctx.prove(&var("y"), &Constraint::IsNumber), ProofResult::Unknown);
    }

    #[test]
    fn facts_accumulate_via_unify() {
        let ctx = RefinementContext::empty()
            .assume(var("x"), Constraint::Gt(0.0))
            .assume(var("x"), Constraint::Lt(10.0));
        assert_eq!(
            ctx.prove(&var("x"), &Constraint::And(vec![Constraint::Gt(0.0), Constraint::Lt(10.0)])),
            ProofResult::True
        );
    }

    #[test]
    fn branch_extension_does_not_leak_to_sibling() {
        let base = RefinementContext::empty();
        let left = base.assume(var("x"), Constraint::Gt(0.0));
        let right = base.assume(var("x"), Constraint::Lt(0.0));
        assert_eq!(left.prove(&var("x"), &Constraint::Gt(0.0)), ProofResult::True);
        assert_eq!(right.prove(&var("x"), &Constraint::Gt(0.0)), ProofResult::False);
    }
}
