//! `ModuleResolver`: the one external collaborator the evaluator depends
//! on (spec.md §6). Loading a module — finding it, parsing it, recursively
//! evaluating it — is explicitly out of scope for `refine-core`; a host
//! embedding the evaluator supplies a resolver that already knows how to
//! produce bindings for an `import`.

use crate::value::SValue;
use refine_util::Symbol;

/// Resolves an `import { names... } from "module"` expression to concrete
/// bindings. Implementations are free to parse source, consult a cache,
/// or reject everything — the evaluator only needs the result.
#[cfg_attr(test, mockall::automock)]
pub trait ModuleResolver {
    fn resolve(&mut self, module: &str, names: &[Symbol]) -> Result<Vec<(Symbol, SValue)>, String>;
}

/// A resolver that rejects every import. The default for a standalone
/// evaluator run (the CLI's `eval`/`simplify`/`prove` subcommands, for
/// instance) that has no host to delegate to.
pub struct NullResolver;

impl ModuleResolver for NullResolver {
    fn resolve(&mut self, module: &str, _names: &[Symbol]) -> Result<Vec<(Symbol, SValue)>, String> {
        Err(format!("no module resolver configured; cannot import `{module}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_resolver_rejects_everything() {
        let mut resolver = NullResolver;
        assert!(resolver.resolve("std/math", &[]).is_err());
    }
}
