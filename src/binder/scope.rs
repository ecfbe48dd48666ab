//! Lexical scope chain
//!
//! A [`ScopeChain`] is a stack of scopes, pushed on block and function
//! entry and popped on exit. Lookup walks from the innermost scope
//! outward, so the nearest declaration of a name wins (shadowing). Depth
//! strictly increases with nesting; the emitter uses it to form unique
//! assembly names for shadowed locals, so the chain is shared
//! infrastructure between binding and emission.

use crate::binder::symbols::VariableSymbol;
use rustc_hash::FxHashMap;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Scope {
    bindings: FxHashMap<String, Rc<VariableSymbol>>,
}

/// Stack of lexical scopes; index is depth.
#[derive(Debug, Default)]
pub struct ScopeChain {
    scopes: Vec<Scope>,
}

impl ScopeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a nested scope; its depth is one greater than the current.
    pub fn push(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Leave the innermost scope, discarding its bindings.
    pub fn pop(&mut self) {
        self.scopes
            .pop()
            .expect("scope chain popped more scopes than were pushed");
    }

    /// Depth of the innermost scope; 0 when no scope is open.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Bind a name in the innermost scope. Returns the shadowed-in-the-
    /// same-scope symbol if the name was already bound there.
    pub fn declare(&mut self, symbol: Rc<VariableSymbol>) -> Option<Rc<VariableSymbol>> {
        let scope = self
            .scopes
            .last_mut()
            .expect("declared a variable with no open scope");
        scope.bindings.insert(symbol.name.clone(), symbol)
    }

    /// Innermost-first lookup; returns the symbol and the depth it was
    /// found at.
    pub fn lookup(&self, name: &str) -> Option<(Rc<VariableSymbol>, usize)> {
        for (index, scope) in self.scopes.iter().enumerate().rev() {
            if let Some(symbol) = scope.bindings.get(name) {
                return Some((Rc::clone(symbol), index + 1));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::types::Ty;

    #[test]
    fn test_innermost_match_wins() {
        let mut chain = ScopeChain::new();
        chain.push();
        let outer = VariableSymbol::local("x", Ty::int());
        chain.declare(Rc::clone(&outer));

        chain.push();
        let inner = VariableSymbol::local("x", Ty::char());
        chain.declare(Rc::clone(&inner));

        let (found, depth) = chain.lookup("x").unwrap();
        assert!(Rc::ptr_eq(&found, &inner));
        assert_eq!(depth, 2);

        chain.pop();
        let (found, depth) = chain.lookup("x").unwrap();
        assert!(Rc::ptr_eq(&found, &outer));
        assert_eq!(depth, 1);
    }

    #[test]
    fn test_lookup_misses_after_pop() {
        let mut chain = ScopeChain::new();
        chain.push();
        chain.push();
        chain.declare(VariableSymbol::local("tmp", Ty::int()));
        assert!(chain.lookup("tmp").is_some());
        chain.pop();
        assert!(chain.lookup("tmp").is_none());
    }

    #[test]
    fn test_same_scope_redeclaration_is_reported() {
        let mut chain = ScopeChain::new();
        chain.push();
        assert!(chain.declare(VariableSymbol::local("x", Ty::int())).is_none());
        assert!(chain.declare(VariableSymbol::local("x", Ty::int())).is_some());
    }

    #[test]
    fn test_depth_tracks_nesting() {
        let mut chain = ScopeChain::new();
        assert_eq!(chain.depth(), 0);
        chain.push();
        chain.push();
        assert_eq!(chain.depth(), 2);
        chain.pop();
        assert_eq!(chain.depth(), 1);
    }

    #[test]
    #[should_panic(expected = "popped more scopes")]
    fn test_unbalanced_pop_panics() {
        let mut chain = ScopeChain::new();
        chain.pop();
    }
}
