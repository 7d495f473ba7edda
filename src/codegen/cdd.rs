//! Compilation-declaration descriptors
//!
//! One `Cdd` is created per top-level object. It accumulates the C forward
//! declaration and the C definition as separate buffers, plus everything the
//! driver needs afterwards: which external objects the definition requires,
//! which same-unit objects it mentions (for topological ordering), and a
//! complexity counter that decides whether a function body is small enough to
//! live in the header.

use std::collections::{BTreeMap, BTreeSet};

/// What kind of top-level object a descriptor belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Type,
    Const,
    Var,
    Func,
}

/// Identity of a cross-unit reference: owning package path plus object name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefKey {
    pub pkg: String,
    pub name: String,
}

impl RefKey {
    pub fn new(pkg: impl Into<String>, name: impl Into<String>) -> Self {
        RefKey {
            pkg: pkg.into(),
            name: name.into(),
        }
    }
}

/// Per-declaration descriptor
#[derive(Debug)]
pub struct Cdd {
    /// Mangled name of the object being defined
    pub name: String,
    pub kind: DeclKind,
    /// C forward declaration
    pub decl: String,
    /// C definition
    pub def: String,
    /// Cross-unit references; the flag is true when the full definition is
    /// needed, false when the declaration alone suffices
    pub refs: BTreeMap<RefKey, bool>,
    /// References discovered while emitting nested bodies, hoisted into
    /// `refs` when the owning function is finalised
    pub body_uses: BTreeMap<RefKey, bool>,
    /// Mangled names of same-unit package-level objects this declaration
    /// mentions; drives the driver's topological sort
    pub local_deps: BTreeSet<String>,
    /// Grows with every translated node
    pub complexity: u32,
    /// Current indentation level
    pub il: usize,
    /// Definition belongs in the header (types, small functions)
    pub def_in_header: bool,
    /// Hoisted nested-function definitions waiting to be flushed before the
    /// statement that produced them
    pub pre_stmts: Vec<String>,
    /// Tuple typedefs this declaration introduced; prepended to `decl` when
    /// the descriptor is finalised
    pub tuple_typedefs: Vec<String>,
}

impl Cdd {
    pub fn new(name: impl Into<String>, kind: DeclKind, il: usize) -> Self {
        Cdd {
            name: name.into(),
            kind,
            decl: String::new(),
            def: String::new(),
            refs: BTreeMap::new(),
            body_uses: BTreeMap::new(),
            local_deps: BTreeSet::new(),
            complexity: 0,
            il,
            def_in_header: false,
            pre_stmts: Vec::new(),
            tuple_typedefs: Vec::new(),
        }
    }

    /// Record a cross-unit reference. A direct use never downgrades to an
    /// indirect one.
    pub fn add_ref(&mut self, key: RefKey, direct: bool) {
        let e = self.refs.entry(key).or_insert(false);
        *e = *e || direct;
    }

    /// Record a same-unit dependency on a package-level object
    pub fn add_local(&mut self, mangled: impl Into<String>) {
        self.local_deps.insert(mangled.into());
    }

    /// Write the current indentation
    pub fn indent(&self, w: &mut String) {
        for _ in 0..self.il {
            w.push('\t');
        }
    }

    /// Write indentation one level shallower (label placement)
    pub fn indent_out(&self, w: &mut String) {
        for _ in 0..self.il.saturating_sub(1) {
            w.push('\t');
        }
    }

    /// Absorb a nested descriptor's reference sets (local declarations and
    /// hoisted function literals report through their owner)
    pub fn merge_uses(&mut self, child: &Cdd) {
        for (k, d) in &child.refs {
            let e = self.body_uses.entry(k.clone()).or_insert(false);
            *e = *e || *d;
        }
        for (k, d) in &child.body_uses {
            let e = self.body_uses.entry(k.clone()).or_insert(false);
            *e = *e || *d;
        }
        for dep in &child.local_deps {
            self.local_deps.insert(dep.clone());
        }
    }

    /// Fold body uses into the reference set; called once per finished
    /// descriptor
    pub fn hoist_body_uses(&mut self) {
        let uses = std::mem::take(&mut self.body_uses);
        for (k, d) in uses {
            self.add_ref(k, d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_wins_over_indirect() {
        let mut cdd = Cdd::new("x", DeclKind::Var, 0);
        cdd.add_ref(RefKey::new("p", "a"), false);
        cdd.add_ref(RefKey::new("p", "a"), true);
        cdd.add_ref(RefKey::new("p", "a"), false);
        assert_eq!(cdd.refs[&RefKey::new("p", "a")], true);
    }

    #[test]
    fn body_uses_hoist_into_refs() {
        let mut outer = Cdd::new("f", DeclKind::Func, 0);
        let mut inner = Cdd::new("g", DeclKind::Func, 1);
        inner.add_ref(RefKey::new("q", "b"), true);
        outer.merge_uses(&inner);
        assert!(outer.refs.is_empty());
        outer.hoist_body_uses();
        assert_eq!(outer.refs[&RefKey::new("q", "b")], true);
    }
}
