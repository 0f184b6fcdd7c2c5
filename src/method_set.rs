//! Promoted method sets.
//!
//! The method set of `*T` holds every method declared on `T` (value or
//! reference receiver) plus the methods promoted through embedded fields:
//!
//! - embedded records are expanded breadth-first, one depth at a time;
//! - a name seen at a shallower depth (method *or* field) shadows deeper ones;
//! - a name found twice at the same depth is ambiguous and dropped;
//! - a record already expanded at a shallower depth is not expanded again;
//! - only exported names (uppercase first letter) are enumerable.
//!
//! The result is sorted by name; an entry's position is the stable index the
//! invoker uses to find the method again.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::arena::Symbol;
use crate::types::{MethodDef, TypeId, TypeTable};

/// Field-index path from an owner record down to a composed record.
pub type FieldPath = SmallVec<[u32; 4]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSetEntry {
    pub name: Symbol,
    /// Record the method is declared on.
    pub declared_on: TypeId,
    /// Index into `declared_on`'s declared methods.
    pub decl_index: u32,
    /// Embedded fields to step through, from the owner to `declared_on`.
    pub path: FieldPath,
}

impl MethodSetEntry {
    #[inline]
    pub fn decl<'t>(&self, types: &'t TypeTable) -> Option<&'t MethodDef> {
        types
            .record(self.declared_on)?
            .methods()
            .get(self.decl_index as usize)
    }

    /// Depth of promotion; `0` for methods declared on the owner itself.
    #[inline]
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

#[derive(Debug, Clone)]
struct Embedded {
    record: TypeId,
    path: FieldPath,
    /// Reached through more than one path at this depth.
    multiples: bool,
}

/// `None` marks a name that is shadowed or ambiguous.
type Candidates = FxHashMap<Symbol, Option<MethodSetEntry>>;

impl TypeTable {
    /// Method set of a reference to `ty` (a record or a reference to one).
    ///
    /// Returns an empty set for anything else.
    pub fn method_set(&self, ty: TypeId) -> Vec<MethodSetEntry> {
        let Some(root) = self.deref_record(ty) else {
            return Vec::new();
        };

        let mut current = vec![Embedded {
            record: root,
            path: FieldPath::new(),
            multiples: false,
        }];
        let mut seen: FxHashSet<TypeId> = FxHashSet::default();
        let mut base: Candidates = FxHashMap::default();

        while !current.is_empty() {
            let mut next: Vec<Embedded> = Vec::new();
            let mut methods: Candidates = FxHashMap::default();
            let mut fields: FxHashSet<Symbol> = FxHashSet::default();

            for e in &current {
                if !seen.insert(e.record) {
                    continue;
                }
                let Some(def) = self.record(e.record) else {
                    continue;
                };

                for (i, m) in def.methods().iter().enumerate() {
                    let entry = MethodSetEntry {
                        name: m.name,
                        declared_on: e.record,
                        decl_index: i as u32,
                        path: e.path.clone(),
                    };
                    methods
                        .entry(m.name)
                        .and_modify(|slot| *slot = None)
                        .or_insert(if e.multiples { None } else { Some(entry) });
                }

                for (i, f) in def.fields().iter().enumerate() {
                    fields.insert(f.name);
                    if !f.embedded {
                        continue;
                    }
                    if let Some(inner) = self.deref_record(f.ty) {
                        let mut path = e.path.clone();
                        path.push(i as u32);
                        next.push(Embedded {
                            record: inner,
                            path,
                            multiples: e.multiples,
                        });
                    }
                }
            }

            for (name, entry) in methods {
                if base.contains_key(&name) {
                    continue;
                }
                let entry = if fields.contains(&name) { None } else { entry };
                base.insert(name, entry);
            }
            for name in fields {
                base.entry(name).or_insert(None);
            }

            current = consolidate(next);
        }

        let mut set: Vec<MethodSetEntry> = base
            .into_values()
            .flatten()
            .filter(|m| is_exported(self.resolve(m.name)))
            .collect();
        set.sort_by(|a, b| self.resolve(a.name).cmp(self.resolve(b.name)));
        set
    }
}

/// Merges entries for the same record, flagging them as reached twice.
fn consolidate(list: Vec<Embedded>) -> Vec<Embedded> {
    let mut out: Vec<Embedded> = Vec::with_capacity(list.len());
    for e in list {
        match out.iter_mut().find(|o| o.record == e.record) {
            Some(existing) => existing.multiples = true,
            None => out.push(e),
        }
    }
    out
}

#[inline]
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}
