//! # Composition Tree
//!
//! [`TypeTree::build`] walks a root record and every record it composes
//! anonymously, by value or through a reference, and catalogs the promoted
//! method set of each position.
//!
//! ## Shape
//!
//! - Nodes are allocated in pre-order: a node, then each embedded field's
//!   subtree in declaration order. Arena order *is* the flattened order.
//! - A node's methods are allocated right after the node, so the method arena
//!   is flattened in the same pre-order.
//! - Along any root-to-node chain no reference-to-record type repeats. This is
//!   a chain check only: the same record reached through two sibling paths is
//!   visited twice, under two names.
//!
//! ## Naming
//!
//! The root is named after its type (`*pkg.Root`); each descendant appends the
//! name of the embedded field that reaches it (`*pkg.Root.Inner.Leaf`). A
//! method is named `<node>.<method>`.

use std::fmt::Write as _;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::arena::{Arena, Id, ListRef, Symbol};
use crate::error::BuildError;
use crate::method_set::MethodSetEntry;
use crate::types::{TypeId, TypeTable};
use crate::value::Value;
use crate::walk::{Visitor, Walk};

pub type NodeId = Id<TypeNode>;
pub type MethodId = Id<MethodEntry>;

/// A position in the composition tree.
#[derive(Debug, Clone)]
pub struct TypeNode {
    /// Record type at this position (`T` or `*T`).
    pub ty: TypeId,
    pub parent: Option<NodeId>,
    /// Index of the embedded field in the parent's record. `0` for the root.
    pub field_index: u32,
    /// Name of that field; `None` for the root.
    pub field_name: Option<Symbol>,
    pub children: SmallVec<[NodeId; 4]>,
    pub methods: ListRef<MethodEntry>,
}

/// One method of a node's promoted method set.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub owner: NodeId,
    pub name: Symbol,
    /// Position in the owner type's sorted method set.
    pub index: u32,
    /// Parameters, receiver excluded.
    pub inputs: SmallVec<[TypeId; 4]>,
    pub outputs: SmallVec<[TypeId; 2]>,
}

/// Immutable composition tree and method catalog.
#[derive(Debug)]
pub struct TypeTree {
    types: Arc<TypeTable>,
    root: NodeId,
    nodes: Arena<TypeNode>,
    methods: Arena<MethodEntry>,
    /// Method sets keyed by reference type, shared by nodes of the same type.
    method_sets: FxHashMap<TypeId, Arc<[MethodSetEntry]>>,
}

/// Builds the tree for `root`; see [`TypeTree::build`].
#[inline]
pub fn build(types: Arc<TypeTable>, root: &Value) -> Result<TypeTree, BuildError> {
    TypeTree::build(types, root)
}

impl TypeTree {
    /// Builds the composition tree of `root`, a non-nil reference to a record.
    pub fn build(types: Arc<TypeTable>, root: &Value) -> Result<TypeTree, BuildError> {
        let root_ty = match root {
            Value::Ref(r) if types.deref_record(r.ty()).is_some() => {
                if r.is_nil() {
                    return Err(BuildError::NilRoot {
                        ty: types.type_name(r.ty()),
                    });
                }
                r.ty()
            }
            other => {
                return Err(BuildError::NonRecordRoot {
                    found: types.value_type_name(other),
                });
            }
        };

        let mut builder = Builder {
            types: &types,
            nodes: Arena::new(),
            methods: Arena::new(),
            method_sets: FxHashMap::default(),
        };
        let root = builder.add_node(root_ty, None);
        let Builder {
            nodes,
            methods,
            method_sets,
            ..
        } = builder;

        tracing::debug!(
            root = %types.type_name(root_ty),
            nodes = nodes.len(),
            methods = methods.len(),
            "built composition tree"
        );

        Ok(TypeTree {
            types,
            root,
            nodes,
            methods,
            method_sets,
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[inline]
    pub fn types(&self) -> &Arc<TypeTable> {
        &self.types
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Type of the root node (a reference to a record).
    #[inline]
    pub fn root_type(&self) -> TypeId {
        self.nodes[self.root].ty
    }

    /// Panics if `id` is out of range for this tree.
    #[inline]
    pub fn node(&self, id: NodeId) -> &TypeNode {
        debug_assert!(id.to_usize() < self.nodes.len(), "node id from another tree");
        &self.nodes[id]
    }

    /// Panics if `id` is out of range for this tree; see [`get_method`](Self::get_method).
    #[inline]
    pub fn method(&self, id: MethodId) -> &MethodEntry {
        debug_assert!(id.to_usize() < self.methods.len(), "method id from another tree");
        &self.methods[id]
    }

    #[inline]
    pub fn get_method(&self, id: MethodId) -> Option<&MethodEntry> {
        (id.to_usize() < self.methods.len()).then(|| &self.methods[id])
    }

    /// Direct composed sub-nodes, in field declaration order.
    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Methods of one node, sorted by name.
    #[inline]
    pub fn methods(&self, id: NodeId) -> impl ExactSizeIterator<Item = MethodId> {
        self.nodes[id].methods.ids()
    }

    /// Every node, pre-order.
    #[inline]
    pub fn all_nodes(&self) -> impl ExactSizeIterator<Item = NodeId> {
        self.nodes.ids()
    }

    /// Every method, in the same order as [`all_nodes`](Self::all_nodes).
    #[inline]
    pub fn all_methods(&self) -> impl ExactSizeIterator<Item = MethodId> {
        self.methods.ids()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Parent chain, starting with `id` itself and ending at the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), |&n| self.nodes[n].parent)
    }

    /// Field indices leading from the root to `id`.
    pub fn field_path(&self, id: NodeId) -> SmallVec<[u32; 8]> {
        let mut path: SmallVec<[u32; 8]> = self
            .ancestors(id)
            .filter(|&n| self.nodes[n].parent.is_some())
            .map(|n| self.nodes[n].field_index)
            .collect();
        path.reverse();
        path
    }

    /// Dotted display name, e.g. `*pkg.Root.Inner`.
    pub fn node_name(&self, id: NodeId) -> String {
        let mut segments: SmallVec<[NodeId; 8]> = self.ancestors(id).collect();
        segments.reverse();
        let mut name = self.types.type_name(self.nodes[segments[0]].ty);
        for &n in &segments[1..] {
            if let Some(field) = self.nodes[n].field_name {
                name.push('.');
                name.push_str(self.types.resolve(field));
            }
        }
        name
    }

    /// `<node name>.<method name>`.
    pub fn method_name(&self, id: MethodId) -> String {
        let m = &self.methods[id];
        let mut name = self.node_name(m.owner);
        name.push('.');
        name.push_str(self.types.resolve(m.name));
        name
    }

    /// Looks a method up by its display name.
    pub fn find_method(&self, display_name: &str) -> Option<MethodId> {
        self.all_methods()
            .find(|&id| self.method_name(id) == display_name)
    }

    /// Method set the entry was enumerated from.
    pub(crate) fn method_set_of(&self, entry: &MethodEntry) -> Option<&MethodSetEntry> {
        let owner_ty = self.nodes[entry.owner].ty;
        let key = self.types.ref_of(self.types.deref(owner_ty))?;
        self.method_sets.get(&key)?.get(entry.index as usize)
    }

    /// Indented outline of the tree, one node or method per line.
    pub fn outline(&self) -> String {
        let mut out = Outline {
            depth: 0,
            buf: String::new(),
        };
        out.visit_node(self, self.root);
        out.buf
    }
}

// =============================================================================
// Builder
// =============================================================================

struct Builder<'t> {
    types: &'t TypeTable,
    nodes: Arena<TypeNode>,
    methods: Arena<MethodEntry>,
    method_sets: FxHashMap<TypeId, Arc<[MethodSetEntry]>>,
}

impl Builder<'_> {
    fn add_node(&mut self, ty: TypeId, parent: Option<(NodeId, u32, Symbol)>) -> NodeId {
        let id = self.nodes.alloc(TypeNode {
            ty,
            parent: parent.map(|(p, _, _)| p),
            field_index: parent.map_or(0, |(_, i, _)| i),
            field_name: parent.map(|(_, _, name)| name),
            children: SmallVec::new(),
            methods: ListRef::EMPTY,
        });
        self.nodes[id].methods = self.catalog(id, ty);
        self.expand(id);
        id
    }

    /// Allocates the method entries of node `id`.
    fn catalog(&mut self, id: NodeId, ty: TypeId) -> ListRef<MethodEntry> {
        let types = self.types;
        let record = types.deref(ty);
        let key = types.ref_of(record).unwrap_or(record);
        let set = self
            .method_sets
            .entry(key)
            .or_insert_with(|| types.method_set(record).into())
            .clone();

        self.methods
            .alloc_list(set.iter().enumerate().filter_map(|(index, entry)| {
                let decl = entry.decl(types)?;
                Some(MethodEntry {
                    owner: id,
                    name: entry.name,
                    index: index as u32,
                    inputs: decl.inputs.clone(),
                    outputs: decl.outputs.clone(),
                })
            }))
    }

    /// Adds a child for every embedded record of node `id`.
    fn expand(&mut self, id: NodeId) {
        let types = self.types;
        let ty = self.nodes[id].ty;
        let Some(record) = types.deref_record(ty) else {
            return;
        };
        let Some(def) = types.record(record) else {
            return;
        };
        let self_ref = types.ref_of(record);

        for (i, field) in def.fields().iter().enumerate() {
            if !field.embedded {
                continue;
            }
            let Some(inner) = types.deref_record(field.ty) else {
                tracing::trace!(
                    field = types.resolve(field.name),
                    "skipping non-record embedding"
                );
                continue;
            };
            if field.ty == record || Some(field.ty) == self_ref {
                tracing::trace!(field = types.resolve(field.name), "skipping self reference");
                continue;
            }
            let inner_ref = types.ref_of(inner);
            if self.chain_contains(id, inner_ref) {
                tracing::trace!(
                    field = types.resolve(field.name),
                    "skipping type already on the ancestor chain"
                );
                continue;
            }

            let child = self.add_node(field.ty, Some((id, i as u32, field.name)));
            self.nodes[id].children.push(child);
        }
    }

    /// Whether a node on the chain from `id` to the root has reference type `ref_ty`.
    fn chain_contains(&self, id: NodeId, ref_ty: Option<TypeId>) -> bool {
        let mut cursor = Some(id);
        while let Some(n) = cursor {
            let node = &self.nodes[n];
            let node_ref = self.types.ref_of(self.types.deref(node.ty));
            if node_ref == ref_ty {
                return true;
            }
            cursor = node.parent;
        }
        false
    }
}

// =============================================================================
// Outline
// =============================================================================

struct Outline {
    depth: usize,
    buf: String,
}

impl<'t> Visitor<'t> for Outline {
    fn visit_node(&mut self, t: &'t TypeTree, id: NodeId) {
        let node = t.node(id);
        let ty = t.types().type_name(node.ty);
        let label = match node.field_name {
            Some(field) => format!("{} ({ty})", t.types().resolve(field)),
            None => ty,
        };
        let _ = writeln!(self.buf, "{:indent$}{label}", "", indent = self.depth * 2);
        self.depth += 1;
        node.walk(t, self);
        self.depth -= 1;
    }

    fn visit_method(&mut self, t: &'t TypeTree, id: MethodId) {
        let m = t.method(id);
        let types = t.types();
        let join = |tys: &[TypeId]| {
            tys.iter()
                .map(|&ty| types.type_name(ty))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = writeln!(
            self.buf,
            "{:indent$}.{}({}) ({})",
            "",
            types.resolve(m.name),
            join(&m.inputs),
            join(&m.outputs),
            indent = self.depth * 2
        );
    }
}
