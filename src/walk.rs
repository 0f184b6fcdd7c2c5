use crate::tree::{MethodEntry, MethodId, NodeId, TypeNode, TypeTree};

// Core traits
pub trait Walk<'t> {
    fn walk<V: Visitor<'t> + ?Sized>(&self, t: &'t TypeTree, v: &mut V);
}

/// Pre-order visitor over a [`TypeTree`]: a node, its methods, then each
/// child subtree in field declaration order.
pub trait Visitor<'t> {
    #[inline(always)]
    fn visit_node(&mut self, t: &'t TypeTree, id: NodeId) {
        t.node(id).walk(t, self);
    }

    #[inline(always)]
    fn visit_method(&mut self, t: &'t TypeTree, id: MethodId) {
        t.method(id).walk(t, self);
    }
}

macro_rules! impl_walk_for_ids {
    ($($id:ty => $visit:ident),* $(,)?) => {
        $(
            impl<'t> Walk<'t> for $id {
                #[inline(always)]
                fn walk<V: Visitor<'t> + ?Sized>(&self, t: &'t TypeTree, v: &mut V) {
                    v.$visit(t, *self);
                }
            }
        )*
    };
}

impl_walk_for_ids! {
    NodeId => visit_node,
    MethodId => visit_method,
}

impl<'t> Walk<'t> for TypeNode {
    #[inline(always)]
    fn walk<V: Visitor<'t> + ?Sized>(&self, t: &'t TypeTree, v: &mut V) {
        for m in self.methods.ids() {
            m.walk(t, v);
        }
        for c in &self.children {
            c.walk(t, v);
        }
    }
}

// Leaf.
impl<'t> Walk<'t> for MethodEntry {
    #[inline(always)]
    fn walk<V: Visitor<'t> + ?Sized>(&self, _: &'t TypeTree, _: &mut V) {}
}

/// Walks the whole tree from its root.
pub fn walk_tree<'t, V: Visitor<'t> + ?Sized>(t: &'t TypeTree, v: &mut V) {
    v.visit_node(t, t.root());
}
