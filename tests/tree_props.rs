mod common;

use std::sync::Arc;

use common::Counting;
use embed_reflect::types::INT;
use embed_reflect::walk::{walk_tree, Visitor, Walk};
use embed_reflect::{
    build, CallError, Field, MethodDecl, MethodId, NodeId, ReceiverKind, TypeId, TypeTable,
    TypeTree, Value,
};
use proptest::prelude::*;
use rustc_hash::FxHashSet;

/// Per record: embedded `(target, by_ref)` pairs, and whether it declares `Run`.
#[derive(Debug, Clone)]
struct Graph {
    edges: Vec<Vec<(usize, bool)>>,
    run: Vec<bool>,
}

fn graph() -> impl Strategy<Value = Graph> {
    (2usize..6).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::collection::vec((0..n, any::<bool>()), 0..3), n),
            prop::collection::vec(any::<bool>(), n),
        )
            .prop_map(|(edges, run)| Graph { edges, run })
    })
}

/// Registers `T0..Tn`. Value embedding only points at higher indices, so
/// records never contain themselves by value.
fn register(g: &Graph) -> (Arc<TypeTable>, Vec<TypeId>) {
    let mut t = TypeTable::new();
    let records: Vec<TypeId> = (0..g.edges.len())
        .map(|i| t.declare_record("gen", &format!("T{i}")))
        .collect();

    for (i, edges) in g.edges.iter().enumerate() {
        let mut seen = FxHashSet::default();
        let mut fields = vec![Field::named("N", INT)];
        for &(target, by_ref) in edges {
            if !seen.insert(target) {
                continue;
            }
            let ty = if by_ref || target <= i {
                t.pointer_to(records[target])
            } else {
                records[target]
            };
            fields.push(Field::embedded(ty));
        }
        t.set_fields(records[i], fields).unwrap();

        let receiver = if i % 2 == 0 {
            ReceiverKind::Ref
        } else {
            ReceiverKind::Value
        };
        t.add_method(
            records[i],
            MethodDecl::new(format!("M{i}"), receiver, |_, _| Vec::new()).input(INT),
        )
        .unwrap();
        if g.run[i] {
            t.add_method(
                records[i],
                MethodDecl::new("Run", receiver, |_, _| Vec::new()).input(INT),
            )
            .unwrap();
        }
    }
    (Arc::new(t), records)
}

#[derive(Default)]
struct Order {
    nodes: Vec<NodeId>,
    methods: Vec<MethodId>,
}

impl<'t> Visitor<'t> for Order {
    fn visit_node(&mut self, t: &'t TypeTree, id: NodeId) {
        self.nodes.push(id);
        t.node(id).walk(t, self);
    }

    fn visit_method(&mut self, _: &'t TypeTree, id: MethodId) {
        self.methods.push(id);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn names_extend_their_parent_and_never_repeat(g in graph()) {
        let (types, records) = register(&g);
        let instance = types.instance(records[0]).unwrap();
        let tree = build(Arc::clone(&types), &instance).unwrap();

        let nodes: Vec<NodeId> = tree.all_nodes().collect();
        prop_assert_eq!(nodes[0], tree.root());

        let mut names = FxHashSet::default();
        for &n in &nodes {
            let name = tree.node_name(n);
            prop_assert!(names.insert(name.clone()), "repeated name {}", name);
            let node = tree.node(n);
            if let (Some(parent), Some(field)) = (node.parent, node.field_name) {
                let expected = format!("{}.{}", tree.node_name(parent), types.resolve(field));
                prop_assert_eq!(name, expected);
            }
        }
    }

    #[test]
    fn no_type_repeats_along_an_ancestor_chain(g in graph()) {
        let (types, records) = register(&g);
        let instance = types.instance(records[0]).unwrap();
        let tree = build(Arc::clone(&types), &instance).unwrap();

        for n in tree.all_nodes() {
            let mut chain = FxHashSet::default();
            for a in tree.ancestors(n) {
                let record = types.deref(tree.node(a).ty);
                prop_assert!(chain.insert(record), "{} repeats", tree.node_name(n));
            }
        }
    }

    #[test]
    fn visitor_agrees_with_flattened_lists(g in graph()) {
        let (types, records) = register(&g);
        let instance = types.instance(records[0]).unwrap();
        let tree = build(Arc::clone(&types), &instance).unwrap();

        let mut order = Order::default();
        walk_tree(&tree, &mut order);
        prop_assert_eq!(order.nodes, tree.all_nodes().collect::<Vec<_>>());
        prop_assert_eq!(order.methods, tree.all_methods().collect::<Vec<_>>());

        for m in tree.all_methods() {
            let entry = tree.method(m);
            prop_assert!(tree.methods(entry.owner).any(|x| x == m));
            let expected = format!(
                "{}.{}",
                tree.node_name(entry.owner),
                types.resolve(entry.name)
            );
            prop_assert_eq!(tree.method_name(m), expected);
        }
    }

    #[test]
    fn calls_on_a_zero_instance_resolve_only_when_the_receiver_exists(g in graph()) {
        let (types, records) = register(&g);
        let instance = types.instance(records[0]).unwrap();
        let tree = build(Arc::clone(&types), &instance).unwrap();

        for m in tree.all_methods() {
            let mut resolver = Counting::default();
            match tree.call(&instance, m, &mut resolver) {
                Ok(out) => {
                    prop_assert!(out.is_empty());
                    prop_assert_eq!(resolver.calls, 1);
                }
                Err(CallError::MissingComponent { .. }) => prop_assert_eq!(resolver.calls, 0),
                Err(other) => prop_assert!(false, "{}: {}", tree.method_name(m), other),
            }
        }
    }
}

// =============================================================================
// Deep chains
// =============================================================================

/// `L0 { *L1 }`, `L1 { *L2 }`, ... with `Leaf() int` declared on the last link.
fn chain(depth: usize) -> (Arc<TypeTable>, Value) {
    let mut t = TypeTable::new();
    let links: Vec<TypeId> = (0..=depth)
        .map(|i| t.declare_record("stress", &format!("L{i}")))
        .collect();
    for i in 0..depth {
        let next = t.pointer_to(links[i + 1]);
        t.set_fields(links[i], [Field::embedded(next)]).unwrap();
    }
    t.set_fields(links[depth], [Field::named("Depth", INT)])
        .unwrap();
    t.add_method(
        links[depth],
        MethodDecl::new("Leaf", ReceiverKind::Value, |recv, _| {
            vec![recv.get("Depth").cloned().unwrap_or(Value::Int(-1))]
        })
        .output(INT),
    )
    .unwrap();

    let mut last = t.zero_record(links[depth]).unwrap();
    last.set("Depth", depth as i64).unwrap();
    let mut value = last.into_ref();
    for i in (0..depth).rev() {
        let mut rec = t.zero_record(links[i]).unwrap();
        rec.set(&format!("L{}", i + 1), value).unwrap();
        value = rec.into_ref();
    }
    (Arc::new(t), value)
}

#[test]
fn deep_chain_calls_reach_the_last_link() {
    let (types, root) = chain(16);
    let tree = build(types, &root).unwrap();
    assert_eq!(tree.node_count(), 17);
    assert_eq!(tree.method_count(), 17);
    let leaf = tree.find_method("*stress.L0.Leaf").unwrap();
    assert_eq!(
        tree.call(&root, leaf, &mut common::by_kind).unwrap(),
        [Value::Int(16)]
    );
}

#[test]
fn deep_chain_stress_if_configured() {
    let Some(depth) = std::env::var_os("EMBED_REFLECT_STRESS_DEPTH") else {
        eprintln!("EMBED_REFLECT_STRESS_DEPTH not set; skipping stress test");
        return;
    };
    let depth: usize = depth
        .to_string_lossy()
        .parse()
        .expect("EMBED_REFLECT_STRESS_DEPTH must be a number");

    let handle = std::thread::Builder::new()
        .stack_size(256 << 20)
        .spawn(move || {
            let (types, root) = chain(depth);
            let tree = build(types, &root).unwrap();
            assert_eq!(tree.node_count(), depth + 1);
            let leaf = tree.methods(tree.root()).next().unwrap();
            let out = tree.call(&root, leaf, &mut common::by_kind).unwrap();
            assert_eq!(out, [Value::Int(depth as i64)]);
            eprintln!("Called through {depth} composed references.");
        })
        .unwrap();
    handle.join().unwrap();
}
