// fuzz_targets/build_tree.rs
#![no_main]

use std::sync::Arc;

use embed_reflect::types::INT;
use embed_reflect::{
    build, CallError, Field, MethodDecl, ReceiverKind, ResolveError, TypeId, TypeTable, Value,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&n, rest)) = data.split_first() else {
        return;
    };
    let n = usize::from(n % 8) + 1;

    let mut t = TypeTable::new();
    let records: Vec<TypeId> = (0..n)
        .map(|i| t.declare_record("fuzz", &format!("T{i}")))
        .collect();

    // Each byte: low nibble picks a target, bit 4 asks for a reference,
    // bit 5 declares a shared method, bit 6 closes the current record.
    let mut current = 0usize;
    let mut targets: Vec<Vec<(usize, bool)>> = vec![Vec::new(); n];
    let mut shared = vec![false; n];
    for &b in rest {
        if current >= n {
            break;
        }
        let target = usize::from(b & 0x0f) % n;
        let by_ref = b & 0x10 != 0 || target <= current;
        if !targets[current].iter().any(|&(seen, _)| seen == target) {
            targets[current].push((target, by_ref));
        }
        shared[current] |= b & 0x20 != 0;
        if b & 0x40 != 0 {
            current += 1;
        }
    }

    for (i, embeds) in targets.into_iter().enumerate() {
        let fields: Vec<Field> = embeds
            .into_iter()
            .map(|(target, by_ref)| {
                let ty = if by_ref {
                    t.pointer_to(records[target])
                } else {
                    records[target]
                };
                Field::embedded(ty)
            })
            .collect();
        t.set_fields(records[i], fields).expect("value embedding only points forward");
        t.add_method(
            records[i],
            MethodDecl::new(format!("M{i}"), ReceiverKind::Ref, |_, _| Vec::new()).input(INT),
        )
        .expect("method names are unique");
        if shared[i] {
            t.add_method(
                records[i],
                MethodDecl::new("Run", ReceiverKind::Value, |_, _| Vec::new()),
            )
            .expect("method names are unique");
        }
    }

    let types = Arc::new(t);
    let Ok(instance) = types.instance(records[0]) else {
        return;
    };
    let tree = build(Arc::clone(&types), &instance).expect("root is a record");

    let nodes: Vec<_> = tree.all_nodes().collect();
    assert_eq!(nodes[0], tree.root());
    for &node in &nodes {
        assert!(tree.ancestors(node).count() <= n);
    }
    assert_eq!(tree.all_methods().len(), tree.method_count());

    for m in tree.all_methods() {
        let mut calls = 0usize;
        let mut resolver = |_: TypeId| {
            calls += 1;
            Ok::<_, ResolveError>(Value::Int(0))
        };
        match tree.call(&instance, m, &mut resolver) {
            Ok(out) => assert!(out.is_empty()),
            Err(CallError::MissingComponent { .. }) => assert_eq!(calls, 0),
            Err(other) => panic!("{}: {other}", tree.method_name(m)),
        }
    }
});
