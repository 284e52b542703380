use serde_json::{json, Value};

use confres::{resolve, ConfigError, ConfigResolveOptions, Path, ResolveError};

mod tree_util;
use tree_util::{merge, opt_subst, resolve_json, subst, tree};

fn assert_cycle(doc: Value) -> String {
    match resolve_json(doc.clone()) {
        Err(ConfigError::SubstitutionCycle { path, .. }) => path,
        other => panic!("expected a cycle for {doc}, got {other:?}"),
    }
}

#[test]
fn two_node_cycle_is_reported() {
    let path = assert_cycle(json!({"a": subst("b"), "b": subst("a")}));
    assert!(path == "a" || path == "b", "cycle names {path:?}");
}

#[test]
fn longer_cycles_are_reported() {
    assert_cycle(json!({"a": subst("b"), "b": subst("c"), "c": subst("a")}));
    assert_cycle(json!({"a": {"x": subst("b.y")}, "b": {"y": subst("a.x")}}));
}

#[test]
fn self_reference_is_a_cycle() {
    let path = assert_cycle(json!({"a": subst("a")}));
    assert_eq!(path, "a");
    assert_cycle(json!({"a": {"b": subst("a")}}));
}

#[test]
fn cycle_error_names_the_resolved_value() {
    let err = resolve_json(json!({"a": subst("b"), "b": subst("a")})).expect_err("cycle");
    let rendered = err.to_string();
    assert!(rendered.contains("part of a cycle"), "{rendered}");
}

#[test]
fn optional_self_reference_disappears() {
    let got = resolve_json(json!({"a": opt_subst("a"), "c": 2})).expect("resolve");
    assert_eq!(got, json!({"c": 2}));
}

#[test]
fn optional_cycle_disappears() {
    let got = resolve_json(json!({"a": opt_subst("b"), "b": opt_subst("a"), "c": 1}))
        .expect("resolve");
    assert_eq!(got, json!({"c": 1}));
}

#[test]
fn required_link_in_an_optional_cycle_still_fails() {
    let err = resolve_json(json!({"a": opt_subst("b"), "b": subst("a")})).expect_err("b is required");
    assert!(
        matches!(err, ConfigError::UnresolvedSubstitution { ref expression, .. } if expression == "${a}"),
        "unexpected error: {err:?}"
    );
}

#[test]
fn restricted_cycle_is_returned_as_not_possible() {
    let root = tree(json!({"a": subst("a")}));
    let err = resolve(
        &root,
        &root,
        ConfigResolveOptions::defaults(),
        Some(Path::new_key("a")),
    )
    .expect_err("cycle");
    assert!(err.is_not_possible_to_resolve(), "{err:?}");
    assert!(matches!(err, ResolveError::NotPossibleToResolve { .. }));
}

#[test]
fn pathological_documents_never_break_invariants() {
    let docs = vec![
        json!({"a": merge(vec![subst("a"), subst("a")])}),
        json!({"a": merge(vec![subst("b"), json!({"x": 1})]), "b": subst("a")}),
        json!({"a": merge(vec![json!({"x": subst("a.y")}), subst("a")])}),
        json!({"a": [subst("a")]}),
        json!({"a": subst("b.c"), "b": {"c": subst("a")}}),
        json!({"a": merge(vec![opt_subst("a"), json!({"y": subst("a.y")})])}),
        json!({"$merge": [opt_subst("x"), 5]}),
    ];
    for doc in docs {
        if let Err(err) = resolve_json(doc.clone()) {
            assert!(
                !matches!(err, ConfigError::BugOrBroken(_)),
                "broken invariant for {doc}: {err}"
            );
        }
    }
}
