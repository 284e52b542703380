#![allow(dead_code)]

use serde_json::{json, Value};

use confres::tree::{parse_tree_json, value_from_json, value_to_json};
use confres::{resolve_document, ConfigError, ConfigResolveOptions, ConfigValue};
use confres_contracts::CONFRES_TREE_SCHEMA_VERSION;

pub fn tree(root: Value) -> ConfigValue {
    value_from_json(&root, "test").expect("build tree from JSON")
}

pub fn document(root: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "schema_version": CONFRES_TREE_SCHEMA_VERSION,
        "root": root,
    }))
    .expect("encode tree document JSON")
}

pub fn parse_document(root: Value) -> ConfigValue {
    parse_tree_json(&document(root), "test").expect("parse tree document")
}

pub fn resolve_json_with(root: Value, options: ConfigResolveOptions) -> Result<Value, ConfigError> {
    let root = tree(root);
    resolve_document(&root, options).map(|v| value_to_json(&v))
}

pub fn resolve_json(root: Value) -> Result<Value, ConfigError> {
    resolve_json_with(root, ConfigResolveOptions::defaults())
}

pub fn subst(path: &str) -> Value {
    json!({ "$subst": path })
}

pub fn opt_subst(path: &str) -> Value {
    json!({ "$subst": path, "optional": true })
}

pub fn merge(items: Vec<Value>) -> Value {
    json!({ "$merge": items })
}
