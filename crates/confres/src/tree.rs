//! JSON tree documents.
//!
//! The tree arrives already parsed: placeholders and delayed merges are spelled
//! out as reserved JSON objects rather than parsed from any text syntax.
//!
//! ```json
//! {
//!   "schema_version": "confres.tree@0.1.0",
//!   "root": {
//!     "port": 8080,
//!     "url": {"$subst": "server.host", "optional": true},
//!     "server": {"$merge": [{"host": "localhost"}, {"$subst": "defaults.server"}]}
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use confres_contracts::CONFRES_TREE_SCHEMA_VERSION;

use crate::error::ConfigError;
use crate::origin::Origin;
use crate::path::Path;
use crate::value::{ConfigValue, SubstitutionExpression, ValueKind};

pub const SUBST_KEY: &str = "$subst";
pub const OPTIONAL_KEY: &str = "optional";
pub const MERGE_KEY: &str = "$merge";

pub fn parse_tree_json(bytes: &[u8], description: &str) -> Result<ConfigValue, ConfigError> {
    let origin = Origin::new(description);
    let doc: Value = serde_json::from_slice(bytes).map_err(|e| ConfigError::BadTree {
        origin: origin.clone(),
        message: e.to_string(),
    })?;
    let Some(doc_obj) = doc.as_object() else {
        return Err(bad(&origin, "", "tree document must be an object"));
    };

    match doc_obj.get("schema_version") {
        Some(Value::String(v)) if v == CONFRES_TREE_SCHEMA_VERSION => {}
        Some(Value::String(v)) => {
            return Err(bad(
                &origin,
                "/schema_version",
                &format!(
                    "unsupported schema_version: got {v:?} (supported: {CONFRES_TREE_SCHEMA_VERSION}) (hint: regenerate the tree with the current exporter)"
                ),
            ))
        }
        Some(_) => return Err(bad(&origin, "/schema_version", "schema_version must be a string")),
        None => return Err(bad(&origin, "", "missing schema_version")),
    }

    let Some(root) = doc_obj.get("root") else {
        return Err(bad(&origin, "", "missing root"));
    };
    let root = convert(root, &origin, "/root")?;
    match root.kind() {
        ValueKind::Object(_) | ValueKind::MergeStack(_) => Ok(root),
        _ => Err(bad(&origin, "/root", "root must be an object")),
    }
}

/// Converts a bare JSON value (no envelope) into a tree.
pub fn value_from_json(json: &Value, description: &str) -> Result<ConfigValue, ConfigError> {
    convert(json, &Origin::new(description), "")
}

/// Renders a tree back to JSON, spelling out unresolved nodes.
pub fn value_to_json(value: &ConfigValue) -> Value {
    match value.kind() {
        ValueKind::Null => Value::Null,
        ValueKind::Bool(b) => Value::Bool(*b),
        ValueKind::Number(n) => Value::Number(n.clone()),
        ValueKind::String(s) => Value::String(s.clone()),
        ValueKind::List(items) => Value::Array(items.iter().map(value_to_json).collect()),
        ValueKind::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        ValueKind::Substitution(expr) => {
            let mut m = Map::new();
            m.insert(SUBST_KEY.to_string(), Value::String(expr.path().render()));
            if expr.optional() {
                m.insert(OPTIONAL_KEY.to_string(), Value::Bool(true));
            }
            Value::Object(m)
        }
        ValueKind::MergeStack(items) => {
            let mut m = Map::new();
            m.insert(
                MERGE_KEY.to_string(),
                Value::Array(items.iter().map(value_to_json).collect()),
            );
            Value::Object(m)
        }
    }
}

fn bad(origin: &Origin, ptr: &str, message: &str) -> ConfigError {
    ConfigError::BadTree {
        origin: origin.with_pointer(ptr),
        message: message.to_string(),
    }
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn convert(json: &Value, origin: &Origin, ptr: &str) -> Result<ConfigValue, ConfigError> {
    let here = origin.with_pointer(ptr);
    let kind = match json {
        Value::Null => ValueKind::Null,
        Value::Bool(b) => ValueKind::Bool(*b),
        Value::Number(n) => ValueKind::Number(n.clone()),
        Value::String(s) => ValueKind::String(s.clone()),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(convert(item, origin, &format!("{ptr}/{i}"))?);
            }
            ValueKind::List(out)
        }
        Value::Object(map) if map.contains_key(SUBST_KEY) => {
            return convert_substitution(map, origin, ptr);
        }
        Value::Object(map) if map.contains_key(MERGE_KEY) => {
            return convert_merge(map, origin, ptr);
        }
        Value::Object(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                let child_ptr = format!("{ptr}/{}", escape_pointer_token(k));
                out.insert(k.clone(), convert(v, origin, &child_ptr)?);
            }
            ValueKind::Object(out)
        }
    };
    Ok(ConfigValue::new(here, kind))
}

fn convert_substitution(
    map: &Map<String, Value>,
    origin: &Origin,
    ptr: &str,
) -> Result<ConfigValue, ConfigError> {
    if let Some(extra) = map.keys().find(|k| *k != SUBST_KEY && *k != OPTIONAL_KEY) {
        return Err(bad(
            origin,
            ptr,
            &format!("unexpected key {extra:?} next to {SUBST_KEY:?}"),
        ));
    }
    let Some(Value::String(path)) = map.get(SUBST_KEY) else {
        return Err(bad(origin, ptr, "substitution path must be a string"));
    };
    let path = Path::parse(path).map_err(|err| bad(origin, ptr, &err.to_string()))?;
    let optional = match map.get(OPTIONAL_KEY) {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(bad(origin, ptr, "\"optional\" must be a boolean")),
    };
    Ok(ConfigValue::substitution(
        origin.with_pointer(ptr),
        SubstitutionExpression::new(path, optional),
    ))
}

fn convert_merge(
    map: &Map<String, Value>,
    origin: &Origin,
    ptr: &str,
) -> Result<ConfigValue, ConfigError> {
    if map.len() != 1 {
        return Err(bad(origin, ptr, "a merge stack object must have no other keys"));
    }
    let Some(Value::Array(items)) = map.get(MERGE_KEY) else {
        return Err(bad(origin, ptr, "merge stack entries must be an array"));
    };
    if items.len() < 2 {
        return Err(bad(origin, ptr, "a merge stack needs at least two entries"));
    }
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let item_ptr = format!("{ptr}/{MERGE_KEY}/{i}");
        let v = convert(item, origin, &item_ptr)?;
        if matches!(v.kind(), ValueKind::MergeStack(_)) {
            return Err(bad(origin, &item_ptr, "merge stacks cannot be nested"));
        }
        out.push(v);
    }
    Ok(ConfigValue::new(
        origin.with_pointer(ptr),
        ValueKind::MergeStack(out),
    ))
}
