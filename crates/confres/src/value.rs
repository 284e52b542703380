//! Immutable configuration value tree.
//!
//! A [`ConfigValue`] is a shared handle to an immutable node. Resolution never
//! mutates a node; it builds new ones. Node identity is the identity of the
//! shared allocation, so two structurally equal placeholders at different places
//! in a document are different nodes.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::ConfigError;
use crate::origin::Origin;
use crate::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStatus {
    Resolved,
    Unresolved,
}

impl ResolveStatus {
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a ConfigValue>) -> Self {
        if values.into_iter().all(ConfigValue::is_resolved) {
            ResolveStatus::Resolved
        } else {
            ResolveStatus::Unresolved
        }
    }
}

/// A reference to another place in the same tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubstitutionExpression {
    path: Path,
    optional: bool,
}

impl SubstitutionExpression {
    pub fn new(path: Path, optional: bool) -> Self {
        SubstitutionExpression { path, optional }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn optional(&self) -> bool {
        self.optional
    }
}

impl fmt::Display for SubstitutionExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "${{?{}}}", self.path.render())
        } else {
            write!(f, "${{{}}}", self.path.render())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<ConfigValue>),
    Object(BTreeMap<String, ConfigValue>),
    /// Placeholder standing for the value found at another path.
    Substitution(SubstitutionExpression),
    /// Values to overlay, highest priority first. Never resolved as-is.
    MergeStack(Vec<ConfigValue>),
}

#[derive(Debug)]
struct Node {
    origin: Origin,
    status: ResolveStatus,
    kind: ValueKind,
}

/// Shared handle to an immutable tree node.
///
/// `PartialEq` compares structure (ignoring origins); use [`ConfigValue::ptr_eq`]
/// for identity.
#[derive(Debug, Clone)]
pub struct ConfigValue(Rc<Node>);

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0.kind == other.0.kind
    }
}

impl ConfigValue {
    pub fn new(origin: Origin, kind: ValueKind) -> Self {
        let status = match &kind {
            ValueKind::Null | ValueKind::Bool(_) | ValueKind::Number(_) | ValueKind::String(_) => {
                ResolveStatus::Resolved
            }
            ValueKind::List(items) => ResolveStatus::from_values(items),
            ValueKind::Object(map) => ResolveStatus::from_values(map.values()),
            ValueKind::Substitution(_) | ValueKind::MergeStack(_) => ResolveStatus::Unresolved,
        };
        ConfigValue(Rc::new(Node {
            origin,
            status,
            kind,
        }))
    }

    pub fn object(origin: Origin, map: BTreeMap<String, ConfigValue>) -> Self {
        ConfigValue::new(origin, ValueKind::Object(map))
    }

    pub fn list(origin: Origin, items: Vec<ConfigValue>) -> Self {
        ConfigValue::new(origin, ValueKind::List(items))
    }

    pub fn substitution(origin: Origin, expression: SubstitutionExpression) -> Self {
        ConfigValue::new(origin, ValueKind::Substitution(expression))
    }

    /// Builds a merge stack, flattening nested stacks into this one.
    pub fn merge_stack(origin: Origin, items: Vec<ConfigValue>) -> Self {
        let mut flat = Vec::with_capacity(items.len());
        for item in items {
            match item.kind() {
                ValueKind::MergeStack(inner) => flat.extend(inner.iter().cloned()),
                _ => flat.push(item),
            }
        }
        ConfigValue::new(origin, ValueKind::MergeStack(flat))
    }

    pub fn kind(&self) -> &ValueKind {
        &self.0.kind
    }

    pub fn origin(&self) -> &Origin {
        &self.0.origin
    }

    pub fn resolve_status(&self) -> ResolveStatus {
        self.0.status
    }

    pub fn is_resolved(&self) -> bool {
        self.0.status == ResolveStatus::Resolved
    }

    pub fn ptr_eq(&self, other: &ConfigValue) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared node; stable while any handle to it is alive.
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self.kind() {
            ValueKind::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_substitution(&self) -> Option<&SubstitutionExpression> {
        match self.kind() {
            ValueKind::Substitution(expr) => Some(expr),
            _ => None,
        }
    }

    /// True for nodes that cannot be overlaid before they are resolved.
    pub fn is_unmergeable(&self) -> bool {
        matches!(
            self.kind(),
            ValueKind::Substitution(_) | ValueKind::MergeStack(_)
        )
    }

    /// Overlays `self` on top of `fallback`.
    ///
    /// Objects merge key by key. An unresolved value on either side of an object
    /// overlay produces a merge stack so the decision is deferred until both
    /// sides are resolved. Any other value simply wins over its fallback.
    pub fn with_fallback(&self, fallback: &ConfigValue) -> ConfigValue {
        if self.is_unmergeable() {
            return ConfigValue::merge_stack(
                self.origin().clone(),
                vec![self.clone(), fallback.clone()],
            );
        }
        let Some(mine) = self.as_object() else {
            return self.clone();
        };
        if fallback.is_unmergeable() {
            return ConfigValue::merge_stack(
                self.origin().clone(),
                vec![self.clone(), fallback.clone()],
            );
        }
        let Some(theirs) = fallback.as_object() else {
            return self.clone();
        };

        let mut merged = mine.clone();
        let mut changed = false;
        for (key, their_value) in theirs {
            match merged.get(key) {
                Some(my_value) => {
                    let overlaid = my_value.with_fallback(their_value);
                    if !overlaid.ptr_eq(my_value) {
                        merged.insert(key.clone(), overlaid);
                        changed = true;
                    }
                }
                None => {
                    merged.insert(key.clone(), their_value.clone());
                    changed = true;
                }
            }
        }
        if changed {
            ConfigValue::object(self.origin().clone(), merged)
        } else {
            self.clone()
        }
    }

    /// Looks `path` up without resolving anything.
    ///
    /// Missing keys and non-object intermediates give `None`. A placeholder on the
    /// way is an error because its value is not known yet.
    pub fn peek_path(&self, path: &Path) -> Result<Option<ConfigValue>, ConfigError> {
        let mut cur = self.clone();
        for (depth, key) in path.keys().iter().enumerate() {
            let next = match cur.attempt_peek(key) {
                Ok(next) => next,
                Err(origin) => {
                    let walked = Path::from_keys(path.keys()[..=depth].iter().cloned())
                        .map(|p| p.render())
                        .unwrap_or_default();
                    return Err(ConfigError::NotResolved {
                        origin,
                        path: walked,
                    });
                }
            };
            match next {
                Some(v) => cur = v,
                None => return Ok(None),
            }
        }
        Ok(Some(cur))
    }

    fn attempt_peek(&self, key: &str) -> Result<Option<ConfigValue>, Origin> {
        match self.kind() {
            ValueKind::Object(map) => Ok(map.get(key).cloned()),
            ValueKind::Substitution(_) => Err(self.origin().clone()),
            ValueKind::MergeStack(items) => {
                // Leading objects can answer for a key they define; once a
                // placeholder is reached the answer depends on resolution.
                for item in items {
                    match item.kind() {
                        ValueKind::Object(map) => {
                            if let Some(v) = map.get(key) {
                                if v.is_resolved() {
                                    return Ok(Some(v.clone()));
                                }
                                return Err(v.origin().clone());
                            }
                        }
                        ValueKind::Substitution(_) | ValueKind::MergeStack(_) => {
                            return Err(item.origin().clone())
                        }
                        _ => return Ok(None),
                    }
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Number of placeholders and merge stacks in this subtree.
    pub fn count_unresolved(&self) -> (usize, usize) {
        match self.kind() {
            ValueKind::Substitution(_) => (1, 0),
            ValueKind::MergeStack(items) => {
                items.iter().fold((0, 1), |(s, m), item| {
                    let (is, im) = item.count_unresolved();
                    (s + is, m + im)
                })
            }
            ValueKind::List(items) => sum_counts(items.iter()),
            ValueKind::Object(map) => sum_counts(map.values()),
            _ => (0, 0),
        }
    }
}

fn sum_counts<'a>(values: impl Iterator<Item = &'a ConfigValue>) -> (usize, usize) {
    values.fold((0, 0), |(s, m), v| {
        if v.is_resolved() {
            return (s, m);
        }
        let (vs, vm) = v.count_unresolved();
        (s + vs, m + vm)
    })
}
