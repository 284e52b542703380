use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::path::Path;
use crate::value::ConfigValue;

/// Identity of a node plus the restriction it was (or is being) resolved under.
///
/// Holding the handle keeps the node alive, so its address cannot be reused by
/// another node while the key exists.
#[derive(Debug, Clone)]
pub struct MemoKey {
    value: ConfigValue,
    restrict_to_child: Option<Path>,
}

impl MemoKey {
    pub fn new(value: &ConfigValue, restrict_to_child: Option<&Path>) -> Self {
        MemoKey {
            value: value.clone(),
            restrict_to_child: restrict_to_child.cloned(),
        }
    }

    pub fn value(&self) -> &ConfigValue {
        &self.value
    }

    pub fn restrict_to_child(&self) -> Option<&Path> {
        self.restrict_to_child.as_ref()
    }
}

impl PartialEq for MemoKey {
    fn eq(&self, other: &Self) -> bool {
        self.value.ptr_eq(&other.value) && self.restrict_to_child == other.restrict_to_child
    }
}

impl Eq for MemoKey {}

impl Hash for MemoKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.identity().hash(state);
        self.restrict_to_child.hash(state);
    }
}

/// Resolved values of one traversal.
///
/// Entries written while a replacement is active go into a scope layer that is
/// dropped when the replacement ends, since they may have been computed from the
/// stand-in value rather than the node's own definition.
#[derive(Debug)]
pub struct ResolveMemos {
    layers: Vec<HashMap<MemoKey, ConfigValue>>,
}

impl Default for ResolveMemos {
    fn default() -> Self {
        ResolveMemos {
            layers: vec![HashMap::new()],
        }
    }
}

impl ResolveMemos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &MemoKey) -> Option<ConfigValue> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(key))
            .cloned()
    }

    pub fn put(&mut self, key: MemoKey, value: ConfigValue) {
        if let Some(layer) = self.layers.last_mut() {
            layer.insert(key, value);
        }
    }

    pub(crate) fn push_scope(&mut self) {
        self.layers.push(HashMap::new());
    }

    /// Drops the innermost scope; the base scope is never dropped.
    pub(crate) fn pop_scope(&mut self) -> bool {
        if self.layers.len() > 1 {
            self.layers.pop();
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.layers.iter().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::Origin;
    use crate::value::ValueKind;

    fn leaf(s: &str) -> ConfigValue {
        ConfigValue::new(Origin::new("memo"), ValueKind::String(s.to_string()))
    }

    #[test]
    fn keys_compare_identity_and_restriction() {
        let a = leaf("same");
        let b = leaf("same");
        let p = Path::new_key("x");

        assert_eq!(MemoKey::new(&a, None), MemoKey::new(&a.clone(), None));
        assert_ne!(MemoKey::new(&a, None), MemoKey::new(&b, None));
        assert_ne!(MemoKey::new(&a, None), MemoKey::new(&a, Some(&p)));
        assert_eq!(MemoKey::new(&a, Some(&p)), MemoKey::new(&a, Some(&p)));
    }

    #[test]
    fn restricted_and_full_entries_are_separate() {
        let node = leaf("n");
        let full = leaf("full");
        let partial = leaf("partial");
        let p = Path::new_key("x");

        let mut memos = ResolveMemos::new();
        memos.put(MemoKey::new(&node, Some(&p)), partial.clone());
        assert!(memos.get(&MemoKey::new(&node, None)).is_none());
        memos.put(MemoKey::new(&node, None), full.clone());

        let got = memos.get(&MemoKey::new(&node, None)).expect("full entry");
        assert!(got.ptr_eq(&full));
        let got = memos.get(&MemoKey::new(&node, Some(&p))).expect("restricted entry");
        assert!(got.ptr_eq(&partial));
        assert_eq!(memos.len(), 2);
    }

    #[test]
    fn scoped_entries_are_dropped_with_their_scope() {
        let outer = leaf("outer");
        let inner = leaf("inner");
        let mut memos = ResolveMemos::new();
        memos.put(MemoKey::new(&outer, None), outer.clone());

        memos.push_scope();
        memos.put(MemoKey::new(&inner, None), inner.clone());
        assert!(memos.get(&MemoKey::new(&outer, None)).is_some());
        assert!(memos.get(&MemoKey::new(&inner, None)).is_some());
        assert!(memos.pop_scope());

        assert!(memos.get(&MemoKey::new(&inner, None)).is_none());
        assert!(memos.get(&MemoKey::new(&outer, None)).is_some());
        assert!(!memos.pop_scope());
    }
}
