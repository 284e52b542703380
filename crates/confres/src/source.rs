//! The tree being resolved and the per-node resolution step.

use std::rc::Rc;

use tracing::trace;

use crate::context::ResolveContext;
use crate::error::{ConfigError, ResolveError};
use crate::path::Path;
use crate::replacer::ResolveReplacer;
use crate::value::{ConfigValue, SubstitutionExpression, ValueKind};

#[derive(Debug)]
pub struct ResolveSource {
    root: ConfigValue,
    // Innermost replacement last.
    replacements: Vec<(ConfigValue, Rc<ResolveReplacer>)>,
}

impl ResolveSource {
    pub fn new(root: ConfigValue) -> Self {
        ResolveSource {
            root,
            replacements: Vec::new(),
        }
    }

    pub fn root(&self) -> &ConfigValue {
        &self.root
    }

    pub fn active_replacements(&self) -> usize {
        self.replacements.len()
    }

    pub fn replace(
        &mut self,
        node: &ConfigValue,
        replacer: ResolveReplacer,
    ) -> Result<(), ResolveError> {
        if self.replacement_for(node).is_some() {
            return Err(ResolveError::BrokenInvariant(format!(
                "replace() while a replacement is already active for {}",
                node.origin()
            )));
        }
        self.replacements.push((node.clone(), Rc::new(replacer)));
        Ok(())
    }

    pub fn unreplace(&mut self, node: &ConfigValue) -> Result<(), ResolveError> {
        match self.replacements.last() {
            Some((top, _)) if top.ptr_eq(node) => {
                self.replacements.pop();
                Ok(())
            }
            Some((top, _)) => Err(ResolveError::BrokenInvariant(format!(
                "unreplace() of {} but the innermost replacement is for {}",
                node.origin(),
                top.origin()
            ))),
            None => Err(ResolveError::BrokenInvariant(format!(
                "unreplace() without replace(): {}",
                node.origin()
            ))),
        }
    }

    pub fn replacement_for(&self, node: &ConfigValue) -> Option<Rc<ResolveReplacer>> {
        self.replacements
            .iter()
            .rev()
            .find(|(replaced, _)| replaced.ptr_eq(node))
            .map(|(_, replacer)| replacer.clone())
    }

    /// Resolves `original`, or its stand-in if a replacement is active for it.
    pub fn resolve_checking_replacement(
        context: &mut ResolveContext<'_>,
        original: &ConfigValue,
    ) -> Result<Option<ConfigValue>, ResolveError> {
        let Some(replacer) = context.source().replacement_for(original) else {
            return resolve_substitutions(context, original);
        };

        match replacer.replace(context)? {
            Some(replacement) if !replacement.ptr_eq(original) => {
                trace!(
                    depth = context.depth(),
                    origin = %original.origin(),
                    "resolving replacement"
                );
                // Start over so the replacement gets its own memo entry.
                context.resolve(&replacement)
            }
            Some(_) => resolve_substitutions(context, original),
            None => Ok(None),
        }
    }
}

/// One resolution step for `value` under `context`'s restriction.
pub(crate) fn resolve_substitutions(
    context: &mut ResolveContext<'_>,
    value: &ConfigValue,
) -> Result<Option<ConfigValue>, ResolveError> {
    if value.is_resolved() {
        return Ok(Some(value.clone()));
    }
    match value.kind() {
        ValueKind::Object(_) => resolve_object(context, value),
        ValueKind::List(items) => resolve_list(context, value, items),
        ValueKind::Substitution(expression) => resolve_substitution(context, value, expression),
        ValueKind::MergeStack(items) => resolve_merge_stack(context, value, items),
        ValueKind::Null | ValueKind::Bool(_) | ValueKind::Number(_) | ValueKind::String(_) => {
            Ok(Some(value.clone()))
        }
    }
}

fn resolve_object(
    context: &mut ResolveContext<'_>,
    value: &ConfigValue,
) -> Result<Option<ConfigValue>, ResolveError> {
    let Some(map) = value.as_object() else {
        return Ok(Some(value.clone()));
    };
    let restriction = context.restrict_to_child().cloned();

    let mut changes: Vec<(&String, Option<ConfigValue>)> = Vec::new();
    for (key, child) in map {
        let modified = match &restriction {
            // Siblings off the restricted path stay as they are.
            Some(restriction) if key.as_str() != restriction.first() => continue,
            Some(restriction) => match restriction.remainder() {
                Some(rest) => context.restrict(Some(rest)).resolve(child)?,
                None => context.unrestricted().resolve(child)?,
            },
            None => context.unrestricted().resolve(child)?,
        };
        match &modified {
            Some(m) if m.ptr_eq(child) => {}
            _ => changes.push((key, modified)),
        }
    }

    if changes.is_empty() {
        return Ok(Some(value.clone()));
    }
    let mut new_map = map.clone();
    for (key, modified) in changes {
        match modified {
            Some(v) => {
                new_map.insert(key.clone(), v);
            }
            None => {
                new_map.remove(key);
            }
        }
    }
    Ok(Some(ConfigValue::object(value.origin().clone(), new_map)))
}

fn resolve_list(
    context: &mut ResolveContext<'_>,
    value: &ConfigValue,
    items: &[ConfigValue],
) -> Result<Option<ConfigValue>, ResolveError> {
    // A restriction names a key path, which never goes through a list.
    if context.is_restricted_to_child() {
        return Ok(Some(value.clone()));
    }

    let mut changed = false;
    let mut resolved_items = Vec::with_capacity(items.len());
    for item in items {
        match context.resolve(item)? {
            Some(r) => {
                changed |= !r.ptr_eq(item);
                resolved_items.push(r);
            }
            None => changed = true,
        }
    }
    if !changed {
        return Ok(Some(value.clone()));
    }
    Ok(Some(ConfigValue::list(value.origin().clone(), resolved_items)))
}

fn resolve_substitution(
    context: &mut ResolveContext<'_>,
    value: &ConfigValue,
    expression: &SubstitutionExpression,
) -> Result<Option<ConfigValue>, ResolveError> {
    trace!(depth = context.depth(), %expression, "looking up substitution");
    let root = context.source().root().clone();
    let found = context.traversing(value, expression, |context| {
        lookup(context, &root, expression.path())
    })?;
    let resolved = match found {
        Some(found) => context.resolve(&found)?,
        None => None,
    };

    match resolved {
        Some(v) => Ok(Some(v)),
        None if expression.optional() => Ok(None),
        None if context.options().allow_unresolved() => Ok(Some(value.clone())),
        None => Err(ConfigError::UnresolvedSubstitution {
            origin: value.origin().clone(),
            expression: expression.to_string(),
        }
        .into()),
    }
}

/// Finds `path` in `root`, resolving only what lies on the way to it.
fn lookup(
    context: &mut ResolveContext<'_>,
    root: &ConfigValue,
    path: &Path,
) -> Result<Option<ConfigValue>, ResolveError> {
    let partially_resolved = context.restrict(Some(path.clone())).resolve(root)?;
    // A root stack may resolve to a non-object, which has nothing at any path.
    let Some(partially_resolved) = partially_resolved else {
        return Ok(None);
    };
    match partially_resolved.peek_path(path) {
        Ok(found) => Ok(found),
        // Placeholders left on purpose hide whatever is below them.
        Err(ConfigError::NotResolved { .. }) if context.options().allow_unresolved() => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn resolve_merge_stack(
    context: &mut ResolveContext<'_>,
    value: &ConfigValue,
    items: &[ConfigValue],
) -> Result<Option<ConfigValue>, ResolveError> {
    let mut merged: Option<ConfigValue> = None;
    for (count, item) in items.iter().enumerate() {
        if matches!(item.kind(), ValueKind::MergeStack(_)) {
            return Err(ResolveError::BrokenInvariant(format!(
                "a merge stack should not contain another one: {}",
                value.origin()
            )));
        }

        // While resolving a placeholder entry, anything that comes back to this
        // stack must only see the entries below that placeholder.
        let replaced = item.is_unmergeable();
        if replaced {
            context.replace(
                value,
                ResolveReplacer::merge_remainder(items.to_vec(), count + 1),
            )?;
        }
        let resolved = context.resolve(item);
        if replaced {
            context.unreplace(value)?;
        }

        if let Some(resolved) = resolved? {
            merged = Some(match merged {
                Some(merged) => merged.with_fallback(&resolved),
                None => resolved,
            });
        }
    }
    Ok(merged)
}
