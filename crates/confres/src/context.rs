//! Resolution orchestration: memoization, restriction and cycle detection.
//!
//! A [`ResolveTraversal`] owns the mutable state of one top-level resolution
//! request. [`ResolveContext`] values are views into it that differ only in
//! their restriction; `restrict` reborrows the traversal, so every view of a
//! traversal sees the same memos, cycle sets and replacements.

use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::error::{ConfigError, ResolveError};
use crate::memo::{MemoKey, ResolveMemos};
use crate::options::ConfigResolveOptions;
use crate::path::Path;
use crate::replacer::ResolveReplacer;
use crate::source::ResolveSource;
use crate::value::{ConfigValue, SubstitutionExpression, ValueKind};

// Each hop of a substitution chain costs a dozen or so frames; grow the stack
// before it runs out.
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Mutable state shared by every context of one resolution.
#[derive(Debug)]
pub struct ResolveTraversal {
    source: ResolveSource,
    memos: ResolveMemos,
    // One set per replacement scope; the last one is the active scope.
    traversed_stack: Vec<IndexSet<MemoKey>>,
    options: ConfigResolveOptions,
    depth: usize,
}

impl ResolveTraversal {
    pub fn new(root: ConfigValue, options: ConfigResolveOptions) -> Self {
        ResolveTraversal {
            source: ResolveSource::new(root),
            memos: ResolveMemos::new(),
            traversed_stack: vec![IndexSet::new()],
            options,
            depth: 0,
        }
    }

    pub fn context(&mut self, restrict_to_child: Option<Path>) -> ResolveContext<'_> {
        ResolveContext {
            traversal: self,
            restrict_to_child,
        }
    }

    pub fn memos(&self) -> &ResolveMemos {
        &self.memos
    }

    pub fn source(&self) -> &ResolveSource {
        &self.source
    }

    pub fn cycle_scopes(&self) -> usize {
        self.traversed_stack.len()
    }

    /// Number of substitutions currently being traversed in the active scope.
    pub fn active_traversals(&self) -> usize {
        self.traversed_stack.last().map_or(0, IndexSet::len)
    }
}

pub struct ResolveContext<'a> {
    traversal: &'a mut ResolveTraversal,
    // None for a full resolve.
    restrict_to_child: Option<Path>,
}

impl<'a> ResolveContext<'a> {
    pub fn options(&self) -> ConfigResolveOptions {
        self.traversal.options
    }

    pub fn source(&self) -> &ResolveSource {
        &self.traversal.source
    }

    pub fn depth(&self) -> usize {
        self.traversal.depth
    }

    pub fn is_restricted_to_child(&self) -> bool {
        self.restrict_to_child.is_some()
    }

    pub fn restrict_to_child(&self) -> Option<&Path> {
        self.restrict_to_child.as_ref()
    }

    /// A view of the same traversal restricted to `restrict_to`.
    pub fn restrict(&mut self, restrict_to: Option<Path>) -> ResolveContext<'_> {
        ResolveContext {
            traversal: &mut *self.traversal,
            restrict_to_child: restrict_to,
        }
    }

    pub fn unrestricted(&mut self) -> ResolveContext<'_> {
        self.restrict(None)
    }

    fn traverse(
        &mut self,
        node: &ConfigValue,
        via: &SubstitutionExpression,
    ) -> Result<(), ResolveError> {
        let key = MemoKey::new(node, self.restrict_to_child.as_ref());
        let Some(traversed) = self.traversal.traversed_stack.last_mut() else {
            return Err(ResolveError::BrokenInvariant(
                "traverse() with no cycle detection scope".to_string(),
            ));
        };
        if traversed.contains(&key) {
            return Err(ResolveError::SelfReferential {
                origin: node.origin().clone(),
                path: via.path().render(),
            });
        }
        traversed.insert(key);
        Ok(())
    }

    fn untraverse(&mut self, node: &ConfigValue) -> Result<(), ResolveError> {
        let key = MemoKey::new(node, self.restrict_to_child.as_ref());
        let removed = self
            .traversal
            .traversed_stack
            .last_mut()
            .is_some_and(|traversed| traversed.shift_remove(&key));
        if removed {
            Ok(())
        } else {
            Err(ResolveError::BrokenInvariant(format!(
                "untraverse() did not find the untraversed substitution at {}",
                node.origin()
            )))
        }
    }

    /// Runs `body` with `node` registered as being traversed.
    ///
    /// If `node` is already being traversed in the active scope, an optional
    /// `expression` yields `Ok(None)` and a required one fails with
    /// [`ResolveError::NotPossibleToResolve`]; `body` is not run.
    pub fn traversing<F>(
        &mut self,
        node: &ConfigValue,
        expression: &SubstitutionExpression,
        body: F,
    ) -> Result<Option<ConfigValue>, ResolveError>
    where
        F: FnOnce(&mut ResolveContext<'_>) -> Result<Option<ConfigValue>, ResolveError>,
    {
        match self.traverse(node, expression) {
            Ok(()) => {}
            Err(ResolveError::SelfReferential { origin, path }) => {
                trace!(depth = self.depth(), %expression, "cycle detected");
                if expression.optional() {
                    return Ok(None);
                }
                return Err(ResolveError::NotPossibleToResolve { origin, path });
            }
            Err(err) => return Err(err),
        }

        let result = body(self);
        self.untraverse(node)?;
        result
    }

    /// Makes lookups of `node` see `replacer`'s value and opens a fresh cycle
    /// detection scope.
    pub fn replace(
        &mut self,
        node: &ConfigValue,
        replacer: ResolveReplacer,
    ) -> Result<(), ResolveError> {
        self.traversal.source.replace(node, replacer)?;
        self.traversal.traversed_stack.push(IndexSet::new());
        self.traversal.memos.push_scope();
        trace!(
            depth = self.depth(),
            origin = %node.origin(),
            scopes = self.traversal.traversed_stack.len(),
            "replacement installed"
        );
        Ok(())
    }

    pub fn unreplace(&mut self, node: &ConfigValue) -> Result<(), ResolveError> {
        self.traversal.source.unreplace(node)?;
        self.traversal.memos.pop_scope();

        if self.traversal.traversed_stack.len() < 2 {
            return Err(ResolveError::BrokenInvariant(
                "unreplace() would drop the base cycle detection scope".to_string(),
            ));
        }
        let old = self.traversal.traversed_stack.pop().unwrap_or_default();
        if !old.is_empty() {
            let leaked: Vec<String> = old
                .iter()
                .map(|key| key.value().origin().to_string())
                .collect();
            return Err(ResolveError::BrokenInvariant(format!(
                "unreplace() with stuff still in the traverse set: [{}]",
                leaked.join(", ")
            )));
        }
        trace!(depth = self.depth(), origin = %node.origin(), "replacement removed");
        Ok(())
    }

    /// Resolves `original` as far as the current restriction requires.
    pub fn resolve(&mut self, original: &ConfigValue) -> Result<Option<ConfigValue>, ResolveError> {
        // A fully resolved entry satisfies any restricted request, so look for
        // it first.
        let full_key = MemoKey::new(original, None);
        let mut restricted_key = None;
        let mut cached = self.traversal.memos.get(&full_key);

        if cached.is_none() && self.is_restricted_to_child() {
            let key = MemoKey::new(original, self.restrict_to_child.as_ref());
            cached = self.traversal.memos.get(&key);
            restricted_key = Some(key);
        }

        if let Some(cached) = cached {
            trace!(depth = self.depth(), origin = %original.origin(), "memo hit");
            return Ok(Some(cached));
        }

        self.traversal.depth += 1;
        let resolved = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            ResolveSource::resolve_checking_replacement(self, original)
        });
        self.traversal.depth -= 1;
        let resolved = resolved?;

        if let Some(value) = &resolved {
            if value.is_resolved() {
                // Resolving only the restricted child may have been enough to
                // resolve everything, in which case the full key applies.
                self.traversal.memos.put(full_key, value.clone());
            } else if self.is_restricted_to_child() {
                let Some(key) = restricted_key else {
                    return Err(ResolveError::BrokenInvariant(
                        "restricted memo key missing for a restricted resolve".to_string(),
                    ));
                };
                self.traversal.memos.put(key, value.clone());
            } else if self.options().allow_unresolved() {
                self.traversal.memos.put(full_key, value.clone());
            } else {
                return Err(ResolveError::BrokenInvariant(format!(
                    "resolving {} did not give us a resolved value",
                    original.origin()
                )));
            }
        }

        Ok(resolved)
    }
}

/// Resolves `value` against `root` in a fresh traversal.
///
/// Conditions such as [`ResolveError::NotPossibleToResolve`] are returned as-is
/// so the caller can retry with another restriction.
pub fn resolve(
    value: &ConfigValue,
    root: &ConfigValue,
    options: ConfigResolveOptions,
    restrict_to_child: Option<Path>,
) -> Result<Option<ConfigValue>, ResolveError> {
    let mut traversal = ResolveTraversal::new(root.clone(), options);
    let mut context = traversal.context(restrict_to_child);
    context.resolve(value)
}

/// Fully resolves `value`, reporting failures as user-facing errors.
///
/// Without a restriction, not being able to resolve can only mean a cycle, which
/// is reported against `value`'s origin.
pub fn resolve_with_external_errors(
    value: &ConfigValue,
    root: &ConfigValue,
    options: ConfigResolveOptions,
) -> Result<Option<ConfigValue>, ConfigError> {
    debug!(origin = %value.origin(), ?options, "resolving");
    let result = resolve(value, root, options, None);
    match &result {
        Ok(_) => debug!(origin = %value.origin(), "resolved"),
        Err(err) => debug!(origin = %value.origin(), %err, "resolution failed"),
    }
    result.map_err(|err| err.into_config_error(value.origin()))
}

/// Resolves a whole document; a document that resolves to nothing is empty.
///
/// The result must be an object. A root merge stack that comes out as any other
/// value is rejected, except that a stack left unresolved under
/// `allow_unresolved` is returned as-is.
pub fn resolve_document(
    root: &ConfigValue,
    options: ConfigResolveOptions,
) -> Result<ConfigValue, ConfigError> {
    let Some(resolved) = resolve_with_external_errors(root, root, options)? else {
        return Ok(ConfigValue::object(root.origin().clone(), Default::default()));
    };
    match resolved.kind() {
        ValueKind::Object(_) => Ok(resolved),
        ValueKind::MergeStack(_) | ValueKind::Substitution(_) if options.allow_unresolved() => {
            Ok(resolved)
        }
        _ => Err(ConfigError::BadTree {
            origin: root.origin().clone(),
            message: "document root resolved to a value that is not an object".to_string(),
        }),
    }
}
