use std::fmt;

use once_cell::unsync::OnceCell;

use crate::context::ResolveContext;
use crate::error::ResolveError;
use crate::value::ConfigValue;

type MakeReplacement = dyn Fn(&mut ResolveContext<'_>) -> Result<Option<ConfigValue>, ResolveError>;

/// Lazily computed stand-in for a node that is in the middle of being resolved.
///
/// The stand-in is computed at most once; later calls return the same value.
/// A failed computation is not cached.
pub struct ResolveReplacer {
    make: Box<MakeReplacement>,
    replacement: OnceCell<Option<ConfigValue>>,
}

impl ResolveReplacer {
    pub fn new<F>(make: F) -> Self
    where
        F: Fn(&mut ResolveContext<'_>) -> Result<Option<ConfigValue>, ResolveError> + 'static,
    {
        ResolveReplacer {
            make: Box::new(make),
            replacement: OnceCell::new(),
        }
    }

    /// Stand-in for a merge stack whose entries up to `skipping` are being
    /// resolved: the overlay of the entries below them, or nothing.
    pub fn merge_remainder(stack: Vec<ConfigValue>, skipping: usize) -> Self {
        ResolveReplacer::new(move |_context| {
            let mut rest = stack.iter().skip(skipping);
            let Some(first) = rest.next() else {
                return Ok(None);
            };
            Ok(Some(
                rest.fold(first.clone(), |merged, v| merged.with_fallback(v)),
            ))
        })
    }

    pub fn replace(
        &self,
        context: &mut ResolveContext<'_>,
    ) -> Result<Option<ConfigValue>, ResolveError> {
        if let Some(v) = self.replacement.get() {
            return Ok(v.clone());
        }
        let v = (self.make)(context)?;
        Ok(self.replacement.get_or_init(|| v).clone())
    }

    pub fn is_computed(&self) -> bool {
        self.replacement.get().is_some()
    }
}

impl fmt::Debug for ResolveReplacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveReplacer")
            .field("replacement", &self.replacement.get())
            .finish_non_exhaustive()
    }
}
