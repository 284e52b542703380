//! Substitution resolution for configuration trees.
//!
//! A tree may contain placeholders (`${a.b}`, or `${?a.b}` when optional) and
//! delayed merges of several values. Resolution replaces every placeholder with
//! the fully resolved value it refers to, performs the pending merges, reports
//! reference cycles and missing references, and resolves each node at most once
//! per request.

pub mod check;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod memo;
pub mod options;
pub mod origin;
pub mod path;
pub mod replacer;
pub mod source;
pub mod tree;
pub mod util;
pub mod value;

pub use context::{
    resolve, resolve_document, resolve_with_external_errors, ResolveContext, ResolveTraversal,
};
pub use error::{ConfigError, ResolveError};
pub use memo::{MemoKey, ResolveMemos};
pub use options::ConfigResolveOptions;
pub use origin::Origin;
pub use path::Path;
pub use replacer::ResolveReplacer;
pub use source::ResolveSource;
pub use value::{ConfigValue, ResolveStatus, SubstitutionExpression, ValueKind};
