//! Whole-document check: counts what is left to resolve and tries to resolve it.

use serde_json::Value;

use crate::context::resolve_document;
use crate::diagnostics::{Diagnostic, Report};
use crate::options::ConfigResolveOptions;
use crate::value::ConfigValue;

pub fn check_tree(root: &ConfigValue, options: ConfigResolveOptions) -> Report {
    let (substitutions, merge_stacks) = root.count_unresolved();

    let mut diagnostics = Vec::new();
    if let Err(err) = resolve_document(root, options) {
        diagnostics.push(Diagnostic::from(&err));
    }

    let mut report = Report::ok().with_diagnostics(diagnostics);
    report
        .meta
        .insert("substitutions".to_string(), Value::from(substitutions));
    report
        .meta
        .insert("merge_stacks".to_string(), Value::from(merge_stacks));
    report
}
