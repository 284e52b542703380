use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use confres_contracts::CONFRES_DIAG_SCHEMA_VERSION;

use crate::error::ConfigError;
use crate::origin::Origin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Resolve,
}

pub const CODE_UNRESOLVED_SUBSTITUTION: &str = "CONFRES-SUBST-0001";
pub const CODE_SUBSTITUTION_CYCLE: &str = "CONFRES-CYCLE-0001";
pub const CODE_NOT_RESOLVED: &str = "CONFRES-NOTRESOLVED-0001";
pub const CODE_BAD_PATH: &str = "CONFRES-PATH-0001";
pub const CODE_BAD_TREE: &str = "CONFRES-TREE-0001";
pub const CODE_BUG: &str = "CONFRES-BUG-0001";
pub const CODE_IO_READ: &str = "CONFRES-IO-READ-0001";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    /// Substitution path involved, in rendered form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl Diagnostic {
    pub fn error(code: &str, stage: Stage, message: impl Into<String>) -> Self {
        Diagnostic {
            code: code.to_string(),
            severity: Severity::Error,
            stage,
            message: message.into(),
            origin: None,
            path: None,
            data: BTreeMap::new(),
        }
    }

    pub fn with_origin(mut self, origin: &Origin) -> Self {
        self.origin = Some(origin.clone());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl From<&ConfigError> for Diagnostic {
    fn from(err: &ConfigError) -> Self {
        let message = err.to_string();
        match err {
            ConfigError::UnresolvedSubstitution { origin, expression } => {
                Diagnostic::error(CODE_UNRESOLVED_SUBSTITUTION, Stage::Resolve, message)
                    .with_origin(origin)
                    .with_path(expression.clone())
            }
            ConfigError::SubstitutionCycle { origin, path } => {
                Diagnostic::error(CODE_SUBSTITUTION_CYCLE, Stage::Resolve, message)
                    .with_origin(origin)
                    .with_path(path.clone())
            }
            ConfigError::NotResolved { origin, path } => {
                Diagnostic::error(CODE_NOT_RESOLVED, Stage::Resolve, message)
                    .with_origin(origin)
                    .with_path(path.clone())
            }
            ConfigError::BadPath { input, .. } => {
                Diagnostic::error(CODE_BAD_PATH, Stage::Load, message).with_path(input.clone())
            }
            ConfigError::BadTree { origin, .. } => {
                Diagnostic::error(CODE_BAD_TREE, Stage::Load, message).with_origin(origin)
            }
            ConfigError::BugOrBroken(_) => Diagnostic::error(CODE_BUG, Stage::Resolve, message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub schema_version: String,
    pub ok: bool,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
}

impl Report {
    pub fn ok() -> Self {
        Self {
            schema_version: CONFRES_DIAG_SCHEMA_VERSION.to_string(),
            ok: true,
            diagnostics: Vec::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_diagnostics(mut self, mut diagnostics: Vec<Diagnostic>) -> Self {
        diagnostics.sort_by(|a, b| {
            let ap = a.origin.as_ref().and_then(|o| o.pointer.as_deref()).unwrap_or("");
            let bp = b.origin.as_ref().and_then(|o| o.pointer.as_deref()).unwrap_or("");
            ap.cmp(bp)
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.message.cmp(&b.message))
        });
        self.ok = diagnostics.iter().all(|d| d.severity != Severity::Error);
        self.diagnostics = diagnostics;
        self
    }
}
