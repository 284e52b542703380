use std::fmt;

use serde::Serialize;

/// Where a node came from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Origin {
    pub description: String,
    /// JSON Pointer of the node inside its tree document, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
}

impl Origin {
    pub fn new(description: impl Into<String>) -> Self {
        Origin {
            description: description.into(),
            pointer: None,
        }
    }

    pub fn with_pointer(&self, pointer: impl Into<String>) -> Self {
        Origin {
            description: self.description.clone(),
            pointer: Some(pointer.into()),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pointer {
            Some(ptr) if !ptr.is_empty() => write!(f, "{} @ {}", self.description, ptr),
            _ => f.write_str(&self.description),
        }
    }
}
