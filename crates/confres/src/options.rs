/// Options consulted (never mutated) during one resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigResolveOptions {
    allow_unresolved: bool,
}

impl ConfigResolveOptions {
    pub fn defaults() -> Self {
        Self::default()
    }

    /// When set, a non-optional substitution that finds nothing stays in the
    /// result as a placeholder instead of failing the resolution.
    pub fn with_allow_unresolved(self, allow_unresolved: bool) -> Self {
        ConfigResolveOptions { allow_unresolved }
    }

    pub fn allow_unresolved(&self) -> bool {
        self.allow_unresolved
    }
}
