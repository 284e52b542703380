//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable I/O of the `confres` tool.

pub const CONFRES_TREE_SCHEMA_VERSION: &str = "confres.tree@0.1.0";
pub const CONFRES_REPORT_SCHEMA_VERSION: &str = "confres.report@0.1.0";
pub const CONFRES_DIAG_SCHEMA_VERSION: &str = "confres.diag@0.1.0";
