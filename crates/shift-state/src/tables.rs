//! redb table definitions for the PromptShift state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Deployment state keyed by target name.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

/// Rollout reports keyed by pipeline id.
pub const REPORTS: TableDefinition<&str, &[u8]> = TableDefinition::new("reports");
