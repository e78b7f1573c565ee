//! shift-core: shared data model for PromptShift.
//!
//! Holds the immutable records that flow through a rollout (templates,
//! model variants, test cases, results, scores, violations, gate
//! decisions), the typed `shift.toml` configuration, and the read-only
//! prompt template store.

pub mod candidate;
pub mod config;
pub mod error;
pub mod template;
pub mod types;

pub use candidate::{Candidate, CandidateDescriptor, Corpus, VariantSpec};
pub use config::{parse_duration, ShiftConfig};
pub use error::{ConfigError, ConfigResult};
pub use template::{PromptTemplate, TemplateStore};
pub use types::*;

/// Current Unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
