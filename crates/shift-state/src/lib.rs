//! shift-state: blue/green deployment state for PromptShift.
//!
//! Backed by [redb](https://docs.rs/redb), holds one `DeploymentState` per
//! deployment target plus the persisted rollout reports.
//!
//! # Architecture
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns.
//! `DeploymentState` transitions are pure functions producing a new value;
//! `StateStore::commit_deployment` writes it in a single transaction guarded
//! by the revision the writer started from, so a slot write and the
//! live-pointer flip land together or not at all.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
