//! Change batching: groups a stream of migration actions into atomic,
//! orderable change groups with deterministic splitting rules, plus the
//! persistence surface used for promote/demote and crash recovery.

pub mod batcher;
pub mod store;

pub use batcher::{AddActionParams, BatchedAction, ChangeBatcher};
pub use store::{ChangeGroupStore, MemoryChangeGroupStore};
