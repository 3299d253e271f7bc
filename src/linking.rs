//! Link delta analysis and migration.
//!
//! Link change groups move through translation, topology analysis, and
//! migration in fixed-size slices, with deferred groups retried on an aging
//! schedule instead of blocking the pipeline.

pub mod adapter;
pub mod aging;
pub mod closure;
pub mod engine;
pub mod store;

pub use adapter::{LinkAdapter, ReflectionError};
pub use aging::{AgeBucket, TranslationAging};
pub use closure::{ClosureCache, NonCyclicClosure};
pub use engine::{LinkEngine, LinkEngineConfig, LinkEngineParams, Side};
pub use store::{LinkChangeStore, MemoryLinkChangeStore, PageRequest};
