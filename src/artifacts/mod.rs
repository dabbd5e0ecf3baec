//! Artifact store subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline stage
//!     → recorder.rs (latest request/response pair, audit snapshots, log)
//!     → store.rs (ArtifactStore trait, CAS-based update_json)
//!     → fs.rs | memory.rs (backends)
//!
//! Resumed stage
//!     → keys.rs (well-known predecessor location)
//!     → store.rs read_json
//! ```
//!
//! # Design Decisions
//! - Keys are sanitized once, in `ArtifactKey::new`; backends trust them
//! - "Latest" keys are overwritten on re-run, history lives in audit snapshots
//! - Shared sets (relations, logs) are only mutated through compare-and-swap

pub mod fs;
pub mod key;
pub mod keys;
pub mod memory;
pub mod recorder;
pub mod relations;
pub mod store;

pub use fs::FsArtifactStore;
pub use key::ArtifactKey;
pub use memory::MemoryArtifactStore;
pub use recorder::{PipelineArtifact, SavedPair, StageRecorder};
pub use relations::RelationSets;
pub use store::{update_json, ArtifactStore, StoreError, StoreResult};
