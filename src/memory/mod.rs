//! Memory tiers: session transcripts, per-document notes, the global user
//! profile and a vector mirror for related-memory recall.

pub mod classifier;
pub mod cross_session;
pub mod identity;
pub mod manager;
pub mod notes;
pub mod profile;
pub mod session;
pub mod vector;

pub use classifier::{classify, Classification, MemoryCategory, MemoryTier};
pub use cross_session::CrossSessionStore;
pub use identity::DocumentIdentity;
pub use manager::{MemoryConfig, MemoryContext, MemoryManager, TurnContext};
pub use profile::GlobalProfileStore;
pub use session::{SessionStore, TurnRecord, TurnRole};
pub use vector::{VectorHit, VectorMemory, VectorWriteMode};
