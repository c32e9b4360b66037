pub mod builders;
pub mod harness;

// Re-export commonly used test utilities
pub use builders::{plan_json, ChatRequestBuilder, SkillFileBuilder};
pub use harness::TestHarness;
