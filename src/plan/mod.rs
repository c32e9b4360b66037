//! The Plan pipeline: contract, normalization, generation and repair.

pub mod extract;
pub mod generator;
pub mod guard;
pub mod normalize;
pub mod prompts;
pub mod repair;
pub mod schema;

pub use generator::{
    apply_override, finalise_plan, suggest_block_id, PlanError, PlanGenerator, PlanRequest,
};
pub use guard::guard_output;
pub use normalize::{normalize_action, normalize_plan_payload};
pub use repair::{obtain_plan, PlanFailure, PlanOutcome, RepairBudget, PLAN_FAILURE_MESSAGE};
pub use schema::{
    plan_json_schema, validate_plan, Action, ActionKind, BlockAnchor, HostApp, Plan,
    PlanValidationError, PLAN_SCHEMA_VERSION,
};
