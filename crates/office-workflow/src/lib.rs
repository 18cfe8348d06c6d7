//! Task lifecycle engine: status transitions, assignment, forwarding,
//! delegation and review routing, gated by a role policy table.

mod engine;
pub mod policy;

pub use engine::TaskEngine;
pub use office_types::WorkflowError;
pub use policy::{authorize, authorize_role, delegation_targets, Operation, Relationship};
