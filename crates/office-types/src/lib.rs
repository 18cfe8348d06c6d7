//! Core types and traits for the office workflow backend.
//!
//! Task lifecycle entities, audit records, request/response DTOs, and the
//! repository/directory traits the engine and audit service are built on.

#[macro_use]
mod macros;

mod audit;
mod deadline;
mod dto;
mod task;
mod traits;

pub use audit::*;
pub use deadline::*;
pub use dto::*;
pub use task::*;
pub use traits::*;
