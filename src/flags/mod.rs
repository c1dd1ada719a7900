//! Flag configuration data model and deterministic assignment evaluation.
mod assignment;
mod eval;
mod models;
mod rules;

pub use assignment::{Assignment, AssignmentDetails, AssignmentValue, EvaluationReason};
pub use models::*;

pub(crate) use eval::{evaluate_flag, EvaluationFailure};
