//! Contextual multi-armed bandits: wire models and action selection.
mod eval;
mod models;

pub use eval::BanditResult;
pub use models::*;

pub(crate) use eval::get_bandit_action;
