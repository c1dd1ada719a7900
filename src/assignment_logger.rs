use crate::events::{AssignmentEvent, BanditEvent};

/// Receives assignment and bandit events for delivery to the application's analytics storage.
///
/// Implementations are called synchronously on the evaluation path and should hand events off
/// quickly (e.g. to a channel); the engine does not batch or retry.
pub trait AssignmentLogger {
    /// Called when a flag evaluation lands on an allocation with logging enabled.
    fn log_assignment(&self, event: AssignmentEvent) {
        let _ = event;
    }

    /// Called when a bandit selects an action.
    fn log_bandit_action(&self, event: BanditEvent) {
        let _ = event;
    }
}

/// Logger that discards all events. Used when the application does not configure one.
pub(crate) struct NoopAssignmentLogger;
impl AssignmentLogger for NoopAssignmentLogger {}
