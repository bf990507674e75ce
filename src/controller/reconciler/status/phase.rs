//! # Phase Derivation
//!
//! Folds independent sub-statuses (children, sync state, API state) into the
//! single coarse `status.phase` using a fixed precedence table.

use crate::crd::{ConditionStatus, Phase};

/// Readiness of one sub-component observed during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubState {
    Ready,
    /// Waiting on a child or dependency
    Pending,
    /// Pulling or processing external data
    Syncing,
    /// Cannot progress until the spec changes
    Failed,
}

impl SubState {
    /// Precedence used by [`derive_overall_phase`]; higher wins
    fn weight(self) -> u8 {
        match self {
            SubState::Ready => 0,
            SubState::Pending => 1,
            SubState::Syncing => 2,
            SubState::Failed => 3,
        }
    }

    fn phase(self) -> Phase {
        match self {
            SubState::Ready => Phase::Ready,
            SubState::Pending => Phase::Pending,
            SubState::Syncing => Phase::Syncing,
            SubState::Failed => Phase::Failed,
        }
    }
}

/// Overall phase: `Failed` > `Syncing` > `Pending` > `Ready`.
/// A resource with no sub-components is `Ready`.
#[must_use]
pub fn derive_overall_phase(sub_states: &[SubState]) -> Phase {
    sub_states
        .iter()
        .copied()
        .max_by_key(|s| s.weight())
        .map_or(Phase::Ready, SubState::phase)
}

/// Ready condition status and reason for a phase
#[must_use]
pub fn ready_condition(phase: Phase) -> (ConditionStatus, &'static str) {
    match phase {
        Phase::Ready => (ConditionStatus::True, "Reconciled"),
        Phase::Pending => (ConditionStatus::False, "Pending"),
        Phase::Syncing => (ConditionStatus::False, "Syncing"),
        Phase::Failed => (ConditionStatus::False, "Failed"),
        Phase::Terminating => (ConditionStatus::False, "Terminating"),
    }
}

/// Default `status.message` when a pass did not set one
#[must_use]
pub fn default_message(phase: Phase) -> &'static str {
    match phase {
        Phase::Ready => "All components are ready",
        Phase::Pending => "Waiting for components to become ready",
        Phase::Syncing => "Synchronising data",
        Phase::Failed => "Reconciliation failed",
        Phase::Terminating => "Deletion in progress",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_ready() {
        assert_eq!(derive_overall_phase(&[]), Phase::Ready);
    }

    #[test]
    fn test_precedence_table() {
        use SubState::*;
        let cases = [
            (vec![Ready, Ready], Phase::Ready),
            (vec![Ready, Pending], Phase::Pending),
            (vec![Pending, Syncing, Ready], Phase::Syncing),
            (vec![Syncing, Failed, Pending], Phase::Failed),
            (vec![Failed], Phase::Failed),
        ];
        for (input, expected) in cases {
            assert_eq!(derive_overall_phase(&input), expected, "{input:?}");
        }
    }

    #[test]
    fn test_order_does_not_matter() {
        use SubState::*;
        assert_eq!(
            derive_overall_phase(&[Pending, Syncing]),
            derive_overall_phase(&[Syncing, Pending])
        );
    }

    #[test]
    fn test_ready_condition_only_true_when_ready() {
        assert_eq!(ready_condition(Phase::Ready).0, ConditionStatus::True);
        for phase in [Phase::Pending, Phase::Syncing, Phase::Failed, Phase::Terminating] {
            assert_eq!(ready_condition(phase).0, ConditionStatus::False);
        }
    }
}
