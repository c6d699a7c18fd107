//! The workflow state union and its transition predicates.
//!
//! One tagged union replaces the pile of independent booleans the usual UI
//! for this flow accumulates (modal visible, loading, reverting, ...), so
//! combinations like "poisoning and reverting at once" cannot be expressed
//! at all. The controller is the only writer.

use crate::models::{CompareReport, OperationOutcome};

/// The controller's single source of truth.
///
/// Confirming variants carry the state to return to on cancel, so cancel is
/// a plain move rather than a lookup in some side table.
#[derive(Debug, Clone)]
pub enum WorkflowState {
    /// No generation yet.
    Idle,
    /// The backend produced code for the current prompt.
    Generated { code: String },
    /// The poison confirmation dialog is open and counting down.
    ConfirmingPoison {
        remaining: u32,
        can_confirm: bool,
        resume: Box<WorkflowState>,
    },
    /// Poison call in flight.
    Poisoning,
    /// Poison call resolved.
    Poisoned {
        outcome: OperationOutcome,
        revert_available: bool,
    },
    /// The revert confirmation dialog is open (not timed; revert is the
    /// corrective action, not the dangerous one).
    ConfirmingRevert { resume: Box<WorkflowState> },
    /// Revert call in flight.
    Reverting,
    /// Revert call resolved.
    Reverted { outcome: OperationOutcome },
    /// The compare acknowledgment dialog is open (single OK/Cancel; the
    /// operation is slow and unreliable enough to warrant it).
    ConfirmingCompare { resume: Box<WorkflowState> },
    /// Compare call in flight.
    Comparing,
    /// Compare call resolved.
    Compared { result: CompareReport },
}

impl WorkflowState {
    /// A remote destructive/comparative call is currently awaited.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            WorkflowState::Poisoning | WorkflowState::Reverting | WorkflowState::Comparing
        )
    }

    /// A confirmation dialog is open.
    #[must_use]
    pub fn is_confirming(&self) -> bool {
        matches!(
            self,
            WorkflowState::ConfirmingPoison { .. }
                | WorkflowState::ConfirmingRevert { .. }
                | WorkflowState::ConfirmingCompare { .. }
        )
    }

    /// No dialog is open and no call is in flight.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.is_in_flight() && !self.is_confirming()
    }

    /// Poison may be requested from any settled state once code exists.
    #[must_use]
    pub fn can_request_poison(&self, has_code: bool) -> bool {
        has_code && self.is_settled()
    }

    /// Revert may be requested while an unreverted successful poison exists:
    /// the most recent poison succeeded and no revert has succeeded since.
    /// A failed revert leaves the poison unreverted, so re-requesting from
    /// `Reverted` works.
    #[must_use]
    pub fn can_request_revert(&self, unreverted_poison: bool) -> bool {
        unreverted_poison && self.is_settled()
    }

    /// Compare is offered iff an unreverted successful poison exists and the
    /// session has non-empty generated code.
    #[must_use]
    pub fn can_request_compare(&self, has_code: bool, unreverted_poison: bool) -> bool {
        has_code && unreverted_poison && self.is_settled()
    }

    /// Short name for logs and status lines.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Generated { .. } => "generated",
            WorkflowState::ConfirmingPoison { .. } => "confirming-poison",
            WorkflowState::Poisoning => "poisoning",
            WorkflowState::Poisoned { .. } => "poisoned",
            WorkflowState::ConfirmingRevert { .. } => "confirming-revert",
            WorkflowState::Reverting => "reverting",
            WorkflowState::Reverted { .. } => "reverted",
            WorkflowState::ConfirmingCompare { .. } => "confirming-compare",
            WorkflowState::Comparing => "comparing",
            WorkflowState::Compared { .. } => "compared",
        }
    }
}

/// Clamp a requested TPI count into the representable range. Applied at
/// edit time; out-of-range counts never reach a request.
#[must_use]
pub fn clamp_poison_count(requested: i64) -> u32 {
    u32::try_from(requested.clamp(1, 1000)).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poisoned(ok: bool) -> WorkflowState {
        WorkflowState::Poisoned {
            outcome: if ok {
                OperationOutcome::success("done")
            } else {
                OperationOutcome::failure("boom")
            },
            revert_available: ok,
        }
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp_poison_count(0), 1);
        assert_eq!(clamp_poison_count(-25), 1);
        assert_eq!(clamp_poison_count(1), 1);
        assert_eq!(clamp_poison_count(500), 500);
        assert_eq!(clamp_poison_count(1000), 1000);
        assert_eq!(clamp_poison_count(99_999), 1000);
    }

    #[test]
    fn in_flight_states_are_exclusive_and_block_requests() {
        for state in [
            WorkflowState::Poisoning,
            WorkflowState::Reverting,
            WorkflowState::Comparing,
        ] {
            assert!(state.is_in_flight());
            assert!(!state.can_request_poison(true));
            assert!(!state.can_request_revert(true));
            assert!(!state.can_request_compare(true, true));
        }
    }

    #[test]
    fn poison_requires_code_and_settled_state() {
        assert!(!WorkflowState::Idle.can_request_poison(false));
        assert!(WorkflowState::Idle.can_request_poison(true));
        assert!(poisoned(true).can_request_poison(true));
        let confirming = WorkflowState::ConfirmingRevert {
            resume: Box::new(poisoned(true)),
        };
        assert!(!confirming.can_request_poison(true));
    }

    #[test]
    fn revert_follows_unreverted_poison_flag() {
        assert!(poisoned(true).can_request_revert(true));
        assert!(!poisoned(false).can_request_revert(false));
        assert!(!WorkflowState::Idle.can_request_revert(false));
    }

    #[test]
    fn failed_revert_can_be_retried_successful_cannot() {
        // A failed revert leaves the poison in place; the flag stays set.
        let failed = WorkflowState::Reverted {
            outcome: OperationOutcome::failure("revert blew up"),
        };
        assert!(failed.can_request_revert(true));

        let succeeded = WorkflowState::Reverted {
            outcome: OperationOutcome::success("reverted"),
        };
        assert!(!succeeded.can_request_revert(false));
    }

    #[test]
    fn compare_needs_unreverted_poison_and_code() {
        assert!(poisoned(true).can_request_compare(true, true));
        assert!(!poisoned(true).can_request_compare(false, true));
        assert!(!poisoned(false).can_request_compare(true, false));
        assert!(!WorkflowState::Generated {
            code: "x".to_string()
        }
        .can_request_compare(true, false));
    }

    #[test]
    fn revert_stays_available_after_a_compare() {
        let compared = WorkflowState::Compared {
            result: CompareReport {
                ok: true,
                is_correct: false,
                clean_output: "def rev(s):\n    return s[::-1]".to_string(),
                message: String::new(),
            },
        };
        assert!(compared.can_request_revert(true));
        assert!(compared.can_request_compare(true, true));
    }
}
