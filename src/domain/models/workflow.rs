//! Workflow phase types and per-task workflow state.
//!
//! The phase routing itself lives in the application layer
//! (`application::workflow_machine`); these types are the durable record
//! embedded in every task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One named step of a workflow.
///
/// Wire form is SCREAMING_SNAKE_CASE (`"E2E_TEST_GEN"`, ...). COMPLETE and
/// FAILED are the terminal pseudo-phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    E2eTestGen,
    CodeImpl,
    Review,
    Deploy,
    E2eValidate,
    Complete,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E2eTestGen => "E2E_TEST_GEN",
            Self::CodeImpl => "CODE_IMPL",
            Self::Review => "REVIEW",
            Self::Deploy => "DEPLOY",
            Self::E2eValidate => "E2E_VALIDATE",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    /// Whether this is a terminal pseudo-phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// The five agent-backed phases, in nominal order.
    pub fn agent_phases() -> &'static [Phase] {
        &[Self::E2eTestGen, Self::CodeImpl, Self::Review, Self::Deploy, Self::E2eValidate]
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success/failure discriminator of a phase result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseOutcome {
    Success,
    Failure,
}

/// Record produced by one agent invocation for one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub status: PhaseOutcome,
    /// Agent-specific output (test report, PR id, deployment url, ...).
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PhaseResult {
    pub fn success(data: serde_json::Value) -> Self {
        Self { status: PhaseOutcome::Success, data, error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: PhaseOutcome::Failure,
            data: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    /// Tie-break rule: a result carrying an error is a failure even when
    /// its status claims success.
    pub fn is_success(&self) -> bool {
        self.status == PhaseOutcome::Success
            && self.error.as_deref().map_or(true, str::is_empty)
    }
}

/// Durable workflow progression record embedded in a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub current_phase: Phase,
    /// Latest result per entered phase. A retried phase overwrites its
    /// previous entry.
    #[serde(default)]
    pub phase_results: BTreeMap<Phase, PhaseResult>,
    /// Times each phase has been re-entered (first entry counts as zero).
    #[serde(default)]
    pub retry_counts: BTreeMap<Phase, u32>,
    pub last_transition_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Fresh state at the first phase of the five-phase loop.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            current_phase: Phase::E2eTestGen,
            phase_results: BTreeMap::new(),
            retry_counts: BTreeMap::new(),
            last_transition_at: now,
        }
    }

    /// Record `result` for `phase` and move to `next`.
    ///
    /// Re-entering a phase that already holds a result bumps its retry
    /// count; the workflow machine enforces the bound before asking for
    /// the transition.
    pub fn advance(&mut self, phase: Phase, result: PhaseResult, next: Phase) {
        self.phase_results.insert(phase, result);
        if !next.is_terminal() && self.phase_results.contains_key(&next) {
            *self.retry_counts.entry(next).or_insert(0) += 1;
        }
        self.current_phase = next;
        self.last_transition_at = Utc::now();
    }

    /// Move to a phase without recording a result (cancellation, abort).
    pub fn jump_to(&mut self, next: Phase) {
        self.current_phase = next;
        self.last_transition_at = Utc::now();
    }

    pub fn retry_count(&self, phase: Phase) -> u32 {
        self.retry_counts.get(&phase).copied().unwrap_or(0)
    }

    pub fn result_for(&self, phase: Phase) -> Option<&PhaseResult> {
        self.phase_results.get(&phase)
    }

    pub fn is_terminal(&self) -> bool {
        self.current_phase.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn phase_serializes_to_wire_form() {
        assert_eq!(serde_json::to_string(&Phase::E2eTestGen).unwrap(), "\"E2E_TEST_GEN\"");
        assert_eq!(serde_json::to_string(&Phase::CodeImpl).unwrap(), "\"CODE_IMPL\"");
        assert_eq!(serde_json::to_string(&Phase::E2eValidate).unwrap(), "\"E2E_VALIDATE\"");
    }

    #[test]
    fn result_with_error_is_failure_despite_success_status() {
        let ambiguous = PhaseResult {
            status: PhaseOutcome::Success,
            data: json!({}),
            error: Some("broke anyway".to_string()),
        };
        assert!(!ambiguous.is_success());
        assert!(PhaseResult::success(json!({})).is_success());
    }

    #[test]
    fn advance_records_result_and_counts_reentry() {
        let mut state = WorkflowState::new(Utc::now());
        state.advance(Phase::E2eTestGen, PhaseResult::success(json!({})), Phase::CodeImpl);
        assert_eq!(state.current_phase, Phase::CodeImpl);
        assert_eq!(state.retry_count(Phase::CodeImpl), 0);

        // CODE_IMPL fails and re-enters itself: that is retry one.
        state.advance(Phase::CodeImpl, PhaseResult::failure("nope"), Phase::CodeImpl);
        assert_eq!(state.retry_count(Phase::CodeImpl), 1);

        state.advance(Phase::CodeImpl, PhaseResult::success(json!({})), Phase::Review);
        // REVIEW rework re-enters CODE_IMPL: retry two.
        state.advance(Phase::Review, PhaseResult::failure("nit"), Phase::CodeImpl);
        assert_eq!(state.retry_count(Phase::CodeImpl), 2);
    }

    #[test]
    fn workflow_state_json_roundtrip() {
        let mut state = WorkflowState::new(Utc::now());
        state.advance(Phase::E2eTestGen, PhaseResult::success(json!({"tests": 3})), Phase::CodeImpl);

        let json = serde_json::to_string(&state).unwrap();
        let back: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert!(json.contains("\"E2E_TEST_GEN\""));
    }
}
