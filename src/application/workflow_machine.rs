//! Pure workflow state machine for the five-phase TDD loop.
//!
//! The machine never reads or writes storage: it maps (workflow state,
//! latest phase result) to the next action. The executor owns all side
//! effects.
//!
//! Phase table:
//!
//! | Phase        | Agent          | Success      | Failure                      |
//! |--------------|----------------|--------------|------------------------------|
//! | E2E_TEST_GEN | test-generator | CODE_IMPL    | FAILED                       |
//! | CODE_IMPL    | coder          | REVIEW       | CODE_IMPL (bounded) / FAILED |
//! | REVIEW       | reviewer       | DEPLOY       | CODE_IMPL (bounded) / FAILED |
//! | DEPLOY       | deployer       | E2E_VALIDATE | FAILED                       |
//! | E2E_VALIDATE | test-generator | COMPLETE     | CODE_IMPL (bounded) / FAILED |

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::domain::models::{Phase, PhaseResult, WorkflowConfig, WorkflowState};

/// A request to call an agent for one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub agent: String,
    pub phase: Phase,
    pub timeout: Duration,
}

/// Final status of a finished workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed,
}

/// What the executor should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Call this agent for the current phase.
    Invoke(Invocation),
    /// Move to a new phase without an invocation.
    Transition(Phase),
    /// The workflow is done.
    Terminate(TaskOutcome),
}

/// Where a failing phase routes.
#[derive(Debug, Clone, Copy)]
enum FailureRoute {
    /// No retry: straight to FAILED.
    Fail,
    /// Re-enter `target` while its retry count is below the bound.
    Rework { target: Phase, max_retries: u32 },
}

#[derive(Debug, Clone)]
struct PhaseRule {
    agent: &'static str,
    timeout: Duration,
    on_success: Phase,
    on_failure: FailureRoute,
}

/// Pure phase router, built once per workflow kind from configuration.
#[derive(Debug, Clone)]
pub struct WorkflowMachine {
    rules: BTreeMap<Phase, PhaseRule>,
}

impl WorkflowMachine {
    /// The five-phase TDD loop with timeouts and retry bounds from config.
    pub fn five_phase_tdd(config: &WorkflowConfig) -> Self {
        let rework = FailureRoute::Rework {
            target: Phase::CodeImpl,
            max_retries: config.max_code_impl_retries,
        };

        let mut rules = BTreeMap::new();
        rules.insert(
            Phase::E2eTestGen,
            PhaseRule {
                agent: "test-generator",
                timeout: Duration::from_secs(config.e2e_test_gen_timeout_secs),
                on_success: Phase::CodeImpl,
                on_failure: FailureRoute::Fail,
            },
        );
        rules.insert(
            Phase::CodeImpl,
            PhaseRule {
                agent: "coder",
                timeout: Duration::from_secs(config.code_impl_timeout_secs),
                on_success: Phase::Review,
                on_failure: rework,
            },
        );
        rules.insert(
            Phase::Review,
            PhaseRule {
                agent: "reviewer",
                timeout: Duration::from_secs(config.review_timeout_secs),
                on_success: Phase::Deploy,
                on_failure: rework,
            },
        );
        rules.insert(
            Phase::Deploy,
            PhaseRule {
                agent: "deployer",
                timeout: Duration::from_secs(config.deploy_timeout_secs),
                on_success: Phase::E2eValidate,
                on_failure: FailureRoute::Fail,
            },
        );
        rules.insert(
            Phase::E2eValidate,
            PhaseRule {
                agent: "test-generator",
                timeout: Duration::from_secs(config.e2e_validate_timeout_secs),
                on_success: Phase::Complete,
                on_failure: rework,
            },
        );

        Self { rules }
    }

    /// Agent names the phase table references; the registry is validated
    /// against this set at startup.
    pub fn agent_names(&self) -> BTreeSet<&'static str> {
        self.rules.values().map(|r| r.agent).collect()
    }

    /// Decide the next action.
    ///
    /// With no pending result the current phase still needs its agent
    /// invocation; with one, the result dictates the transition.
    pub fn decide(&self, state: &WorkflowState, last: Option<&PhaseResult>) -> Action {
        match state.current_phase {
            Phase::Complete => Action::Terminate(TaskOutcome::Completed),
            Phase::Failed => Action::Terminate(TaskOutcome::Failed),
            phase => {
                let rule = self
                    .rules
                    .get(&phase)
                    .expect("non-terminal phase must have a rule");
                match last {
                    None => Action::Invoke(Invocation {
                        agent: rule.agent.to_string(),
                        phase,
                        timeout: rule.timeout,
                    }),
                    Some(result) => Action::Transition(self.route(rule, result, state)),
                }
            }
        }
    }

    fn route(&self, rule: &PhaseRule, result: &PhaseResult, state: &WorkflowState) -> Phase {
        if result.is_success() {
            return rule.on_success;
        }
        match rule.on_failure {
            FailureRoute::Fail => Phase::Failed,
            FailureRoute::Rework { target, max_retries } => {
                if state.retry_count(target) < max_retries {
                    target
                } else {
                    Phase::Failed
                }
            }
        }
    }
}
