//! Per-operation outcomes of a restore.

use crate::planner::{Barrier, Bindings, PlanDiagnostic, RestorePlan};
use cartographer_core::TenantId;
use cartographer_error::AdapterErrorKind;
use derive_getters::Getters;

/// Why an operation was never sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// Execution was cancelled before the operation's barrier
    Cancelled,
    /// The plan was a dry run
    DryRun,
    /// Deletions are withheld once anything else failed
    EarlierFailures,
}

/// Why an operation failed.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum FailureReason {
    /// The adapter rejected the call, or retries ran out
    #[display("{}", _0)]
    Adapter(AdapterErrorKind),
    /// Something the operation references has no live identity
    #[display("dependency unmet: {}", _0)]
    DependencyUnmet(String),
}

/// Outcome of one planned operation.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum OperationOutcome {
    /// The mutation was sent and accepted
    #[display("applied")]
    Applied,
    /// The live state already matched; nothing was sent
    #[display("already correct")]
    AlreadyCorrect,
    /// The operation failed
    #[display("failed: {}", _0)]
    Failed(FailureReason),
    /// The operation was never attempted
    #[display("not attempted: {}", _0)]
    NotAttempted(SkipReason),
}

impl OperationOutcome {
    /// Whether the live state now reflects the operation.
    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Applied | OperationOutcome::AlreadyCorrect)
    }

    /// Whether the operation failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, OperationOutcome::Failed(_))
    }

    /// Whether the operation failed because a dependency was missing.
    pub fn is_dependency_unmet(&self) -> bool {
        matches!(
            self,
            OperationOutcome::Failed(FailureReason::DependencyUnmet(_))
        )
    }
}

/// Report line for one planned operation.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct OperationReport {
    /// Index in the plan
    index: usize,
    /// Barrier the operation ran in
    barrier: Barrier,
    /// Human-readable operation
    description: String,
    /// What happened
    outcome: OperationOutcome,
    /// Adapter calls made, retries included
    attempts: u32,
}

impl OperationReport {
    pub(crate) fn new(
        index: usize,
        barrier: Barrier,
        description: String,
        outcome: OperationOutcome,
        attempts: u32,
    ) -> Self {
        Self {
            index,
            barrier,
            description,
            outcome,
            attempts,
        }
    }
}

impl std::fmt::Display for OperationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:>3}] {:<9} {} => {}",
            self.index, self.barrier, self.description, self.outcome
        )?;
        if self.attempts > 1 {
            write!(f, " ({} attempts)", self.attempts)?;
        }
        Ok(())
    }
}

/// Full account of a restore: one line per planned operation, in plan order.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct RestoreReport {
    /// Tenant restored
    tenant_id: TenantId,
    /// Outcome of every planned operation
    operations: Vec<OperationReport>,
    /// Planner diagnostics
    diagnostics: Vec<PlanDiagnostic>,
    /// Live identities of every node after execution
    bindings: Bindings,
    /// Whether execution stopped at a barrier boundary on request
    cancelled: bool,
}

impl RestoreReport {
    pub(crate) fn new(
        tenant_id: TenantId,
        operations: Vec<OperationReport>,
        diagnostics: Vec<PlanDiagnostic>,
        bindings: Bindings,
        cancelled: bool,
    ) -> Self {
        Self {
            tenant_id,
            operations,
            diagnostics,
            bindings,
            cancelled,
        }
    }

    /// Report of a plan that was never executed.
    pub fn dry_run(tenant_id: TenantId, plan: &RestorePlan) -> Self {
        let operations = plan
            .operations()
            .iter()
            .enumerate()
            .map(|(index, op)| {
                OperationReport::new(
                    index,
                    op.barrier(),
                    op.to_string(),
                    OperationOutcome::NotAttempted(SkipReason::DryRun),
                    0,
                )
            })
            .collect();
        Self::new(
            tenant_id,
            operations,
            plan.diagnostics().clone(),
            plan.bindings().clone(),
            false,
        )
    }

    fn count(&self, predicate: impl Fn(&OperationOutcome) -> bool) -> usize {
        self.operations
            .iter()
            .filter(|op| predicate(&op.outcome))
            .count()
    }

    /// Operations applied.
    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, OperationOutcome::Applied))
    }

    /// Operations skipped because the live state already matched.
    pub fn already_correct(&self) -> usize {
        self.count(|o| matches!(o, OperationOutcome::AlreadyCorrect))
    }

    /// Operations that failed.
    pub fn failed(&self) -> usize {
        self.count(OperationOutcome::is_failure)
    }

    /// Operations never attempted.
    pub fn not_attempted(&self) -> usize {
        self.count(|o| matches!(o, OperationOutcome::NotAttempted(_)))
    }

    /// Whether every operation now holds live.
    pub fn is_complete(&self) -> bool {
        self.operations.iter().all(|op| op.outcome.is_success())
    }
}

impl std::fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Restore of {}: {} applied, {} already correct, {} failed, {} not attempted{}",
            self.tenant_id,
            self.applied(),
            self.already_correct(),
            self.failed(),
            self.not_attempted(),
            if self.cancelled { " (cancelled)" } else { "" }
        )?;
        for op in &self.operations {
            writeln!(f, "  {}", op)?;
        }
        for diagnostic in &self.diagnostics {
            writeln!(f, "  ! {}", diagnostic)?;
        }
        Ok(())
    }
}
