//! teardown 的逐步结果

use crate::remote::RemoteError;
use crate::resource::ResourceKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Deleted,
    /// 远端本就不存在，视为成功
    Absent,
    Failed(String),
}

impl StepOutcome {
    pub fn from_result(result: Result<(), RemoteError>) -> Self {
        match result {
            Ok(()) => StepOutcome::Deleted,
            Err(RemoteError::NotFound(_)) => StepOutcome::Absent,
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownStep {
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub steps: Vec<TeardownStep>,
}

impl TeardownReport {
    pub fn record(&mut self, kind: ResourceKind, name: impl Into<String>, outcome: StepOutcome) {
        let name = name.into();
        match &outcome {
            StepOutcome::Deleted => tracing::info!("Deleted {} '{}'", kind, name),
            StepOutcome::Absent => tracing::debug!("{} '{}' already absent", kind, name),
            StepOutcome::Failed(e) => tracing::warn!("Failed to delete {} '{}': {}", kind, name, e),
        }
        self.steps.push(TeardownStep {
            kind,
            name,
            outcome,
        });
    }

    pub fn merge(&mut self, other: TeardownReport) {
        self.steps.extend(other.steps);
    }

    /// 没有失败步骤（NotFound 不算失败）
    pub fn is_clean(&self) -> bool {
        !self
            .steps
            .iter()
            .any(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }

    /// 实际删除的资源名称，按删除顺序
    pub fn deleted(&self, kind: ResourceKind) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.kind == kind && s.outcome == StepOutcome::Deleted)
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn failures(&self) -> Vec<&TeardownStep> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
            .collect()
    }
}
