//! 编排层错误类型
//!
//! 远端调用的原始错误为 RemoteError，生命周期、拓扑构建与流式调用统一上抛 HiveError。

use std::time::Duration;

use thiserror::Error;

use crate::remote::{RemoteError, SinkError};
use crate::resource::ResourceKind;
use crate::stream::InvocationOutcome;

/// 编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum HiveError {
    /// 轮询超过截止时间仍处于过渡态
    #[error("Provisioning timeout: {kind} '{name}' still {status} after {waited:?}")]
    ProvisioningTimeout {
        kind: ResourceKind,
        name: String,
        status: String,
        waited: Duration,
    },

    #[error("Provisioning failed: {kind} '{name}' settled in {status}")]
    ProvisioningFailed {
        kind: ResourceKind,
        name: String,
        status: String,
    },

    /// 创建重试耗尽后仍冲突
    #[error("Resource conflict: {kind} '{name}' after {attempts} attempts: {detail}")]
    ResourceConflict {
        kind: ResourceKind,
        name: String,
        attempts: usize,
        detail: String,
    },

    #[error("Resource not found: {kind} '{name}'")]
    ResourceNotFound { kind: ResourceKind, name: String },

    /// 流打开前被服务拒绝
    #[error("Invocation rejected with status {status}: {body}")]
    InvocationRejected { status: u16, body: String },

    /// 流中途断开，partial 保存断开前已累积的答案与遥测
    #[error("Stream interrupted: {reason}")]
    StreamInterrupted {
        reason: String,
        partial: Box<InvocationOutcome>,
    },

    /// 非致命：记录为警告，答案退回清洗后的原文
    #[error("Citation reconstruction skipped: {0}")]
    CitationReconstructionSkipped(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Artifact sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

impl HiveError {
    /// 是否值得调用方整体重试（流式调用本身不做自动重试）
    pub fn is_retryable(&self) -> bool {
        match self {
            HiveError::ProvisioningTimeout { .. } | HiveError::ResourceConflict { .. } => true,
            HiveError::StreamInterrupted { .. } => true,
            HiveError::Remote(e) => e.is_transient(),
            _ => false,
        }
    }

    /// 流中断时已拿到的部分结果
    pub fn partial_outcome(&self) -> Option<&InvocationOutcome> {
        match self {
            HiveError::StreamInterrupted { partial, .. } => Some(partial),
            _ => None,
        }
    }
}
