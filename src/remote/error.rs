//! 远端调用错误

use thiserror::Error;

/// 控制面、函数注册表与调用通道返回的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote resource not found: {0}")]
    NotFound(String),

    /// 名称已占用，或资源正处于不允许该操作的状态
    #[error("Remote conflict: {0}")]
    Conflict(String),

    #[error("Remote throttled: {0}")]
    Throttled(String),

    #[error("Remote rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::Conflict(_))
    }

    /// 限流与传输层错误可以原样重试
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Throttled(_) | RemoteError::Transport(_))
    }

    /// 按 HTTP 状态码映射
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 => RemoteError::NotFound(body),
            409 => RemoteError::Conflict(body),
            429 => RemoteError::Throttled(body),
            _ => RemoteError::Rejected { status, body },
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        RemoteError::Decode(e.to_string())
    }
}
