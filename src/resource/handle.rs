//! 资源句柄与远端状态
//!
//! 句柄只在编排层内部流转，状态迁移通过方法完成，保证：
//! remote_id 存在当且仅当状态为 Provisioning / Ready / Deleting。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 托管服务中的资源种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Agent,
    Alias,
    BackingFunction,
    Role,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Agent => "agent",
            ResourceKind::Alias => "alias",
            ResourceKind::BackingFunction => "backing function",
            ResourceKind::Role => "role",
        };
        f.write_str(s)
    }
}

/// 句柄在本地视角下的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Unprovisioned,
    Provisioning,
    Ready,
    Deleting,
    Deleted,
    Failed,
}

impl ResourceStatus {
    /// 该状态下句柄是否必须持有 remote_id
    pub fn holds_remote_id(self) -> bool {
        matches!(
            self,
            ResourceStatus::Provisioning | ResourceStatus::Ready | ResourceStatus::Deleting
        )
    }
}

/// 远端原始状态字符串，如 CREATING / PREPARED / NOT_PREPARED / FAILED
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteStatus(String);

impl RemoteStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    /// 轮询遇到 NotFound 时使用的合成状态
    pub fn deleted() -> Self {
        Self("DELETED".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 以 "ING" 结尾的状态都视为过渡态（CREATING、UPDATING、PREPARING、DELETING 等）
    pub fn is_transitional(&self) -> bool {
        self.0.to_ascii_uppercase().ends_with("ING")
    }

    pub fn is_failed(&self) -> bool {
        self.0.eq_ignore_ascii_case("FAILED")
    }

    pub fn is_deleted(&self) -> bool {
        self.0.eq_ignore_ascii_case("DELETED")
    }

    /// 映射到本地状态；非过渡、非失败、非删除的状态一律视为 Ready
    pub fn settle(&self) -> ResourceStatus {
        if self.is_deleted() {
            ResourceStatus::Deleted
        } else if self.0.eq_ignore_ascii_case("DELETING") {
            ResourceStatus::Deleting
        } else if self.is_transitional() {
            ResourceStatus::Provisioning
        } else if self.is_failed() {
            ResourceStatus::Failed
        } else {
            ResourceStatus::Ready
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 远端查询返回的资源描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResource {
    pub kind: ResourceKind,
    pub name: String,
    pub remote_id: String,
    pub status: RemoteStatus,
    /// 别名所属的 agent id
    pub parent_id: Option<String>,
    pub arn: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// 同一 kind 下以名称唯一定位资源
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

/// 编排层持有的资源句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    kind: ResourceKind,
    name: String,
    remote_id: Option<String>,
    status: ResourceStatus,
    parent_id: Option<String>,
    arn: Option<String>,
}

impl ResourceHandle {
    /// 尚未在远端创建的句柄
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            remote_id: None,
            status: ResourceStatus::Unprovisioned,
            parent_id: None,
            arn: None,
        }
    }

    /// 由远端查询结果构造；Failed / Deleted 的资源不保留 remote_id
    pub fn from_remote(resource: &RemoteResource) -> Self {
        let mut handle = Self::new(resource.kind, resource.name.clone());
        handle.parent_id = resource.parent_id.clone();
        handle.arn = resource.arn.clone();
        handle.provisioning(resource.remote_id.clone());
        handle.settle(&resource.status);
        handle
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn arn(&self) -> Option<&str> {
        self.arn.as_deref()
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.kind, self.name.clone())
    }

    pub fn is_ready(&self) -> bool {
        self.status == ResourceStatus::Ready
    }

    /// 远端已接受创建请求
    pub fn provisioning(&mut self, remote_id: impl Into<String>) {
        self.remote_id = Some(remote_id.into());
        self.status = ResourceStatus::Provisioning;
    }

    /// 根据远端状态落定本地状态
    pub fn settle(&mut self, remote: &RemoteStatus) {
        self.status = remote.settle();
        if !self.status.holds_remote_id() {
            self.remote_id = None;
        }
    }

    pub fn set_arn(&mut self, arn: Option<String>) {
        self.arn = arn;
    }

    pub fn begin_deleting(&mut self) {
        if self.remote_id.is_some() {
            self.status = ResourceStatus::Deleting;
        }
    }

    pub fn mark_deleted(&mut self) {
        self.status = ResourceStatus::Deleted;
        self.remote_id = None;
    }

    /// 句柄状态与 remote_id 是否一致
    pub fn is_consistent(&self) -> bool {
        self.status.holds_remote_id() == self.remote_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: &str) -> RemoteResource {
        RemoteResource {
            kind: ResourceKind::Agent,
            name: "news_agent".to_string(),
            remote_id: "AG1".to_string(),
            status: RemoteStatus::new(status),
            parent_id: None,
            arn: Some("arn:agent/AG1".to_string()),
            updated_at: None,
        }
    }

    #[test]
    fn test_transitional_statuses() {
        for s in ["CREATING", "UPDATING", "PREPARING", "DELETING", "versioning"] {
            assert!(RemoteStatus::new(s).is_transitional(), "{} should be transitional", s);
        }
        for s in ["PREPARED", "NOT_PREPARED", "FAILED", "ACTIVE"] {
            assert!(!RemoteStatus::new(s).is_transitional(), "{} should be settled", s);
        }
    }

    #[test]
    fn test_settle_mapping() {
        assert_eq!(RemoteStatus::new("PREPARED").settle(), ResourceStatus::Ready);
        assert_eq!(RemoteStatus::new("NOT_PREPARED").settle(), ResourceStatus::Ready);
        assert_eq!(RemoteStatus::new("CREATING").settle(), ResourceStatus::Provisioning);
        assert_eq!(RemoteStatus::new("DELETING").settle(), ResourceStatus::Deleting);
        assert_eq!(RemoteStatus::new("FAILED").settle(), ResourceStatus::Failed);
        assert_eq!(RemoteStatus::deleted().settle(), ResourceStatus::Deleted);
    }

    #[test]
    fn test_handle_from_ready_remote_keeps_id() {
        let handle = ResourceHandle::from_remote(&remote("PREPARED"));
        assert!(handle.is_ready());
        assert_eq!(handle.remote_id(), Some("AG1"));
        assert!(handle.is_consistent());
    }

    #[test]
    fn test_handle_from_failed_remote_drops_id() {
        let handle = ResourceHandle::from_remote(&remote("FAILED"));
        assert_eq!(handle.status(), ResourceStatus::Failed);
        assert_eq!(handle.remote_id(), None);
        assert!(handle.is_consistent());
    }

    #[test]
    fn test_transitions_stay_consistent() {
        let mut handle = ResourceHandle::new(ResourceKind::Role, "exec_role");
        assert!(handle.is_consistent());

        handle.provisioning("R1");
        assert_eq!(handle.status(), ResourceStatus::Provisioning);
        assert!(handle.is_consistent());

        handle.settle(&RemoteStatus::new("ACTIVE"));
        assert!(handle.is_ready());
        assert!(handle.is_consistent());

        handle.begin_deleting();
        assert_eq!(handle.status(), ResourceStatus::Deleting);
        assert!(handle.is_consistent());

        handle.mark_deleted();
        assert_eq!(handle.remote_id(), None);
        assert!(handle.is_consistent());
    }

    #[test]
    fn test_begin_deleting_without_id_is_noop() {
        let mut handle = ResourceHandle::new(ResourceKind::Alias, "live");
        handle.begin_deleting();
        assert_eq!(handle.status(), ResourceStatus::Unprovisioned);
    }
}
