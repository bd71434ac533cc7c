//! 远端能力抽象
//!
//! 控制面（资源增删查、协作者关联、准备、调用）与函数注册表分开建模，
//! 生产实现见 `http`，测试实现见 `mock`。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::error::RemoteError;
use crate::resource::{FunctionSpec, RemoteResource, RemoteStatus, ResourceKind, ResourceSpec};
use crate::stream::{SessionState, StreamEvent};

/// 调用返回的事件流
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, RemoteError>> + Send>>;

/// 一次调用请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    pub agent_id: String,
    pub alias_id: String,
    pub session_id: String,
    pub input_text: String,
    pub enable_trace: bool,
    pub end_session: bool,
    /// 随调用附带的文件与 return-of-control 结果
    pub session_state: Option<SessionState>,
}

/// supervisor 与协作者之间的关联
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorAssociation {
    /// 关联名称，在同一 supervisor 下唯一
    pub collaborator_name: String,
    pub alias_arn: String,
    #[serde(default)]
    pub instruction: String,
    /// 是否把对话历史转发给协作者
    #[serde(default)]
    pub relay_history: bool,
}

/// 把后端函数挂到 agent 上作为一组工具
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionBinding {
    pub group_name: String,
    pub function_id: String,
    pub description: String,
    /// 函数签名描述（名称、参数），原样透传给服务端
    pub functions: serde_json::Value,
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// 按名称查找；别名需要 parent_id 限定在所属 agent 内
    async fn get_resource_by_name(
        &self,
        kind: ResourceKind,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<RemoteResource>, RemoteError>;

    async fn list_resources(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
    ) -> Result<Vec<RemoteResource>, RemoteError>;

    async fn create_resource(
        &self,
        name: &str,
        spec: &ResourceSpec,
    ) -> Result<RemoteResource, RemoteError>;

    async fn delete_resource(
        &self,
        kind: ResourceKind,
        remote_id: &str,
        parent_id: Option<&str>,
    ) -> Result<(), RemoteError>;

    async fn poll_status(
        &self,
        kind: ResourceKind,
        remote_id: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteStatus, RemoteError>;

    async fn associate_collaborator(
        &self,
        supervisor_id: &str,
        association: &CollaboratorAssociation,
    ) -> Result<(), RemoteError>;

    /// 已有的协作者关联（含各自指向的别名 ARN）
    async fn list_collaborators(
        &self,
        supervisor_id: &str,
    ) -> Result<Vec<CollaboratorAssociation>, RemoteError>;

    async fn disassociate_collaborator(
        &self,
        supervisor_id: &str,
        collaborator_name: &str,
    ) -> Result<(), RemoteError>;

    /// 触发 agent 的 prepare 过渡
    async fn prepare(&self, agent_id: &str) -> Result<(), RemoteError>;

    async fn attach_function(
        &self,
        agent_id: &str,
        binding: &FunctionBinding,
    ) -> Result<(), RemoteError>;

    async fn list_function_bindings(&self, agent_id: &str) -> Result<Vec<FunctionBinding>, RemoteError>;

    /// 让已挂载的同名工具组改指向 binding.function_id
    async fn update_function_binding(
        &self,
        agent_id: &str,
        binding: &FunctionBinding,
    ) -> Result<(), RemoteError>;

    async fn list_role_policies(&self, role_id: &str) -> Result<Vec<String>, RemoteError>;

    async fn delete_role_policy(&self, role_id: &str, policy_name: &str)
        -> Result<(), RemoteError>;

    /// 打开调用流；流打开前的拒绝以 RemoteError::Rejected 返回
    async fn invoke(&self, request: &InvokeRequest) -> Result<EventStream, RemoteError>;
}

/// 函数注册表中的函数描述
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInfo {
    #[serde(rename = "id")]
    pub function_id: String,
    pub name: String,
    pub role_name: Option<String>,
    pub status: RemoteStatus,
}

impl FunctionInfo {
    pub fn to_remote(&self) -> RemoteResource {
        RemoteResource {
            kind: ResourceKind::BackingFunction,
            name: self.name.clone(),
            remote_id: self.function_id.clone(),
            status: self.status.clone(),
            parent_id: None,
            arn: None,
            updated_at: None,
        }
    }
}

#[async_trait]
pub trait FunctionRegistry: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<FunctionInfo>, RemoteError>;

    async fn deploy(&self, name: &str, spec: &FunctionSpec) -> Result<FunctionInfo, RemoteError>;

    async fn status(&self, function_id: &str) -> Result<RemoteStatus, RemoteError>;

    /// 允许某个 agent 调用该函数
    async fn authorize_caller(&self, function_id: &str, caller_id: &str)
        -> Result<(), RemoteError>;

    async fn list_callers(&self, function_id: &str) -> Result<Vec<String>, RemoteError>;

    async fn revoke_caller(&self, function_id: &str, caller_id: &str) -> Result<(), RemoteError>;

    async fn delete(&self, function_id: &str) -> Result<(), RemoteError>;
}
