//! 资源模型：种类、状态、句柄与创建参数

pub mod handle;
pub mod spec;

pub use handle::{
    RemoteResource, RemoteStatus, ResourceHandle, ResourceKey, ResourceKind, ResourceStatus,
};
pub use spec::{
    AgentSpec, AliasSpec, CollaborationMode, FunctionSpec, ResourceSpec, RoleSpec,
    DEFAULT_IDLE_SESSION_TTL_SECS,
};
