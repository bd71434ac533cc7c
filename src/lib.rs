//! Hive - 托管多 agent 服务的客户端编排层
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类与优雅关闭
//! - **lifecycle**: 远端资源的 create-or-reuse、轮询、重试与尽力删除
//! - **observability**: tracing 初始化
//! - **remote**: 控制面 / 函数注册表抽象，HTTP 与内存实现，产物存放
//! - **resource**: 资源种类、句柄与创建参数
//! - **stream**: 调用流消费、引用重建、追踪累加
//! - **topology**: supervisor + 协作者拓扑的定义与构建

pub mod config;
pub mod core;
pub mod lifecycle;
pub mod observability;
pub mod remote;
pub mod resource;
pub mod stream;
pub mod topology;

pub use crate::core::HiveError;
pub use lifecycle::{LifecycleConfig, LifecycleManager};
pub use stream::{InvocationOutcome, StreamConsumer};
pub use topology::{AgentGraphBuilder, AgentTopology};
