//! 资源创建参数

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::handle::ResourceKind;

/// 默认的会话空闲超时（秒）
pub const DEFAULT_IDLE_SESSION_TTL_SECS: u64 = 1800;

/// agent 之间的协作模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollaborationMode {
    #[default]
    Disabled,
    Supervisor,
    /// 先由路由分类器直接分派，无法判断时再走 supervisor 编排
    SupervisorRouter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    pub description: String,
    pub instruction: String,
    pub foundation_model: String,
    pub collaboration: CollaborationMode,
    /// 仅在 SupervisorRouter 模式下生效
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_classifier_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    pub idle_session_ttl_secs: u64,
    pub code_interpreter: bool,
}

impl AgentSpec {
    pub fn new(
        description: impl Into<String>,
        instruction: impl Into<String>,
        foundation_model: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            instruction: instruction.into(),
            foundation_model: foundation_model.into(),
            collaboration: CollaborationMode::Disabled,
            routing_classifier_model: None,
            role_name: None,
            idle_session_ttl_secs: DEFAULT_IDLE_SESSION_TTL_SECS,
            code_interpreter: false,
        }
    }

    pub fn with_collaboration(mut self, mode: CollaborationMode) -> Self {
        self.collaboration = mode;
        self
    }

    pub fn with_routing_model(mut self, model: impl Into<String>) -> Self {
        self.routing_classifier_model = Some(model.into());
        self
    }

    pub fn with_role(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = Some(role_name.into());
        self
    }

    pub fn with_code_interpreter(mut self, enabled: bool) -> Self {
        self.code_interpreter = enabled;
        self
    }
}

/// 别名名称只在所属 agent 内唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasSpec {
    pub agent_id: String,
}

/// 后端函数（agent 的工具实现）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    /// 打包后的函数代码
    pub code: Vec<u8>,
    pub handler: String,
    pub runtime: String,
    pub timeout_secs: u64,
    pub env: BTreeMap<String, String>,
    pub role_name: Option<String>,
}

impl FunctionSpec {
    pub fn new(code: Vec<u8>, handler: impl Into<String>) -> Self {
        Self {
            code,
            handler: handler.into(),
            runtime: "python3.12".to_string(),
            timeout_secs: 180,
            env: BTreeMap::new(),
            role_name: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_role(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = Some(role_name.into());
        self
    }
}

/// 执行角色：信任策略 + 内联策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    pub trust_policy: Value,
    pub inline_policies: BTreeMap<String, Value>,
}

impl RoleSpec {
    /// 允许指定服务主体扮演的角色
    pub fn assumable_by(service: &str) -> Self {
        Self {
            trust_policy: json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": service },
                    "Action": "sts:AssumeRole"
                }]
            }),
            inline_policies: BTreeMap::new(),
        }
    }

    /// agent 执行角色：允许调用基础模型
    pub fn agent_execution() -> Self {
        Self::assumable_by("agents.hive.internal").with_policy(
            "invoke_models",
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Action": ["model:Invoke", "model:InvokeStream"],
                    "Resource": "*"
                }]
            }),
        )
    }

    /// 后端函数执行角色：允许写日志
    pub fn function_execution() -> Self {
        Self::assumable_by("functions.hive.internal").with_policy(
            "write_logs",
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Action": ["logs:CreateLogStream", "logs:PutLogEvents"],
                    "Resource": "*"
                }]
            }),
        )
    }

    pub fn with_policy(mut self, name: impl Into<String>, document: Value) -> Self {
        self.inline_policies.insert(name.into(), document);
        self
    }
}

/// ensure 的输入，按 kind 区分
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    Agent(AgentSpec),
    Alias(AliasSpec),
    BackingFunction(FunctionSpec),
    Role(RoleSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Agent(_) => ResourceKind::Agent,
            ResourceSpec::Alias(_) => ResourceKind::Alias,
            ResourceSpec::BackingFunction(_) => ResourceKind::BackingFunction,
            ResourceSpec::Role(_) => ResourceKind::Role,
        }
    }

    /// 查询与删除时使用的父资源 id（目前只有别名有）
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            ResourceSpec::Alias(alias) => Some(alias.agent_id.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_kind_and_parent() {
        let alias = ResourceSpec::Alias(AliasSpec {
            agent_id: "AG1".to_string(),
        });
        assert_eq!(alias.kind(), ResourceKind::Alias);
        assert_eq!(alias.parent_id(), Some("AG1"));

        let role = ResourceSpec::Role(RoleSpec::agent_execution());
        assert_eq!(role.kind(), ResourceKind::Role);
        assert_eq!(role.parent_id(), None);
    }

    #[test]
    fn test_agent_spec_serializes_camel_case() {
        let spec = AgentSpec::new("desc", "inst", "model-a")
            .with_collaboration(CollaborationMode::SupervisorRouter)
            .with_routing_model("model-b");
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["collaboration"], "SUPERVISOR_ROUTER");
        assert_eq!(value["routingClassifierModel"], "model-b");
        assert_eq!(value["idleSessionTtlSecs"], 1800);
        assert!(value.get("roleName").is_none());
    }
}
