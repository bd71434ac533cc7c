//! Return of control：agent 不调用后端函数，而是把函数调用交还给客户端执行，
//! 客户端再以 session state 携带执行结果发起一次后续调用。

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::HiveError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationParameter {
    pub name: String,
    #[serde(default, rename = "type")]
    pub param_type: Option<String>,
    #[serde(default)]
    pub value: String,
}

/// 交还给客户端的一次函数调用
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInvocation {
    pub action_group: String,
    pub function: String,
    #[serde(default)]
    pub parameters: Vec<InvocationParameter>,
}

impl FunctionInvocation {
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInvocationInput {
    function_invocation_input: Option<FunctionInvocation>,
}

/// 流中的 returnControl 事件
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnControl {
    pub invocation_id: String,
    #[serde(default, deserialize_with = "function_inputs")]
    pub invocation_inputs: Vec<FunctionInvocation>,
}

/// 只保留函数调用类输入，其他类型（如 API schema 调用）忽略
fn function_inputs<'de, D>(deserializer: D) -> Result<Vec<FunctionInvocation>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let inputs = Vec::<WireInvocationInput>::deserialize(deserializer)?;
    Ok(inputs
        .into_iter()
        .filter_map(|i| i.function_invocation_input)
        .collect())
}

/// 客户端执行函数后回传的结果（以文本形式）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnControlResult {
    pub action_group: String,
    pub function: String,
    pub body: String,
}

impl ReturnControlResult {
    pub fn for_invocation(invocation: &FunctionInvocation, body: impl Into<String>) -> Self {
        Self {
            action_group: invocation.action_group.clone(),
            function: invocation.function.clone(),
            body: body.into(),
        }
    }
}

/// 本地执行交还的函数调用
#[async_trait]
pub trait ReturnControlHandler: Send + Sync {
    async fn call(&self, invocation: &FunctionInvocation) -> Result<String, HiveError>;
}
