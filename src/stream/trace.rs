//! 追踪事件载荷
//!
//! 字段名与服务端 JSON 保持一致（camelCase），缺失字段一律按空处理。

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TracePayload {
    /// 调用链：第一个为 supervisor，第二个（若有）为当前 sub-agent
    pub caller_chain: Vec<CallerLink>,
    pub collaborator_name: Option<String>,
    pub trace: TraceBody,
}

impl TracePayload {
    /// 调用链第二个节点的 "<agentId>/<aliasId>"，用于归属到 sub-agent
    pub fn sub_agent_alias_key(&self) -> Option<&str> {
        if self.caller_chain.len() < 2 {
            return None;
        }
        let arn = self.caller_chain[1].agent_alias_arn.as_deref()?;
        arn.split_once('/').map(|(_, rest)| rest)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallerLink {
    pub agent_alias_arn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceBody {
    pub routing_classifier_trace: Option<ModelStageTrace>,
    pub orchestration_trace: Option<OrchestrationTrace>,
    pub pre_processing_trace: Option<ModelStageTrace>,
    pub post_processing_trace: Option<ModelStageTrace>,
    pub failure_trace: Option<FailureTrace>,
}

/// 路由、预处理、后处理阶段共用的模型调用记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelStageTrace {
    pub model_invocation_input: Option<Value>,
    pub model_invocation_output: Option<ModelInvocationOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelInvocationOutput {
    pub metadata: Option<InvocationMetadata>,
    pub raw_response: Option<RawResponse>,
}

impl ModelInvocationOutput {
    /// (input_tokens, output_tokens)，缺失按 0
    pub fn tokens(&self) -> (u64, u64) {
        let usage = self.metadata.as_ref().and_then(|m| m.usage.as_ref());
        match usage {
            Some(u) => (u.input_tokens.unwrap_or(0), u.output_tokens.unwrap_or(0)),
            None => (0, 0),
        }
    }

    pub fn raw_content(&self) -> &str {
        self.raw_response
            .as_ref()
            .and_then(|r| r.content.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvocationMetadata {
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawResponse {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestrationTrace {
    pub rationale: Option<TextPart>,
    pub invocation_input: Option<InvocationInput>,
    pub observation: Option<Observation>,
    pub model_invocation_input: Option<Value>,
    pub model_invocation_output: Option<ModelInvocationOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvocationInput {
    pub action_group_invocation_input: Option<ActionGroupInput>,
    pub agent_collaborator_invocation_input: Option<CollaboratorInput>,
    pub code_interpreter_invocation_input: Option<CodeInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionGroupInput {
    pub function: Option<String>,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollaboratorInput {
    pub agent_collaborator_name: String,
    pub agent_collaborator_alias_arn: Option<String>,
    pub input: Option<TextPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeInput {
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Observation {
    pub action_group_invocation_output: Option<TextPart>,
    pub agent_collaborator_invocation_output: Option<CollaboratorOutput>,
    pub final_response: Option<TextPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollaboratorOutput {
    pub agent_collaborator_name: String,
    pub output: Option<TextPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FailureTrace {
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_routing_trace() {
        let payload: TracePayload = serde_json::from_value(json!({
            "callerChain": [{"agentAliasArn": "arn:hive:agent-alias/SUP/AL1"}],
            "trace": {
                "routingClassifierTrace": {
                    "modelInvocationOutput": {
                        "metadata": {"usage": {"inputTokens": 120, "outputTokens": 7}},
                        "rawResponse": {"content": "<a>news_agent</a>"}
                    }
                }
            }
        }))
        .unwrap();

        let routing = payload.trace.routing_classifier_trace.as_ref().unwrap();
        let output = routing.model_invocation_output.as_ref().unwrap();
        assert_eq!(output.tokens(), (120, 7));
        assert_eq!(output.raw_content(), "<a>news_agent</a>");
        assert_eq!(payload.sub_agent_alias_key(), None);
    }

    #[test]
    fn test_sub_agent_alias_key_from_second_link() {
        let payload: TracePayload = serde_json::from_value(json!({
            "callerChain": [
                {"agentAliasArn": "arn:hive:agent-alias/SUP/AL1"},
                {"agentAliasArn": "arn:hive:agent-alias/NEWS/AL2"}
            ],
            "trace": {}
        }))
        .unwrap();
        assert_eq!(payload.sub_agent_alias_key(), Some("NEWS/AL2"));
    }

    #[test]
    fn test_missing_usage_counts_zero() {
        let output = ModelInvocationOutput::default();
        assert_eq!(output.tokens(), (0, 0));
        assert_eq!(output.raw_content(), "");
    }
}
