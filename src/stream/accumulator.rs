//! 追踪累加器：按事件到达顺序累计 token、LLM 调用次数、两级步骤编号与当前 sub-agent
//!
//! 步骤编号：supervisor 层的编排步骤为 "N"，委派给 sub-agent 的步骤为 "N.M"。
//! 归属依据调用链第二个节点的别名 ARN，在协作者名称表中查不到时记为 UNKNOWN_COLLABORATOR。

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::trace::{ModelInvocationOutput, ModelStageTrace, OrchestrationTrace, TracePayload};
use crate::remote::ArtifactKey;

/// 工具与协作者输出在展示时的截断长度
pub const DEFAULT_TRACE_TRUNCATION: usize = 300;

/// 调用链中出现但不在名称表里的 sub-agent
pub const UNKNOWN_COLLABORATOR: &str = "<unknown-collaborator>";

/// 路由分类器无法决定时的输出
pub const ROUTING_UNDECIDABLE: &str = "undecidable";
/// 路由分类器要求沿用上一个 sub-agent 时的输出
pub const ROUTING_KEEP_PREVIOUS: &str = "keep_previous_agent";

/// 追踪日志详细程度，只影响日志，不影响统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    None,
    /// 每个步骤一行
    #[default]
    Outline,
    /// 附带推理过程与工具输入输出
    Core,
    /// 附带完整载荷
    All,
}

/// 两级步骤编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepLabel {
    pub step: u32,
    pub sub_step: Option<u32>,
}

impl fmt::Display for StepLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub_step {
            Some(sub) => write!(f, "{}.{}", self.step, sub),
            None => write!(f, "{}", self.step),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Routing,
    Orchestration,
}

/// 一次模型调用对应的步骤记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub label: StepLabel,
    pub kind: StepKind,
    pub sub_agent: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration: Duration,
}

/// 路由分类结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RoutingDecision {
    Undecidable,
    KeepPrevious,
    Collaborator(String),
}

impl RoutingDecision {
    /// 解析分类器输出，去掉 <a></a> 包裹
    pub fn parse(raw: &str) -> Self {
        let cleaned = raw.replace("<a>", "").replace("</a>", "");
        let cleaned = cleaned.trim();
        match cleaned {
            ROUTING_UNDECIDABLE => RoutingDecision::Undecidable,
            ROUTING_KEEP_PREVIOUS => RoutingDecision::KeepPrevious,
            name => RoutingDecision::Collaborator(name.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ToolInput,
    ToolOutput,
    CollaboratorInput,
    CollaboratorOutput,
    CodeInterpreter,
    FinalResponse,
}

/// 工具 / 协作者活动，detail 已按截断长度截断
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolActivity {
    pub label: StepLabel,
    pub kind: ActivityKind,
    pub target: String,
    pub detail: String,
}

/// 一次调用结束时的遥测记录
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Telemetry {
    pub llm_calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub steps: Vec<StepRecord>,
    pub routing: Vec<RoutingDecision>,
    pub activities: Vec<ToolActivity>,
    /// failure trace 中的原因，非致命
    pub failures: Vec<String>,
    pub artifacts: Vec<ArtifactKey>,
    pub warnings: Vec<String>,
    pub duration: Duration,
}

impl Telemetry {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Agent made a total of {} LLM calls, using {} tokens (in: {}, out: {}), and took {:.1} total seconds",
            self.llm_calls,
            self.total_tokens(),
            self.input_tokens,
            self.output_tokens,
            self.duration.as_secs_f64()
        )
    }
}

/// 截断展示文本
pub fn truncate_display(text: &str, max_chars: usize) -> String {
    let preview: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        format!("{}...", preview)
    } else {
        preview
    }
}

pub struct TraceAccumulator {
    collaborator_names: HashMap<String, String>,
    level: TraceLevel,
    truncation: usize,
    step: u32,
    sub_step: u32,
    active_sub_agent: Option<String>,
    started: Instant,
    step_started: Instant,
    telemetry: Telemetry,
}

impl TraceAccumulator {
    /// collaborator_names: "<agentId>/<aliasId>" -> 协作者名称
    pub fn new(collaborator_names: HashMap<String, String>) -> Self {
        let now = Instant::now();
        Self {
            collaborator_names,
            level: TraceLevel::default(),
            truncation: DEFAULT_TRACE_TRUNCATION,
            step: 0,
            sub_step: 0,
            active_sub_agent: None,
            started: now,
            step_started: now,
            telemetry: Telemetry::default(),
        }
    }

    pub fn with_level(mut self, level: TraceLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_truncation(mut self, max_chars: usize) -> Self {
        self.truncation = max_chars;
        self
    }

    pub fn active_sub_agent(&self) -> Option<&str> {
        self.active_sub_agent.as_deref()
    }

    pub fn current_label(&self) -> StepLabel {
        StepLabel {
            step: self.step,
            sub_step: (self.sub_step > 0).then_some(self.sub_step),
        }
    }

    /// 处理一个追踪事件
    pub fn observe(&mut self, payload: &TracePayload) {
        if self.level >= TraceLevel::All {
            if let Ok(json) = serde_json::to_string(payload) {
                tracing::debug!("Trace payload: {}", json);
            }
        }

        let delegated = match payload.sub_agent_alias_key() {
            Some(key) => {
                let name = self
                    .collaborator_names
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_COLLABORATOR.to_string());
                self.active_sub_agent = Some(name);
                true
            }
            None => false,
        };

        let body = &payload.trace;
        if let Some(routing) = &body.routing_classifier_trace {
            self.observe_routing(routing);
        }
        if let Some(failure) = &body.failure_trace {
            let reason = failure
                .failure_reason
                .clone()
                .unwrap_or_else(|| "unspecified failure".to_string());
            tracing::warn!("Agent reported failure trace: {}", reason);
            self.telemetry.failures.push(reason);
        }
        if let Some(orchestration) = &body.orchestration_trace {
            self.observe_orchestration(orchestration, delegated);
        } else if let Some(pre) = &body.pre_processing_trace {
            self.observe_processing("Pre-processing", pre);
        } else if let Some(post) = &body.post_processing_trace {
            self.observe_processing("Post-processing", post);
        }
    }

    fn observe_routing(&mut self, routing: &ModelStageTrace) {
        if routing.model_invocation_input.is_some() {
            self.step += 1;
            self.sub_step = 0;
            self.step_started = Instant::now();
            if self.level >= TraceLevel::Outline {
                tracing::info!("Step {}: routing classifier", self.step);
            }
        }
        if let Some(output) = &routing.model_invocation_output {
            let decision = RoutingDecision::parse(output.raw_content());
            match &decision {
                RoutingDecision::Collaborator(name) => {
                    self.active_sub_agent = Some(name.clone());
                    if self.level >= TraceLevel::Outline {
                        tracing::info!("Routing classifier chose collaborator: {}", name);
                    }
                }
                RoutingDecision::Undecidable => {
                    tracing::debug!("Routing classifier undecidable, falling back to supervisor");
                }
                RoutingDecision::KeepPrevious => {
                    tracing::debug!("Routing classifier kept previous collaborator");
                }
            }
            self.telemetry.routing.push(decision);
            self.record_model_call(StepKind::Routing, output);
        }
    }

    fn observe_orchestration(&mut self, orchestration: &OrchestrationTrace, delegated: bool) {
        if let Some(rationale) = &orchestration.rationale {
            if self.level >= TraceLevel::Core {
                tracing::info!(
                    "[{}] Rationale: {}",
                    self.current_label(),
                    truncate_display(&rationale.text, self.truncation)
                );
            }
        }

        if let Some(input) = &orchestration.invocation_input {
            if let Some(tool) = &input.action_group_invocation_input {
                let params = tool
                    .parameters
                    .iter()
                    .map(|p| format!("{}={}", p.name, p.value))
                    .collect::<Vec<_>>()
                    .join(", ");
                let target = tool.function.clone().unwrap_or_default();
                self.record_activity(ActivityKind::ToolInput, target, &params);
            }
            if let Some(collab) = &input.agent_collaborator_invocation_input {
                self.active_sub_agent = Some(collab.agent_collaborator_name.clone());
                let text = collab
                    .input
                    .as_ref()
                    .map(|t| t.text.as_str())
                    .unwrap_or("");
                self.record_activity(
                    ActivityKind::CollaboratorInput,
                    collab.agent_collaborator_name.clone(),
                    text,
                );
            }
            if let Some(code) = &input.code_interpreter_invocation_input {
                self.record_activity(
                    ActivityKind::CodeInterpreter,
                    "code_interpreter".to_string(),
                    &code.code,
                );
            }
        }

        if let Some(observation) = &orchestration.observation {
            if let Some(output) = &observation.action_group_invocation_output {
                self.record_activity(ActivityKind::ToolOutput, String::new(), &output.text);
            }
            if let Some(collab) = &observation.agent_collaborator_invocation_output {
                let text = collab
                    .output
                    .as_ref()
                    .map(|t| t.text.as_str())
                    .unwrap_or("");
                self.record_activity(
                    ActivityKind::CollaboratorOutput,
                    collab.agent_collaborator_name.clone(),
                    text,
                );
            }
            if let Some(final_response) = &observation.final_response {
                self.record_activity(
                    ActivityKind::FinalResponse,
                    String::new(),
                    &final_response.text,
                );
            }
        }

        if let Some(output) = &orchestration.model_invocation_output {
            if delegated {
                self.sub_step += 1;
            } else {
                self.step += 1;
                self.sub_step = 0;
            }
            self.record_model_call(StepKind::Orchestration, output);
        }
    }

    fn observe_processing(&mut self, stage: &str, trace: &ModelStageTrace) {
        if let Some(output) = &trace.model_invocation_output {
            let (input_tokens, output_tokens) = output.tokens();
            self.telemetry.llm_calls += 1;
            self.telemetry.input_tokens += input_tokens;
            self.telemetry.output_tokens += output_tokens;
            if self.level >= TraceLevel::Core {
                tracing::info!(
                    "{} used {} input and {} output tokens",
                    stage,
                    input_tokens,
                    output_tokens
                );
            }
        }
    }

    fn record_model_call(&mut self, kind: StepKind, output: &ModelInvocationOutput) {
        let (input_tokens, output_tokens) = output.tokens();
        let now = Instant::now();
        let duration = now.duration_since(self.step_started);
        self.step_started = now;

        self.telemetry.llm_calls += 1;
        self.telemetry.input_tokens += input_tokens;
        self.telemetry.output_tokens += output_tokens;

        let label = self.current_label();
        let sub_agent = match kind {
            StepKind::Orchestration if label.sub_step.is_some() => self.active_sub_agent.clone(),
            _ => None,
        };
        if self.level >= TraceLevel::Outline {
            tracing::info!(
                "Step {}{}: {} input / {} output tokens, {:.1}s",
                label,
                sub_agent
                    .as_deref()
                    .map(|s| format!(" ({})", s))
                    .unwrap_or_default(),
                input_tokens,
                output_tokens,
                duration.as_secs_f64()
            );
        }
        self.telemetry.steps.push(StepRecord {
            label,
            kind,
            sub_agent,
            input_tokens,
            output_tokens,
            duration,
        });
    }

    fn record_activity(&mut self, kind: ActivityKind, target: String, text: &str) {
        let detail = truncate_display(text, self.truncation);
        let label = self.current_label();
        if self.level >= TraceLevel::Core {
            tracing::info!("[{}] {:?} {}: {}", label, kind, target, detail);
        }
        self.telemetry.activities.push(ToolActivity {
            label,
            kind,
            target,
            detail,
        });
    }

    pub fn record_artifact(&mut self, key: ArtifactKey) {
        self.telemetry.artifacts.push(key);
    }

    pub fn record_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::warn!("{}", warning);
        self.telemetry.warnings.push(warning);
    }

    /// 当前累计结果（用于流中断时的部分结果）
    pub fn snapshot(&self) -> Telemetry {
        let mut telemetry = self.telemetry.clone();
        telemetry.duration = self.started.elapsed();
        telemetry
    }

    pub fn finish(self) -> Telemetry {
        let mut telemetry = self.telemetry;
        telemetry.duration = self.started.elapsed();
        telemetry
    }
}
