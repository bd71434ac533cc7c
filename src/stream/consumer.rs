//! 流式调用消费者
//!
//! 一次调用对应一条流：答案片段以最后一个为准（替换而非拼接），
//! 追踪事件交给 TraceAccumulator，文件产物写入 ArtifactSink。
//! 流中断时返回 StreamInterrupted 并附带已累积的部分结果，不在本地重试。
//!
//! agent 交还函数调用（return of control）时本次调用以 `return_control` 结束，
//! 调用方执行函数后用 [`StreamConsumer::return_control`] 回传结果；
//! [`StreamConsumer::invoke_with_tools`] 把这一往返交给 [`ReturnControlHandler`] 自动完成。

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::accumulator::{Telemetry, TraceAccumulator, TraceLevel, DEFAULT_TRACE_TRUNCATION};
use super::citation::reconstruct_detailed;
use super::control::{ReturnControl, ReturnControlHandler, ReturnControlResult};
use super::events::{FileArtifact, StreamEvent};
use super::session::InvocationSession;
use super::state::SessionState;
use crate::config::StreamSection;
use crate::core::HiveError;
use crate::remote::{ArtifactKey, ArtifactSink, ControlPlane, InvokeRequest, NoopPreview, PreviewHook, RemoteError};

/// 调用目标：supervisor 的 agent / alias，以及协作者别名到名称的映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationTarget {
    pub agent_id: String,
    pub alias_id: String,
    /// "<agentId>/<aliasId>" -> 协作者名称
    pub collaborator_names: HashMap<String, String>,
}

/// invoke_with_tools 最多回传结果的轮数
pub const MAX_RETURN_CONTROL_ROUNDS: usize = 5;

/// 一次调用的结果
#[derive(Debug, Clone, Default)]
pub struct InvocationOutcome {
    pub answer: String,
    pub telemetry: Telemetry,
    /// 为 Some 时 agent 在等待客户端执行这些函数调用
    pub return_control: Option<ReturnControl>,
}

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub enable_trace: bool,
    pub trace_level: TraceLevel,
    pub trace_truncation: usize,
    pub end_session: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            enable_trace: true,
            trace_level: TraceLevel::Outline,
            trace_truncation: DEFAULT_TRACE_TRUNCATION,
            end_session: false,
        }
    }
}

impl From<&StreamSection> for StreamOptions {
    fn from(section: &StreamSection) -> Self {
        Self {
            enable_trace: section.enable_trace,
            trace_level: section.trace_level,
            trace_truncation: section.trace_truncation,
            end_session: section.end_session,
        }
    }
}

pub struct StreamConsumer {
    control: Arc<dyn ControlPlane>,
    sink: Arc<dyn ArtifactSink>,
    preview: Arc<dyn PreviewHook>,
    options: StreamOptions,
    cancel: CancellationToken,
}

impl StreamConsumer {
    pub fn new(control: Arc<dyn ControlPlane>, sink: Arc<dyn ArtifactSink>, options: StreamOptions) -> Self {
        Self {
            control,
            sink,
            preview: Arc::new(NoopPreview),
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_preview(mut self, preview: Arc<dyn PreviewHook>) -> Self {
        self.preview = preview;
        self
    }

    /// 取消时中断当前流，返回 StreamInterrupted
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// 发起一次调用并消费整条流
    pub async fn invoke(
        &self,
        target: &InvocationTarget,
        input_text: &str,
        session: &mut InvocationSession,
    ) -> Result<InvocationOutcome, HiveError> {
        self.stream_invocation(target, input_text, SessionState::default(), input_text, session)
            .await
    }

    /// 携带 session state（输入文件等）发起调用
    pub async fn invoke_with_state(
        &self,
        target: &InvocationTarget,
        input_text: &str,
        state: SessionState,
        session: &mut InvocationSession,
    ) -> Result<InvocationOutcome, HiveError> {
        self.stream_invocation(target, input_text, state, input_text, session)
            .await
    }

    /// 回传客户端执行交还函数的结果，agent 据此继续
    pub async fn return_control(
        &self,
        target: &InvocationTarget,
        control: &ReturnControl,
        results: Vec<ReturnControlResult>,
        session: &mut InvocationSession,
    ) -> Result<InvocationOutcome, HiveError> {
        let state = SessionState::returning(control, results);
        self.stream_invocation(target, "", state, "", session).await
    }

    /// 调用并在本地执行 agent 交还的函数，直到得到最终答案
    ///
    /// 超过 [`MAX_RETURN_CONTROL_ROUNDS`] 轮仍在交还时停止，返回的结果里保留未处理的 return_control。
    pub async fn invoke_with_tools(
        &self,
        target: &InvocationTarget,
        input_text: &str,
        state: SessionState,
        handler: &dyn ReturnControlHandler,
        session: &mut InvocationSession,
    ) -> Result<InvocationOutcome, HiveError> {
        let mut outcome = self
            .stream_invocation(target, input_text, state, input_text, session)
            .await?;
        let mut rounds = 0;
        while let Some(control) = outcome.return_control.take() {
            if rounds == MAX_RETURN_CONTROL_ROUNDS {
                tracing::warn!(
                    "Agent still returning control after {} rounds, leaving invocation {} pending",
                    rounds,
                    control.invocation_id
                );
                outcome.return_control = Some(control);
                break;
            }
            rounds += 1;

            let mut results = Vec::with_capacity(control.invocation_inputs.len());
            for invocation in &control.invocation_inputs {
                tracing::info!(
                    "Running returned function {}.{}",
                    invocation.action_group,
                    invocation.function
                );
                let body = handler.call(invocation).await?;
                results.push(ReturnControlResult::for_invocation(invocation, body));
            }
            let state = SessionState::returning(&control, results);
            outcome = self
                .stream_invocation(target, "", state, input_text, session)
                .await?;
        }
        Ok(outcome)
    }

    /// turn_input 是记入会话的用户输入；回传结果的后续调用沿用原始问题
    async fn stream_invocation(
        &self,
        target: &InvocationTarget,
        input_text: &str,
        state: SessionState,
        turn_input: &str,
        session: &mut InvocationSession,
    ) -> Result<InvocationOutcome, HiveError> {
        let request = InvokeRequest {
            agent_id: target.agent_id.clone(),
            alias_id: target.alias_id.clone(),
            session_id: session.session_id().to_string(),
            input_text: input_text.to_string(),
            enable_trace: self.options.enable_trace,
            end_session: self.options.end_session,
            session_state: (!state.is_empty()).then_some(state),
        };

        tracing::info!(
            "Invoking agent {} (alias {}) in session {}",
            request.agent_id,
            request.alias_id,
            request.session_id
        );

        let mut stream = match self.control.invoke(&request).await {
            Ok(stream) => stream,
            Err(RemoteError::Rejected { status, body }) => {
                tracing::warn!("Invocation rejected with status {}: {}", status, body);
                return Err(HiveError::InvocationRejected { status, body });
            }
            Err(e) => return Err(HiveError::Remote(e)),
        };

        let mut accumulator = TraceAccumulator::new(target.collaborator_names.clone())
            .with_level(self.options.trace_level)
            .with_truncation(self.options.trace_truncation);
        let mut answer = String::new();
        let mut pending = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(interrupted("invocation cancelled".to_string(), answer, &accumulator));
                }
                next = stream.next() => next,
            };

            match next {
                None => break,
                Some(Ok(event)) => {
                    self.apply(event, &mut answer, &mut pending, &mut accumulator, session.session_id())
                        .await;
                }
                Some(Err(e)) => {
                    tracing::warn!("Stream interrupted: {}", e);
                    return Err(interrupted(e.to_string(), answer, &accumulator));
                }
            }
        }

        let telemetry = accumulator.finish();
        if self.options.trace_level > TraceLevel::None {
            tracing::info!("{}", telemetry.summary_line());
        }
        if pending.is_none() {
            session.push_turn(turn_input, &answer, telemetry.clone());
        }

        Ok(InvocationOutcome {
            answer,
            telemetry,
            return_control: pending,
        })
    }

    async fn apply(
        &self,
        event: StreamEvent,
        answer: &mut String,
        pending: &mut Option<ReturnControl>,
        accumulator: &mut TraceAccumulator,
        session_id: &str,
    ) {
        match event {
            StreamEvent::AnswerChunk { bytes, citations } => {
                let text = String::from_utf8_lossy(&bytes);
                let rebuilt = reconstruct_detailed(&text, &citations);
                if let Some(reason) = rebuilt.skipped {
                    accumulator
                        .record_warning(HiveError::CitationReconstructionSkipped(reason).to_string());
                }
                *answer = rebuilt.text;
            }
            StreamEvent::Trace(payload) => accumulator.observe(&payload),
            StreamEvent::FileArtifact(artifact) => {
                self.store_artifact(&artifact, accumulator, session_id).await;
            }
            StreamEvent::ReturnControl(control) => {
                tracing::info!(
                    "Agent returned control for {} function call(s) (invocation {})",
                    control.invocation_inputs.len(),
                    control.invocation_id
                );
                *pending = Some(control);
            }
        }
    }

    /// 写入失败只记为警告，不中断流
    async fn store_artifact(
        &self,
        artifact: &FileArtifact,
        accumulator: &mut TraceAccumulator,
        session_id: &str,
    ) {
        let key = ArtifactKey::new(session_id, artifact.name.clone());
        match self.sink.put(&key, &artifact.bytes).await {
            Ok(()) => accumulator.record_artifact(key),
            Err(e) => {
                accumulator.record_warning(HiveError::Sink(e).to_string());
            }
        }
        if artifact.is_previewable_image() {
            self.preview.preview(artifact);
        }
    }
}

fn interrupted(reason: String, answer: String, accumulator: &TraceAccumulator) -> HiveError {
    HiveError::StreamInterrupted {
        reason,
        partial: Box::new(InvocationOutcome {
            answer,
            telemetry: accumulator.snapshot(),
            return_control: None,
        }),
    }
}
