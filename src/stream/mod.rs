//! 流式调用：事件、追踪载荷、引用重建、追踪累加与消费者

pub mod accumulator;
pub mod citation;
pub mod consumer;
pub mod control;
pub mod events;
pub mod session;
pub mod state;
pub mod trace;

pub use accumulator::{
    ActivityKind, RoutingDecision, StepKind, StepLabel, StepRecord, Telemetry, ToolActivity,
    TraceAccumulator, TraceLevel, UNKNOWN_COLLABORATOR,
};
pub use citation::{reconstruct, reconstruct_detailed, strip_markers, Reconstruction};
pub use consumer::{
    InvocationOutcome, InvocationTarget, StreamConsumer, StreamOptions, MAX_RETURN_CONTROL_ROUNDS,
};
pub use control::{
    FunctionInvocation, InvocationParameter, ReturnControl, ReturnControlHandler,
    ReturnControlResult,
};
pub use events::{CitationSpan, FileArtifact, StreamEvent};
pub use session::{InvocationSession, Turn};
pub use state::{FileUseCase, SessionFile, SessionState};
pub use trace::TracePayload;
