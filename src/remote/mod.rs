//! 远端边界：控制面 / 函数注册表 trait、HTTP 与内存实现、产物存放

pub mod error;
pub mod http;
pub mod mock;
pub mod sink;
pub mod sse;
pub mod traits;
pub mod wire;

pub use error::RemoteError;
pub use http::{HttpControlPlane, HttpFunctionRegistry, HttpTransport};
pub use mock::{CallLog, MockCall, MockControlPlane, MockFunctionRegistry};
pub use sink::{ArtifactKey, ArtifactSink, FsSink, MemorySink, NoopPreview, PreviewHook, SinkError};
pub use traits::{
    CollaboratorAssociation, ControlPlane, EventStream, FunctionBinding, FunctionInfo,
    FunctionRegistry, InvokeRequest,
};
