//! HTTP 接口的 JSON 结构与调用流事件解码

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::RemoteError;
use super::sse::SseFrame;
use crate::resource::{RemoteResource, RemoteStatus, ResourceKind};
use crate::stream::{CitationSpan, FileArtifact, ReturnControl, SessionState, StreamEvent, TracePayload};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResource {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub arn: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WireResource {
    pub fn into_remote(self, kind: ResourceKind) -> RemoteResource {
        RemoteResource {
            kind,
            name: self.name,
            remote_id: self.id,
            status: RemoteStatus::new(self.status),
            parent_id: self.parent_id,
            arn: self.arn,
            updated_at: self.updated_at,
        }
    }
}

/// 列表接口的统一包裹
#[derive(Debug, Deserialize)]
pub struct WireList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct WireStatus {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireChunk {
    bytes: String,
    attribution: Option<WireAttribution>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireAttribution {
    citations: Vec<WireCitation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireCitation {
    generated_response_part: WireResponsePart,
    retrieved_references: Vec<WireReference>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireResponsePart {
    text_response_part: WireTextPart,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireTextPart {
    span: WireSpan,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireSpan {
    start: usize,
    end: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireReference {
    location: WireLocation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireLocation {
    s3_location: Option<WireUri>,
    web_location: Option<WireUrl>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireUri {
    uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireUrl {
    url: Option<String>,
}

impl WireCitation {
    fn into_span(self) -> CitationSpan {
        let span = self.generated_response_part.text_response_part.span;
        let source_uri = self.retrieved_references.into_iter().next().and_then(|r| {
            let location = r.location;
            location
                .s3_location
                .and_then(|l| l.uri)
                .or_else(|| location.web_location.and_then(|l| l.url))
        });
        CitationSpan {
            start: span.start,
            end: span.end,
            source_uri,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireFiles {
    files: Vec<WireFile>,
}

#[derive(Debug, Deserialize)]
struct WireFile {
    name: String,
    #[serde(rename = "type")]
    mime_type: String,
    bytes: String,
}

/// 无 event 名称时，data 为 {"chunk": ...} / {"trace": ...} / {"files": ...} / {"returnControl": ...} 形式
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireEnvelope {
    chunk: Option<WireChunk>,
    trace: Option<TracePayload>,
    files: Option<WireFiles>,
    return_control: Option<ReturnControl>,
}

fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, RemoteError> {
    STANDARD
        .decode(value)
        .map_err(|e| RemoteError::Decode(format!("invalid base64 in {}: {}", field, e)))
}

fn chunk_event(chunk: WireChunk) -> Result<StreamEvent, RemoteError> {
    let bytes = decode_base64("chunk", &chunk.bytes)?;
    let citations = chunk
        .attribution
        .map(|a| a.citations.into_iter().map(WireCitation::into_span).collect())
        .unwrap_or_default();
    Ok(StreamEvent::AnswerChunk { bytes, citations })
}

fn file_events(files: WireFiles) -> Result<Vec<StreamEvent>, RemoteError> {
    files
        .files
        .into_iter()
        .map(|f| -> Result<StreamEvent, RemoteError> {
            Ok(StreamEvent::FileArtifact(FileArtifact {
                bytes: decode_base64("file", &f.bytes)?,
                name: f.name,
                mime_type: f.mime_type,
            }))
        })
        .collect()
}

/// 把一帧 SSE 解码为零个或多个流事件；未知事件类型忽略
pub fn decode_frame(frame: &SseFrame) -> Result<Vec<StreamEvent>, RemoteError> {
    match frame.event.as_deref() {
        Some("chunk") => Ok(vec![chunk_event(serde_json::from_str(&frame.data)?)?]),
        Some("trace") => {
            let payload: TracePayload = serde_json::from_str(&frame.data)?;
            Ok(vec![StreamEvent::trace(payload)])
        }
        Some("files") => file_events(serde_json::from_str(&frame.data)?),
        Some("returnControl") => Ok(vec![StreamEvent::ReturnControl(serde_json::from_str(
            &frame.data,
        )?)]),
        Some("error") => Err(RemoteError::Transport(frame.data.clone())),
        Some(other) => {
            tracing::debug!("Ignoring unknown stream event type: {}", other);
            Ok(Vec::new())
        }
        None => {
            let envelope: WireEnvelope = serde_json::from_str(&frame.data)?;
            let mut events = Vec::new();
            if let Some(chunk) = envelope.chunk {
                events.push(chunk_event(chunk)?);
            }
            if let Some(trace) = envelope.trace {
                events.push(StreamEvent::trace(trace));
            }
            if let Some(files) = envelope.files {
                events.extend(file_events(files)?);
            }
            if let Some(control) = envelope.return_control {
                events.push(StreamEvent::ReturnControl(control));
            }
            Ok(events)
        }
    }
}

/// 调用请求体中的 sessionState；文件内容按 base64 内联
pub fn session_state_body(state: &SessionState) -> Value {
    let mut body = json!({});
    if !state.files.is_empty() {
        body["files"] = state
            .files
            .iter()
            .map(|file| {
                json!({
                    "name": file.name,
                    "source": {
                        "sourceType": "BYTE_CONTENT",
                        "byteContent": {
                            "mediaType": file.media_type,
                            "data": STANDARD.encode(&file.bytes),
                        }
                    },
                    "useCase": file.use_case.to_string(),
                })
            })
            .collect();
    }
    if let Some(invocation_id) = &state.invocation_id {
        body["invocationId"] = json!(invocation_id);
    }
    if !state.return_control_results.is_empty() {
        body["returnControlInvocationResults"] = state
            .return_control_results
            .iter()
            .map(|result| {
                json!({
                    "functionResult": {
                        "actionGroup": result.action_group,
                        "function": result.function,
                        "responseBody": {"TEXT": {"body": result.body}},
                    }
                })
            })
            .collect();
    }
    body
}
