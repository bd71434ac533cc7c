//! 调用流中的事件

use serde::Serialize;

use super::control::ReturnControl;
use super::trace::TracePayload;

/// 答案片段中的一条引用：span 为清洗前文本中的字符区间
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationSpan {
    pub start: usize,
    pub end: usize,
    pub source_uri: Option<String>,
}

impl CitationSpan {
    pub fn new(start: usize, end: usize, source_uri: impl Into<String>) -> Self {
        Self {
            start,
            end,
            source_uri: Some(source_uri.into()),
        }
    }
}

/// agent 在调用过程中产出的文件（如代码解释器生成的图表）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileArtifact {
    /// 需要触发预览钩子的图片类型
    pub fn is_previewable_image(&self) -> bool {
        matches!(self.mime_type.as_str(), "image/png" | "image/jpeg")
    }
}

/// 流式调用产出的事件，按到达顺序处理
#[derive(Debug, Clone)]
pub enum StreamEvent {
    AnswerChunk {
        bytes: Vec<u8>,
        citations: Vec<CitationSpan>,
    },
    Trace(Box<TracePayload>),
    FileArtifact(FileArtifact),
    /// agent 把函数调用交还给客户端，本次调用到此结束
    ReturnControl(ReturnControl),
}

impl StreamEvent {
    pub fn answer(text: impl Into<String>) -> Self {
        StreamEvent::AnswerChunk {
            bytes: text.into().into_bytes(),
            citations: Vec::new(),
        }
    }

    pub fn cited_answer(text: impl Into<String>, citations: Vec<CitationSpan>) -> Self {
        StreamEvent::AnswerChunk {
            bytes: text.into().into_bytes(),
            citations,
        }
    }

    pub fn trace(payload: TracePayload) -> Self {
        StreamEvent::Trace(Box::new(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_previewable_images() {
        let mut artifact = FileArtifact {
            name: "chart.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        };
        assert!(artifact.is_previewable_image());
        artifact.mime_type = "image/jpeg".to_string();
        assert!(artifact.is_previewable_image());
        artifact.mime_type = "text/csv".to_string();
        assert!(!artifact.is_previewable_image());
    }
}
