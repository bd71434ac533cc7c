//! 随调用发送的 session state：输入文件（供代码解释器或对话使用）与 return-of-control 结果

use std::fmt;

use crate::remote::{ArtifactKey, ArtifactSink, SinkError};

use super::control::{ReturnControl, ReturnControlResult};

const XLSX_MEDIA_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileUseCase {
    #[default]
    CodeInterpreter,
    Chat,
}

impl fmt::Display for FileUseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileUseCase::CodeInterpreter => write!(f, "CODE_INTERPRETER"),
            FileUseCase::Chat => write!(f, "CHAT"),
        }
    }
}

/// 以字节内容内联发送的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
    pub use_case: FileUseCase,
}

impl SessionFile {
    /// 名称取路径最后一段，媒体类型按扩展名推断（csv / xls / xlsx，其余按纯文本）
    pub fn new(path: &str, bytes: Vec<u8>, use_case: FileUseCase) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let media_type = match extension.as_str() {
            "csv" => "text/csv",
            "xls" | "xlsx" => XLSX_MEDIA_TYPE,
            _ => "text/plain",
        };
        Self {
            name,
            media_type: media_type.to_string(),
            bytes,
            use_case,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub files: Vec<SessionFile>,
    /// 回传 return-of-control 结果时对应的 invocationId
    pub invocation_id: Option<String>,
    pub return_control_results: Vec<ReturnControlResult>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, file: SessionFile) -> Self {
        self.files.push(file);
        self
    }

    /// 从产物存放中取出先前保存的文件（如上一轮生成的 csv）附加到本次调用
    pub async fn attach_from_sink(
        &mut self,
        sink: &dyn ArtifactSink,
        key: &ArtifactKey,
        use_case: FileUseCase,
    ) -> Result<(), SinkError> {
        let bytes = sink.get(key).await?;
        tracing::debug!("Attaching {} ({} bytes) as {}", key, bytes.len(), use_case);
        self.files.push(SessionFile::new(&key.file_name, bytes, use_case));
        Ok(())
    }

    /// 回传一次 return-of-control 的执行结果
    pub fn returning(control: &ReturnControl, results: Vec<ReturnControlResult>) -> Self {
        Self {
            files: Vec::new(),
            invocation_id: Some(control.invocation_id.clone()),
            return_control_results: results,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.invocation_id.is_none() && self.return_control_results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemorySink;

    #[test]
    fn test_media_type_from_extension() {
        let csv = SessionFile::new("data/customers.csv", b"a,b".to_vec(), FileUseCase::CodeInterpreter);
        assert_eq!(csv.name, "customers.csv");
        assert_eq!(csv.media_type, "text/csv");

        let sheet = SessionFile::new("report.XLSX", Vec::new(), FileUseCase::Chat);
        assert_eq!(sheet.media_type, XLSX_MEDIA_TYPE);

        let notes = SessionFile::new("notes", Vec::new(), FileUseCase::Chat);
        assert_eq!(notes.media_type, "text/plain");
    }

    #[tokio::test]
    async fn test_attach_from_sink() {
        let sink = MemorySink::new();
        let key = ArtifactKey::new("s1", "usage.csv");
        sink.put(&key, b"month,kwh\nmay,320\n").await.unwrap();

        let mut state = SessionState::new();
        state
            .attach_from_sink(&sink, &key, FileUseCase::CodeInterpreter)
            .await
            .unwrap();
        assert_eq!(state.files[0].name, "usage.csv");
        assert_eq!(state.files[0].bytes, b"month,kwh\nmay,320\n".to_vec());

        let missing = state
            .attach_from_sink(&sink, &ArtifactKey::new("s1", "nope.csv"), FileUseCase::Chat)
            .await;
        assert!(matches!(missing, Err(SinkError::NotFound(_))));
    }
}
