//! 调用产物的存放位置（文件系统 / 内存），以及图片预览钩子

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::stream::FileArtifact;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),
}

/// 产物按 (会话, 文件名) 定位
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArtifactKey {
    pub session_id: String,
    pub file_name: String,
}

impl ArtifactKey {
    pub fn new(session_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            file_name: file_name.into(),
        }
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.session_id, self.file_name)
    }
}

#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn put(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<(), SinkError>;

    async fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>, SinkError>;
}

/// 单个路径段只能是普通文件名，拒绝 ".."、绝对路径与多级路径
fn safe_segment(segment: &str) -> Result<&str, SinkError> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(segment),
        _ => Err(SinkError::PathEscape(segment.to_string())),
    }
}

/// 写入 `<root>/<session_id>/<file_name>`
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &ArtifactKey) -> Result<PathBuf, SinkError> {
        let session = safe_segment(&key.session_id)?;
        let file = safe_segment(&key.file_name)?;
        Ok(self.root.join(session).join(file))
    }
}

#[async_trait]
impl ArtifactSink for FsSink {
    async fn put(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<(), SinkError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::info!("Saved artifact {} to {}", key, path.display());
        Ok(())
    }

    async fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>, SinkError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SinkError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// 测试与一次性调用用的内存存放
#[derive(Default)]
pub struct MemorySink {
    items: Mutex<HashMap<ArtifactKey, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn put(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<(), SinkError> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.insert(key.clone(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>, SinkError> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items
            .get(key)
            .cloned()
            .ok_or_else(|| SinkError::NotFound(key.to_string()))
    }
}

/// 图片类产物的预览钩子（终端/笔记本等展示层实现）
pub trait PreviewHook: Send + Sync {
    fn preview(&self, artifact: &FileArtifact);
}

/// 默认不做任何预览
pub struct NoopPreview;

impl PreviewHook for NoopPreview {
    fn preview(&self, _artifact: &FileArtifact) {}
}
