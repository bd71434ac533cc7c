//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LIFECYCLE__FORCE_RECREATE=true`）。

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::stream::TraceLevel;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub control_plane: ControlPlaneSection,
    pub lifecycle: LifecycleSection,
    pub stream: StreamSection,
    pub topology: TopologySection,
    pub tasks: TasksSection,
}

/// [app] 段：应用名与产物输出目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// 文件产物落盘根目录
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_app_name() -> String {
    "hive".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// [control_plane] 段：服务地址、凭据所在环境变量、超时
#[derive(Debug, Clone, Deserialize)]
pub struct ControlPlaneSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 存放 bearer token 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_secs: u64,
}

impl Default for ControlPlaneSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
            stream_timeout_secs: default_stream_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/v1".to_string()
}

fn default_api_key_env() -> String {
    "HIVE_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_stream_timeout_secs() -> u64 {
    600
}

/// [lifecycle] 段：轮询、重试与重建策略
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleSection {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// 轮询截止时间，不允许为 0
    #[serde(default = "default_poll_deadline_secs")]
    pub poll_deadline_secs: u64,
    #[serde(default = "default_create_retries")]
    pub create_retries: usize,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default)]
    pub force_recreate: bool,
    #[serde(default = "default_true")]
    pub serialize_same_name: bool,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            poll_deadline_secs: default_poll_deadline_secs(),
            create_retries: default_create_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            force_recreate: false,
            serialize_same_name: true,
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_poll_deadline_secs() -> u64 {
    600
}

fn default_create_retries() -> usize {
    2
}

fn default_retry_backoff_secs() -> u64 {
    4
}

fn default_true() -> bool {
    true
}

/// [stream] 段：追踪开关与展示粒度
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    #[serde(default = "default_true")]
    pub enable_trace: bool,
    /// none / outline / core / all
    #[serde(default = "default_trace_level")]
    pub trace_level: TraceLevel,
    #[serde(default = "default_trace_truncation")]
    pub trace_truncation: usize,
    #[serde(default)]
    pub end_session: bool,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            enable_trace: true,
            trace_level: default_trace_level(),
            trace_truncation: default_trace_truncation(),
            end_session: false,
        }
    }
}

fn default_trace_level() -> TraceLevel {
    TraceLevel::Core
}

fn default_trace_truncation() -> usize {
    300
}

/// [topology] 段：supervisor 与协作者定义
#[derive(Debug, Clone, Deserialize)]
pub struct TopologySection {
    /// 所有 agent 共用的执行角色
    #[serde(default = "default_execution_role")]
    pub execution_role: String,
    #[serde(default = "default_model_id")]
    pub default_model: String,
    /// supervisor 路由分类器使用的模型，未设置时由服务端决定
    pub routing_model: Option<String>,
    #[serde(default)]
    pub supervisor: SupervisorSection,
    #[serde(default)]
    pub collaborators: Vec<CollaboratorSection>,
}

impl Default for TopologySection {
    fn default() -> Self {
        Self {
            execution_role: default_execution_role(),
            default_model: default_model_id(),
            routing_model: None,
            supervisor: SupervisorSection::default(),
            collaborators: Vec::new(),
        }
    }
}

fn default_execution_role() -> String {
    "hive_agent_execution".to_string()
}

fn default_model_id() -> String {
    "anthropic.claude-3-5-sonnet".to_string()
}

fn default_alias_name() -> String {
    "live".to_string()
}

/// [topology.supervisor] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SupervisorSection {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    pub model: Option<String>,
    pub alias_name: Option<String>,
}

impl SupervisorSection {
    pub fn alias_name(&self) -> String {
        self.alias_name.clone().unwrap_or_else(default_alias_name)
    }
}

/// [[topology.collaborators]] 段：一个协作者 agent 及其可选的后端函数
#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorSection {
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub model: Option<String>,
    pub alias_name: Option<String>,
    /// 关联名称，默认与 name 相同
    pub association_name: Option<String>,
    #[serde(default)]
    pub relay_history: bool,
    #[serde(default)]
    pub code_interpreter: bool,
    pub function: Option<FunctionSection>,
}

impl CollaboratorSection {
    pub fn alias_name(&self) -> String {
        self.alias_name.clone().unwrap_or_else(default_alias_name)
    }

    pub fn association_name(&self) -> String {
        self.association_name.clone().unwrap_or_else(|| self.name.clone())
    }
}

/// [topology.collaborators.function] 段
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionSection {
    pub name: String,
    /// 代码包路径（zip）
    pub code_path: PathBuf,
    pub handler: String,
    pub runtime: Option<String>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// 函数执行角色，未设置时为 "<name>_role"
    pub role_name: Option<String>,
    pub group_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub signatures: Vec<FunctionSignatureSection>,
}

/// 函数签名（名称、说明、参数）
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionSignatureSection {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterSection {
    #[serde(rename = "type", default = "default_parameter_type")]
    pub param_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

fn default_parameter_type() -> String {
    "string".to_string()
}

/// [tasks] 段：把一组任务拼成一次 supervisor 调用
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TasksSection {
    /// sequential / allow_parallel
    #[serde(default)]
    pub mode: crate::topology::TaskMode,
    #[serde(default)]
    pub additional_instructions: String,
    #[serde(default)]
    pub items: Vec<TaskSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskSection {
    pub name: String,
    /// 支持 `{input}` 等占位符
    pub description: String,
    pub expected_output: String,
    pub output_type: Option<String>,
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    let app: AppConfig = c.try_deserialize()?;
    if app.lifecycle.poll_deadline_secs == 0 {
        return Err(config::ConfigError::Message(
            "lifecycle.poll_deadline_secs must be greater than zero".to_string(),
        ));
    }
    Ok(app)
}
