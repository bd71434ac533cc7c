//! 基于 REST + SSE 的控制面与函数注册表实现

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use super::error::RemoteError;
use super::sse::SseDecoder;
use super::traits::{
    CollaboratorAssociation, ControlPlane, EventStream, FunctionBinding, FunctionInfo,
    FunctionRegistry, InvokeRequest,
};
use super::wire::{decode_frame, session_state_body, WireList, WireResource, WireStatus};
use crate::config::ControlPlaneSection;
use crate::resource::{FunctionSpec, RemoteResource, RemoteStatus, ResourceKind, ResourceSpec};

/// 共享的 HTTP 客户端、服务地址与鉴权
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: Duration,
    /// 调用流从发出到读完的总时长上限
    stream_timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            request_timeout,
            stream_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// 从配置构造，API key 从 `api_key_env` 指定的环境变量读取
    pub fn from_config(config: &ControlPlaneSection) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!("{} not set, calling control plane without credentials", config.api_key_env);
        }
        Self::new(
            config.base_url.clone(),
            api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
        .with_stream_timeout(Duration::from_secs(config.stream_timeout_secs))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, self.url(path));
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn execute(&self, req: RequestBuilder) -> Result<Response, RemoteError> {
        let resp = req.timeout(self.request_timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status.as_u16(), body));
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        let resp = self
            .execute(self.request(Method::GET, path).query(query))
            .await?;
        Ok(resp.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let resp = self.execute(self.request(Method::POST, path).json(body)).await?;
        Ok(resp.json().await?)
    }

    async fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), RemoteError> {
        self.execute(self.request(Method::POST, path).json(body)).await?;
        Ok(())
    }

    async fn put_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), RemoteError> {
        self.execute(self.request(Method::PUT, path).json(body)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        self.execute(self.request(Method::DELETE, path)).await?;
        Ok(())
    }
}

/// 资源集合路径；别名挂在所属 agent 下，无 parent 时走全局别名集合
fn collection(kind: ResourceKind, parent_id: Option<&str>) -> String {
    match (kind, parent_id) {
        (ResourceKind::Agent, _) => "agents".to_string(),
        (ResourceKind::Alias, Some(agent_id)) => format!("agents/{}/aliases", agent_id),
        (ResourceKind::Alias, None) => "aliases".to_string(),
        (ResourceKind::BackingFunction, _) => "functions".to_string(),
        (ResourceKind::Role, _) => "roles".to_string(),
    }
}

pub struct HttpControlPlane {
    transport: HttpTransport,
}

impl HttpControlPlane {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn get_resource_by_name(
        &self,
        kind: ResourceKind,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<RemoteResource>, RemoteError> {
        let list: WireList<WireResource> = self
            .transport
            .get_json(&collection(kind, parent_id), &[("name", name)])
            .await?;
        Ok(list
            .items
            .into_iter()
            .find(|r| r.name == name)
            .map(|r| r.into_remote(kind)))
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
    ) -> Result<Vec<RemoteResource>, RemoteError> {
        let list: WireList<WireResource> = self
            .transport
            .get_json(&collection(kind, parent_id), &[])
            .await?;
        Ok(list.items.into_iter().map(|r| r.into_remote(kind)).collect())
    }

    async fn create_resource(
        &self,
        name: &str,
        spec: &ResourceSpec,
    ) -> Result<RemoteResource, RemoteError> {
        let kind = spec.kind();
        let mut body = match spec {
            ResourceSpec::Agent(agent) => serde_json::to_value(agent)?,
            ResourceSpec::Alias(_) => json!({}),
            ResourceSpec::Role(role) => serde_json::to_value(role)?,
            ResourceSpec::BackingFunction(_) => {
                return Err(RemoteError::Rejected {
                    status: 400,
                    body: "backing functions are deployed through the function registry".to_string(),
                });
            }
        };
        body["name"] = json!(name);

        let created: WireResource = self
            .transport
            .post_json(&collection(kind, spec.parent_id()), &body)
            .await?;
        Ok(created.into_remote(kind))
    }

    async fn delete_resource(
        &self,
        kind: ResourceKind,
        remote_id: &str,
        parent_id: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.transport
            .delete(&format!("{}/{}", collection(kind, parent_id), remote_id))
            .await
    }

    async fn poll_status(
        &self,
        kind: ResourceKind,
        remote_id: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteStatus, RemoteError> {
        let status: WireStatus = self
            .transport
            .get_json(
                &format!("{}/{}/status", collection(kind, parent_id), remote_id),
                &[],
            )
            .await?;
        Ok(RemoteStatus::new(status.status))
    }

    async fn associate_collaborator(
        &self,
        supervisor_id: &str,
        association: &CollaboratorAssociation,
    ) -> Result<(), RemoteError> {
        self.transport
            .post_empty(&format!("agents/{}/collaborators", supervisor_id), association)
            .await
    }

    async fn list_collaborators(
        &self,
        supervisor_id: &str,
    ) -> Result<Vec<CollaboratorAssociation>, RemoteError> {
        let list: WireList<CollaboratorAssociation> = self
            .transport
            .get_json(&format!("agents/{}/collaborators", supervisor_id), &[])
            .await?;
        Ok(list.items)
    }

    async fn disassociate_collaborator(
        &self,
        supervisor_id: &str,
        collaborator_name: &str,
    ) -> Result<(), RemoteError> {
        self.transport
            .delete(&format!(
                "agents/{}/collaborators/{}",
                supervisor_id, collaborator_name
            ))
            .await
    }

    async fn prepare(&self, agent_id: &str) -> Result<(), RemoteError> {
        self.transport
            .post_empty(&format!("agents/{}/prepare", agent_id), &json!({}))
            .await
    }

    async fn attach_function(
        &self,
        agent_id: &str,
        binding: &FunctionBinding,
    ) -> Result<(), RemoteError> {
        self.transport
            .post_empty(&format!("agents/{}/action-groups", agent_id), binding)
            .await
    }

    async fn list_function_bindings(&self, agent_id: &str) -> Result<Vec<FunctionBinding>, RemoteError> {
        let list: WireList<FunctionBinding> = self
            .transport
            .get_json(&format!("agents/{}/action-groups", agent_id), &[])
            .await?;
        Ok(list.items)
    }

    async fn update_function_binding(
        &self,
        agent_id: &str,
        binding: &FunctionBinding,
    ) -> Result<(), RemoteError> {
        self.transport
            .put_empty(
                &format!("agents/{}/action-groups/{}", agent_id, binding.group_name),
                binding,
            )
            .await
    }

    async fn list_role_policies(&self, role_id: &str) -> Result<Vec<String>, RemoteError> {
        let list: WireList<String> = self
            .transport
            .get_json(&format!("roles/{}/policies", role_id), &[])
            .await?;
        Ok(list.items)
    }

    async fn delete_role_policy(
        &self,
        role_id: &str,
        policy_name: &str,
    ) -> Result<(), RemoteError> {
        self.transport
            .delete(&format!("roles/{}/policies/{}", role_id, policy_name))
            .await
    }

    async fn invoke(&self, request: &InvokeRequest) -> Result<EventStream, RemoteError> {
        let path = format!(
            "agents/{}/aliases/{}/sessions/{}/invoke",
            request.agent_id, request.alias_id, request.session_id
        );
        let mut body = json!({
            "inputText": request.input_text,
            "enableTrace": request.enable_trace,
            "endSession": request.end_session,
        });
        if let Some(state) = request.session_state.as_ref().filter(|s| !s.is_empty()) {
            body["sessionState"] = session_state_body(state);
        }
        let resp = self
            .transport
            .request(Method::POST, &path)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .timeout(self.transport.stream_timeout)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let mut bytes = resp.bytes_stream();
        let events: EventStream = Box::pin(async_stream::try_stream! {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| RemoteError::Transport(e.to_string()))?;
                for frame in decoder.push(&chunk) {
                    for event in decode_frame(&frame)? {
                        yield event;
                    }
                }
            }
            if let Some(frame) = decoder.finish() {
                for event in decode_frame(&frame)? {
                    yield event;
                }
            }
        });
        Ok(events)
    }
}

pub struct HttpFunctionRegistry {
    transport: HttpTransport,
}

impl HttpFunctionRegistry {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl FunctionRegistry for HttpFunctionRegistry {
    async fn get_by_name(&self, name: &str) -> Result<Option<FunctionInfo>, RemoteError> {
        let list: WireList<FunctionInfo> = self
            .transport
            .get_json("functions", &[("name", name)])
            .await?;
        Ok(list.items.into_iter().find(|f| f.name == name))
    }

    async fn deploy(&self, name: &str, spec: &FunctionSpec) -> Result<FunctionInfo, RemoteError> {
        let body = json!({
            "name": name,
            "handler": spec.handler,
            "runtime": spec.runtime,
            "timeoutSecs": spec.timeout_secs,
            "environment": spec.env,
            "roleName": spec.role_name,
            "code": STANDARD.encode(&spec.code),
        });
        self.transport.post_json("functions", &body).await
    }

    async fn status(&self, function_id: &str) -> Result<RemoteStatus, RemoteError> {
        let status: WireStatus = self
            .transport
            .get_json(&format!("functions/{}/status", function_id), &[])
            .await?;
        Ok(RemoteStatus::new(status.status))
    }

    async fn authorize_caller(
        &self,
        function_id: &str,
        caller_id: &str,
    ) -> Result<(), RemoteError> {
        self.transport
            .post_empty(
                &format!("functions/{}/callers", function_id),
                &json!({ "callerId": caller_id }),
            )
            .await
    }

    async fn list_callers(&self, function_id: &str) -> Result<Vec<String>, RemoteError> {
        let list: WireList<String> = self
            .transport
            .get_json(&format!("functions/{}/callers", function_id), &[])
            .await?;
        Ok(list.items)
    }

    async fn revoke_caller(&self, function_id: &str, caller_id: &str) -> Result<(), RemoteError> {
        self.transport
            .delete(&format!("functions/{}/callers/{}", function_id, caller_id))
            .await
    }

    async fn delete(&self, function_id: &str) -> Result<(), RemoteError> {
        self.transport
            .delete(&format!("functions/{}", function_id))
            .await
    }
}
