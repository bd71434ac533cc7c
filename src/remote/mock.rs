//! 内存中的控制面与函数注册表，用于测试与离线演示
//!
//! 创建、prepare、关联之后资源会在若干次轮询内保持过渡态，之后落定。
//! 所有调用按名称记录在共享的 CallLog 中，便于断言调用顺序。

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream;

use super::error::RemoteError;
use super::traits::{
    CollaboratorAssociation, ControlPlane, EventStream, FunctionBinding, FunctionInfo,
    FunctionRegistry, InvokeRequest,
};
use crate::resource::{FunctionSpec, RemoteResource, RemoteStatus, ResourceKind, ResourceSpec};
use crate::stream::StreamEvent;

/// 记录下来的一次远端调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Lookup(ResourceKind, String),
    List(ResourceKind),
    Create(ResourceKind, String),
    Delete(ResourceKind, String),
    Poll(ResourceKind, String),
    Associate { supervisor: String, collaborator: String },
    Disassociate { supervisor: String, collaborator: String },
    ListCollaborators(String),
    Prepare(String),
    AttachFunction { agent: String, group: String },
    ListFunctionBindings(String),
    UpdateFunctionBinding { agent: String, group: String },
    ListRolePolicies(String),
    DeleteRolePolicy { role: String, policy: String },
    Invoke(String),
    AuthorizeCaller { function: String, caller: String },
    RevokeCaller { function: String, caller: String },
}

/// 两个 mock 共享的调用日志
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[derive(Debug, Clone)]
struct MockResource {
    kind: ResourceKind,
    name: String,
    parent_id: Option<String>,
    status: String,
    /// 剩余多少次轮询保持过渡态
    pending_polls: u32,
    settled: String,
}

impl MockResource {
    fn to_remote(&self, id: &str) -> RemoteResource {
        RemoteResource {
            kind: self.kind,
            name: self.name.clone(),
            remote_id: id.to_string(),
            status: RemoteStatus::new(self.status.clone()),
            parent_id: self.parent_id.clone(),
            arn: Some(mock_arn(self.kind, id, self.parent_id.as_deref())),
            updated_at: Some(Utc::now()),
        }
    }
}

fn mock_arn(kind: ResourceKind, id: &str, parent_id: Option<&str>) -> String {
    match (kind, parent_id) {
        (ResourceKind::Alias, Some(agent)) => format!("arn:hive:mock:agent-alias/{}/{}", agent, id),
        (ResourceKind::Agent, _) => format!("arn:hive:mock:agent/{}", id),
        (ResourceKind::Role, _) => format!("arn:hive:mock:role/{}", id),
        _ => format!("arn:hive:mock:{}/{}", kind, id),
    }
}

/// 预设的一次调用结果
enum ScriptedInvocation {
    Rejected { status: u16, body: String },
    Events(Vec<Result<StreamEvent, RemoteError>>),
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    resources: BTreeMap<String, MockResource>,
    collaborators: HashMap<String, Vec<CollaboratorAssociation>>,
    attached: HashMap<String, Vec<FunctionBinding>>,
    role_policies: HashMap<String, Vec<String>>,
    transitional_polls: u32,
    injected_conflicts: HashMap<(ResourceKind, String), u32>,
    fail_on_settle: HashSet<(ResourceKind, String)>,
    scripted: VecDeque<ScriptedInvocation>,
    invocations: Vec<InvokeRequest>,
    /// 每次按名称查找返回后让出的时长，用于制造并发竞争
    lookup_delay: Option<Duration>,
}

impl MockState {
    fn allocate_id(&mut self, kind: ResourceKind) -> String {
        self.next_id += 1;
        let prefix = match kind {
            ResourceKind::Agent => "AG",
            ResourceKind::Alias => "AL",
            ResourceKind::BackingFunction => "FN",
            ResourceKind::Role => "RO",
        };
        format!("{}{:04}", prefix, self.next_id)
    }

    fn name_of(&self, id: &str) -> String {
        self.resources
            .get(id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn find(&self, kind: ResourceKind, name: &str, parent_id: Option<&str>) -> Option<(&String, &MockResource)> {
        self.resources.iter().find(|(_, r)| {
            r.kind == kind
                && r.name == name
                && parent_id.map_or(true, |p| r.parent_id.as_deref() == Some(p))
        })
    }

    /// 把资源置为过渡态，若干次轮询后落定为 settled（或 FAILED）
    fn start_transition(&mut self, id: &str, transitional: &str, settled: &str) {
        let polls = self.transitional_polls;
        let failing = self
            .resources
            .get(id)
            .map(|r| self.fail_on_settle.contains(&(r.kind, r.name.clone())))
            .unwrap_or(false);
        if let Some(resource) = self.resources.get_mut(id) {
            resource.settled = if failing { "FAILED".to_string() } else { settled.to_string() };
            if polls == 0 {
                resource.status = resource.settled.clone();
                resource.pending_polls = 0;
            } else {
                resource.status = transitional.to_string();
                resource.pending_polls = polls;
            }
        }
    }

    fn create(
        &mut self,
        kind: ResourceKind,
        name: &str,
        parent_id: Option<String>,
        settled: &str,
    ) -> Result<String, RemoteError> {
        let key = (kind, name.to_string());
        if let Some(remaining) = self.injected_conflicts.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Conflict(format!("{} '{}' is being modified", kind, name)));
            }
        }
        if self.find(kind, name, parent_id.as_deref()).is_some() {
            return Err(RemoteError::Conflict(format!("{} '{}' already exists", kind, name)));
        }

        let id = self.allocate_id(kind);
        self.resources.insert(
            id.clone(),
            MockResource {
                kind,
                name: name.to_string(),
                parent_id,
                status: settled.to_string(),
                pending_polls: 0,
                settled: settled.to_string(),
            },
        );
        self.start_transition(&id, "CREATING", settled);
        Ok(id)
    }

    fn poll(&mut self, id: &str) -> Result<RemoteStatus, RemoteError> {
        let resource = self
            .resources
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        let current = RemoteStatus::new(resource.status.clone());
        if resource.pending_polls > 0 {
            resource.pending_polls -= 1;
            if resource.pending_polls == 0 {
                resource.status = resource.settled.clone();
            }
        }
        Ok(current)
    }
}

/// 内存控制面
#[derive(Clone)]
pub struct MockControlPlane {
    state: Arc<Mutex<MockState>>,
    log: CallLog,
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::with_log(CallLog::new())
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            log,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// 创建 / prepare / 关联之后保持过渡态的轮询次数
    pub fn with_transitional_polls(self, polls: u32) -> Self {
        self.state().transitional_polls = polls;
        self
    }

    /// 查找返回前先 sleep，让并发的 ensure 交错执行
    pub fn with_lookup_delay(self, delay: Duration) -> Self {
        self.state().lookup_delay = Some(delay);
        self
    }

    /// 接下来 n 次创建该资源时返回 Conflict
    pub fn inject_conflicts(&self, kind: ResourceKind, name: &str, times: u32) {
        self.state()
            .injected_conflicts
            .insert((kind, name.to_string()), times);
    }

    /// 该资源的下一次过渡落定为 FAILED
    pub fn fail_on_settle(&self, kind: ResourceKind, name: &str) {
        self.state().fail_on_settle.insert((kind, name.to_string()));
    }

    /// 直接放入一个已存在的资源（模拟上一次运行遗留）
    pub fn seed(&self, kind: ResourceKind, name: &str, parent_id: Option<&str>, status: &str) -> String {
        let mut state = self.state();
        let id = state.allocate_id(kind);
        state.resources.insert(
            id.clone(),
            MockResource {
                kind,
                name: name.to_string(),
                parent_id: parent_id.map(String::from),
                status: status.to_string(),
                pending_polls: 0,
                settled: status.to_string(),
            },
        );
        id
    }

    /// 把已有资源置为过渡态，polls 次轮询后落定为 settled
    pub fn set_transition(&self, id: &str, transitional: &str, polls: u32, settled: &str) {
        if let Some(resource) = self.state().resources.get_mut(id) {
            resource.status = transitional.to_string();
            resource.pending_polls = polls;
            resource.settled = settled.to_string();
        }
    }

    pub fn add_role_policy(&self, role_id: &str, policy: &str) {
        self.state()
            .role_policies
            .entry(role_id.to_string())
            .or_default()
            .push(policy.to_string());
    }

    pub fn script_events(&self, events: Vec<Result<StreamEvent, RemoteError>>) {
        self.state()
            .scripted
            .push_back(ScriptedInvocation::Events(events));
    }

    pub fn script_rejection(&self, status: u16, body: &str) {
        self.state().scripted.push_back(ScriptedInvocation::Rejected {
            status,
            body: body.to_string(),
        });
    }

    pub fn resources(&self, kind: ResourceKind) -> Vec<RemoteResource> {
        let state = self.state();
        state
            .resources
            .iter()
            .filter(|(_, r)| r.kind == kind)
            .map(|(id, r)| r.to_remote(id))
            .collect()
    }

    pub fn association_names(&self, supervisor_id: &str) -> Vec<String> {
        let state = self.state();
        state
            .collaborators
            .get(supervisor_id)
            .map(|list| list.iter().map(|a| a.collaborator_name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn associations(&self, supervisor_id: &str) -> Vec<CollaboratorAssociation> {
        self.state()
            .collaborators
            .get(supervisor_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn function_bindings(&self, agent_id: &str) -> Vec<FunctionBinding> {
        self.state().attached.get(agent_id).cloned().unwrap_or_default()
    }

    /// 收到过的调用请求，按顺序
    pub fn invocations(&self) -> Vec<InvokeRequest> {
        self.state().invocations.clone()
    }

    pub fn attached_groups(&self, agent_id: &str) -> Vec<String> {
        let state = self.state();
        state
            .attached
            .get(agent_id)
            .map(|list| list.iter().map(|b| b.group_name.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn get_resource_by_name(
        &self,
        kind: ResourceKind,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<RemoteResource>, RemoteError> {
        self.log.record(MockCall::Lookup(kind, name.to_string()));
        let (found, delay) = {
            let state = self.state();
            (
                state.find(kind, name, parent_id).map(|(id, r)| r.to_remote(id)),
                state.lookup_delay,
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(found)
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
    ) -> Result<Vec<RemoteResource>, RemoteError> {
        self.log.record(MockCall::List(kind));
        let state = self.state();
        Ok(state
            .resources
            .iter()
            .filter(|(_, r)| r.kind == kind)
            .filter(|(_, r)| parent_id.map_or(true, |p| r.parent_id.as_deref() == Some(p)))
            .map(|(id, r)| r.to_remote(id))
            .collect())
    }

    async fn create_resource(
        &self,
        name: &str,
        spec: &ResourceSpec,
    ) -> Result<RemoteResource, RemoteError> {
        let kind = spec.kind();
        self.log.record(MockCall::Create(kind, name.to_string()));
        let settled = match kind {
            ResourceKind::Agent => "NOT_PREPARED",
            ResourceKind::Alias => "PREPARED",
            _ => "ACTIVE",
        };
        let mut state = self.state();
        let id = state.create(kind, name, spec.parent_id().map(String::from), settled)?;
        if let ResourceSpec::Role(role) = spec {
            let names: Vec<String> = role.inline_policies.keys().cloned().collect();
            state.role_policies.insert(id.clone(), names);
        }
        let resource = state
            .resources
            .get(&id)
            .map(|r| r.to_remote(&id))
            .ok_or_else(|| RemoteError::NotFound(id.clone()))?;
        Ok(resource)
    }

    async fn delete_resource(
        &self,
        kind: ResourceKind,
        remote_id: &str,
        _parent_id: Option<&str>,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        let name = state.name_of(remote_id);
        self.log.record(MockCall::Delete(kind, name));
        match state.resources.get(remote_id) {
            Some(r) if r.kind == kind => {}
            _ => return Err(RemoteError::NotFound(remote_id.to_string())),
        }
        state.resources.remove(remote_id);
        state.collaborators.remove(remote_id);
        state.attached.remove(remote_id);
        state.role_policies.remove(remote_id);
        Ok(())
    }

    async fn poll_status(
        &self,
        kind: ResourceKind,
        remote_id: &str,
        _parent_id: Option<&str>,
    ) -> Result<RemoteStatus, RemoteError> {
        let mut state = self.state();
        let name = state.name_of(remote_id);
        self.log.record(MockCall::Poll(kind, name));
        state.poll(remote_id)
    }

    async fn associate_collaborator(
        &self,
        supervisor_id: &str,
        association: &CollaboratorAssociation,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        let supervisor = state.name_of(supervisor_id);
        self.log.record(MockCall::Associate {
            supervisor,
            collaborator: association.collaborator_name.clone(),
        });
        if !state.resources.contains_key(supervisor_id) {
            return Err(RemoteError::NotFound(supervisor_id.to_string()));
        }
        let list = state.collaborators.entry(supervisor_id.to_string()).or_default();
        if list
            .iter()
            .any(|a| a.collaborator_name == association.collaborator_name)
        {
            return Err(RemoteError::Conflict(format!(
                "collaborator '{}' already associated",
                association.collaborator_name
            )));
        }
        list.push(association.clone());
        state.start_transition(supervisor_id, "UPDATING", "NOT_PREPARED");
        Ok(())
    }

    async fn list_collaborators(
        &self,
        supervisor_id: &str,
    ) -> Result<Vec<CollaboratorAssociation>, RemoteError> {
        let state = self.state();
        self.log
            .record(MockCall::ListCollaborators(state.name_of(supervisor_id)));
        Ok(state
            .collaborators
            .get(supervisor_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn disassociate_collaborator(
        &self,
        supervisor_id: &str,
        collaborator_name: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        let supervisor = state.name_of(supervisor_id);
        self.log.record(MockCall::Disassociate {
            supervisor,
            collaborator: collaborator_name.to_string(),
        });
        let list = state
            .collaborators
            .get_mut(supervisor_id)
            .ok_or_else(|| RemoteError::NotFound(supervisor_id.to_string()))?;
        let before = list.len();
        list.retain(|a| a.collaborator_name != collaborator_name);
        if list.len() == before {
            return Err(RemoteError::NotFound(collaborator_name.to_string()));
        }
        state.start_transition(supervisor_id, "UPDATING", "NOT_PREPARED");
        Ok(())
    }

    async fn prepare(&self, agent_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state();
        self.log.record(MockCall::Prepare(state.name_of(agent_id)));
        if !state.resources.contains_key(agent_id) {
            return Err(RemoteError::NotFound(agent_id.to_string()));
        }
        state.start_transition(agent_id, "PREPARING", "PREPARED");
        Ok(())
    }

    async fn attach_function(
        &self,
        agent_id: &str,
        binding: &FunctionBinding,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        self.log.record(MockCall::AttachFunction {
            agent: state.name_of(agent_id),
            group: binding.group_name.clone(),
        });
        let list = state.attached.entry(agent_id.to_string()).or_default();
        if list.iter().any(|b| b.group_name == binding.group_name) {
            return Err(RemoteError::Conflict(format!(
                "function group '{}' already attached",
                binding.group_name
            )));
        }
        list.push(binding.clone());
        Ok(())
    }

    async fn list_function_bindings(&self, agent_id: &str) -> Result<Vec<FunctionBinding>, RemoteError> {
        let state = self.state();
        self.log
            .record(MockCall::ListFunctionBindings(state.name_of(agent_id)));
        Ok(state.attached.get(agent_id).cloned().unwrap_or_default())
    }

    async fn update_function_binding(
        &self,
        agent_id: &str,
        binding: &FunctionBinding,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        self.log.record(MockCall::UpdateFunctionBinding {
            agent: state.name_of(agent_id),
            group: binding.group_name.clone(),
        });
        let existing = state
            .attached
            .get_mut(agent_id)
            .and_then(|list| list.iter_mut().find(|b| b.group_name == binding.group_name))
            .ok_or_else(|| RemoteError::NotFound(binding.group_name.clone()))?;
        *existing = binding.clone();
        Ok(())
    }

    async fn list_role_policies(&self, role_id: &str) -> Result<Vec<String>, RemoteError> {
        let state = self.state();
        self.log
            .record(MockCall::ListRolePolicies(state.name_of(role_id)));
        if !state.resources.contains_key(role_id) {
            return Err(RemoteError::NotFound(role_id.to_string()));
        }
        Ok(state.role_policies.get(role_id).cloned().unwrap_or_default())
    }

    async fn delete_role_policy(
        &self,
        role_id: &str,
        policy_name: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        self.log.record(MockCall::DeleteRolePolicy {
            role: state.name_of(role_id),
            policy: policy_name.to_string(),
        });
        let policies = state
            .role_policies
            .get_mut(role_id)
            .ok_or_else(|| RemoteError::NotFound(role_id.to_string()))?;
        let before = policies.len();
        policies.retain(|p| p != policy_name);
        if policies.len() == before {
            return Err(RemoteError::NotFound(policy_name.to_string()));
        }
        Ok(())
    }

    async fn invoke(&self, request: &InvokeRequest) -> Result<EventStream, RemoteError> {
        self.log.record(MockCall::Invoke(request.session_id.clone()));
        let scripted = {
            let mut state = self.state();
            state.invocations.push(request.clone());
            state.scripted.pop_front()
        };
        match scripted {
            Some(ScriptedInvocation::Rejected { status, body }) => {
                Err(RemoteError::Rejected { status, body })
            }
            Some(ScriptedInvocation::Events(events)) => Ok(Box::pin(stream::iter(events))),
            None => Ok(Box::pin(stream::empty())),
        }
    }
}

#[derive(Debug, Clone)]
struct MockFunction {
    name: String,
    role_name: Option<String>,
    status: String,
    pending_polls: u32,
    callers: Vec<String>,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    functions: BTreeMap<String, MockFunction>,
    transitional_polls: u32,
}

/// 内存函数注册表
#[derive(Clone)]
pub struct MockFunctionRegistry {
    state: Arc<Mutex<RegistryState>>,
    log: CallLog,
}

impl Default for MockFunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFunctionRegistry {
    pub fn new() -> Self {
        Self::with_log(CallLog::new())
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            log,
        }
    }

    pub fn with_transitional_polls(self, polls: u32) -> Self {
        self.state().transitional_polls = polls;
        self
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn function_names(&self) -> Vec<String> {
        self.state().functions.values().map(|f| f.name.clone()).collect()
    }

    pub fn callers_of(&self, name: &str) -> Vec<String> {
        self.state()
            .functions
            .values()
            .find(|f| f.name == name)
            .map(|f| f.callers.clone())
            .unwrap_or_default()
    }
}

fn function_info(id: &str, f: &MockFunction) -> FunctionInfo {
    FunctionInfo {
        function_id: id.to_string(),
        name: f.name.clone(),
        role_name: f.role_name.clone(),
        status: RemoteStatus::new(f.status.clone()),
    }
}

#[async_trait]
impl FunctionRegistry for MockFunctionRegistry {
    async fn get_by_name(&self, name: &str) -> Result<Option<FunctionInfo>, RemoteError> {
        self.log
            .record(MockCall::Lookup(ResourceKind::BackingFunction, name.to_string()));
        let state = self.state();
        Ok(state
            .functions
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(id, f)| function_info(id, f)))
    }

    async fn deploy(&self, name: &str, spec: &FunctionSpec) -> Result<FunctionInfo, RemoteError> {
        self.log
            .record(MockCall::Create(ResourceKind::BackingFunction, name.to_string()));
        let mut state = self.state();
        if state.functions.values().any(|f| f.name == name) {
            return Err(RemoteError::Conflict(format!("function '{}' already exists", name)));
        }
        state.next_id += 1;
        let id = format!("FN{:04}", state.next_id);
        let pending = state.transitional_polls;
        let function = MockFunction {
            name: name.to_string(),
            role_name: spec.role_name.clone(),
            status: if pending > 0 { "PENDING" } else { "ACTIVE" }.to_string(),
            pending_polls: pending,
            callers: Vec::new(),
        };
        let info = function_info(&id, &function);
        state.functions.insert(id, function);
        Ok(info)
    }

    async fn status(&self, function_id: &str) -> Result<RemoteStatus, RemoteError> {
        let mut state = self.state();
        let function = state
            .functions
            .get_mut(function_id)
            .ok_or_else(|| RemoteError::NotFound(function_id.to_string()))?;
        self.log
            .record(MockCall::Poll(ResourceKind::BackingFunction, function.name.clone()));
        let current = RemoteStatus::new(function.status.clone());
        if function.pending_polls > 0 {
            function.pending_polls -= 1;
            if function.pending_polls == 0 {
                function.status = "ACTIVE".to_string();
            }
        }
        Ok(current)
    }

    async fn authorize_caller(
        &self,
        function_id: &str,
        caller_id: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        let function = state
            .functions
            .get_mut(function_id)
            .ok_or_else(|| RemoteError::NotFound(function_id.to_string()))?;
        self.log.record(MockCall::AuthorizeCaller {
            function: function.name.clone(),
            caller: caller_id.to_string(),
        });
        if function.callers.iter().any(|c| c == caller_id) {
            return Err(RemoteError::Conflict(format!("{} already authorized", caller_id)));
        }
        function.callers.push(caller_id.to_string());
        Ok(())
    }

    async fn list_callers(&self, function_id: &str) -> Result<Vec<String>, RemoteError> {
        let state = self.state();
        state
            .functions
            .get(function_id)
            .map(|f| f.callers.clone())
            .ok_or_else(|| RemoteError::NotFound(function_id.to_string()))
    }

    async fn revoke_caller(&self, function_id: &str, caller_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state();
        let function = state
            .functions
            .get_mut(function_id)
            .ok_or_else(|| RemoteError::NotFound(function_id.to_string()))?;
        self.log.record(MockCall::RevokeCaller {
            function: function.name.clone(),
            caller: caller_id.to_string(),
        });
        function.callers.retain(|c| c != caller_id);
        Ok(())
    }

    async fn delete(&self, function_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state();
        let removed = state
            .functions
            .remove(function_id)
            .ok_or_else(|| RemoteError::NotFound(function_id.to_string()))?;
        self.log
            .record(MockCall::Delete(ResourceKind::BackingFunction, removed.name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{AgentSpec, AliasSpec};

    #[tokio::test]
    async fn test_created_resource_settles_after_polls() {
        let control = MockControlPlane::new().with_transitional_polls(2);
        let spec = ResourceSpec::Agent(AgentSpec::new("d", "i", "m"));
        let created = control.create_resource("news_agent", &spec).await.unwrap();
        assert_eq!(created.status.as_str(), "CREATING");

        let id = created.remote_id;
        assert!(control
            .poll_status(ResourceKind::Agent, &id, None)
            .await
            .unwrap()
            .is_transitional());
        assert!(control
            .poll_status(ResourceKind::Agent, &id, None)
            .await
            .unwrap()
            .is_transitional());
        assert_eq!(
            control
                .poll_status(ResourceKind::Agent, &id, None)
                .await
                .unwrap()
                .as_str(),
            "NOT_PREPARED"
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let control = MockControlPlane::new();
        let spec = ResourceSpec::Agent(AgentSpec::new("d", "i", "m"));
        control.create_resource("a", &spec).await.unwrap();
        let err = control.create_resource("a", &spec).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_alias_names_scoped_per_agent() {
        let control = MockControlPlane::new();
        let alias = |agent: &str| {
            ResourceSpec::Alias(AliasSpec {
                agent_id: agent.to_string(),
            })
        };
        control.create_resource("live", &alias("AG1")).await.unwrap();
        control.create_resource("live", &alias("AG2")).await.unwrap();
        assert_eq!(control.resources(ResourceKind::Alias).len(), 2);
    }

    #[tokio::test]
    async fn test_delete_agent_leaves_aliases() {
        let control = MockControlPlane::new();
        let agent = control
            .create_resource("a", &ResourceSpec::Agent(AgentSpec::new("d", "i", "m")))
            .await
            .unwrap();
        control
            .create_resource(
                "live",
                &ResourceSpec::Alias(AliasSpec {
                    agent_id: agent.remote_id.clone(),
                }),
            )
            .await
            .unwrap();
        control
            .delete_resource(ResourceKind::Agent, &agent.remote_id, None)
            .await
            .unwrap();
        assert_eq!(control.resources(ResourceKind::Alias).len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_rejection() {
        let control = MockControlPlane::new();
        control.script_rejection(403, "access denied");
        let request = InvokeRequest {
            agent_id: "A".into(),
            alias_id: "B".into(),
            session_id: "s".into(),
            input_text: "hi".into(),
            enable_trace: true,
            end_session: false,
            session_state: None,
        };
        match control.invoke(&request).await {
            Err(RemoteError::Rejected { status, .. }) => assert_eq!(status, 403),
            Err(e) => panic!("Expected Rejected, got {:?}", e),
            Ok(_) => panic!("Expected Rejected, got a stream"),
        }
    }
}
