//! 资源生命周期管理：按名称幂等地创建 / 复用 / 删除远端资源
//!
//! - ensure：已就绪则直接复用（不产生任何写操作）；过渡态先等待落定；
//!   FAILED 或 force_recreate 时先删除再创建；创建遇冲突按策略重试。
//! - teardown：尽力而为，NotFound 视为成功，按「引用方先删」的顺序进行。
//! - 同名操作可在进程内串行化，轮询都有截止时间并响应取消。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::locks::NameLocks;
use super::poll::Poller;
use super::report::{StepOutcome, TeardownReport};
use super::retry::{retry_remote, RetryError, RetryPolicy};
use crate::config::LifecycleSection;
use crate::core::HiveError;
use crate::remote::{
    CollaboratorAssociation, ControlPlane, FunctionBinding, FunctionRegistry, RemoteError,
};
use crate::resource::{
    RemoteResource, RemoteStatus, ResourceHandle, ResourceKey, ResourceKind, ResourceSpec,
    ResourceStatus,
};

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub poller: Poller,
    pub retry: RetryPolicy,
    /// 每个名称在本管理器生命周期内首次 ensure 时删除重建
    pub force_recreate: bool,
    pub serialize_same_name: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poller: Poller::default(),
            retry: RetryPolicy::default(),
            force_recreate: false,
            serialize_same_name: true,
        }
    }
}

impl From<&LifecycleSection> for LifecycleConfig {
    fn from(section: &LifecycleSection) -> Self {
        Self {
            poller: Poller {
                interval: Duration::from_secs(section.poll_interval_secs),
                deadline: Duration::from_secs(section.poll_deadline_secs),
            },
            retry: RetryPolicy {
                max_retries: section.create_retries,
                backoff: Duration::from_secs(section.retry_backoff_secs),
            },
            force_recreate: section.force_recreate,
            serialize_same_name: section.serialize_same_name,
        }
    }
}

/// ensure 的结果是复用还是新建
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Reused,
    Created,
}

pub struct LifecycleManager {
    control: Arc<dyn ControlPlane>,
    functions: Arc<dyn FunctionRegistry>,
    config: LifecycleConfig,
    locks: NameLocks,
    known: Mutex<HashMap<ResourceKey, ResourceHandle>>,
    recreated: Mutex<HashSet<ResourceKey>>,
    cancel: CancellationToken,
}

/// 别名只在所属 agent 内唯一，缓存与加锁时带上 parent
fn scoped_key(kind: ResourceKind, name: &str, parent_id: Option<&str>) -> ResourceKey {
    match parent_id {
        Some(parent) => ResourceKey::new(kind, format!("{}/{}", parent, name)),
        None => ResourceKey::new(kind, name),
    }
}

impl LifecycleManager {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        functions: Arc<dyn FunctionRegistry>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            control,
            functions,
            config,
            locks: NameLocks::new(),
            known: Mutex::new(HashMap::new()),
            recreated: Mutex::new(HashSet::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn control(&self) -> &Arc<dyn ControlPlane> {
        &self.control
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// 本进程内已知的句柄
    pub fn known(&self, kind: ResourceKind, name: &str, parent_id: Option<&str>) -> Option<ResourceHandle> {
        let known = self.known.lock().unwrap_or_else(|e| e.into_inner());
        known.get(&scoped_key(kind, name, parent_id)).cloned()
    }

    fn remember(&self, handle: &ResourceHandle) {
        let key = scoped_key(handle.kind(), handle.name(), handle.parent_id());
        let mut known = self.known.lock().unwrap_or_else(|e| e.into_inner());
        known.insert(key, handle.clone());
    }

    fn forget(&self, predicate: impl Fn(&ResourceHandle) -> bool) {
        let mut known = self.known.lock().unwrap_or_else(|e| e.into_inner());
        known.retain(|_, handle| !predicate(handle));
    }

    /// 确保资源存在且就绪
    pub async fn ensure(
        &self,
        kind: ResourceKind,
        name: &str,
        spec: &ResourceSpec,
    ) -> Result<ResourceHandle, HiveError> {
        self.ensure_tracked(kind, name, spec)
            .await
            .map(|(handle, _)| handle)
    }

    /// 同 ensure，同时告知是复用还是新建
    pub async fn ensure_tracked(
        &self,
        kind: ResourceKind,
        name: &str,
        spec: &ResourceSpec,
    ) -> Result<(ResourceHandle, Provisioned), HiveError> {
        if spec.kind() != kind {
            return Err(HiveError::Config(format!(
                "{} spec passed to ensure for {} '{}'",
                spec.kind(),
                kind,
                name
            )));
        }
        if self.cancel.is_cancelled() {
            return Err(HiveError::Cancelled);
        }

        let parent_id = spec.parent_id();
        let key = scoped_key(kind, name, parent_id);
        let _guard = if self.config.serialize_same_name {
            Some(self.locks.acquire(&key).await)
        } else {
            None
        };

        let force = self.config.force_recreate && {
            let mut recreated = self.recreated.lock().unwrap_or_else(|e| e.into_inner());
            recreated.insert(key.clone())
        };

        if let Some(existing) = self.lookup(kind, name, parent_id).await? {
            let mut handle = ResourceHandle::from_remote(&existing);
            let mut status = existing.status.clone();
            if status.is_transitional() {
                tracing::info!("{} is {}, waiting for it to settle", key, status);
                status = self
                    .wait_settled(&key, kind, &existing.remote_id, parent_id)
                    .await?;
                handle.settle(&status);
            }

            match status.settle() {
                ResourceStatus::Ready if !force => {
                    tracing::info!("Reusing existing {} ({})", key, existing.remote_id);
                    self.remember(&handle);
                    return Ok((handle, Provisioned::Reused));
                }
                ResourceStatus::Ready => {
                    tracing::info!("force_recreate set, replacing {}", key);
                    self.replace(&existing).await;
                }
                ResourceStatus::Failed => {
                    tracing::warn!("{} is in {} state, recreating", key, status);
                    self.replace(&existing).await;
                }
                _ => {}
            }
        }

        let (handle, provisioned) = self.create(&key, name, spec).await?;
        self.remember(&handle);
        Ok((handle, provisioned))
    }

    async fn lookup(
        &self,
        kind: ResourceKind,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<RemoteResource>, HiveError> {
        Ok(self.lookup_remote(kind, name, parent_id).await?)
    }

    async fn lookup_remote(
        &self,
        kind: ResourceKind,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<RemoteResource>, RemoteError> {
        match kind {
            ResourceKind::BackingFunction => Ok(self
                .functions
                .get_by_name(name)
                .await?
                .map(|info| info.to_remote())),
            _ => self.control.get_resource_by_name(kind, name, parent_id).await,
        }
    }

    /// 创建资源；冲突时重新查找，同名资源已由别的调用方建好（或正在建）则直接采用
    async fn create(
        &self,
        key: &ResourceKey,
        name: &str,
        spec: &ResourceSpec,
    ) -> Result<(ResourceHandle, Provisioned), HiveError> {
        let kind = spec.kind();
        let this = self;
        let (created, provisioned) = retry_remote(&self.config.retry, &self.cancel, move || async move {
            let attempt = match spec {
                ResourceSpec::BackingFunction(function) => this
                    .functions
                    .deploy(name, function)
                    .await
                    .map(|info| info.to_remote()),
                _ => this.control.create_resource(name, spec).await,
            };
            match attempt {
                Ok(resource) => Ok((resource, Provisioned::Created)),
                Err(conflict) if conflict.is_conflict() => {
                    let found = match this.lookup_remote(kind, name, spec.parent_id()).await {
                        Ok(found) => found,
                        Err(e) => return Err(e),
                    };
                    match found {
                        Some(winner)
                            if matches!(
                                winner.status.settle(),
                                ResourceStatus::Ready | ResourceStatus::Provisioning
                            ) =>
                        {
                            tracing::info!(
                                "Lost create race for {} '{}', adopting {}",
                                kind,
                                name,
                                winner.remote_id
                            );
                            Ok((winner, Provisioned::Reused))
                        }
                        _ => Err(conflict),
                    }
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| match e {
            RetryError::Exhausted { attempts, last } if last.is_conflict() => {
                HiveError::ResourceConflict {
                    kind,
                    name: name.to_string(),
                    attempts,
                    detail: last.to_string(),
                }
            }
            RetryError::Exhausted { last, .. } => HiveError::Remote(last),
            RetryError::Fatal(e) => HiveError::Remote(e),
            RetryError::Cancelled => HiveError::Cancelled,
        })?;

        if provisioned == Provisioned::Created {
            tracing::info!("Created {} ({}), status {}", key, created.remote_id, created.status);
        }

        let mut handle = ResourceHandle::from_remote(&created);
        if created.status.is_transitional() {
            let status = self
                .wait_settled(key, kind, &created.remote_id, spec.parent_id())
                .await?;
            handle.settle(&status);
        }
        Ok((self.require_ready(handle, key)?, provisioned))
    }

    fn require_ready(&self, handle: ResourceHandle, key: &ResourceKey) -> Result<ResourceHandle, HiveError> {
        match handle.status() {
            ResourceStatus::Ready => Ok(handle),
            ResourceStatus::Deleted => Err(HiveError::ResourceNotFound {
                kind: key.kind,
                name: handle.name().to_string(),
            }),
            other => Err(HiveError::ProvisioningFailed {
                kind: key.kind,
                name: handle.name().to_string(),
                status: format!("{:?}", other).to_uppercase(),
            }),
        }
    }

    async fn wait_settled(
        &self,
        key: &ResourceKey,
        kind: ResourceKind,
        remote_id: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteStatus, HiveError> {
        let poller = &self.config.poller;
        match kind {
            ResourceKind::BackingFunction => {
                let functions = &self.functions;
                poller
                    .until_settled(key, &self.cancel, move || functions.status(remote_id))
                    .await
            }
            _ => {
                let control = &self.control;
                poller
                    .until_settled(key, &self.cancel, move || {
                        control.poll_status(kind, remote_id, parent_id)
                    })
                    .await
            }
        }
    }

    /// 轮询句柄直到就绪
    pub async fn wait_until_ready(&self, handle: &ResourceHandle) -> Result<ResourceHandle, HiveError> {
        let remote_id = handle.remote_id().ok_or_else(|| HiveError::ResourceNotFound {
            kind: handle.kind(),
            name: handle.name().to_string(),
        })?;
        let key = scoped_key(handle.kind(), handle.name(), handle.parent_id());
        let status = self
            .wait_settled(&key, handle.kind(), remote_id, handle.parent_id())
            .await?;
        let mut updated = handle.clone();
        updated.settle(&status);
        let updated = self.require_ready(updated, &key)?;
        self.remember(&updated);
        Ok(updated)
    }

    /// 触发 agent 的 prepare 并等待完成
    pub async fn prepare(&self, agent: &ResourceHandle) -> Result<ResourceHandle, HiveError> {
        let agent_id = self.require_id(agent)?;
        let control = &self.control;
        retry_remote(&self.config.retry, &self.cancel, move || control.prepare(agent_id))
            .await
            .map_err(|e| self.retry_to_hive(e, agent))?;
        tracing::info!("Preparing agent '{}'", agent.name());
        self.wait_until_ready(agent).await
    }

    /// 关联协作者并等待 supervisor 落定
    pub async fn associate(
        &self,
        supervisor: &ResourceHandle,
        association: &CollaboratorAssociation,
    ) -> Result<ResourceHandle, HiveError> {
        let supervisor_id = self.require_id(supervisor)?;
        let control = &self.control;
        retry_remote(&self.config.retry, &self.cancel, move || {
            control.associate_collaborator(supervisor_id, association)
        })
        .await
        .map_err(|e| self.retry_to_hive(e, supervisor))?;
        tracing::info!(
            "Associated collaborator '{}' with supervisor '{}'",
            association.collaborator_name,
            supervisor.name()
        );
        self.wait_until_ready(supervisor).await
    }

    /// 解除协作者关联并等待 supervisor 落定；关联已不存在视为成功
    pub async fn disassociate(
        &self,
        supervisor: &ResourceHandle,
        collaborator_name: &str,
    ) -> Result<ResourceHandle, HiveError> {
        let supervisor_id = self.require_id(supervisor)?;
        let control = &self.control;
        let result = retry_remote(&self.config.retry, &self.cancel, move || {
            control.disassociate_collaborator(supervisor_id, collaborator_name)
        })
        .await;
        match result {
            Ok(()) => tracing::info!(
                "Disassociated collaborator '{}' from supervisor '{}'",
                collaborator_name,
                supervisor.name()
            ),
            Err(RetryError::Fatal(e)) if e.is_not_found() => {}
            Err(e) => return Err(self.retry_to_hive(e, supervisor)),
        }
        self.wait_until_ready(supervisor).await
    }

    /// 允许 caller 调用后端函数；已授权时不重复写
    pub async fn authorize_caller(&self, function: &ResourceHandle, caller_id: &str) -> Result<(), HiveError> {
        let function_id = self.require_id(function)?;
        let callers = self.functions.list_callers(function_id).await?;
        if callers.iter().any(|c| c == caller_id) {
            return Ok(());
        }
        match self.functions.authorize_caller(function_id, caller_id).await {
            Ok(()) => Ok(()),
            Err(RemoteError::Conflict(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// 把后端函数挂到 agent 上；同名函数组已存在时确认它指向同一个函数，否则改绑
    pub async fn attach_function(&self, agent: &ResourceHandle, binding: &FunctionBinding) -> Result<(), HiveError> {
        let agent_id = self.require_id(agent)?;
        let conflict = match self.control.attach_function(agent_id, binding).await {
            Ok(()) => {
                tracing::info!("Attached function group '{}' to agent '{}'", binding.group_name, agent.name());
                return Ok(());
            }
            Err(RemoteError::Conflict(detail)) => detail,
            Err(e) => return Err(e.into()),
        };

        let bindings = self.control.list_function_bindings(agent_id).await?;
        match bindings.iter().find(|b| b.group_name == binding.group_name) {
            Some(existing) if existing.function_id == binding.function_id => {
                tracing::debug!("Function group '{}' already attached", binding.group_name);
                Ok(())
            }
            Some(existing) => {
                tracing::info!(
                    "Function group '{}' on agent '{}' points at {}, rebinding to {}",
                    binding.group_name,
                    agent.name(),
                    existing.function_id,
                    binding.function_id
                );
                self.control.update_function_binding(agent_id, binding).await?;
                Ok(())
            }
            None => Err(HiveError::ResourceConflict {
                kind: ResourceKind::Agent,
                name: agent.name().to_string(),
                attempts: 1,
                detail: conflict,
            }),
        }
    }

    /// 删除并重建别名，使其指向 agent 重新 prepare 后的版本
    pub async fn refresh_alias(&self, alias: &ResourceHandle, spec: &ResourceSpec) -> Result<ResourceHandle, HiveError> {
        if spec.kind() != ResourceKind::Alias {
            return Err(HiveError::Config(format!(
                "{} spec passed to refresh_alias for '{}'",
                spec.kind(),
                alias.name()
            )));
        }
        let key = scoped_key(ResourceKind::Alias, alias.name(), spec.parent_id());
        let _guard = if self.config.serialize_same_name {
            Some(self.locks.acquire(&key).await)
        } else {
            None
        };

        if let Some(alias_id) = alias.remote_id() {
            match self
                .control
                .delete_resource(ResourceKind::Alias, alias_id, alias.parent_id())
                .await
            {
                Ok(()) => tracing::info!("Deleted stale {} ({})", key, alias_id),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        let (handle, _) = self.create(&key, alias.name(), spec).await?;
        self.remember(&handle);
        Ok(handle)
    }

    fn require_id<'a>(&self, handle: &'a ResourceHandle) -> Result<&'a str, HiveError> {
        handle.remote_id().ok_or_else(|| HiveError::ResourceNotFound {
            kind: handle.kind(),
            name: handle.name().to_string(),
        })
    }

    fn retry_to_hive(&self, error: RetryError, handle: &ResourceHandle) -> HiveError {
        match error {
            RetryError::Exhausted { attempts, last } if last.is_conflict() => HiveError::ResourceConflict {
                kind: handle.kind(),
                name: handle.name().to_string(),
                attempts,
                detail: last.to_string(),
            },
            RetryError::Exhausted { last, .. } | RetryError::Fatal(last) => HiveError::Remote(last),
            RetryError::Cancelled => HiveError::Cancelled,
        }
    }

    /// 删除一个已存在的资源以便重建（不连带删除角色）
    async fn replace(&self, existing: &RemoteResource) {
        let mut report = TeardownReport::default();
        match existing.kind {
            ResourceKind::Agent => {
                self.remove_agent(&existing.name, &existing.remote_id, true, &mut report)
                    .await
            }
            ResourceKind::Alias => self.remove_alias(existing, &mut report).await,
            ResourceKind::BackingFunction => {
                self.remove_function(&existing.name, &existing.remote_id, &mut report)
                    .await
            }
            ResourceKind::Role => {
                self.remove_role(&existing.name, &existing.remote_id, &mut report)
                    .await
            }
        }
        if !report.is_clean() {
            tracing::warn!(
                "Replacing {} '{}' left {} failed deletions, creation may conflict",
                existing.kind,
                existing.name,
                report.failures().len()
            );
        }
    }

    /// 尽力删除资源及其从属资源
    ///
    /// - agent：先删别名，再删 agent，再补扫一次别名；agent 已不存在时用缓存 id 清理孤儿别名
    /// - 后端函数：先撤销调用授权，再删函数，最后删其执行角色
    /// - 角色：先删内联策略，再删角色
    /// - 别名：只在所属 agent 内唯一，名称须写成 `agent/alias`
    pub async fn teardown(&self, kind: ResourceKind, name: &str) -> Result<TeardownReport, HiveError> {
        if self.cancel.is_cancelled() {
            return Err(HiveError::Cancelled);
        }
        let key = ResourceKey::new(kind, name);
        let _guard = if self.config.serialize_same_name {
            Some(self.locks.acquire(&key).await)
        } else {
            None
        };

        let mut report = TeardownReport::default();
        match kind {
            ResourceKind::Agent => self.teardown_agent(name, &mut report).await,
            ResourceKind::Alias => match name.split_once('/') {
                Some((agent_name, alias_name)) => {
                    self.teardown_scoped_alias(agent_name, alias_name, &mut report)
                        .await
                }
                None => {
                    return Err(HiveError::Config(format!(
                        "alias '{}' must be named as <agent>/<alias> for teardown",
                        name
                    )))
                }
            },
            ResourceKind::BackingFunction => self.teardown_function(name, &mut report).await,
            ResourceKind::Role => match self.control.get_resource_by_name(kind, name, None).await {
                Ok(Some(role)) => self.remove_role(name, &role.remote_id, &mut report).await,
                Ok(None) => report.record(kind, name, StepOutcome::Absent),
                Err(e) => report.record(kind, name, StepOutcome::from_result(Err(e))),
            },
        }
        Ok(report)
    }

    /// 删除某个 agent 下的一个别名；agent 已不存在时用缓存 id 定位
    pub async fn teardown_alias(&self, agent_name: &str, alias_name: &str) -> Result<TeardownReport, HiveError> {
        if self.cancel.is_cancelled() {
            return Err(HiveError::Cancelled);
        }
        let mut report = TeardownReport::default();
        self.teardown_scoped_alias(agent_name, alias_name, &mut report)
            .await;
        Ok(report)
    }

    async fn teardown_scoped_alias(&self, agent_name: &str, alias_name: &str, report: &mut TeardownReport) {
        let kind = ResourceKind::Alias;
        let agent_id = match self
            .control
            .get_resource_by_name(ResourceKind::Agent, agent_name, None)
            .await
        {
            Ok(found) => found.map(|r| r.remote_id).or_else(|| {
                self.known(ResourceKind::Agent, agent_name, None)
                    .and_then(|h| h.remote_id().map(String::from))
            }),
            Err(e) => {
                report.record(kind, alias_name, StepOutcome::from_result(Err(e)));
                return;
            }
        };
        let Some(agent_id) = agent_id else {
            report.record(kind, alias_name, StepOutcome::Absent);
            return;
        };

        let key = scoped_key(kind, alias_name, Some(&agent_id));
        let _guard = if self.config.serialize_same_name {
            Some(self.locks.acquire(&key).await)
        } else {
            None
        };
        match self
            .control
            .get_resource_by_name(kind, alias_name, Some(&agent_id))
            .await
        {
            Ok(Some(alias)) => self.remove_alias(&alias, report).await,
            Ok(None) => report.record(kind, alias_name, StepOutcome::Absent),
            Err(e) if e.is_not_found() => report.record(kind, alias_name, StepOutcome::Absent),
            Err(e) => report.record(kind, alias_name, StepOutcome::from_result(Err(e))),
        }
    }

    async fn teardown_agent(&self, name: &str, report: &mut TeardownReport) {
        let kind = ResourceKind::Agent;
        let existing = match self.control.get_resource_by_name(kind, name, None).await {
            Ok(found) => found,
            Err(e) => {
                report.record(kind, name, StepOutcome::from_result(Err(e)));
                return;
            }
        };
        let exists = existing.is_some();
        let agent_id = existing
            .map(|r| r.remote_id)
            .or_else(|| self.known(kind, name, None).and_then(|h| h.remote_id().map(String::from)));

        match agent_id {
            Some(id) => self.remove_agent(name, &id, exists, report).await,
            None => report.record(kind, name, StepOutcome::Absent),
        }
    }

    async fn remove_agent(&self, name: &str, agent_id: &str, exists: bool, report: &mut TeardownReport) {
        let kind = ResourceKind::Agent;
        if exists {
            let key = ResourceKey::new(kind, name);
            if let Err(e) = self.wait_settled(&key, kind, agent_id, None).await {
                tracing::warn!("Agent '{}' did not settle before deletion: {}", name, e);
            }
        }

        self.sweep_aliases(agent_id, report).await;
        if exists {
            let result = self.control.delete_resource(kind, agent_id, None).await;
            report.record(kind, name, StepOutcome::from_result(result));
        } else {
            report.record(kind, name, StepOutcome::Absent);
        }
        self.sweep_aliases(agent_id, report).await;

        self.forget(|h| {
            (h.kind() == kind && h.name() == name)
                || (h.kind() == ResourceKind::Alias && h.parent_id() == Some(agent_id))
        });
    }

    async fn sweep_aliases(&self, agent_id: &str, report: &mut TeardownReport) {
        let aliases = match self
            .control
            .list_resources(ResourceKind::Alias, Some(agent_id))
            .await
        {
            Ok(aliases) => aliases,
            Err(RemoteError::NotFound(_)) => return,
            Err(e) => {
                report.record(ResourceKind::Alias, format!("{}/*", agent_id), StepOutcome::Failed(e.to_string()));
                return;
            }
        };
        for alias in &aliases {
            self.remove_alias(alias, report).await;
        }
    }

    async fn remove_alias(&self, alias: &RemoteResource, report: &mut TeardownReport) {
        let result = self
            .control
            .delete_resource(ResourceKind::Alias, &alias.remote_id, alias.parent_id.as_deref())
            .await;
        report.record(ResourceKind::Alias, alias.name.clone(), StepOutcome::from_result(result));
        self.forget(|h| h.kind() == ResourceKind::Alias && h.remote_id() == Some(alias.remote_id.as_str()));
    }

    async fn teardown_function(&self, name: &str, report: &mut TeardownReport) {
        let kind = ResourceKind::BackingFunction;
        let info = match self.functions.get_by_name(name).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                report.record(kind, name, StepOutcome::Absent);
                return;
            }
            Err(e) => {
                report.record(kind, name, StepOutcome::from_result(Err(e)));
                return;
            }
        };

        self.remove_function(name, &info.function_id, report).await;

        if let Some(role_name) = &info.role_name {
            match self
                .control
                .get_resource_by_name(ResourceKind::Role, role_name, None)
                .await
            {
                Ok(Some(role)) => self.remove_role(role_name, &role.remote_id, report).await,
                Ok(None) => report.record(ResourceKind::Role, role_name.clone(), StepOutcome::Absent),
                Err(e) => report.record(ResourceKind::Role, role_name.clone(), StepOutcome::from_result(Err(e))),
            }
        }
    }

    async fn remove_function(&self, name: &str, function_id: &str, report: &mut TeardownReport) {
        match self.functions.list_callers(function_id).await {
            Ok(callers) => {
                for caller in callers {
                    if let Err(e) = self.functions.revoke_caller(function_id, &caller).await {
                        if !e.is_not_found() {
                            tracing::warn!("Failed to revoke caller {} on '{}': {}", caller, name, e);
                        }
                    }
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!("Failed to list callers of '{}': {}", name, e),
        }

        let result = self.functions.delete(function_id).await;
        report.record(ResourceKind::BackingFunction, name, StepOutcome::from_result(result));
        self.forget(|h| h.kind() == ResourceKind::BackingFunction && h.name() == name);
    }

    async fn remove_role(&self, name: &str, role_id: &str, report: &mut TeardownReport) {
        match self.control.list_role_policies(role_id).await {
            Ok(policies) => {
                for policy in policies {
                    if let Err(e) = self.control.delete_role_policy(role_id, &policy).await {
                        if !e.is_not_found() {
                            tracing::warn!("Failed to delete policy '{}' on role '{}': {}", policy, name, e);
                        }
                    }
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!("Failed to list policies of role '{}': {}", name, e),
        }

        let result = self.control.delete_resource(ResourceKind::Role, role_id, None).await;
        report.record(ResourceKind::Role, name, StepOutcome::from_result(result));
        self.forget(|h| h.kind() == ResourceKind::Role && h.name() == name);
    }
}
