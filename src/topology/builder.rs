//! 协作拓扑构建
//!
//! 1. 确保共用的执行角色
//! 2. 并发确保各协作者（后端函数、agent、别名）就绪
//! 3. 确保 supervisor，按名称补齐缺失的协作者关联（逐个、串行）；
//!    已关联但别名 ARN 过期（协作者别名被重建）的先解除再重新关联
//! 4. 有变化时 prepare supervisor，并让别名指向新版本
//!
//! 全部复用时不产生任何写操作。

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::try_join_all;
use serde_json::Value;

use super::types::{AgentTopology, CollaboratorBinding};
use crate::core::HiveError;
use crate::lifecycle::{LifecycleManager, Provisioned, TeardownReport};
use crate::remote::{CollaboratorAssociation, FunctionBinding};
use crate::resource::{
    AgentSpec, AliasSpec, CollaborationMode, FunctionSpec, ResourceHandle, ResourceKind,
    ResourceSpec, RoleSpec,
};

#[derive(Debug, Clone)]
pub struct SupervisorDefinition {
    pub name: String,
    pub agent: AgentSpec,
    pub alias_name: String,
}

/// 协作者的后端函数
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub spec: FunctionSpec,
    /// spec.role_name 对应的角色定义；为 None 时认为角色已由外部管理
    pub role: Option<RoleSpec>,
    pub group_name: String,
    pub description: String,
    pub functions: Value,
}

#[derive(Debug, Clone)]
pub struct CollaboratorDefinition {
    pub name: String,
    pub agent: AgentSpec,
    pub alias_name: String,
    pub association_name: String,
    /// 告诉 supervisor 何时委派给该协作者
    pub collaboration_instruction: String,
    pub relay_history: bool,
    pub function: Option<FunctionDefinition>,
}

pub struct AgentGraphBuilder {
    manager: Arc<LifecycleManager>,
    execution_role: Option<(String, RoleSpec)>,
}

impl AgentGraphBuilder {
    pub fn new(manager: Arc<LifecycleManager>) -> Self {
        Self {
            manager,
            execution_role: None,
        }
    }

    /// 所有 agent 共用的执行角色；agent 未指定角色时使用
    pub fn with_execution_role(mut self, name: impl Into<String>, spec: RoleSpec) -> Self {
        self.execution_role = Some((name.into(), spec));
        self
    }

    pub fn manager(&self) -> &Arc<LifecycleManager> {
        &self.manager
    }

    fn with_default_role(&self, agent: &AgentSpec) -> AgentSpec {
        let mut agent = agent.clone();
        if agent.role_name.is_none() {
            if let Some((role, _)) = &self.execution_role {
                agent.role_name = Some(role.clone());
            }
        }
        agent
    }

    pub async fn build(
        &self,
        supervisor: &SupervisorDefinition,
        collaborators: &[CollaboratorDefinition],
    ) -> Result<AgentTopology, HiveError> {
        if let Some((name, spec)) = &self.execution_role {
            self.manager
                .ensure(ResourceKind::Role, name, &ResourceSpec::Role(spec.clone()))
                .await?;
        }

        let bindings = try_join_all(collaborators.iter().map(|c| self.realize_collaborator(c))).await?;
        tracing::info!("{} collaborators ready", bindings.len());

        let supervisor_spec = self.with_default_role(&supervisor.agent);
        let supervisor_spec = supervisor_spec.with_collaboration(match supervisor.agent.collaboration {
            CollaborationMode::Disabled => CollaborationMode::SupervisorRouter,
            mode => mode,
        });
        let (mut supervisor_handle, provisioned) = self
            .manager
            .ensure_tracked(
                ResourceKind::Agent,
                &supervisor.name,
                &ResourceSpec::Agent(supervisor_spec),
            )
            .await?;
        let mut changed = provisioned == Provisioned::Created;

        let supervisor_id = supervisor_handle
            .remote_id()
            .map(String::from)
            .ok_or_else(|| HiveError::ResourceNotFound {
                kind: ResourceKind::Agent,
                name: supervisor.name.clone(),
            })?;
        let mut associated: HashMap<String, String> = self
            .manager
            .control()
            .list_collaborators(&supervisor_id)
            .await?
            .into_iter()
            .map(|a| (a.collaborator_name, a.alias_arn))
            .collect();

        for (definition, binding) in collaborators.iter().zip(&bindings) {
            let alias_arn = binding.alias.arn().unwrap_or_default().to_string();
            match associated.get(&binding.association_name) {
                Some(current) if *current == alias_arn => {
                    tracing::debug!(
                        "Collaborator '{}' already associated with '{}'",
                        binding.association_name,
                        supervisor.name
                    );
                    continue;
                }
                Some(current) => {
                    tracing::info!(
                        "Collaborator '{}' on '{}' points at stale alias {}, reassociating",
                        binding.association_name,
                        supervisor.name,
                        current
                    );
                    supervisor_handle = self
                        .manager
                        .disassociate(&supervisor_handle, &binding.association_name)
                        .await?;
                }
                None => {}
            }
            let association = CollaboratorAssociation {
                collaborator_name: binding.association_name.clone(),
                alias_arn: alias_arn.clone(),
                instruction: definition.collaboration_instruction.clone(),
                relay_history: binding.relay_history,
            };
            supervisor_handle = self.manager.associate(&supervisor_handle, &association).await?;
            associated.insert(binding.association_name.clone(), alias_arn);
            changed = true;
        }

        if changed {
            supervisor_handle = self.manager.prepare(&supervisor_handle).await?;
        }

        let supervisor_alias = self
            .ensure_alias(&supervisor_id, &supervisor.alias_name, changed)
            .await?;

        tracing::info!(
            "Topology '{}' ready: agent {}, alias {}",
            supervisor.name,
            supervisor_id,
            supervisor_alias.remote_id().unwrap_or_default()
        );

        Ok(AgentTopology {
            supervisor: supervisor_handle,
            supervisor_alias,
            collaborators: bindings,
        })
    }

    async fn realize_collaborator(
        &self,
        definition: &CollaboratorDefinition,
    ) -> Result<CollaboratorBinding, HiveError> {
        let function = match &definition.function {
            Some(function) => Some(self.ensure_function(function).await?),
            None => None,
        };

        let (agent, provisioned) = self
            .manager
            .ensure_tracked(
                ResourceKind::Agent,
                &definition.name,
                &ResourceSpec::Agent(self.with_default_role(&definition.agent)),
            )
            .await?;
        let agent_created = provisioned == Provisioned::Created;
        let function_created = matches!(function, Some((_, Provisioned::Created)));

        let mut agent = agent;
        let changed = agent_created || function_created;
        if changed {
            if let (Some(def), Some((handle, _))) = (&definition.function, &function) {
                let agent_id = agent.remote_id().unwrap_or_default().to_string();
                self.manager.authorize_caller(handle, &agent_id).await?;
                let binding = FunctionBinding {
                    group_name: def.group_name.clone(),
                    function_id: handle.remote_id().unwrap_or_default().to_string(),
                    description: def.description.clone(),
                    functions: def.functions.clone(),
                };
                self.manager.attach_function(&agent, &binding).await?;
            }
            agent = self.manager.prepare(&agent).await?;
        }

        let agent_id = agent
            .remote_id()
            .map(String::from)
            .ok_or_else(|| HiveError::ResourceNotFound {
                kind: ResourceKind::Agent,
                name: definition.name.clone(),
            })?;
        let alias = self
            .ensure_alias(&agent_id, &definition.alias_name, changed)
            .await?;

        Ok(CollaboratorBinding {
            sub_agent: agent,
            alias,
            association_name: definition.association_name.clone(),
            relay_history: definition.relay_history,
            function: function.map(|(handle, _)| handle),
        })
    }

    async fn ensure_function(
        &self,
        function: &FunctionDefinition,
    ) -> Result<(ResourceHandle, Provisioned), HiveError> {
        if let (Some(role_name), Some(role)) = (&function.spec.role_name, &function.role) {
            self.manager
                .ensure(ResourceKind::Role, role_name, &ResourceSpec::Role(role.clone()))
                .await?;
        }
        self.manager
            .ensure_tracked(
                ResourceKind::BackingFunction,
                &function.name,
                &ResourceSpec::BackingFunction(function.spec.clone()),
            )
            .await
    }

    /// agent 在本次构建中重新 prepare 过时，复用的别名需要重建
    async fn ensure_alias(
        &self,
        agent_id: &str,
        alias_name: &str,
        agent_changed: bool,
    ) -> Result<ResourceHandle, HiveError> {
        let spec = ResourceSpec::Alias(AliasSpec {
            agent_id: agent_id.to_string(),
        });
        let (alias, provisioned) = self
            .manager
            .ensure_tracked(ResourceKind::Alias, alias_name, &spec)
            .await?;
        if agent_changed && provisioned == Provisioned::Reused {
            return self.manager.refresh_alias(&alias, &spec).await;
        }
        Ok(alias)
    }

    /// 按引用方优先的顺序删除整个拓扑
    ///
    /// supervisor（及其别名）→ 各协作者（别名、agent、后端函数及其角色）→ 共用执行角色
    pub async fn teardown(
        &self,
        supervisor: &SupervisorDefinition,
        collaborators: &[CollaboratorDefinition],
    ) -> Result<TeardownReport, HiveError> {
        let mut report = self
            .manager
            .teardown(ResourceKind::Agent, &supervisor.name)
            .await?;

        for collaborator in collaborators {
            report.merge(
                self.manager
                    .teardown(ResourceKind::Agent, &collaborator.name)
                    .await?,
            );
            if let Some(function) = &collaborator.function {
                report.merge(
                    self.manager
                        .teardown(ResourceKind::BackingFunction, &function.name)
                        .await?,
                );
            }
        }

        if let Some((role, _)) = &self.execution_role {
            report.merge(self.manager.teardown(ResourceKind::Role, role).await?);
        }

        if report.is_clean() {
            tracing::info!("Topology '{}' torn down", supervisor.name);
        } else {
            tracing::warn!(
                "Topology '{}' teardown finished with {} failed steps",
                supervisor.name,
                report.failures().len()
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleConfig;
    use crate::remote::{CallLog, MockCall, MockControlPlane, MockFunctionRegistry};
    use serde_json::json;

    fn collaborator(name: &str, with_function: bool) -> CollaboratorDefinition {
        CollaboratorDefinition {
            name: name.to_string(),
            agent: AgentSpec::new(format!("{} agent", name), "help", "model-a"),
            alias_name: "live".to_string(),
            association_name: name.to_string(),
            collaboration_instruction: format!("Use {} for its specialty.", name),
            relay_history: false,
            function: with_function.then(|| FunctionDefinition {
                name: format!("{}_fn", name),
                spec: FunctionSpec::new(b"zip".to_vec(), "lambda_function.lambda_handler")
                    .with_role(format!("{}_fn_role", name)),
                role: Some(RoleSpec::function_execution()),
                group_name: format!("{}_actions", name),
                description: "actions".to_string(),
                functions: json!([{ "name": "run" }]),
            }),
        }
    }

    fn supervisor() -> SupervisorDefinition {
        SupervisorDefinition {
            name: "advisor".to_string(),
            agent: AgentSpec::new("advisor", "coordinate", "model-a"),
            alias_name: "live".to_string(),
        }
    }

    fn setup() -> (MockControlPlane, MockFunctionRegistry, AgentGraphBuilder) {
        let log = CallLog::new();
        let control = MockControlPlane::with_log(log.clone()).with_transitional_polls(1);
        let functions = MockFunctionRegistry::with_log(log).with_transitional_polls(1);
        let manager = Arc::new(LifecycleManager::new(
            Arc::new(control.clone()),
            Arc::new(functions.clone()),
            LifecycleConfig::default(),
        ));
        let builder = AgentGraphBuilder::new(manager)
            .with_execution_role("exec_role", RoleSpec::agent_execution());
        (control, functions, builder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_wires_functions_and_associates() {
        let (control, functions, builder) = setup();
        let topology = builder
            .build(&supervisor(), &[collaborator("forecaster", true), collaborator("explainer", false)])
            .await
            .unwrap();

        assert!(topology.supervisor.is_ready());
        assert!(topology.supervisor_alias.is_ready());
        let supervisor_id = topology.supervisor.remote_id().unwrap();
        assert_eq!(
            control.association_names(supervisor_id),
            vec!["forecaster".to_string(), "explainer".to_string()]
        );

        let forecaster = &topology.collaborators[0];
        let agent_id = forecaster.sub_agent.remote_id().unwrap();
        assert_eq!(control.attached_groups(agent_id), vec!["forecaster_actions".to_string()]);
        assert_eq!(functions.callers_of("forecaster_fn"), vec![agent_id.to_string()]);
        assert!(topology.collaborators[1].function.is_none());

        let target = topology.target();
        assert_eq!(target.collaborator_names.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebuild_reassociates_refreshed_collaborator_alias() {
        let (control, _, builder) = setup();
        let collaborators = [collaborator("forecaster", true)];
        let first = builder.build(&supervisor(), &collaborators).await.unwrap();
        let stale_arn = first.collaborators[0].alias.arn().unwrap().to_string();

        builder
            .manager()
            .teardown(ResourceKind::BackingFunction, "forecaster_fn")
            .await
            .unwrap();
        let second = builder.build(&supervisor(), &collaborators).await.unwrap();

        let forecaster = &second.collaborators[0];
        let fresh_arn = forecaster.alias.arn().unwrap();
        assert_ne!(fresh_arn, stale_arn);

        let supervisor_id = second.supervisor.remote_id().unwrap();
        let associations = control.associations(supervisor_id);
        assert_eq!(associations.len(), 1);
        assert_eq!(associations[0].alias_arn, fresh_arn);
        assert_eq!(
            control
                .log()
                .count(|c| matches!(c, MockCall::Disassociate { .. })),
            1
        );

        let agent_id = forecaster.sub_agent.remote_id().unwrap();
        let bindings = control.function_bindings(agent_id);
        assert_eq!(bindings.len(), 1);
        assert_eq!(
            Some(bindings[0].function_id.as_str()),
            forecaster.function.as_ref().and_then(|f| f.remote_id())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebuild_creates_nothing() {
        let (control, _, builder) = setup();
        let collaborators = [collaborator("forecaster", true), collaborator("explainer", false)];
        let first = builder.build(&supervisor(), &collaborators).await.unwrap();
        control.log().clear();

        let second = builder.build(&supervisor(), &collaborators).await.unwrap();
        assert_eq!(first.target(), second.target());

        let writes = control.log().count(|c| {
            matches!(
                c,
                MockCall::Create(..)
                    | MockCall::Delete(..)
                    | MockCall::Associate { .. }
                    | MockCall::Prepare(_)
                    | MockCall::AttachFunction { .. }
                    | MockCall::AuthorizeCaller { .. }
            )
        });
        assert_eq!(writes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_association_added_and_alias_refreshed() {
        let (control, _, builder) = setup();
        let first = builder
            .build(&supervisor(), &[collaborator("forecaster", false)])
            .await
            .unwrap();

        let second = builder
            .build(&supervisor(), &[collaborator("forecaster", false), collaborator("explainer", false)])
            .await
            .unwrap();

        assert_eq!(first.supervisor.remote_id(), second.supervisor.remote_id());
        assert_ne!(first.supervisor_alias.remote_id(), second.supervisor_alias.remote_id());
        let supervisor_id = second.supervisor.remote_id().unwrap();
        assert_eq!(control.association_names(supervisor_id).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_removes_everything() {
        let (control, functions, builder) = setup();
        let collaborators = [collaborator("forecaster", true), collaborator("explainer", false)];
        builder.build(&supervisor(), &collaborators).await.unwrap();

        let report = builder.teardown(&supervisor(), &collaborators).await.unwrap();
        assert!(report.is_clean());
        assert!(control.resources(ResourceKind::Agent).is_empty());
        assert!(control.resources(ResourceKind::Alias).is_empty());
        assert!(control.resources(ResourceKind::Role).is_empty());
        assert!(functions.function_names().is_empty());

        let again = builder.teardown(&supervisor(), &collaborators).await.unwrap();
        assert!(again.is_clean());
        assert!(again.deleted(ResourceKind::Agent).is_empty());
    }
}
