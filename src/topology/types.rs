//! 已就绪的协作拓扑

use std::collections::{BTreeSet, HashMap};

use crate::resource::ResourceHandle;
use crate::stream::InvocationTarget;

/// 一个协作者及其关联信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorBinding {
    pub sub_agent: ResourceHandle,
    pub alias: ResourceHandle,
    pub association_name: String,
    pub relay_history: bool,
    pub function: Option<ResourceHandle>,
}

/// supervisor 与其协作者
///
/// force_recreate 之后别名 id 会变化，不要跨重建缓存拓扑。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTopology {
    pub supervisor: ResourceHandle,
    pub supervisor_alias: ResourceHandle,
    pub collaborators: Vec<CollaboratorBinding>,
}

impl AgentTopology {
    pub fn association_names(&self) -> BTreeSet<String> {
        self.collaborators
            .iter()
            .map(|c| c.association_name.clone())
            .collect()
    }

    /// 调用目标，附带 "<agentId>/<aliasId>" 到协作者名称的映射
    pub fn target(&self) -> InvocationTarget {
        let collaborator_names: HashMap<String, String> = self
            .collaborators
            .iter()
            .map(|c| {
                let key = format!(
                    "{}/{}",
                    c.sub_agent.remote_id().unwrap_or_default(),
                    c.alias.remote_id().unwrap_or_default()
                );
                (key, c.association_name.clone())
            })
            .collect();

        InvocationTarget {
            agent_id: self.supervisor.remote_id().unwrap_or_default().to_string(),
            alias_id: self.supervisor_alias.remote_id().unwrap_or_default().to_string(),
            collaborator_names,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{RemoteResource, RemoteStatus, ResourceKind};

    fn ready(kind: ResourceKind, name: &str, id: &str) -> ResourceHandle {
        ResourceHandle::from_remote(&RemoteResource {
            kind,
            name: name.to_string(),
            remote_id: id.to_string(),
            status: RemoteStatus::new("PREPARED"),
            parent_id: None,
            arn: None,
            updated_at: None,
        })
    }

    #[test]
    fn test_target_maps_alias_keys_to_names() {
        let topology = AgentTopology {
            supervisor: ready(ResourceKind::Agent, "advisor", "SUP1"),
            supervisor_alias: ready(ResourceKind::Alias, "live", "SAL1"),
            collaborators: vec![CollaboratorBinding {
                sub_agent: ready(ResourceKind::Agent, "forecaster", "AG7"),
                alias: ready(ResourceKind::Alias, "live", "AL9"),
                association_name: "forecaster".to_string(),
                relay_history: false,
                function: None,
            }],
        };

        let target = topology.target();
        assert_eq!(target.agent_id, "SUP1");
        assert_eq!(target.alias_id, "SAL1");
        assert_eq!(
            target.collaborator_names.get("AG7/AL9").map(String::as_str),
            Some("forecaster")
        );
    }
}
