//! 从 [topology] 配置生成 supervisor / 协作者定义

use std::path::Path;

use serde_json::{json, Map, Value};

use super::builder::{CollaboratorDefinition, FunctionDefinition, SupervisorDefinition};
use super::persona::AgentPersona;
use crate::config::{FunctionSection, FunctionSignatureSection, TopologySection};
use crate::core::HiveError;
use crate::resource::{AgentSpec, CollaborationMode, FunctionSpec, RoleSpec};

/// 由配置得到的完整拓扑定义
#[derive(Debug, Clone)]
pub struct TopologyDefinition {
    pub execution_role: String,
    pub supervisor: SupervisorDefinition,
    pub collaborators: Vec<CollaboratorDefinition>,
}

impl TopologyDefinition {
    /// 函数代码路径相对 base_dir 解析
    pub fn from_config(section: &TopologySection, base_dir: &Path) -> Result<Self, HiveError> {
        if section.supervisor.name.is_empty() {
            return Err(HiveError::Config("topology.supervisor.name is required".to_string()));
        }

        let mut supervisor_agent = AgentSpec::new(
            section.supervisor.description.clone(),
            section.supervisor.instructions.clone(),
            section
                .supervisor
                .model
                .clone()
                .unwrap_or_else(|| section.default_model.clone()),
        )
        .with_collaboration(CollaborationMode::SupervisorRouter)
        .with_role(section.execution_role.clone());
        if let Some(model) = &section.routing_model {
            supervisor_agent = supervisor_agent.with_routing_model(model.clone());
        }

        let collaborators = section
            .collaborators
            .iter()
            .map(|c| -> Result<CollaboratorDefinition, HiveError> {
                let persona = AgentPersona::new(&c.role, &c.goal, &c.backstory);
                let function = c
                    .function
                    .as_ref()
                    .map(|f| function_definition(f, base_dir))
                    .transpose()?;
                let instruction = persona.instructions(function.is_some());
                let agent = AgentSpec::new(
                    persona.description(),
                    instruction.clone(),
                    c.model.clone().unwrap_or_else(|| section.default_model.clone()),
                )
                .with_role(section.execution_role.clone())
                .with_code_interpreter(c.code_interpreter);

                Ok(CollaboratorDefinition {
                    name: c.name.clone(),
                    agent,
                    alias_name: c.alias_name(),
                    association_name: c.association_name(),
                    collaboration_instruction: instruction,
                    relay_history: c.relay_history,
                    function,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            execution_role: section.execution_role.clone(),
            supervisor: SupervisorDefinition {
                name: section.supervisor.name.clone(),
                agent: supervisor_agent,
                alias_name: section.supervisor.alias_name(),
            },
            collaborators,
        })
    }
}

fn function_definition(section: &FunctionSection, base_dir: &Path) -> Result<FunctionDefinition, HiveError> {
    let path = base_dir.join(&section.code_path);
    let code = std::fs::read(&path).map_err(|e| {
        HiveError::Config(format!("Failed to read function code {}: {}", path.display(), e))
    })?;

    let role_name = section
        .role_name
        .clone()
        .unwrap_or_else(|| format!("{}_role", section.name));
    let mut spec = FunctionSpec::new(code, section.handler.clone()).with_role(role_name);
    if let Some(runtime) = &section.runtime {
        spec.runtime = runtime.clone();
    }
    if let Some(timeout) = section.timeout_secs {
        spec.timeout_secs = timeout;
    }
    for (key, value) in &section.env {
        spec = spec.with_env(key.clone(), value.clone());
    }

    Ok(FunctionDefinition {
        name: section.name.clone(),
        spec,
        role: Some(RoleSpec::function_execution()),
        group_name: section
            .group_name
            .clone()
            .unwrap_or_else(|| format!("{}_actions", section.name)),
        description: section.description.clone(),
        functions: signatures_json(&section.signatures),
    })
}

/// 函数签名转为服务端要求的 JSON 结构
fn signatures_json(signatures: &[FunctionSignatureSection]) -> Value {
    let functions: Vec<Value> = signatures
        .iter()
        .map(|sig| {
            let parameters: Map<String, Value> = sig
                .parameters
                .iter()
                .map(|(name, p)| {
                    (
                        name.clone(),
                        json!({
                            "type": p.param_type,
                            "description": p.description,
                            "required": p.required,
                        }),
                    )
                })
                .collect();
            json!({
                "name": sig.name,
                "description": sig.description,
                "parameters": parameters,
            })
        })
        .collect();
    Value::Array(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollaboratorSection, ParameterSection, SupervisorSection};
    use std::collections::BTreeMap;

    fn section(function: Option<FunctionSection>) -> TopologySection {
        TopologySection {
            supervisor: SupervisorSection {
                name: "advisor".to_string(),
                instructions: "Coordinate.".to_string(),
                ..Default::default()
            },
            routing_model: Some("router-small".to_string()),
            collaborators: vec![CollaboratorSection {
                name: "forecaster".to_string(),
                role: "Forecaster".to_string(),
                goal: "Forecast".to_string(),
                backstory: "Analyst.".to_string(),
                model: None,
                alias_name: None,
                association_name: None,
                relay_history: true,
                code_interpreter: false,
                function,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_supervisor_uses_router_mode() {
        let dir = tempfile::tempdir().unwrap();
        let definition = TopologyDefinition::from_config(&section(None), dir.path()).unwrap();
        let agent = &definition.supervisor.agent;
        assert_eq!(agent.collaboration, CollaborationMode::SupervisorRouter);
        assert_eq!(agent.routing_classifier_model.as_deref(), Some("router-small"));
        assert_eq!(definition.supervisor.alias_name, "live");

        let collaborator = &definition.collaborators[0];
        assert!(collaborator.agent.instruction.ends_with("Rely only on your own knowledge."));
        assert!(collaborator.relay_history);
        assert_eq!(collaborator.association_name, "forecaster");
    }

    #[test]
    fn test_function_code_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("forecast.zip"), b"PK").unwrap();
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "customer_id".to_string(),
            ParameterSection {
                param_type: "int".to_string(),
                description: "customer".to_string(),
                required: true,
            },
        );
        let function = FunctionSection {
            name: "forecast_fn".to_string(),
            code_path: "forecast.zip".into(),
            handler: "lambda_function.lambda_handler".to_string(),
            runtime: None,
            timeout_secs: Some(60),
            env: BTreeMap::new(),
            role_name: None,
            group_name: None,
            description: "forecasts".to_string(),
            signatures: vec![FunctionSignatureSection {
                name: "get_forecast".to_string(),
                description: "forecast".to_string(),
                parameters,
            }],
        };

        let definition = TopologyDefinition::from_config(&section(Some(function)), dir.path()).unwrap();
        let collaborator = &definition.collaborators[0];
        assert!(!collaborator.agent.instruction.contains("no available tools"));

        let function = collaborator.function.as_ref().unwrap();
        assert_eq!(function.spec.code, b"PK".to_vec());
        assert_eq!(function.spec.timeout_secs, 60);
        assert_eq!(function.spec.role_name.as_deref(), Some("forecast_fn_role"));
        assert_eq!(function.group_name, "forecast_fn_actions");
        assert_eq!(function.functions[0]["parameters"]["customer_id"]["type"], "int");
    }

    #[test]
    fn test_missing_code_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let function = FunctionSection {
            name: "f".to_string(),
            code_path: "missing.zip".into(),
            handler: "h".to_string(),
            runtime: None,
            timeout_secs: None,
            env: BTreeMap::new(),
            role_name: None,
            group_name: None,
            description: String::new(),
            signatures: Vec::new(),
        };
        let err = TopologyDefinition::from_config(&section(Some(function)), dir.path()).unwrap_err();
        assert!(matches!(err, HiveError::Config(_)));
    }
}
