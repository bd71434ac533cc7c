//! Hive - 托管多 agent 服务的客户端编排
//!
//! 入口：初始化日志、加载配置、构建（或复用）拓扑，然后调用 supervisor；
//! `hive teardown` 按引用方优先的顺序删除整个拓扑。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use hive::config::load_config;
use hive::core::{HiveError, ShutdownManager};
use hive::lifecycle::{LifecycleConfig, LifecycleManager};
use hive::remote::{ControlPlane, FsSink, FunctionRegistry, HttpControlPlane, HttpFunctionRegistry, HttpTransport};
use hive::resource::RoleSpec;
use hive::stream::{InvocationSession, StreamConsumer, StreamOptions};
use hive::topology::{AgentGraphBuilder, TaskPlan, TopologyDefinition};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = std::env::var("HIVE_CONFIG").ok().map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;

    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();

    let transport = HttpTransport::from_config(&config.control_plane);
    let control: Arc<dyn ControlPlane> = Arc::new(HttpControlPlane::new(transport.clone()));
    let functions: Arc<dyn FunctionRegistry> = Arc::new(HttpFunctionRegistry::new(transport));
    let manager = Arc::new(
        LifecycleManager::new(
            control.clone(),
            functions,
            LifecycleConfig::from(&config.lifecycle),
        )
        .with_cancel_token(shutdown.scope("provisioning")),
    );

    let definition = TopologyDefinition::from_config(&config.topology, Path::new("."))
        .context("Invalid [topology] configuration")?;
    let builder = AgentGraphBuilder::new(manager)
        .with_execution_role(definition.execution_role.clone(), RoleSpec::agent_execution());

    if args.first().map(String::as_str) == Some("teardown") {
        let report = builder
            .teardown(&definition.supervisor, &definition.collaborators)
            .await
            .context("Teardown cancelled")?;
        for step in &report.steps {
            println!("{:<18} {:<32} {:?}", step.kind.to_string(), step.name, step.outcome);
        }
        if !report.is_clean() {
            bail!("{} teardown steps failed", report.failures().len());
        }
        return Ok(());
    }

    let input = args.join(" ");
    if input.is_empty() && config.tasks.items.is_empty() {
        bail!("Usage: hive <question> | hive teardown");
    }

    let topology = builder
        .build(&definition.supervisor, &definition.collaborators)
        .await
        .context("Failed to build agent topology")?;

    let prompt = if config.tasks.items.is_empty() {
        input
    } else {
        let mut inputs = HashMap::new();
        inputs.insert("input".to_string(), input);
        let prompt = TaskPlan::from_config(&config.tasks, &inputs).render();
        tracing::debug!("Task prompt:\n{}", prompt);
        prompt
    };

    let consumer = StreamConsumer::new(
        control,
        Arc::new(FsSink::new(config.app.output_dir.clone())),
        StreamOptions::from(&config.stream),
    )
    .with_cancel_token(shutdown.scope("invocation"));
    let mut session = InvocationSession::sortable(&definition.supervisor.name);
    tracing::info!("Session id: {}", session.session_id());

    match consumer.invoke(&topology.target(), &prompt, &mut session).await {
        Ok(outcome) => {
            if let Some(control) = &outcome.return_control {
                tracing::warn!(
                    "Agent returned {} function call(s) to the client (invocation {}), no local handler is configured",
                    control.invocation_inputs.len(),
                    control.invocation_id
                );
            }
            println!("{}", outcome.answer);
            println!("\n{}", outcome.telemetry.summary_line());
            Ok(())
        }
        Err(HiveError::StreamInterrupted { reason, partial }) => {
            if let Some(cause) = shutdown.reason() {
                tracing::warn!("Invocation stopped by shutdown ({:?})", cause);
            }
            println!("{}", partial.answer);
            eprintln!("\n{}", partial.telemetry.summary_line());
            Err(anyhow!("Invocation interrupted: {}", reason))
        }
        Err(e) => Err(e).context("Invocation failed"),
    }
}
