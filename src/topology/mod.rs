//! 协作拓扑：人设、任务计划、定义与构建

pub mod builder;
pub mod definition;
pub mod persona;
pub mod tasks;
pub mod types;

pub use builder::{AgentGraphBuilder, CollaboratorDefinition, FunctionDefinition, SupervisorDefinition};
pub use definition::TopologyDefinition;
pub use persona::AgentPersona;
pub use tasks::{Task, TaskMode, TaskPlan};
pub use types::{AgentTopology, CollaboratorBinding};
