//! 任务计划：把一组任务渲染为一次 supervisor 调用的提示词
//!
//! 顺序模式要求逐个完成并把前序产出带入后续任务；并行模式允许无依赖的任务并行。

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::TasksSection;

const SEQUENTIAL_PREAMBLE: &str = "\nPlease perform the following tasks sequentially. Be sure you do not\n\
perform any of them in parallel. If a task will require information produced from a prior task, \n\
be sure to include the details as input to the task.\n\n";

const PARALLEL_PREAMBLE: &str = "\nPlease perform as many of the following tasks in parallel where possible.\n\
When a dependency between tasks is clear, execute those tasks in sequential order. \n\
If a task will require information produced from a prior task,\n\
be sure to include the details as input to the task.\n\n";

const REVIEW_INSTRUCTION: &str =
    "\nBefore returning the final answer, review whether you have achieved the expected output for each task.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    #[default]
    Sequential,
    AllowParallel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub output_type: Option<String>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            output_type: None,
        }
    }

    pub fn with_output_type(mut self, output_type: impl Into<String>) -> Self {
        self.output_type = Some(output_type.into());
        self
    }

    /// 替换描述中的 `{key}` 占位符；未知占位符保持原样
    pub fn with_inputs(mut self, inputs: &HashMap<String, String>) -> Self {
        for (key, value) in inputs {
            self.description = self.description.replace(&format!("{{{}}}", key), value);
        }
        self
    }

    fn render(&self) -> String {
        match &self.output_type {
            Some(output_type) => format!(
                "{} Expected output: {} Output type: {}",
                self.description, self.expected_output, output_type
            ),
            None => format!("{} Expected output: {}", self.description, self.expected_output),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPlan {
    pub mode: TaskMode,
    pub tasks: Vec<Task>,
    pub additional_instructions: String,
}

impl TaskPlan {
    pub fn new(mode: TaskMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_additional_instructions(mut self, text: impl Into<String>) -> Self {
        self.additional_instructions = text.into();
        self
    }

    /// 由配置构造，并用 inputs 填充任务描述
    pub fn from_config(section: &TasksSection, inputs: &HashMap<String, String>) -> Self {
        let tasks = section
            .items
            .iter()
            .map(|t| {
                let task = Task::new(&t.name, &t.description, &t.expected_output).with_inputs(inputs);
                match &t.output_type {
                    Some(output_type) => task.with_output_type(output_type),
                    None => task,
                }
            })
            .collect();
        Self {
            mode: section.mode,
            tasks,
            additional_instructions: section.additional_instructions.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn render(&self) -> String {
        let mut prompt = String::from(match self.mode {
            TaskMode::Sequential => SEQUENTIAL_PREAMBLE,
            TaskMode::AllowParallel => PARALLEL_PREAMBLE,
        });
        for (i, task) in self.tasks.iter().enumerate() {
            prompt.push_str(&format!("Task {}. {}\n", i + 1, task.render()));
        }
        prompt.push_str(REVIEW_INSTRUCTION);
        if !self.additional_instructions.is_empty() {
            prompt.push('\n');
            prompt.push_str(&self.additional_instructions);
        }
        prompt
    }
}
