//! agent 人设：由 role / goal / backstory 生成指令与描述

use serde::Deserialize;

/// 服务端描述字段上限为 200 字符
pub const MAX_DESCRIPTION_CHARS: usize = 199;

const NO_TOOLS_SUFFIX: &str = "\nYou have no available tools. Rely only on your own knowledge.";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentPersona {
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

impl AgentPersona {
    pub fn new(role: impl Into<String>, goal: impl Into<String>, backstory: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
        }
    }

    /// 没有后端函数的 agent 会被明确告知不要臆造工具调用
    pub fn instructions(&self, has_tools: bool) -> String {
        let mut text = format!(
            "Role: {}\nGoal: {}\nBackstory: {}",
            self.role, self.goal, self.backstory
        );
        if !has_tools {
            text.push_str(NO_TOOLS_SUFFIX);
        }
        text
    }

    pub fn description(&self) -> String {
        self.backstory.chars().take(MAX_DESCRIPTION_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instructions_with_and_without_tools() {
        let persona = AgentPersona::new("Analyst", "Explain charts", "Ten years in BI.");
        assert_eq!(
            persona.instructions(true),
            "Role: Analyst\nGoal: Explain charts\nBackstory: Ten years in BI."
        );
        assert!(persona
            .instructions(false)
            .ends_with("You have no available tools. Rely only on your own knowledge."));
    }

    #[test]
    fn test_description_truncated() {
        let persona = AgentPersona::new("r", "g", "é".repeat(250));
        assert_eq!(persona.description().chars().count(), MAX_DESCRIPTION_CHARS);
    }
}
