//! 调用会话：同一 session_id 下的多轮调用记录

use chrono::Utc;
use uuid::Uuid;

use super::accumulator::Telemetry;

#[derive(Debug, Clone)]
pub struct Turn {
    pub input: String,
    pub answer: String,
    pub telemetry: Telemetry,
}

#[derive(Debug, Clone)]
pub struct InvocationSession {
    session_id: String,
    turns: Vec<Turn>,
}

impl InvocationSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            turns: Vec::new(),
        }
    }

    /// 可按时间排序的会话 id："{prefix}-{unix 秒}-{uuid}"
    pub fn sortable(prefix: &str) -> Self {
        Self::new(format!("{}-{}-{}", prefix, Utc::now().timestamp(), Uuid::new_v4()))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last_answer(&self) -> Option<&str> {
        self.turns.last().map(|t| t.answer.as_str())
    }

    pub(crate) fn push_turn(&mut self, input: &str, answer: &str, telemetry: Telemetry) {
        self.turns.push(Turn {
            input: input.to_string(),
            answer: answer.to_string(),
            telemetry,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sortable_session_id() {
        let session = InvocationSession::sortable("portfolio");
        let parts: Vec<&str> = session.session_id().splitn(3, '-').collect();
        assert_eq!(parts[0], "portfolio");
        assert!(parts[1].parse::<i64>().is_ok());
        assert!(Uuid::parse_str(parts[2]).is_ok());
    }

    #[test]
    fn test_turns_recorded_in_order() {
        let mut session = InvocationSession::new("s1");
        assert_eq!(session.last_answer(), None);
        session.push_turn("q1", "a1", Telemetry::default());
        session.push_turn("q2", "a2", Telemetry::default());
        assert_eq!(session.turns().len(), 2);
        assert_eq!(session.last_answer(), Some("a2"));
    }
}
