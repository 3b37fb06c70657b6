//! Data models for context compression

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Stable identifier of a turn within a conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(String);

impl TurnId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TurnId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TurnId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of conversation context.
///
/// Turns are immutable once built: the fields are private and every
/// "modifier" consumes the turn and returns a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    id: TurnId,
    role: Role,
    content: String,
    /// Advisory logical clock; insertion order is authoritative
    timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<f64>,
}

impl Turn {
    pub fn new(id: impl Into<TurnId>, role: Role, content: impl Into<String>, timestamp: u64) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp,
            priority: None,
        }
    }

    pub fn system(id: impl Into<TurnId>, content: impl Into<String>, timestamp: u64) -> Self {
        Self::new(id, Role::System, content, timestamp)
    }

    pub fn user(id: impl Into<TurnId>, content: impl Into<String>, timestamp: u64) -> Self {
        Self::new(id, Role::User, content, timestamp)
    }

    pub fn assistant(id: impl Into<TurnId>, content: impl Into<String>, timestamp: u64) -> Self {
        Self::new(id, Role::Assistant, content, timestamp)
    }

    pub fn tool(id: impl Into<TurnId>, content: impl Into<String>, timestamp: u64) -> Self {
        Self::new(id, Role::Tool, content, timestamp)
    }

    /// Pin an explicit importance score (higher is kept first)
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn id(&self) -> &TurnId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Explicit priority, if the caller set one
    pub fn priority(&self) -> Option<f64> {
        self.priority
    }
}

/// Ordered turns plus the budget they must fit in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionRequest {
    /// Model whose tokenizer measures the turns
    #[serde(default)]
    pub model: String,
    pub turns: Vec<Turn>,
    pub budget_tokens: usize,
    #[serde(default)]
    pub must_keep: BTreeSet<TurnId>,
}

impl CompressionRequest {
    pub fn new(model: impl Into<String>, turns: Vec<Turn>, budget_tokens: usize) -> Self {
        Self {
            model: model.into(),
            turns,
            budget_tokens,
            must_keep: BTreeSet::new(),
        }
    }

    pub fn with_must_keep<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TurnId>,
    {
        self.must_keep.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Mark every system turn as must-keep
    pub fn keep_system_turns(mut self) -> Self {
        let system_ids: Vec<TurnId> = self
            .turns
            .iter()
            .filter(|t| t.role() == Role::System)
            .map(|t| t.id().clone())
            .collect();
        self.must_keep.extend(system_ids);
        self
    }
}

/// Result of a compression pass with bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionOutcome {
    /// Admitted turns in original order
    pub turns: Vec<Turn>,
    pub total_tokens: usize,
    pub budget_tokens: usize,
    /// Turns left out, in original order
    pub dropped: Vec<TurnId>,
}

impl CompressionOutcome {
    pub fn is_within_budget(&self) -> bool {
        self.total_tokens <= self.budget_tokens
    }

    pub fn remaining(&self) -> usize {
        self.budget_tokens.saturating_sub(self.total_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_priority_returns_new_turn() {
        let turn = Turn::user("u1", "hello", 1);
        let pinned = turn.clone().with_priority(5.0);

        assert_eq!(turn.priority(), None);
        assert_eq!(pinned.priority(), Some(5.0));
        assert_eq!(pinned.id(), turn.id());
    }

    #[test]
    fn test_keep_system_turns() {
        let request = CompressionRequest::new(
            "gpt-4",
            vec![
                Turn::system("sys", "be brief", 0),
                Turn::user("u1", "hi", 1),
                Turn::system("sys2", "answer in English", 2),
            ],
            100,
        )
        .keep_system_turns();

        assert_eq!(request.must_keep.len(), 2);
        assert!(request.must_keep.contains(&TurnId::from("sys")));
        assert!(request.must_keep.contains(&TurnId::from("sys2")));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let turn = Turn::assistant("a1", "ok", 3);
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["id"], "a1");
        assert!(json.get("priority").is_none());
    }
}
