//! Chat message types shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Who authored a message. Serialized lowercase to match the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Whether messages with this role count toward the context window.
    pub fn counts_toward_context(&self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }

    /// Resolve a role from either the current string form or the legacy
    /// `is_user` boolean shape. Returns `None` when neither is present.
    pub fn resolve(role: Option<&str>, is_user: Option<bool>) -> Option<Role> {
        match role {
            Some("system") => Some(Role::System),
            Some("user") => Some(Role::User),
            Some("assistant") => Some(Role::Assistant),
            Some(_) => None,
            None => is_user.map(|u| if u { Role::User } else { Role::Assistant }),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of tool an agentic model invoked mid-response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Search,
    CodeExecution,
    #[serde(other)]
    Unknown,
}

/// Record of one tool invocation performed by an agentic model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedTool {
    #[serde(rename = "type")]
    pub kind: ToolKind,
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// One turn of the conversation. Immutable once appended to the history.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Model that produced an assistant message, for the history caption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub executed_tools: Vec<ExecutedTool>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, model_used: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.model_used = Some(model_used.into());
        msg
    }

    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            model_used: None,
            executed_tools: Vec::new(),
        }
    }
}

// Older exports stored a boolean `is_user` flag instead of a role string.
// Normalize to `Role` once here so nothing downstream ever sees both shapes.
impl<'de> Deserialize<'de> for ChatMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Shape {
            #[serde(default)]
            role: Option<String>,
            #[serde(default)]
            is_user: Option<bool>,
            content: String,
            #[serde(default)]
            model_used: Option<String>,
            #[serde(default)]
            executed_tools: Vec<ExecutedTool>,
        }

        let shape = Shape::deserialize(deserializer)?;
        let role = Role::resolve(shape.role.as_deref(), shape.is_user)
            .ok_or_else(|| serde::de::Error::custom("message has no resolvable role"))?;
        Ok(ChatMessage {
            role,
            content: shape.content,
            model_used: shape.model_used,
            executed_tools: shape.executed_tools,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_resolves_from_string() {
        assert_eq!(Role::resolve(Some("assistant"), None), Some(Role::Assistant));
        assert_eq!(Role::resolve(Some("user"), Some(false)), Some(Role::User));
        assert_eq!(Role::resolve(Some("narrator"), None), None);
    }

    #[test]
    fn role_resolves_from_legacy_flag() {
        assert_eq!(Role::resolve(None, Some(true)), Some(Role::User));
        assert_eq!(Role::resolve(None, Some(false)), Some(Role::Assistant));
        assert_eq!(Role::resolve(None, None), None);
    }

    #[test]
    fn deserialize_normalizes_legacy_shape() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"is_user": true, "content": "hola"}"#).unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hola");

        let msg: ChatMessage =
            serde_json::from_str(r#"{"role": "assistant", "content": "hi"}"#).unwrap();
        assert_eq!(msg.role, Role::Assistant);
    }

    #[test]
    fn deserialize_rejects_undeterminable_role() {
        let result = serde_json::from_str::<ChatMessage>(r#"{"content": "?"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn executed_tool_unknown_type_is_tolerated() {
        let tool: ExecutedTool =
            serde_json::from_str(r#"{"type": "browse", "input": {}, "output": {}}"#).unwrap();
        assert_eq!(tool.kind, ToolKind::Unknown);
    }
}
