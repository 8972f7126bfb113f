//! Context-window assembly: turning the full session history into the
//! bounded message list actually sent upstream.

use serde::Serialize;

use crate::chat::Role;
use crate::registry::get_context_limit;
use crate::session::SessionState;

/// The wire shape of one message: role and content only, with every
/// app-side field stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiMessage {
    pub role: Role,
    pub content: String,
}

impl ApiMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Builds the upstream request body for the active model.
///
/// The result is one system message carrying the configured system prompt,
/// optionally a second system message summarizing recent agentic tool
/// activity, then the last `get_context_limit(model)` user/assistant turns
/// in chronological order. The trailing window is bounded no matter how
/// long the conversation has grown, which is what keeps requests inside the
/// stricter per-family token-per-minute limits.
pub fn prepare_api_messages(state: &SessionState, model_id: &str) -> Vec<ApiMessage> {
    let mut api_messages = vec![ApiMessage::new(
        Role::System,
        state.context.system_prompt.clone(),
    )];

    if state.context.enable_agentic && !state.agentic.is_empty() {
        api_messages.push(ApiMessage::new(
            Role::System,
            state.agentic.context_for_model(),
        ));
    }

    let limit = get_context_limit(model_id);
    tracing::info!(model = model_id, limit, "limiting context window");

    let start = state.messages.len().saturating_sub(limit);
    for msg in &state.messages[start..] {
        if msg.role.counts_toward_context() {
            api_messages.push(ApiMessage::new(msg.role, msg.content.clone()));
        }
    }

    api_messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatMessage, ExecutedTool, ToolKind};
    use crate::registry::DEFAULT_CONTEXT_MESSAGES;
    use chrono::Utc;
    use serde_json::json;

    fn state_with_history(turns: usize) -> SessionState {
        let mut state = SessionState::new();
        for i in 0..turns {
            if i % 2 == 0 {
                state.push_message(ChatMessage::user(format!("question {i}")));
            } else {
                state.push_message(ChatMessage::assistant(format!("answer {i}"), "m"));
            }
        }
        state
    }

    #[test]
    fn window_is_bounded_for_any_history_length() {
        for len in [0usize, 1, 5, 12, 40] {
            let state = state_with_history(len);
            let msgs = prepare_api_messages(&state, "unknown-model");
            let history: Vec<_> = msgs.iter().filter(|m| m.role != Role::System).collect();
            assert!(history.len() <= DEFAULT_CONTEXT_MESSAGES);
        }
    }

    #[test]
    fn twelve_messages_with_limit_five_keeps_newest_five() {
        let state = state_with_history(12);
        let msgs = prepare_api_messages(&state, "meta-llama/llama-4-maverick-17b-128e-instruct");

        assert_eq!(msgs.len(), 6); // 1 system + 5 history
        assert_eq!(msgs[0].role, Role::System);
        // Oldest seven dropped; remaining turns keep chronological order.
        assert_eq!(msgs[1].content, "answer 7");
        assert_eq!(msgs[5].content, "answer 11");
    }

    #[test]
    fn system_prompt_always_leads() {
        let mut state = state_with_history(2);
        state.context.system_prompt = "Be terse.".into();
        let msgs = prepare_api_messages(&state, "qwen-qwq-32b");
        assert_eq!(msgs[0], ApiMessage::new(Role::System, "Be terse."));
    }

    #[test]
    fn synthetic_system_messages_do_not_count_or_leak() {
        let mut state = SessionState::new();
        state.push_message(ChatMessage::system("### PROCESSED FILE ###"));
        state.push_message(ChatMessage::user("what does the file say?"));
        let msgs = prepare_api_messages(&state, "qwen-qwq-32b");
        // The injected file notice is a history system message and is
        // filtered out of the trailing window.
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].content, "what does the file say?");
    }

    #[test]
    fn agentic_summary_is_injected_when_enabled() {
        let mut state = state_with_history(2);
        state.context.enable_agentic = true;
        state.agentic.record_tools(&[ExecutedTool {
            kind: ToolKind::Search,
            input: json!({"query": "weather"}),
            output: json!({"results": []}),
            timestamp: Utc::now(),
        }]);

        let msgs = prepare_api_messages(&state, "compound-beta");
        assert_eq!(msgs[1].role, Role::System);
        assert!(msgs[1].content.contains("weather"));

        // Toggle off: no second system message.
        state.context.enable_agentic = false;
        let msgs = prepare_api_messages(&state, "compound-beta");
        assert_eq!(msgs.iter().filter(|m| m.role == Role::System).count(), 1);
    }
}
