//! Static registry of the hosted models the app can talk to.
//!
//! Registration is compile-time only; nothing mutates the table at runtime.
//! The per-model message ceiling exists because upstream token-per-minute
//! limits are stricter for some model families, so the context assembler
//! must send fewer turns for those.

/// Immutable description of one hosted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    /// Token-level context length advertised by the provider.
    pub context_length: u32,
    /// Ceiling on history messages forwarded per request.
    pub max_context_messages: usize,
    pub provider: &'static str,
    pub supports_vision: bool,
    pub is_agentic: bool,
}

/// Window size applied when a model id is not registered.
pub const DEFAULT_CONTEXT_MESSAGES: usize = 10;

pub const MAVERICK_ID: &str = "meta-llama/llama-4-maverick-17b-128e-instruct";
pub const SCOUT_ID: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

static MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "deepseek-r1-distill-llama-70b",
        display_name: "DeepSeek (128K)",
        context_length: 128_000,
        max_context_messages: 10,
        provider: "Groq",
        supports_vision: false,
        is_agentic: false,
    },
    ModelDescriptor {
        id: MAVERICK_ID,
        display_name: "Meta Maverick (131K)",
        context_length: 131_072,
        // Tight TPM limits on this family
        max_context_messages: 5,
        provider: "Groq",
        supports_vision: true,
        is_agentic: false,
    },
    ModelDescriptor {
        id: SCOUT_ID,
        display_name: "Meta Scout (131K)",
        context_length: 131_072,
        max_context_messages: 6,
        provider: "Groq",
        supports_vision: true,
        is_agentic: false,
    },
    ModelDescriptor {
        id: "qwen-qwq-32b",
        display_name: "Alibaba Qwen (128K)",
        context_length: 128_000,
        max_context_messages: 10,
        provider: "Groq",
        supports_vision: false,
        is_agentic: false,
    },
    ModelDescriptor {
        id: "compound-beta",
        display_name: "Compound Beta (agentic)",
        context_length: 128_000,
        max_context_messages: 10,
        provider: "Groq",
        supports_vision: false,
        is_agentic: true,
    },
    ModelDescriptor {
        id: "compound-beta-mini",
        display_name: "Compound Beta Mini (agentic)",
        context_length: 128_000,
        max_context_messages: 10,
        provider: "Groq",
        supports_vision: false,
        is_agentic: true,
    },
];

pub fn all_models() -> &'static [ModelDescriptor] {
    MODELS
}

pub fn get_model(id: &str) -> Option<&'static ModelDescriptor> {
    MODELS.iter().find(|m| m.id == id)
}

/// Display name for a model id, falling back to the id itself.
pub fn model_display_name(id: &str) -> &str {
    get_model(id).map(|m| m.display_name).unwrap_or(id)
}

/// Message-count ceiling for a model. Family substrings are checked before
/// the exact lookup so fine-tuned or versioned variants inherit the family
/// limit; unknown ids get [`DEFAULT_CONTEXT_MESSAGES`].
pub fn get_context_limit(id: &str) -> usize {
    if id.contains("llama-4-maverick") {
        return get_model(MAVERICK_ID)
            .map(|m| m.max_context_messages)
            .unwrap_or(5);
    }
    if id.contains("llama-4-scout") {
        return get_model(SCOUT_ID)
            .map(|m| m.max_context_messages)
            .unwrap_or(6);
    }
    get_model(id)
        .map(|m| m.max_context_messages)
        .unwrap_or(DEFAULT_CONTEXT_MESSAGES)
}
