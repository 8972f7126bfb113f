//! Session-scoped state: configuration, message history, and the caches of
//! everything ingested or generated during the session.
//!
//! Nothing here is persisted. State lives for one app session and is torn
//! down by [`SessionState::cleanup`], which deletes the temporary files the
//! ingestion caches point at and then empties the caches. Cleanup tolerates
//! already-missing files and is safe to call more than once.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agentic::AgenticContext;
use crate::chat::{ChatMessage, Role};

pub const DEFAULT_MODEL: &str = "deepseek-r1-distill-llama-70b";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly and helpful virtual assistant.";

/// Active configuration, mutated only through the sidebar and read by the
/// context assembler and API client on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub enable_agentic: bool,
    pub enable_vision: bool,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            enable_agentic: false,
            enable_vision: false,
        }
    }
}

/// A document that was uploaded, read, and folded into the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub file_id: String,
    pub file_name: String,
    pub file_kind: String,
    pub file_size: usize,
    /// SHA-256 of the raw upload; duplicate uploads are detected by this.
    pub hash: String,
    pub content: String,
}

/// An uploaded image staged on disk for vision requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredImage {
    pub id: String,
    pub path: PathBuf,
    pub encoded_len: usize,
    pub created_at: DateTime<Utc>,
}

/// A model-generated file staged for download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    pub kind: String,
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub messages: Vec<ChatMessage>,
    pub context: SessionContext,
    pub agentic: AgenticContext,
    pub processed_files: Vec<ProcessedFile>,
    pub images: Vec<StoredImage>,
    pub generated_files: Vec<GeneratedArtifact>,
    pub temp_audio_files: Vec<PathBuf>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append-only history access for the rest of the app.
    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn clear_conversation(&mut self) {
        tracing::info!(dropped = self.messages.len(), "conversation cleared");
        self.messages.clear();
        self.agentic.clear();
    }

    /// Whether any uploaded document with this content hash is already known.
    pub fn has_file_with_hash(&self, hash: &str) -> bool {
        self.processed_files.iter().any(|f| f.hash == hash)
    }

    /// Registers a processed document and injects it into the conversation
    /// as a labeled system message the model can refer back to.
    pub fn register_processed_file(&mut self, mut file: ProcessedFile) {
        file.file_id = format!("file_{}", self.processed_files.len() + 1);
        let notice = format!(
            "### PROCESSED FILE (ID: {id}) ###\n\n\
             Name: {name}\nType: {kind}\nContent:\n\n```{kind}\n{content}\n```\n\n\
             The user may refer to this file in the conversation. Use its \
             content when answering their questions.",
            id = file.file_id,
            name = file.file_name,
            kind = file.file_kind,
            content = file.content,
        );
        self.messages.push(ChatMessage::new(Role::System, notice));
        tracing::info!(file = %file.file_name, id = %file.file_id, "document added to context");
        self.processed_files.push(file);
    }

    /// Deletes every temporary file referenced by the ingestion caches and
    /// empties them. Missing files count as already cleaned; calling this
    /// twice leaves the same end state as calling it once.
    pub fn cleanup(&mut self) {
        let paths = self
            .images
            .drain(..)
            .map(|img| img.path)
            .chain(self.generated_files.drain(..).map(|g| g.path))
            .chain(self.temp_audio_files.drain(..));

        for path in paths {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed temp file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove temp file"),
            }
        }
        self.processed_files.clear();
    }
}
