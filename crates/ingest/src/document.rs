//! Document processor: reads uploaded txt/json/pdf files into text the
//! conversation can carry, with tokenized chunking and content-hash
//! identity for duplicate detection.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::text::{split_text_by_tokens, summarize_text, tokenize_text};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unsupported file type: .{0}")]
    UnsupportedExtension(String),
    #[error("file is not valid JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("could not extract text from PDF: {0}")]
    PdfExtract(String),
}

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub file_kind: String,
    pub num_tokens: usize,
    pub num_chunks: usize,
}

#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub content: String,
    pub chunks: Vec<String>,
    pub metadata: DocumentMetadata,
}

impl ProcessedDocument {
    /// Content bounded to `max_tokens`, marker-suffixed when truncated.
    pub fn context_excerpt(&self, max_tokens: usize) -> String {
        summarize_text(&self.content, max_tokens)
    }
}

/// SHA-256 hex identity of an upload; byte-identical uploads collide here
/// and are skipped as duplicates.
pub fn file_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub struct DocumentProcessor {
    /// Token ceiling per chunk.
    max_tokens: usize,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self { max_tokens: 1024 }
    }
}

impl DocumentProcessor {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// Reads an upload according to its extension and tokenizes it into
    /// chunks. Unsupported extensions fail before any further work.
    pub fn process_bytes(
        &self,
        bytes: &[u8],
        file_name: &str,
    ) -> Result<ProcessedDocument, DocumentError> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        let content = match extension.as_str() {
            "txt" => String::from_utf8_lossy(bytes).into_owned(),
            "json" => {
                let value: serde_json::Value = serde_json::from_slice(bytes)?;
                serde_json::to_string_pretty(&value)?
            }
            "pdf" => pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| DocumentError::PdfExtract(e.to_string()))?,
            other => return Err(DocumentError::UnsupportedExtension(other.to_string())),
        };

        let num_tokens = tokenize_text(&content).len();
        let chunks = split_text_by_tokens(&content, self.max_tokens);
        let metadata = DocumentMetadata {
            file_name: file_name.to_string(),
            file_kind: extension,
            num_tokens,
            num_chunks: chunks.len(),
        };
        tracing::info!(
            file = %metadata.file_name,
            tokens = num_tokens,
            chunks = metadata.num_chunks,
            "document processed"
        );

        Ok(ProcessedDocument {
            content,
            chunks,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_plain_text() {
        let doc = DocumentProcessor::default()
            .process_bytes(b"hello there, general", "notes.txt")
            .unwrap();
        assert_eq!(doc.content, "hello there, general");
        assert_eq!(doc.metadata.file_kind, "txt");
        assert_eq!(doc.metadata.num_chunks, 1);
    }

    #[test]
    fn pretty_prints_json() {
        let doc = DocumentProcessor::default()
            .process_bytes(br#"{"b":1,"a":[2,3]}"#, "data.JSON")
            .unwrap();
        assert!(doc.content.contains("\n"));
        assert!(doc.content.contains("\"a\""));
        assert_eq!(doc.metadata.file_kind, "json");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let result = DocumentProcessor::default().process_bytes(b"{nope", "data.json");
        assert!(matches!(result, Err(DocumentError::JsonParse(_))));
    }

    #[test]
    fn unsupported_extension_fails_fast() {
        let result = DocumentProcessor::default().process_bytes(b"x", "binary.exe");
        match result {
            Err(DocumentError::UnsupportedExtension(ext)) => assert_eq!(ext, "exe"),
            other => panic!("expected unsupported extension, got {other:?}"),
        }
    }

    #[test]
    fn chunking_respects_token_budget() {
        let text = (0..25).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let doc = DocumentProcessor::new(10)
            .process_bytes(text.as_bytes(), "long.txt")
            .unwrap();
        assert_eq!(doc.metadata.num_tokens, 25);
        assert_eq!(doc.chunks.len(), 3);
    }

    #[test]
    fn hash_is_stable_for_identical_bytes() {
        assert_eq!(file_hash(b"same"), file_hash(b"same"));
        assert_ne!(file_hash(b"same"), file_hash(b"different"));
        // hex sha-256
        assert_eq!(file_hash(b"").len(), 64);
    }

    #[test]
    fn context_excerpt_truncates_long_documents() {
        let text = (0..50).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let doc = DocumentProcessor::default()
            .process_bytes(text.as_bytes(), "long.txt")
            .unwrap();
        let excerpt = doc.context_excerpt(5);
        assert!(excerpt.ends_with(" ..."));
        assert_eq!(doc.context_excerpt(1000), doc.content);
    }
}
