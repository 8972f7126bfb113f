//! Ingestion helpers: converting uploaded media into conversational context
//! and model output into downloadable files.

pub mod document;
pub mod generator;
pub mod images;
pub mod text;

pub use document::{file_hash, DocumentError, DocumentProcessor, ProcessedDocument};
pub use generator::{sanitize_filename, FileGenerator, GeneratedFileKind, GeneratorError};
pub use images::{prepare_for_inline, prune_stored, save_upload, validate_image, ImageError, PreparedImage};
pub use text::{split_text_by_tokens, summarize_text, tokenize_text};
