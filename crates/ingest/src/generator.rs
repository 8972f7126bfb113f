//! File generator: turns model output into downloadable files staged in an
//! output directory, with sanitized names and per-kind formatting.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use shared::session::GeneratedArtifact;

/// Characters that are unsafe in filenames across platforms.
static UNSAFE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("filename regex"));

const MAX_FILENAME_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generated content is empty")]
    EmptyContent,
    #[error("content is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("could not write generated file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not build CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Supported output formats. Spreadsheets are emitted as CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedFileKind {
    Json,
    Text,
    Markdown,
    Code,
    Csv,
    Spreadsheet,
    Html,
    Css,
    JavaScript,
}

impl GeneratedFileKind {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" | "txt" => Some(Self::Text),
            "markdown" | "md" => Some(Self::Markdown),
            "code" => Some(Self::Code),
            "csv" => Some(Self::Csv),
            "spreadsheet" | "excel" | "xlsx" => Some(Self::Spreadsheet),
            "html" => Some(Self::Html),
            "css" => Some(Self::Css),
            "javascript" | "js" => Some(Self::JavaScript),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "txt",
            Self::Code => "py",
            Self::Markdown => "md",
            Self::Csv | Self::Spreadsheet => "csv",
            Self::Html => "html",
            Self::Css => "css",
            Self::JavaScript => "js",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain",
            Self::Code => "text/x-python",
            Self::Markdown => "text/markdown",
            Self::Csv | Self::Spreadsheet => "text/csv",
            Self::Html => "text/html",
            Self::Css => "text/css",
            Self::JavaScript => "text/javascript",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Code => "code",
            Self::Csv => "csv",
            Self::Spreadsheet => "spreadsheet",
            Self::Html => "html",
            Self::Css => "css",
            Self::JavaScript => "javascript",
        }
    }
}

/// Replaces filesystem-unsafe characters with underscores, trims
/// whitespace, and caps the length. Empty input falls back to a
/// timestamped default.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = UNSAFE_NAME_RE.replace_all(name, "_");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return format!("generated_{}", Utc::now().format("%Y%m%d_%H%M%S"));
    }
    cleaned.chars().take(MAX_FILENAME_LEN).collect()
}

pub struct FileGenerator {
    output_dir: PathBuf,
}

impl FileGenerator {
    /// Creates the output directory if it does not exist yet.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, GeneratorError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Formats `content` for the requested kind and writes it to the
    /// output directory. Returns the staged artifact for the download list.
    pub fn generate(
        &self,
        content: &str,
        kind: GeneratedFileKind,
        name: Option<&str>,
    ) -> Result<GeneratedArtifact, GeneratorError> {
        let content = strip_code_fence(content);
        if content.trim().is_empty() {
            return Err(GeneratorError::EmptyContent);
        }

        let formatted = match kind {
            GeneratedFileKind::Json => {
                let value: Value = serde_json::from_str(content)?;
                serde_json::to_string_pretty(&value)?
            }
            GeneratedFileKind::Csv | GeneratedFileKind::Spreadsheet => tabulate(content)?,
            _ => content.to_string(),
        };

        let stem = sanitize_filename(name.unwrap_or_default());
        let file_name = if stem.ends_with(&format!(".{}", kind.extension())) {
            stem
        } else {
            format!("{stem}.{}", kind.extension())
        };
        let path = self.output_dir.join(&file_name);
        std::fs::write(&path, formatted)?;
        tracing::info!(file = %file_name, kind = kind.label(), "file generated");

        Ok(GeneratedArtifact {
            path,
            file_name,
            mime_type: kind.mime_type().to_string(),
            kind: kind.label().to_string(),
        })
    }
}

/// Removes a surrounding markdown code fence if present, including any
/// language tag on the opening fence.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return content;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return content;
    };
    match body.split_once('\n') {
        Some((_, after_tag)) => after_tag.trim_matches('\n'),
        None => body,
    }
}

/// Renders content as CSV. A JSON array of objects becomes rows under a
/// header taken from the first object; anything else is assumed to be CSV
/// text already and passes through.
fn tabulate(content: &str) -> Result<String, GeneratorError> {
    let Ok(Value::Array(rows)) = serde_json::from_str::<Value>(content) else {
        return Ok(content.to_string());
    };
    let headers: Vec<String> = match rows.first() {
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        _ => return Ok(content.to_string()),
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&headers)?;
    for row in &rows {
        let Value::Object(obj) = row else { continue };
        let record: Vec<String> = headers
            .iter()
            .map(|h| match obj.get(h) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer.write_record(&record)?;
    }
    let bytes = writer.into_inner().map_err(|e| {
        GeneratorError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> (tempfile::TempDir, FileGenerator) {
        let dir = tempfile::tempdir().unwrap();
        let gen = FileGenerator::new(dir.path().join("out")).unwrap();
        (dir, gen)
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("  report  "), "report");
    }

    #[test]
    fn sanitize_defaults_empty_names_to_timestamp() {
        let name = sanitize_filename("   ");
        assert!(name.starts_with("generated_"));
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_filename(&long).len(), 100);
    }

    #[test]
    fn json_output_is_pretty_printed() {
        let (_dir, gen) = generator();
        let artifact = gen
            .generate(r#"{"b":1,"a":2}"#, GeneratedFileKind::Json, Some("data"))
            .unwrap();
        assert_eq!(artifact.file_name, "data.json");
        assert_eq!(artifact.mime_type, "application/json");
        let written = std::fs::read_to_string(&artifact.path).unwrap();
        assert!(written.contains("\n"));
        assert!(written.contains("\"a\": 2"));
    }

    #[test]
    fn invalid_json_is_rejected() {
        let (_dir, gen) = generator();
        let result = gen.generate("{nope", GeneratedFileKind::Json, Some("data"));
        assert!(matches!(result, Err(GeneratorError::InvalidJson(_))));
    }

    #[test]
    fn code_fences_are_stripped() {
        let (_dir, gen) = generator();
        let artifact = gen
            .generate("```json\n{\"x\": 1}\n```", GeneratedFileKind::Json, Some("fenced"))
            .unwrap();
        let written = std::fs::read_to_string(&artifact.path).unwrap();
        assert!(written.contains("\"x\": 1"));
    }

    #[test]
    fn empty_content_is_an_error() {
        let (_dir, gen) = generator();
        let result = gen.generate("   \n", GeneratedFileKind::Text, None);
        assert!(matches!(result, Err(GeneratorError::EmptyContent)));
    }

    #[test]
    fn json_rows_become_csv() {
        let (_dir, gen) = generator();
        let artifact = gen
            .generate(
                r#"[{"name":"ada","score":3},{"name":"bob","score":5}]"#,
                GeneratedFileKind::Csv,
                Some("scores"),
            )
            .unwrap();
        let written = std::fs::read_to_string(&artifact.path).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("name,score"));
        assert_eq!(lines.next(), Some("ada,3"));
        assert_eq!(lines.next(), Some("bob,5"));
    }

    #[test]
    fn spreadsheet_kind_writes_csv_extension() {
        let (_dir, gen) = generator();
        let artifact = gen
            .generate("a,b\n1,2", GeneratedFileKind::Spreadsheet, Some("sheet"))
            .unwrap();
        assert_eq!(artifact.file_name, "sheet.csv");
        assert_eq!(std::fs::read_to_string(&artifact.path).unwrap(), "a,b\n1,2");
    }

    #[test]
    fn existing_extension_is_not_duplicated() {
        let (_dir, gen) = generator();
        let artifact = gen
            .generate("hello", GeneratedFileKind::Text, Some("notes.txt"))
            .unwrap();
        assert_eq!(artifact.file_name, "notes.txt");
    }

    #[test]
    fn kind_labels_round_trip() {
        for label in ["json", "markdown", "csv", "spreadsheet", "html", "css", "javascript"] {
            let kind = GeneratedFileKind::from_label(label).unwrap();
            assert_eq!(kind.label(), label);
        }
        assert_eq!(GeneratedFileKind::from_label("xlsx"), Some(GeneratedFileKind::Spreadsheet));
        assert_eq!(GeneratedFileKind::from_label("docx"), None);
        assert_eq!(GeneratedFileKind::Code.extension(), "py");
        assert_eq!(GeneratedFileKind::Code.mime_type(), "text/x-python");
    }
}
