//! Client for the Groq audio transcription and translation endpoints.
//!
//! Outcomes are plain values, never errors: a failed request produces
//! `{success: false, error, status_code}` so the UI can always render
//! something.

use std::path::Path;
use std::time::Instant;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::groq::GroqClient;

const TRANSCRIPTION_URL: &str = "https://api.groq.com/openai/v1/audio/transcriptions";
const TRANSLATION_URL: &str = "https://api.groq.com/openai/v1/audio/translations";

pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-large-v3-turbo";
pub const DEFAULT_TRANSLATION_MODEL: &str = "whisper-large-v3";

#[derive(Debug, Clone)]
pub struct TranscriptionOutcome {
    pub success: bool,
    pub text: String,
    pub error: Option<String>,
    pub status_code: Option<u16>,
    pub model_used: Option<String>,
    pub duration_seconds: f64,
}

impl TranscriptionOutcome {
    fn failure(error: String, status_code: Option<u16>) -> Self {
        Self {
            success: false,
            text: String::new(),
            error: Some(error),
            status_code,
            model_used: None,
            duration_seconds: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptBody {
    #[serde(default)]
    text: String,
}

/// Structured responses are requested, but the endpoint occasionally sends
/// bare text; fall back to the raw body instead of failing the operation.
fn extract_transcript(body: &str) -> String {
    match serde_json::from_str::<TranscriptBody>(body) {
        Ok(parsed) => parsed.text,
        Err(_) => body.trim().to_string(),
    }
}

pub struct AudioTranscriber {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl AudioTranscriber {
    /// Shares the chat client's connection pool and key.
    pub fn from_client(client: &GroqClient) -> Self {
        Self {
            http: client.http_handle(),
            api_key: client.api_key().map(str::to_string),
        }
    }

    pub async fn transcribe_audio(
        &self,
        audio_path: &Path,
        model: &str,
        language: Option<&str>,
    ) -> TranscriptionOutcome {
        self.post_audio(TRANSCRIPTION_URL, audio_path, model, language)
            .await
    }

    /// Always produces English text regardless of the source language.
    pub async fn translate_audio(&self, audio_path: &Path, model: &str) -> TranscriptionOutcome {
        self.post_audio(TRANSLATION_URL, audio_path, model, None).await
    }

    async fn post_audio(
        &self,
        url: &str,
        audio_path: &Path,
        model: &str,
        language: Option<&str>,
    ) -> TranscriptionOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return TranscriptionOutcome::failure(
                "Error: API not configured. Please provide an API key.".to_string(),
                None,
            );
        };

        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let bytes = match std::fs::read(audio_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                return TranscriptionOutcome::failure(
                    format!("could not read audio file {}: {e}", audio_path.display()),
                    None,
                )
            }
        };

        tracing::info!(file = %file_name, model, "starting audio request");
        let started = Instant::now();

        let mut form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("model", model.to_string())
            // JSON keeps the response shape predictable.
            .text("response_format", "json");
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let resp = match self
            .http
            .post(url)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(error = %e, "audio request failed to send");
                return TranscriptionOutcome::failure(format!("transcription error: {e}"), None);
            }
        };

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let elapsed = started.elapsed().as_secs_f64();

        if !status.is_success() {
            let error = format!("Groq API error: {} - {body}", status.as_u16());
            tracing::error!(status = status.as_u16(), "audio request rejected");
            return TranscriptionOutcome::failure(error, Some(status.as_u16()));
        }

        let text = extract_transcript(&body);
        tracing::info!(chars = text.len(), elapsed, "audio request completed");
        TranscriptionOutcome {
            success: true,
            text,
            error: None,
            status_code: Some(status.as_u16()),
            model_used: Some(model.to_string()),
            duration_seconds: elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_transcript_prefers_json_text_field() {
        assert_eq!(extract_transcript(r#"{"text": "hola mundo"}"#), "hola mundo");
        assert_eq!(
            extract_transcript(r#"{"text": "hi", "x_groq": {"id": "1"}}"#),
            "hi"
        );
    }

    #[test]
    fn extract_transcript_falls_back_to_raw_body() {
        assert_eq!(extract_transcript("plain transcript\n"), "plain transcript");
        // Valid JSON without a text field yields the empty default.
        assert_eq!(extract_transcript(r#"{"words": []}"#), "");
    }

    #[test]
    fn from_client_inherits_the_key_and_pool() {
        let transcriber = AudioTranscriber::from_client(&GroqClient::with_api_key("k"));
        assert_eq!(transcriber.api_key.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn unconfigured_transcriber_reports_failure_value() {
        let transcriber = AudioTranscriber {
            http: reqwest::Client::new(),
            api_key: None,
        };
        let outcome = transcriber
            .transcribe_audio(Path::new("/tmp/none.wav"), DEFAULT_TRANSCRIPTION_MODEL, None)
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not configured"));
        assert_eq!(outcome.status_code, None);
    }

    #[tokio::test]
    async fn missing_audio_file_is_a_failure_value_not_a_panic() {
        let transcriber = AudioTranscriber {
            http: reqwest::Client::new(),
            api_key: Some("k".into()),
        };
        let outcome = transcriber
            .transcribe_audio(
                Path::new("/definitely/not/here.wav"),
                DEFAULT_TRANSCRIPTION_MODEL,
                Some("es"),
            )
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("could not read audio file"));
    }
}
