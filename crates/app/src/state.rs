use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;

use providers::transcription::DEFAULT_TRANSCRIPTION_MODEL;
use providers::{AudioTranscriber, GroqClient, ImageAttachment, TranscriptionOutcome};
use shared::{prepare_api_messages, ChatMessage, SessionState};

use ingest::document::{file_hash, DocumentProcessor};
use ingest::generator::{FileGenerator, GeneratedFileKind};
use shared::session::{ProcessedFile, StoredImage};

/// Progress of the background generation thread, polled every frame.
pub enum StreamUpdate {
    /// Accumulated text so far.
    Partial(String),
    /// Terminal message; content is either the completion or a renderable
    /// error string.
    Done {
        content: String,
        executed_tools: Vec<shared::ExecutedTool>,
        model: String,
    },
}

pub struct TranscriptionUpdate {
    pub outcome: TranscriptionOutcome,
    pub translated: bool,
}

pub struct AppState {
    pub session: SessionState,
    pub client: Arc<GroqClient>,

    pub api_key_input: String,
    pub input_text: String,
    pub is_thinking: bool,
    pub streaming_text: String,
    pub status_line: Option<String>,

    /// Encoded image staged for the next vision request.
    pub pending_image: Option<ImageAttachment>,

    pub generate_name: String,
    pub generate_kind: GeneratedFileKind,

    pub stream_rx: Option<Receiver<StreamUpdate>>,
    pub transcription_rx: Option<Receiver<TranscriptionUpdate>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            session: SessionState::new(),
            client: Arc::new(GroqClient::new()),
            api_key_input: String::new(),
            input_text: String::new(),
            is_thinking: false,
            streaming_text: String::new(),
            status_line: None,
            pending_image: None,
            generate_name: String::new(),
            generate_kind: GeneratedFileKind::Text,
            stream_rx: None,
            transcription_rx: None,
        }
    }
}

impl AppState {
    /// Replaces the client with one bound to the key from the sidebar.
    pub fn apply_api_key(&mut self) {
        let key = self.api_key_input.trim();
        if key.is_empty() {
            return;
        }
        self.client = Arc::new(GroqClient::with_api_key(key));
        self.status_line = Some("API key applied".to_string());
    }

    /// Pushes the composed user turn and spawns the generation thread. The
    /// thread owns its own runtime; results come back over a channel.
    pub fn send_message(&mut self) {
        let text = self.input_text.trim().to_string();
        if text.is_empty() || self.is_thinking {
            return;
        }
        self.input_text.clear();
        self.session.push_message(ChatMessage::user(text));

        let model = self.session.context.model.clone();
        let temperature = self.session.context.temperature;
        let max_tokens = self.session.context.max_tokens;
        let messages = prepare_api_messages(&self.session, &model);
        let client = Arc::clone(&self.client);
        let image = if self.session.context.enable_vision {
            self.pending_image.take()
        } else {
            None
        };

        let (tx, rx) = channel::<StreamUpdate>();
        self.stream_rx = Some(rx);
        self.is_thinking = true;
        self.streaming_text.clear();

        std::thread::spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = tx.send(StreamUpdate::Done {
                        content: format!("API call error: {e}"),
                        executed_tools: Vec::new(),
                        model,
                    });
                    return;
                }
            };

            let partial_tx = tx.clone();
            let on_partial = |accumulated: &str| {
                let _ = partial_tx.send(StreamUpdate::Partial(accumulated.to_string()));
            };

            let (content, executed_tools) = match image {
                Some(attachment) => {
                    let outcome = runtime.block_on(client.generate_response_with_image(
                        &model,
                        &messages,
                        &attachment,
                        temperature,
                        max_tokens,
                        on_partial,
                    ));
                    (outcome.content, outcome.executed_tools)
                }
                None => {
                    let outcome = runtime.block_on(client.generate_streaming_response(
                        &model,
                        &messages,
                        temperature,
                        max_tokens,
                        on_partial,
                    ));
                    (outcome.content, outcome.executed_tools)
                }
            };

            let _ = tx.send(StreamUpdate::Done {
                content,
                executed_tools,
                model,
            });
        });
    }

    /// Drains generation progress; called once per frame. A disconnected
    /// channel means the worker died without a terminal message, so the
    /// in-flight state is torn down either way.
    pub fn poll_stream(&mut self) {
        let Some(rx) = &self.stream_rx else { return };
        let mut done = None;
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(StreamUpdate::Partial(text)) => self.streaming_text = text,
                Ok(StreamUpdate::Done {
                    content,
                    executed_tools,
                    model,
                }) => done = Some((content, executed_tools, model)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if let Some((content, executed_tools, model)) = done {
            if self.session.context.enable_agentic {
                self.session.agentic.record_tools(&executed_tools);
            }
            let mut msg = ChatMessage::assistant(content, model);
            msg.executed_tools = executed_tools;
            self.session.push_message(msg);
            self.is_thinking = false;
            self.streaming_text.clear();
            self.stream_rx = None;
        } else if disconnected {
            tracing::warn!("generation worker exited without a result");
            self.status_line = Some("Generation stopped unexpectedly".to_string());
            self.is_thinking = false;
            self.streaming_text.clear();
            self.stream_rx = None;
        }
    }

    /// Reads an uploaded document, skips byte-identical re-uploads, and
    /// folds the content into the conversation.
    pub fn upload_document(&mut self, path: PathBuf) {
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                self.status_line = Some(format!("Could not read file: {e}"));
                return;
            }
        };
        let hash = file_hash(&bytes);
        if self.session.has_file_with_hash(&hash) {
            self.status_line = Some("File already uploaded".to_string());
            return;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        match DocumentProcessor::default().process_bytes(&bytes, &file_name) {
            Ok(doc) => {
                let excerpt = doc.context_excerpt(1024);
                self.session.register_processed_file(ProcessedFile {
                    file_id: String::new(),
                    file_name,
                    file_kind: doc.metadata.file_kind.clone(),
                    file_size: bytes.len(),
                    hash,
                    content: excerpt,
                });
                self.status_line = Some(format!(
                    "Processed {} ({} tokens)",
                    doc.metadata.file_name, doc.metadata.num_tokens
                ));
            }
            Err(e) => self.status_line = Some(format!("Could not process file: {e}")),
        }
    }

    /// Validates and recompresses an uploaded image, stages it on disk, and
    /// holds the encoded form for the next vision request.
    pub fn upload_image(&mut self, path: PathBuf) {
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                self.status_line = Some(format!("Could not read image: {e}"));
                return;
            }
        };
        match ingest::prepare_for_inline(&bytes) {
            Ok(prepared) => {
                match ingest::save_upload(&bytes, "img") {
                    Ok(staged) => {
                        self.session.images.push(StoredImage {
                            id: uuid::Uuid::new_v4().to_string(),
                            path: staged,
                            encoded_len: prepared.encoded_len(),
                            created_at: chrono::Utc::now(),
                        });
                        ingest::prune_stored(&mut self.session.images);
                    }
                    Err(e) => tracing::warn!(error = %e, "could not stage uploaded image"),
                }
                self.status_line = Some(format!(
                    "Image ready ({}x{})",
                    prepared.width, prepared.height
                ));
                self.pending_image = Some(ImageAttachment::Inline {
                    media_type: prepared.media_type,
                    base64_data: prepared.base64_data,
                });
                self.session.context.enable_vision = true;
            }
            Err(e) => self.status_line = Some(format!("{e}")),
        }
    }

    /// Copies an uploaded audio file into the session's temp staging area
    /// so teardown can delete it without touching the user's original.
    fn stage_audio_copy(&mut self, path: &PathBuf) -> Option<PathBuf> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                self.status_line = Some(format!("Could not read audio file: {e}"));
                return None;
            }
        };
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "wav".to_string());
        match ingest::save_upload(&bytes, &extension) {
            Ok(staged) => {
                self.session.temp_audio_files.push(staged.clone());
                Some(staged)
            }
            Err(e) => {
                self.status_line = Some(format!("Could not stage audio file: {e}"));
                None
            }
        }
    }

    /// Spawns transcription (or translation) of an audio file; the result
    /// lands in the input box when it arrives.
    pub fn upload_audio(&mut self, path: PathBuf, translate: bool) {
        let Some(path) = self.stage_audio_copy(&path) else {
            return;
        };
        let transcriber = AudioTranscriber::from_client(&self.client);
        let (tx, rx) = channel::<TranscriptionUpdate>();
        self.transcription_rx = Some(rx);
        self.status_line = Some("Transcribing audio...".to_string());

        std::thread::spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!(error = %e, "could not start transcription runtime");
                    return;
                }
            };
            let outcome = if translate {
                runtime.block_on(
                    transcriber.translate_audio(&path, providers::transcription::DEFAULT_TRANSLATION_MODEL),
                )
            } else {
                runtime.block_on(transcriber.transcribe_audio(
                    &path,
                    DEFAULT_TRANSCRIPTION_MODEL,
                    None,
                ))
            };
            let _ = tx.send(TranscriptionUpdate {
                outcome,
                translated: translate,
            });
        });
    }

    pub fn poll_transcription(&mut self) {
        let Some(rx) = &self.transcription_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(update) => {
                if update.outcome.success {
                    self.input_text = update.outcome.text;
                    self.status_line = Some(if update.translated {
                        "Audio translated".to_string()
                    } else {
                        "Audio transcribed".to_string()
                    });
                } else {
                    self.status_line = Some(
                        update
                            .outcome
                            .error
                            .unwrap_or_else(|| "Transcription failed".to_string()),
                    );
                }
                self.transcription_rx = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                tracing::warn!("transcription worker exited without a result");
                self.status_line = Some("Transcription stopped unexpectedly".to_string());
                self.transcription_rx = None;
            }
        }
    }

    /// Writes the most recent assistant reply to a downloadable file.
    pub fn generate_from_last_response(&mut self) {
        let Some(content) = self
            .session
            .messages
            .iter()
            .rev()
            .find(|m| m.role == shared::Role::Assistant)
            .map(|m| m.content.clone())
        else {
            self.status_line = Some("No assistant reply to export yet".to_string());
            return;
        };

        let output_dir = std::env::temp_dir().join("polychat_downloads");
        let generator = match FileGenerator::new(output_dir) {
            Ok(g) => g,
            Err(e) => {
                self.status_line = Some(format!("{e}"));
                return;
            }
        };
        let name = self.generate_name.trim();
        let name = (!name.is_empty()).then_some(name);
        match generator.generate(&content, self.generate_kind, name) {
            Ok(artifact) => {
                self.status_line = Some(format!("Saved {}", artifact.file_name));
                self.session.generated_files.push(artifact);
            }
            Err(e) => self.status_line = Some(format!("{e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_stream_recovers_when_worker_dies_silently() {
        let mut s = AppState::default();
        let (tx, rx) = channel::<StreamUpdate>();
        s.stream_rx = Some(rx);
        s.is_thinking = true;
        // Worker gone without a terminal message.
        drop(tx);

        s.poll_stream();

        assert!(!s.is_thinking);
        assert!(s.stream_rx.is_none());
        assert!(s.status_line.unwrap().contains("unexpectedly"));
        assert!(s.session.messages.is_empty());
    }

    #[test]
    fn poll_stream_keeps_result_sent_before_worker_exit() {
        let mut s = AppState::default();
        let (tx, rx) = channel();
        s.stream_rx = Some(rx);
        s.is_thinking = true;
        tx.send(StreamUpdate::Partial("he".into())).unwrap();
        tx.send(StreamUpdate::Done {
            content: "hello".into(),
            executed_tools: Vec::new(),
            model: "m".into(),
        })
        .unwrap();
        drop(tx);

        s.poll_stream();

        assert_eq!(s.session.messages.last().unwrap().content, "hello");
        assert!(!s.is_thinking);
        assert!(s.stream_rx.is_none());
    }

    #[test]
    fn poll_transcription_recovers_when_worker_dies_silently() {
        let mut s = AppState::default();
        let (tx, rx) = channel::<TranscriptionUpdate>();
        s.transcription_rx = Some(rx);
        drop(tx);

        s.poll_transcription();

        assert!(s.transcription_rx.is_none());
        assert!(s.status_line.unwrap().contains("unexpectedly"));
    }

    #[test]
    fn audio_uploads_are_staged_for_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("clip.wav");
        std::fs::write(&original, b"RIFF").unwrap();

        let mut s = AppState::default();
        let staged = s.stage_audio_copy(&original).unwrap();
        assert_ne!(staged, original);
        assert!(staged.exists());
        assert_eq!(s.session.temp_audio_files, vec![staged.clone()]);

        s.session.cleanup();
        assert!(!staged.exists());
        // The user's own file is never touched.
        assert!(original.exists());
    }
}
