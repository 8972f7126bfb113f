pub mod groq;
pub mod sse;
pub mod transcription;

pub use groq::{GroqClient, ImageAttachment, ImageOutcome, StreamOutcome};
pub use transcription::{AudioTranscriber, TranscriptionOutcome};
