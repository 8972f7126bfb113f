pub mod agentic;
pub mod chat;
pub mod context;
pub mod registry;
pub mod session;

pub use chat::{ChatMessage, ExecutedTool, Role, ToolKind};
pub use context::{prepare_api_messages, ApiMessage};
pub use registry::{get_context_limit, get_model, model_display_name, ModelDescriptor};
pub use session::{SessionContext, SessionState};
