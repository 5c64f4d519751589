//! BOMBAbot: a chat dashboard for questions about Malaysian fire station
//! (Balai Bomba) records, answered by a hosted text-generation model that is
//! grounded on statistics computed from the bundled dataset.

pub mod chat;
pub mod config;
pub mod conversation;
pub mod dataset;
pub mod error;
pub mod gateway;
pub mod gemini;
pub mod markup;
pub mod records;
pub mod stats;
pub mod web_server;

pub use config::{GatewayArgs, GatewayConfig};
pub use conversation::{ChatMessage, Conversation, ConversationState, Role};
pub use error::{ConfigError, GenerationError, SubmitError};
pub use gateway::{AskOutcome, Gateway, GatewaySettings, GenerationRequest, TextGenerator};
pub use gemini::GeminiClient;
pub use records::{AttributeValue, Coordinates, StationRecord};
pub use stats::{DatasetStats, StationSample};
