//! Conversation controller: owns the chat history and the dataset, and
//! makes sure at most one question is in flight at a time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::SubmitError;
use crate::gateway::{AskOutcome, Gateway};
use crate::records::StationRecord;

pub const GREETING: &str = "Hai! Saya BOMBAbot ! Ada apa-apa yang boleh saya bantu hari ini?";
pub const EMPTY_REPLY: &str =
    "Maaf, BOMBAbot tak dapat proses analisis tu sekarang. Cuba tanya lain kali?";
pub const UNAVAILABLE_REPLY: &str =
    "Maaf, sistem BOMBAbot mengalami sedikit gangguan teknikal. Harap bersabar ya!";
pub const RATE_LIMITED_REPLY: &str =
    "Maaf, BOMBAbot terima terlalu banyak permintaan sekarang. Tunggu sekejap dan cuba lagi ya!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversationState {
    LoadingDataset,
    Idle,
    AwaitingResponse,
}

/// A question accepted by the controller, ready to be sent to the gateway.
#[derive(Debug, Clone)]
pub struct PendingQuestion {
    pub records: Arc<[StationRecord]>,
    pub question: String,
}

/// Display text for a gateway outcome.
pub fn reply_text(outcome: &AskOutcome) -> String {
    match outcome {
        AskOutcome::Answer(text) => text.clone(),
        AskOutcome::Empty => EMPTY_REPLY.to_string(),
        AskOutcome::RateLimited => RATE_LIMITED_REPLY.to_string(),
        AskOutcome::Unavailable => UNAVAILABLE_REPLY.to_string(),
    }
}

#[derive(Debug)]
pub struct Conversation {
    state: ConversationState,
    records: Arc<[StationRecord]>,
    history: Vec<ChatMessage>,
    draft: String,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::loading()
    }
}

impl Conversation {
    /// A conversation whose dataset has not been parsed yet.
    pub fn loading() -> Self {
        Self {
            state: ConversationState::LoadingDataset,
            records: Arc::from(Vec::new()),
            history: Vec::new(),
            draft: String::new(),
        }
    }

    /// A conversation that is ready immediately.
    pub fn with_records(records: Arc<[StationRecord]>) -> Self {
        let mut conversation = Self::loading();
        conversation.finish_loading(records);
        conversation
    }

    /// Stores the parsed dataset and greets the user. Only the first call has an effect.
    pub fn finish_loading(&mut self, records: Arc<[StationRecord]>) {
        if self.state != ConversationState::LoadingDataset {
            warn!("Dataset already loaded; ignoring reload");
            return;
        }
        info!(stations = records.len(), "Conversation ready");
        self.records = records;
        self.state = ConversationState::Idle;
        self.history.push(ChatMessage::new(Role::Assistant, GREETING));
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == ConversationState::LoadingDataset
    }

    pub fn is_awaiting(&self) -> bool {
        self.state == ConversationState::AwaitingResponse
    }

    pub fn records(&self) -> &Arc<[StationRecord]> {
        &self.records
    }

    pub fn station_count(&self) -> usize {
        self.records.len()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Takes the draft, leaving the input empty.
    pub fn take_draft(&mut self) -> String {
        std::mem::take(&mut self.draft)
    }

    /// Whether a submit gesture would currently be accepted.
    pub fn can_submit(&self) -> bool {
        self.state == ConversationState::Idle && !self.draft.trim().is_empty()
    }

    /// Accepts a question: records the user turn and waits for the reply.
    pub fn begin_question(&mut self, text: &str) -> Result<PendingQuestion, SubmitError> {
        match self.state {
            ConversationState::LoadingDataset => return Err(SubmitError::Loading),
            ConversationState::AwaitingResponse => return Err(SubmitError::Busy),
            ConversationState::Idle => {}
        }
        if text.trim().is_empty() {
            return Err(SubmitError::EmptyMessage);
        }

        self.history.push(ChatMessage::new(Role::User, text));
        self.state = ConversationState::AwaitingResponse;
        debug!(history = self.history.len(), "Question accepted");

        Ok(PendingQuestion {
            records: Arc::clone(&self.records),
            question: text.to_string(),
        })
    }

    /// Records the assistant turn for the outstanding question and returns to idle.
    pub fn finish_question(&mut self, outcome: &AskOutcome) -> ChatMessage {
        if self.state != ConversationState::AwaitingResponse {
            warn!(state = ?self.state, "Reply arrived with no question outstanding");
        }
        let message = ChatMessage::new(Role::Assistant, reply_text(outcome));
        self.history.push(message.clone());
        self.state = ConversationState::Idle;
        message
    }
}

/// Runs one question through the gateway.
///
/// The lock is held only while changing state, not while the gateway call
/// is outstanding, so readers see `AwaitingResponse` in the meantime and
/// a second submit is refused with [`SubmitError::Busy`].
pub async fn submit(
    conversation: &Mutex<Conversation>,
    gateway: &Gateway,
    text: &str,
) -> Result<ChatMessage, SubmitError> {
    let pending = conversation.lock().await.begin_question(text)?;
    let outcome = gateway.ask(&pending.records, &pending.question).await;
    let reply = conversation.lock().await.finish_question(&outcome);
    Ok(reply)
}
