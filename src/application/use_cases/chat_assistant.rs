//! History-aware citizen services assistant.
//!
//! Two upstream calls per message: the first folds recent history into a
//! self-contained query, the second answers it in the assistant persona.

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::db::chat_history::{ChatHistoryStore, ChatTurn};
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::clean_llm_response;
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_MESSAGE_CHARS: usize = 2000;

pub const ASSISTANT_PERSONA: &str = "Kerala Government Transparency & Citizen Services Assistant
This assistant helps users access information about Kerala's government schemes, services, and transparency initiatives. It gives quick, accurate answers about government programs, eligibility, application procedures, and citizen rights.

Core Functions:
- Provide details on government schemes, eligibility, and applications.
- Explain services and procedures.
- Guide on transparency measures and RTI.
- Clarify citizen rights and government policies.
- Offer links to relevant portals and offices.

Response Guidelines:
- Short & Helpful: brief, clear, and to the point.
- Simple Terms: use simple Malayalam-English terms familiar to citizens of Kerala.
- Accurate Information: prioritize verified, official information.
- Links & Contacts: include official portals or contact details when applicable.
- Supportive: give step-by-step guidance for complex processes.

Knowledge Areas:
- Social Welfare: pensions, housing, healthcare schemes.
- Employment: MGNREGA, skill development programs.
- Education: scholarships, education initiatives.
- Digital Services: e-governance and digital platforms.
- RTI: procedures for Right to Information.
- Local Governance: Panchayat and Corporation services.

Example Queries:

User: What is the Karunya Benevolent Fund?
Assistant: The Karunya Benevolent Fund offers financial assistance up to \u{20B9}5 lakh for critical medical treatments. Apply online via the Kerala government portal with medical documents and an income certificate.

User: How to apply for old age pension?
Assistant: Apply at your local Panchayat or Corporation with age proof (60+), income certificate, Aadhaar, and bank passbook. Monthly pension: \u{20B9}1,600.

User: What is RTI?
Assistant: RTI (Right to Information) allows citizens to request government information within 30 days. Apply online via rtionline.kerala.gov.in or at local government offices with a \u{20B9}10 fee.";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatReply {
    /// The history-aware rewrite of the user's message.
    pub contextual_query: String,
    pub answer: String,
}

pub fn build_context_prompt(history: &[ChatTurn], message: &str) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Here is the previous chat history between the user and the assistant. Take it into account along with the current user question, and rewrite the question so that it is contextually relevant and coherent with the ongoing conversation."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Chat History:");
    if history.is_empty() {
        let _ = writeln!(prompt, "(none)");
    }
    for turn in history {
        let _ = writeln!(prompt, "User: {}", turn.user_message);
        let _ = writeln!(prompt, "Assistant: {}", turn.model_message);
    }
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Current Query:");
    let _ = writeln!(prompt, "{}", message);
    let _ = writeln!(prompt);
    let _ = write!(
        prompt,
        "Based on both the history and the current query, provide a well-formed, context-aware version of the query."
    );
    prompt
}

pub fn build_answer_prompt(contextual_query: &str) -> String {
    format!("{}\n\nUser: {}\nAssistant:", ASSISTANT_PERSONA, contextual_query)
}

pub struct ChatAssistant {
    client: Arc<dyn LLMClient + Send + Sync>,
    history: Arc<ChatHistoryStore>,
    config: LLMConfig,
    history_turns: u32,
}

impl ChatAssistant {
    pub fn new(
        client: Arc<dyn LLMClient + Send + Sync>,
        history: Arc<ChatHistoryStore>,
        config: LLMConfig,
        history_turns: u32,
    ) -> Self {
        Self {
            client,
            history,
            config,
            history_turns,
        }
    }

    pub async fn reply(&self, message: &str) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() || message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AppError::ValidationError(format!(
                "Message must be 1 to {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        let history = match self.history.recent(self.history_turns).await {
            Ok(turns) => turns,
            Err(err) => {
                warn!(error = %err, "Could not load chat history, answering without it");
                Vec::new()
            }
        };
        debug!(turns = history.len(), "Loaded chat history");

        let contextual_query = clean_llm_response(
            &self
                .client
                .generate(&self.config, &build_context_prompt(&history, message))
                .await?,
        );
        let answer = clean_llm_response(
            &self
                .client
                .generate(&self.config, &build_answer_prompt(&contextual_query))
                .await?,
        );
        if answer.is_empty() {
            return Err(AppError::LLMError("Assistant returned an empty answer".to_string()));
        }

        if let Err(err) = self.history.save(message, &answer).await {
            warn!(error = %err, "Failed to persist chat turn");
        }

        Ok(ChatReply {
            contextual_query,
            answer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::connection::connect_pool;
    use crate::infrastructure::llm_clients::testing::ScriptedClient;

    async fn history() -> Arc<ChatHistoryStore> {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        Arc::new(ChatHistoryStore::init(pool).await.unwrap())
    }

    #[tokio::test]
    async fn test_reply_uses_history_and_persists_turn() {
        let history = history().await;
        history
            .save("What is RTI?", "RTI lets citizens request information.")
            .await
            .unwrap();

        let client = Arc::new(ScriptedClient::new(vec![
            Ok("How do I file an RTI application online?".to_string()),
            Ok("Apply at rtionline.kerala.gov.in with a \u{20B9}10 fee.".to_string()),
        ]));
        let assistant = ChatAssistant::new(client.clone(), history.clone(), LLMConfig::default(), 10);

        let reply = assistant.reply("how do I apply?").await.unwrap();

        assert_eq!(reply.contextual_query, "How do I file an RTI application online?");
        let prompts = client.prompts();
        assert!(prompts[0].contains("User: What is RTI?"));
        assert!(prompts[0].contains("how do I apply?"));
        assert!(prompts[1].starts_with("Kerala Government Transparency"));
        assert!(prompts[1].ends_with("User: How do I file an RTI application online?\nAssistant:"));

        let turns = history.recent(10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].user_message, "how do I apply?");
        assert_eq!(turns[1].model_message, reply.answer);
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let history = history().await;
        let client = Arc::new(ScriptedClient::new(vec![Err(AppError::Transport(
            "connection reset".to_string(),
        ))]));
        let assistant = ChatAssistant::new(client, history.clone(), LLMConfig::default(), 10);

        let err = assistant.reply("pension status").await.unwrap_err();

        assert_eq!(err.kind(), "transport");
        assert!(history.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let assistant = ChatAssistant::new(client.clone(), history().await, LLMConfig::default(), 10);
        assert!(matches!(
            assistant.reply("  ").await,
            Err(AppError::ValidationError(_))
        ));
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn test_context_prompt_without_history() {
        let prompt = build_context_prompt(&[], "ration card");
        assert!(prompt.contains("Chat History:\n(none)"));
        assert!(prompt.contains("Current Query:\nration card"));
    }
}
