use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{normalize_name, ChatMessage, Sender, SuggestionSet, Threshold, UserId},
    services::{inventory::InventoryCoordinator, suggestions::SuggestionService},
};

const NO_MATCHES_REPLY: &str =
    "I couldn't find any recipes with those ingredients. Try adding more ingredients!";
const FAILURE_REPLY: &str = "Sorry, I couldn't process your request.";

/// Pulls ingredient names out of free text: comma separated, trimmed, lowercased
pub fn extract(text: &str) -> BTreeSet<String> {
    text.split(',')
        .map(normalize_name)
        .filter(|token| !token.is_empty())
        .collect()
}

fn reply_for(suggestions: &SuggestionSet) -> String {
    match suggestions.recipes.len() {
        0 => NO_MATCHES_REPLY.to_string(),
        n => format!("I found {} recipe(s) you can make!", n),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub extracted: BTreeSet<String>,
    #[serde(flatten)]
    pub suggestions: SuggestionSet,
    pub reply: String,
}

/// Chat front end over the suggestion service, with a per-user transcript
///
/// Only registered users get a transcript; naming an unknown user is `NotFound`.
pub struct ChatService {
    suggestions: Arc<SuggestionService>,
    users: Arc<InventoryCoordinator>,
    transcripts: DashMap<UserId, Vec<ChatMessage>>,
}

impl ChatService {
    pub fn new(suggestions: Arc<SuggestionService>, users: Arc<InventoryCoordinator>) -> Self {
        Self {
            suggestions,
            users,
            transcripts: DashMap::new(),
        }
    }

    fn record(&self, user: Option<&UserId>, message: ChatMessage) {
        if let Some(user) = user {
            self.transcripts.entry(user.clone()).or_default().push(message);
        }
    }

    /// Answers one chat message.
    ///
    /// Only the extracted terms of this message (plus the user's inventory, when
    /// `include_inventory` is set) are matched; earlier messages are never re-read.
    /// Messages of registered users are appended to their transcript together with
    /// the bot reply.
    pub async fn ask(
        &self,
        user: Option<&UserId>,
        text: &str,
        include_inventory: bool,
        threshold: Threshold,
    ) -> AppResult<ChatReply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("message is empty".to_string()));
        }

        let inventory = match (user, include_inventory) {
            (Some(user), include) => {
                let inventory = self.users.list(user).await?;
                include.then_some(inventory)
            }
            (None, true) => {
                return Err(AppError::Validation(
                    "include_inventory requires a username".to_string(),
                ))
            }
            (None, false) => None,
        };

        self.record(user, ChatMessage::new(text, Sender::User));

        match self
            .suggestions
            .chat_suggest(text, inventory.as_ref(), threshold)
            .await
        {
            Ok(found) => {
                let reply = reply_for(&found.suggestions);
                self.record(user, ChatMessage::new(reply.clone(), Sender::Bot));
                tracing::info!(
                    extracted = found.extracted.len(),
                    results = found.suggestions.recipes.len(),
                    "Chat message answered"
                );
                Ok(ChatReply {
                    extracted: found.extracted,
                    suggestions: found.suggestions,
                    reply,
                })
            }
            Err(e) => {
                self.record(user, ChatMessage::new(FAILURE_REPLY, Sender::Bot));
                Err(e)
            }
        }
    }

    /// Messages exchanged with `user`, oldest first
    pub async fn transcript(&self, user: &UserId) -> AppResult<Vec<ChatMessage>> {
        self.users.list(user).await?;
        Ok(self
            .transcripts
            .get(user)
            .map(|messages| messages.clone())
            .unwrap_or_default())
    }
}
