//! Twilio Conversations REST backend.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::TwilioConfig;
use crate::conversations::{ConversationsClient, Participant, ParticipantAttributes};
use crate::error::ConversationsError;

const CONVERSATIONS_API_BASE: &str = "https://conversations.twilio.com/v1";
/// Participant page size when listing a conversation.
const PARTICIPANT_PAGE_SIZE: u32 = 50;

pub struct TwilioConversations {
    config: TwilioConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ParticipantPage {
    participants: Vec<Participant>,
    meta: PageMeta,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    next_page_url: Option<String>,
}

impl TwilioConversations {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn participants_url(&self, conversation_sid: &str) -> String {
        format!("{CONVERSATIONS_API_BASE}/Conversations/{conversation_sid}/Participants")
    }

    fn participant_url(&self, conversation_sid: &str, participant_sid: &str) -> String {
        format!(
            "{}/{}",
            self.participants_url(conversation_sid),
            participant_sid
        )
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(
            &self.config.account_sid,
            Some(self.config.auth_token.expose_secret()),
        )
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ConversationsError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ConversationsError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ConversationsError::Http(e.to_string()))
    }
}

#[async_trait]
impl ConversationsClient for TwilioConversations {
    async fn fetch_participant(
        &self,
        conversation_sid: &str,
        participant_sid: &str,
    ) -> Result<Participant, ConversationsError> {
        let request = self
            .client
            .get(self.participant_url(conversation_sid, participant_sid));
        let response = self
            .auth(request)
            .send()
            .await
            .map_err(|e| ConversationsError::Http(e.to_string()))?;
        Self::decode(response).await
    }

    async fn list_participants(
        &self,
        conversation_sid: &str,
    ) -> Result<Vec<Participant>, ConversationsError> {
        let mut participants = Vec::new();
        let mut url = format!(
            "{}?PageSize={PARTICIPANT_PAGE_SIZE}",
            self.participants_url(conversation_sid)
        );
        loop {
            let response = self
                .auth(self.client.get(&url))
                .send()
                .await
                .map_err(|e| ConversationsError::Http(e.to_string()))?;
            let page: ParticipantPage = Self::decode(response).await?;
            participants.extend(page.participants);
            match page.meta.next_page_url {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(participants)
    }

    async fn update_participant_attributes(
        &self,
        conversation_sid: &str,
        participant_sid: &str,
        attributes: &ParticipantAttributes,
    ) -> Result<(), ConversationsError> {
        debug!(participant_sid, "Updating participant attributes");
        let request = self
            .client
            .post(self.participant_url(conversation_sid, participant_sid))
            .form(&[("Attributes", attributes.to_raw())]);
        let response = self
            .auth(request)
            .send()
            .await
            .map_err(|e| ConversationsError::Http(e.to_string()))?;
        let _: Participant = Self::decode(response).await?;
        Ok(())
    }

    async fn add_participant(
        &self,
        conversation_sid: &str,
        identity: &str,
    ) -> Result<Participant, ConversationsError> {
        debug!(conversation_sid, identity, "Adding a chat participant");
        let request = self
            .client
            .post(self.participants_url(conversation_sid))
            .form(&[("Identity", identity)]);
        let response = self
            .auth(request)
            .send()
            .await
            .map_err(|e| ConversationsError::Http(e.to_string()))?;
        Self::decode(response).await
    }
}
