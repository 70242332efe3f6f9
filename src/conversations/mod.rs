//! Conversation participants and the messaging platform surface.
//!
//! The platform stores participant attributes as a JSON-encoded string.
//! [`ParticipantAttributes`] models the slice of that bag the bridge
//! manages and passes everything else through untouched.

pub mod twilio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConversationsError;

/// How a participant is wired to an external messaging channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagingBinding {
    pub address: Option<String>,
    pub proxy_address: Option<String>,
}

/// A participant attached to a conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct Participant {
    pub sid: String,
    /// Chat identity; present only for operators.
    pub identity: Option<String>,
    /// Attribute bag exactly as the platform stores it (JSON text).
    pub attributes: String,
    pub messaging_binding: Option<MessagingBinding>,
}

impl Participant {
    /// A customer participant joins through a messaging binding (address
    /// plus proxy address) and has no chat identity.
    pub fn is_customer(&self) -> bool {
        self.identity.is_none()
            && self
                .messaging_binding
                .as_ref()
                .is_some_and(|b| b.address.is_some() && b.proxy_address.is_some())
    }

    /// The external address the participant is reachable on.
    pub fn address(&self) -> Option<&str> {
        self.messaging_binding.as_ref()?.address.as_deref()
    }

    /// Parse this participant's attribute bag.
    pub fn parse_attributes(&self) -> Result<ParticipantAttributes, ConversationsError> {
        ParticipantAttributes::from_raw(&self.attributes)
    }
}

/// The managed slice of a participant's attribute bag, with pass-through
/// for whatever else the platform or operators have stored there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ParticipantAttributes {
    /// Parse the platform's JSON-text encoding; empty text is an empty bag.
    pub fn from_raw(raw: &str) -> Result<Self, ConversationsError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|e| ConversationsError::InvalidAttributes(e.to_string()))
    }

    /// Serialize back to the platform's JSON-text encoding.
    pub fn to_raw(&self) -> String {
        serde_json::to_string(self).expect("attribute bag serializes")
    }
}

/// Messaging platform surface consumed by the webhook flows.
#[async_trait]
pub trait ConversationsClient: Send + Sync {
    /// Fetch a single participant of a conversation.
    async fn fetch_participant(
        &self,
        conversation_sid: &str,
        participant_sid: &str,
    ) -> Result<Participant, ConversationsError>;

    /// List every participant in a conversation.
    async fn list_participants(
        &self,
        conversation_sid: &str,
    ) -> Result<Vec<Participant>, ConversationsError>;

    /// Replace a participant's attribute bag.
    async fn update_participant_attributes(
        &self,
        conversation_sid: &str,
        participant_sid: &str,
        attributes: &ParticipantAttributes,
    ) -> Result<(), ConversationsError>;

    /// Add a participant by chat identity (an operator).
    async fn add_participant(
        &self,
        conversation_sid: &str,
        identity: &str,
    ) -> Result<Participant, ConversationsError>;
}
