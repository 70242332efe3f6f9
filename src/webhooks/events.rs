//! Typed conversation webhook events.
//!
//! The platform posts form-encoded callbacks with an `EventType`
//! discriminator. Parsing narrows them to one enum so each flow handles
//! exactly the fields it consumes and unknown types are rejected in a
//! single place.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::WebhookError;

/// Raw conversation callback payload as posted by the platform.
///
/// Every field is optional at this layer; [`ConversationWebhook::into_event`]
/// enforces the per-kind requirements.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationWebhook {
    #[serde(rename = "EventType")]
    pub event_type: Option<String>,
    #[serde(rename = "ConversationSid")]
    pub conversation_sid: Option<String>,
    #[serde(rename = "MessagingBinding.Address")]
    pub messaging_binding_address: Option<String>,
    /// Chat identity of the acting user; absent for customers on messaging
    /// channels.
    #[serde(rename = "ClientIdentity")]
    pub client_identity: Option<String>,
    #[serde(rename = "Identity")]
    pub identity: Option<String>,
    #[serde(rename = "ParticipantSid")]
    pub participant_sid: Option<String>,
    #[serde(rename = "Author")]
    pub author: Option<String>,
    #[serde(rename = "Body")]
    pub body: Option<String>,
    #[serde(rename = "DateCreated")]
    pub date_created: Option<DateTime<Utc>>,
}

/// A conversation is about to be created (pre-action).
#[derive(Debug, Clone)]
pub struct ConversationAddEvent {
    /// Address of the customer whose inbound message opened the
    /// conversation; absent when it was opened some other way.
    pub messaging_binding_address: Option<String>,
}

/// A message is about to be committed (pre-action). This is the relay gate.
#[derive(Debug, Clone)]
pub struct MessageAddEvent {
    pub conversation_sid: String,
    pub client_identity: Option<String>,
}

/// A message was committed (post-action).
#[derive(Debug, Clone)]
pub struct MessageAddedEvent {
    pub conversation_sid: String,
    /// Messaging address for customers, chat identity for operators.
    pub author: String,
    pub body: Option<String>,
    pub client_identity: Option<String>,
    pub date_created: Option<DateTime<Utc>>,
}

/// A participant was attached to a conversation (post-action).
#[derive(Debug, Clone)]
pub struct ParticipantAddedEvent {
    pub conversation_sid: String,
    pub participant_sid: String,
    pub identity: Option<String>,
    pub messaging_binding_address: Option<String>,
}

/// The four conversation callbacks the bridge understands.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    ConversationAdd(ConversationAddEvent),
    MessageAdd(MessageAddEvent),
    MessageAdded(MessageAddedEvent),
    ParticipantAdded(ParticipantAddedEvent),
}

impl ConversationEvent {
    /// Wire name of the event kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConversationAdd(_) => "onConversationAdd",
            Self::MessageAdd(_) => "onMessageAdd",
            Self::MessageAdded(_) => "onMessageAdded",
            Self::ParticipantAdded(_) => "onParticipantAdded",
        }
    }
}

fn require(
    event_type: &'static str,
    field: &'static str,
    value: Option<String>,
) -> Result<String, WebhookError> {
    value.ok_or(WebhookError::MalformedEvent { event_type, field })
}

impl ConversationWebhook {
    /// Narrow the raw payload to a typed event.
    ///
    /// An `EventType` outside the four known kinds is rejected with the
    /// 422 contract the platform expects; a known kind missing one of its
    /// required fields is a malformed payload.
    pub fn into_event(self) -> Result<ConversationEvent, WebhookError> {
        let ConversationWebhook {
            event_type,
            conversation_sid,
            messaging_binding_address,
            client_identity,
            identity,
            participant_sid,
            author,
            body,
            date_created,
        } = self;

        match event_type.as_deref().unwrap_or_default() {
            "onConversationAdd" => Ok(ConversationEvent::ConversationAdd(ConversationAddEvent {
                messaging_binding_address,
            })),
            "onMessageAdd" => Ok(ConversationEvent::MessageAdd(MessageAddEvent {
                conversation_sid: require("onMessageAdd", "ConversationSid", conversation_sid)?,
                client_identity,
            })),
            "onMessageAdded" => Ok(ConversationEvent::MessageAdded(MessageAddedEvent {
                conversation_sid: require("onMessageAdded", "ConversationSid", conversation_sid)?,
                author: require("onMessageAdded", "Author", author)?,
                body,
                client_identity,
                date_created,
            })),
            "onParticipantAdded" => {
                Ok(ConversationEvent::ParticipantAdded(ParticipantAddedEvent {
                    conversation_sid: require(
                        "onParticipantAdded",
                        "ConversationSid",
                        conversation_sid,
                    )?,
                    participant_sid: require(
                        "onParticipantAdded",
                        "ParticipantSid",
                        participant_sid,
                    )?,
                    identity,
                    messaging_binding_address,
                }))
            }
            other => Err(WebhookError::UnrecognizedEventType {
                event_type: other.to_string(),
            }),
        }
    }
}
