//! Conversation event dispatch.
//!
//! One entry point per platform callback. Pre-action events (`onConversationAdd`,
//! `onMessageAdd`) can veto or decorate what the platform is about to do;
//! post-action events (`onMessageAdded`, `onParticipantAdded`) react to what
//! it already did.

use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::conversations::ConversationsClient;
use crate::crm::{CrmStore, CustomerUpdate};
use crate::error::{CrmError, Error, WebhookError};
use crate::optout::{self, OptSignal};
use crate::webhooks::events::{
    ConversationAddEvent, ConversationEvent, ConversationWebhook, MessageAddEvent,
    MessageAddedEvent, ParticipantAddedEvent,
};
use crate::webhooks::sync::plan_attribute_sync;

/// Metadata returned to the platform from the pre-creation hook.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationProperties {
    pub friendly_name: String,
    /// JSON-encoded attribute bag, the encoding the platform applies.
    pub attributes: String,
}

/// What a handled event tells the transport layer to answer.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// Apply these properties to the conversation being created.
    Properties(ConversationProperties),
    /// Handled; the transport acknowledges with `"success"`.
    Acknowledged,
    /// Not relevant to the bridge; the transport answers `null`.
    Ignored,
}

#[derive(Serialize)]
struct ConversationAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar: Option<String>,
}

/// Routes each conversation event to its flow.
///
/// Collaborators are injected as trait objects so the flows can be
/// exercised against in-memory stand-ins.
pub struct EventDispatcher {
    crm: Arc<dyn CrmStore>,
    conversations: Arc<dyn ConversationsClient>,
}

impl EventDispatcher {
    pub fn new(crm: Arc<dyn CrmStore>, conversations: Arc<dyn ConversationsClient>) -> Self {
        Self { crm, conversations }
    }

    /// Parse a raw webhook payload and handle the event it carries.
    pub async fn handle_webhook(&self, payload: ConversationWebhook) -> Result<EventOutcome, Error> {
        let event = payload.into_event()?;
        self.handle(event).await
    }

    /// Handle a typed event. Flow errors propagate unchanged to the
    /// transport layer, which owns the status mapping.
    pub async fn handle(&self, event: ConversationEvent) -> Result<EventOutcome, Error> {
        info!(event_type = event.kind(), "Received a conversations webhook event");
        match event {
            ConversationEvent::ConversationAdd(ev) => self.on_conversation_add(ev).await,
            ConversationEvent::MessageAdd(ev) => self.on_message_add(ev).await,
            ConversationEvent::MessageAdded(ev) => self.on_message_added(ev).await,
            ConversationEvent::ParticipantAdded(ev) => self.on_participant_added(ev).await,
        }
    }

    /// Pre-creation hook: name the conversation after the customer opening
    /// it and seed its avatar. Unknown callers get their number as the
    /// name; conversations not opened by an inbound message are left alone.
    async fn on_conversation_add(
        &self,
        event: ConversationAddEvent,
    ) -> Result<EventOutcome, Error> {
        let Some(address) = event.messaging_binding_address else {
            return Ok(EventOutcome::Ignored);
        };

        let customer = self.crm.find_by_address(&address).await?;
        let (friendly_name, avatar) = match customer {
            Some(c) => (c.display_name, c.avatar),
            None => (address, None),
        };

        let attributes = serde_json::to_string(&ConversationAttributes { avatar })
            .expect("attribute bag serializes");
        debug!(%friendly_name, "Decorating the new conversation");
        Ok(EventOutcome::Properties(ConversationProperties {
            friendly_name,
            attributes,
        }))
    }

    /// Pre-action relay gate: refuse the message when any customer in the
    /// conversation has opted out, before the platform commits it.
    async fn on_message_add(&self, event: MessageAddEvent) -> Result<EventOutcome, Error> {
        if event.client_identity.is_some() {
            return Ok(EventOutcome::Acknowledged);
        }

        let participants = self
            .conversations
            .list_participants(&event.conversation_sid)
            .await?;
        let lookups = participants
            .iter()
            .filter(|p| p.is_customer())
            .filter_map(|p| p.address())
            .map(|address| self.crm.find_by_address(address));
        let customers = try_join_all(lookups).await?;

        if customers
            .into_iter()
            .flatten()
            .any(|c| c.opt_out.is_opted_out())
        {
            info!(
                conversation_sid = %event.conversation_sid,
                "Refusing a message to an opted-out customer"
            );
            return Err(WebhookError::CustomerOptedOut.into());
        }

        Ok(EventOutcome::Acknowledged)
    }

    /// Post-action hook: free-text subscription management. Only customer
    /// messages drive the state machine; an operator typing STOP into the
    /// chat changes nothing.
    async fn on_message_added(&self, event: MessageAddedEvent) -> Result<EventOutcome, Error> {
        if event.client_identity.is_some() {
            return Ok(EventOutcome::Acknowledged);
        }

        let signal = optout::classify(event.body.as_deref());
        if signal == OptSignal::None {
            return Ok(EventOutcome::Acknowledged);
        }

        let customer = self
            .crm
            .find_by_address(&event.author)
            .await?
            .ok_or_else(|| CrmError::RecordNotFound {
                field: "sms".to_string(),
                value: event.author.clone(),
            })?;

        let next = customer.opt_out.apply(signal);
        info!(
            customer_id = %customer.id,
            state = next.label(),
            "Updating the customer's opt-out state"
        );
        self.crm
            .update_customer(
                &customer.id,
                CustomerUpdate {
                    opt_out: Some(next),
                    ..Default::default()
                },
            )
            .await?;

        Ok(EventOutcome::Acknowledged)
    }

    /// Post-action hook: enrich a customer participant's attribute bag
    /// from their CRM record. The write is best-effort; a platform failure
    /// is logged and the webhook still succeeds.
    async fn on_participant_added(
        &self,
        event: ParticipantAddedEvent,
    ) -> Result<EventOutcome, Error> {
        let Some(address) = event
            .messaging_binding_address
            .filter(|_| event.identity.is_none())
        else {
            return Ok(EventOutcome::Acknowledged);
        };

        let participant = self
            .conversations
            .fetch_participant(&event.conversation_sid, &event.participant_sid)
            .await?;
        let customer = self.crm.find_by_address(&address).await?;
        let existing = participant.parse_attributes()?;

        match plan_attribute_sync(&existing, customer.as_ref()) {
            Some(merged) => {
                if let Err(e) = self
                    .conversations
                    .update_participant_attributes(
                        &event.conversation_sid,
                        &event.participant_sid,
                        &merged,
                    )
                    .await
                {
                    warn!(
                        participant_sid = %event.participant_sid,
                        error = %e,
                        "Update customer participant failed"
                    );
                }
            }
            None => debug!(
                participant_sid = %event.participant_sid,
                "Participant attributes already in sync"
            ),
        }

        Ok(EventOutcome::Acknowledged)
    }
}
