//! Conversation routing.
//!
//! Resolves which operator a newly created conversation belongs to and
//! attaches them to it. Customers with an assigned worker route straight
//! to that worker; everyone else lands on a random worker drawn from the
//! roster.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::conversations::ConversationsClient;
use crate::crm::{CrmStore, CustomerQuery};
use crate::error::{Error, WebhookError};

/// Routing callback payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingRequest {
    #[serde(rename = "ConversationSid")]
    pub conversation_sid: Option<String>,
    #[serde(rename = "MessagingBinding.Address")]
    pub messaging_binding_address: Option<String>,
}

/// The operator identity a conversation routes to.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub worker_identity: String,
}

/// Resolve the worker for a conversation opened by `customer_address`.
///
/// An assigned worker on the customer record wins. Unknown and unassigned
/// customers fall back to a uniformly random pick over the distinct set of
/// workers that own at least one record; the pick is not persisted, so a
/// later conversation may land elsewhere.
pub async fn resolve_worker(
    crm: &dyn CrmStore,
    conversation_sid: &str,
    customer_address: &str,
) -> Result<RoutingDecision, Error> {
    if let Some(customer) = crm.find_by_address(customer_address).await? {
        if let Some(worker) = customer.worker {
            info!(conversation_sid, worker_identity = %worker, "Routing to the assigned worker");
            return Ok(RoutingDecision {
                worker_identity: worker,
            });
        }
    }

    info!(conversation_sid, "No assigned worker found, selecting a random worker");
    let roster = crm.list_customers(CustomerQuery::default()).await?;
    let mut workers: Vec<String> = roster.into_iter().filter_map(|c| c.worker).collect();
    workers.sort();
    workers.dedup();

    let worker_identity = workers
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| WebhookError::RoutingFailed {
            conversation_sid: conversation_sid.to_string(),
        })?;

    Ok(RoutingDecision { worker_identity })
}

/// Handle a routing callback: resolve the worker and attach them to the
/// conversation. The attach is best-effort; the decision is returned even
/// when the platform call fails, and the failure is logged.
pub async fn handle_routing_request(
    crm: &dyn CrmStore,
    conversations: &dyn ConversationsClient,
    request: RoutingRequest,
) -> Result<RoutingDecision, Error> {
    let conversation_sid = request.conversation_sid.ok_or(WebhookError::MalformedEvent {
        event_type: "routing callback",
        field: "ConversationSid",
    })?;
    let customer_address = request
        .messaging_binding_address
        .ok_or(WebhookError::MalformedEvent {
            event_type: "routing callback",
            field: "MessagingBinding.Address",
        })?;

    let decision = resolve_worker(crm, &conversation_sid, &customer_address).await?;

    match conversations
        .add_participant(&conversation_sid, &decision.worker_identity)
        .await
    {
        Ok(participant) => info!(
            conversation_sid,
            participant_sid = %participant.sid,
            "Added the worker to the conversation"
        ),
        Err(e) => warn!(
            conversation_sid,
            error = %e,
            "Create agent participant failed"
        ),
    }

    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::support::{StubCrm, StubConversations, make_customer};

    fn roster() -> Vec<crate::crm::Customer> {
        let mut dana = make_customer("rec001", "Dana Orta", "+15550100200");
        dana.worker = Some("dana@example.com".into());
        let mut kai = make_customer("rec002", "Kai Moss", "+15550100300");
        kai.worker = Some("kai@example.com".into());
        let unassigned = make_customer("rec003", "Lee Chu", "+15550100400");
        vec![dana, kai, unassigned]
    }

    #[tokio::test]
    async fn an_assigned_worker_always_wins() {
        let crm = StubCrm::with_customers(roster());
        let decision = resolve_worker(&crm, "CH001", "+1-555-010-0200").await.unwrap();
        assert_eq!(decision.worker_identity, "dana@example.com");
    }

    #[tokio::test]
    async fn unassigned_customers_get_a_worker_from_the_roster() {
        let crm = StubCrm::with_customers(roster());
        for _ in 0..20 {
            let decision = resolve_worker(&crm, "CH001", "+15550100400").await.unwrap();
            assert!(
                ["dana@example.com", "kai@example.com"]
                    .contains(&decision.worker_identity.as_str())
            );
        }
    }

    #[tokio::test]
    async fn unknown_customers_fall_back_the_same_way() {
        let crm = StubCrm::with_customers(roster());
        let decision = resolve_worker(&crm, "CH001", "+15550909090").await.unwrap();
        assert!(
            ["dana@example.com", "kai@example.com"].contains(&decision.worker_identity.as_str())
        );
    }

    #[tokio::test]
    async fn an_ownerless_roster_fails_routing_and_names_the_conversation() {
        let crm = StubCrm::with_customers(vec![make_customer(
            "rec003",
            "Lee Chu",
            "+15550100400",
        )]);
        let err = resolve_worker(&crm, "CH777", "+15550100400")
            .await
            .unwrap_err();
        assert_eq!(err.status(), 500);
        assert!(err.to_string().contains("CH777"));
    }

    #[tokio::test]
    async fn the_callback_attaches_the_resolved_worker() {
        let crm = StubCrm::with_customers(roster());
        let conversations = StubConversations::default();
        let request = RoutingRequest {
            conversation_sid: Some("CH001".into()),
            messaging_binding_address: Some("+15550100200".into()),
        };

        let decision = handle_routing_request(&crm, &conversations, request)
            .await
            .unwrap();
        assert_eq!(decision.worker_identity, "dana@example.com");
        let added = conversations.added.lock().unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].0, "CH001");
        assert_eq!(added[0].1, "dana@example.com");
    }

    #[tokio::test]
    async fn a_failed_attach_still_returns_the_decision() {
        let crm = StubCrm::with_customers(roster());
        let conversations = StubConversations {
            fail_add: true,
            ..Default::default()
        };
        let request = RoutingRequest {
            conversation_sid: Some("CH001".into()),
            messaging_binding_address: Some("+15550100200".into()),
        };

        let decision = handle_routing_request(&crm, &conversations, request)
            .await
            .unwrap();
        assert_eq!(decision.worker_identity, "dana@example.com");
    }

    #[tokio::test]
    async fn the_callback_requires_both_fields() {
        let crm = StubCrm::default();
        let conversations = StubConversations::default();
        let err = handle_routing_request(&crm, &conversations, RoutingRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }
}
