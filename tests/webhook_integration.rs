//! Integration tests for the callback routes.
//!
//! Each test spins up the Axum server on a random port with in-memory
//! collaborators and posts real form-encoded callbacks at it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use crm_bridge::conversations::{
    ConversationsClient, MessagingBinding, Participant, ParticipantAttributes,
};
use crm_bridge::crm::{
    ChannelType, CrmStore, Customer, CustomerChannel, CustomerDetails, CustomerField,
    CustomerQuery, CustomerUpdate, NewCustomer, normalize_address,
};
use crm_bridge::error::{ConversationsError, CrmError};
use crm_bridge::optout::OptOutStatus;
use crm_bridge::server;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn make_customer(id: &str, name: &str, address: &str) -> Customer {
    Customer {
        id: id.to_string(),
        display_name: name.to_string(),
        channels: vec![CustomerChannel {
            channel_type: ChannelType::Sms,
            value: address.to_string(),
        }],
        links: vec![],
        details: CustomerDetails {
            title: "Information".into(),
            content: String::new(),
        },
        worker: None,
        opt_out: OptOutStatus::NotSet,
        avatar: None,
        address: address.to_string(),
    }
}

fn customer_participant(sid: &str, address: &str) -> Participant {
    Participant {
        sid: sid.to_string(),
        identity: None,
        attributes: "{}".into(),
        messaging_binding: Some(MessagingBinding {
            address: Some(address.to_string()),
            proxy_address: Some("+15550109999".into()),
        }),
    }
}

/// CRM store stub over a fixed roster (no real network calls).
#[derive(Default)]
struct StubCrm {
    customers: Vec<Customer>,
    updates: Mutex<Vec<(String, CustomerUpdate)>>,
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl CrmStore for StubCrm {
    async fn find_customer(
        &self,
        field: CustomerField,
        value: &str,
    ) -> Result<Option<Customer>, CrmError> {
        Ok(self
            .customers
            .iter()
            .find(|c| match field {
                CustomerField::Id => c.id == value,
                CustomerField::Sms => c.address == value,
            })
            .cloned())
    }

    async fn list_customers(&self, query: CustomerQuery) -> Result<Vec<Customer>, CrmError> {
        Ok(self
            .customers
            .iter()
            .filter(|c| match &query.worker {
                Some(worker) => c.worker.as_deref() == Some(worker.as_str()),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn create_customer(&self, new: NewCustomer) -> Result<Customer, CrmError> {
        let address = new
            .channels
            .iter()
            .find(|c| c.channel_type == ChannelType::Sms)
            .map(|c| normalize_address(&c.value))
            .unwrap_or_else(|| "none".to_string());
        let mut customer = make_customer("rec-created", &new.display_name, &address);
        customer.worker = new.worker;
        Ok(customer)
    }

    async fn update_customer(&self, id: &str, update: CustomerUpdate) -> Result<(), CrmError> {
        self.updates.lock().unwrap().push((id.to_string(), update));
        Ok(())
    }

    async fn delete_customer(&self, id: &str) -> Result<(), CrmError> {
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

/// Platform stub over a fixed participant list.
#[derive(Default)]
struct StubConversations {
    participants: Vec<Participant>,
    attribute_updates: Mutex<Vec<(String, ParticipantAttributes)>>,
    added: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ConversationsClient for StubConversations {
    async fn fetch_participant(
        &self,
        _conversation_sid: &str,
        participant_sid: &str,
    ) -> Result<Participant, ConversationsError> {
        self.participants
            .iter()
            .find(|p| p.sid == participant_sid)
            .cloned()
            .ok_or_else(|| ConversationsError::Api {
                status: 404,
                message: format!("no participant {participant_sid}"),
            })
    }

    async fn list_participants(
        &self,
        _conversation_sid: &str,
    ) -> Result<Vec<Participant>, ConversationsError> {
        Ok(self.participants.clone())
    }

    async fn update_participant_attributes(
        &self,
        _conversation_sid: &str,
        participant_sid: &str,
        attributes: &ParticipantAttributes,
    ) -> Result<(), ConversationsError> {
        self.attribute_updates
            .lock()
            .unwrap()
            .push((participant_sid.to_string(), attributes.clone()));
        Ok(())
    }

    async fn add_participant(
        &self,
        conversation_sid: &str,
        identity: &str,
    ) -> Result<Participant, ConversationsError> {
        self.added
            .lock()
            .unwrap()
            .push((conversation_sid.to_string(), identity.to_string()));
        Ok(Participant {
            sid: "MB-added".into(),
            identity: Some(identity.to_string()),
            attributes: "{}".into(),
            messaging_binding: None,
        })
    }
}

/// Start the server on a random port, return (port, crm, conversations).
async fn start_server(
    crm: StubCrm,
    conversations: StubConversations,
) -> (u16, Arc<StubCrm>, Arc<StubConversations>) {
    let crm = Arc::new(crm);
    let conversations = Arc::new(conversations);
    let crm_dyn: Arc<dyn CrmStore> = crm.clone();
    let conversations_dyn: Arc<dyn ConversationsClient> = conversations.clone();
    let app = server::app(crm_dyn, conversations_dyn);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, crm, conversations)
}

// ── Conversations Callback ───────────────────────────────────────────

#[tokio::test]
async fn health_answers_ok() {
    timeout(TEST_TIMEOUT, async {
        let (port, _, _) = start_server(StubCrm::default(), StubConversations::default()).await;

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "OK");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_event_types_come_back_unprocessable() {
    timeout(TEST_TIMEOUT, async {
        let (port, _, _) = start_server(StubCrm::default(), StubConversations::default()).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/conversations"))
            .form(&[("EventType", "onBogus")])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422);

        let body: Value = resp.json().await.unwrap();
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("422"));
        assert!(message.contains("onBogus"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn new_conversations_get_named_and_decorated() {
    timeout(TEST_TIMEOUT, async {
        let mut dana = make_customer("rec001", "Dana Orta", "+15550100200");
        dana.avatar = Some("https://example.com/dana.png".into());
        let crm = StubCrm {
            customers: vec![dana],
            ..Default::default()
        };
        let (port, _, _) = start_server(crm, StubConversations::default()).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/conversations"))
            .form(&[
                ("EventType", "onConversationAdd"),
                ("MessagingBinding.Address", "+1-555-010-0200"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["friendly_name"], "Dana Orta");
        assert_eq!(
            body["attributes"],
            r#"{"avatar":"https://example.com/dana.png"}"#
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn messages_to_an_opted_out_customer_are_refused_with_451() {
    timeout(TEST_TIMEOUT, async {
        let mut dana = make_customer("rec001", "Dana Orta", "+15550100200");
        dana.opt_out = OptOutStatus::OptedOut;
        let crm = StubCrm {
            customers: vec![dana],
            ..Default::default()
        };
        let conversations = StubConversations {
            participants: vec![customer_participant("MB001", "+15550100200")],
            ..Default::default()
        };
        let (port, _, _) = start_server(crm, conversations).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/conversations"))
            .form(&[("EventType", "onMessageAdd"), ("ConversationSid", "CH001")])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 451);

        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("451"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn clean_conversations_relay_with_success() {
    timeout(TEST_TIMEOUT, async {
        let crm = StubCrm {
            customers: vec![make_customer("rec001", "Dana Orta", "+15550100200")],
            ..Default::default()
        };
        let conversations = StubConversations {
            participants: vec![customer_participant("MB001", "+15550100200")],
            ..Default::default()
        };
        let (port, _, _) = start_server(crm, conversations).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/conversations"))
            .form(&[("EventType", "onMessageAdd"), ("ConversationSid", "CH001")])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, "success");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn a_stop_text_lands_in_the_crm() {
    timeout(TEST_TIMEOUT, async {
        let crm = StubCrm {
            customers: vec![make_customer("rec001", "Dana Orta", "+15550100200")],
            ..Default::default()
        };
        let (port, crm, _) = start_server(crm, StubConversations::default()).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/conversations"))
            .form(&[
                ("EventType", "onMessageAdded"),
                ("ConversationSid", "CH001"),
                ("Author", "+1-555-010-0200"),
                ("Body", "stop"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let updates = crm.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "rec001");
        assert_eq!(updates[0].1.opt_out, Some(OptOutStatus::OptedOut));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn new_customer_participants_are_enriched_from_the_crm() {
    timeout(TEST_TIMEOUT, async {
        let crm = StubCrm {
            customers: vec![make_customer("rec001", "Dana Orta", "+15550100200")],
            ..Default::default()
        };
        let conversations = StubConversations {
            participants: vec![customer_participant("MB001", "+15550100200")],
            ..Default::default()
        };
        let (port, _, conversations) = start_server(crm, conversations).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/conversations"))
            .form(&[
                ("EventType", "onParticipantAdded"),
                ("ConversationSid", "CH001"),
                ("ParticipantSid", "MB001"),
                ("MessagingBinding.Address", "+1-555-010-0200"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let updates = conversations.attribute_updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "MB001");
        assert_eq!(updates[0].1.customer_id.as_deref(), Some("rec001"));
        assert_eq!(updates[0].1.display_name.as_deref(), Some("Dana Orta"));
    })
    .await
    .expect("test timed out");
}

// ── Routing Callback ─────────────────────────────────────────────────

#[tokio::test]
async fn routing_returns_the_assigned_worker_and_attaches_them() {
    timeout(TEST_TIMEOUT, async {
        let mut dana = make_customer("rec001", "Dana Orta", "+15550100200");
        dana.worker = Some("dana@example.com".into());
        let crm = StubCrm {
            customers: vec![dana],
            ..Default::default()
        };
        let (port, _, conversations) = start_server(crm, StubConversations::default()).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/routing"))
            .form(&[
                ("ConversationSid", "CH001"),
                ("MessagingBinding.Address", "+1-555-010-0200"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["worker_identity"], "dana@example.com");

        let added = conversations.added.lock().unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].1, "dana@example.com");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn routing_with_no_workers_anywhere_is_a_500() {
    timeout(TEST_TIMEOUT, async {
        let crm = StubCrm {
            customers: vec![make_customer("rec001", "Dana Orta", "+15550100200")],
            ..Default::default()
        };
        let (port, _, _) = start_server(crm, StubConversations::default()).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/routing"))
            .form(&[
                ("ConversationSid", "CH777"),
                ("MessagingBinding.Address", "+15550100200"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);

        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("CH777"));
    })
    .await
    .expect("test timed out");
}

// ── Directory Callback ───────────────────────────────────────────────

#[tokio::test]
async fn the_directory_pages_a_worker_roster() {
    timeout(TEST_TIMEOUT, async {
        let customers = (1..=3)
            .map(|n| {
                let mut c = make_customer(
                    &format!("rec00{n}"),
                    &format!("Customer {n}"),
                    &format!("+1555010020{n}"),
                );
                c.worker = Some("dana@example.com".into());
                c
            })
            .collect();
        let crm = StubCrm {
            customers,
            ..Default::default()
        };
        let (port, _, _) = start_server(crm, StubConversations::default()).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/crm"))
            .form(&[
                ("Location", "GetCustomersList"),
                ("Worker", "dana@example.com"),
                ("PageSize", "2"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        let first_page = body["objects"]["customers"].as_array().unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[1]["customer_id"], "rec002");

        // Anchor on the last item of the first page carries on from there.
        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/crm"))
            .form(&[
                ("Location", "GetCustomersList"),
                ("Worker", "dana@example.com"),
                ("PageSize", "2"),
                ("Anchor", "rec002"),
            ])
            .send()
            .await
            .unwrap();
        let body: Value = resp.json().await.unwrap();
        let second_page = body["objects"]["customers"].as_array().unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0]["customer_id"], "rec003");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn directory_create_and_delete_round_trip() {
    timeout(TEST_TIMEOUT, async {
        let crm = StubCrm {
            customers: vec![make_customer("rec001", "Dana Orta", "+15550100200")],
            ..Default::default()
        };
        let (port, crm, _) = start_server(crm, StubConversations::default()).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/crm"))
            .form(&[
                ("Location", "CreateCustomer"),
                ("DisplayName", "Kai Moss"),
                ("Channels", r#"[{"type":"sms","value":"+1-555-010-0300"}]"#),
                ("Worker", "dana@example.com"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["objects"]["customer"]["display_name"], "Kai Moss");

        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/crm"))
            .form(&[("Location", "DeleteCustomer"), ("CustomerId", "rec001")])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, serde_json::json!({}));
        assert_eq!(crm.deleted.lock().unwrap().as_slice(), ["rec001"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_directory_locations_are_unprocessable() {
    timeout(TEST_TIMEOUT, async {
        let (port, _, _) = start_server(StubCrm::default(), StubConversations::default()).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{port}/callbacks/crm"))
            .form(&[("Location", "FailMe")])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422);

        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("FailMe"));
    })
    .await
    .expect("test timed out");
}
