//! Customer records and the CRM store surface.
//!
//! The webhook flows only ever see the [`CrmStore`] trait and the model
//! types here; the Airtable backend lives in [`airtable`] and is injected
//! at startup.

pub mod airtable;

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CrmError;
use crate::optout::OptOutStatus;

/// Channel kinds a customer can be reached on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Sms,
    Whatsapp,
}

/// A reachable channel on a customer record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerChannel {
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub value: String,
}

/// An external link shown on the customer detail view.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerLink {
    #[serde(rename = "type")]
    pub link_type: String,
    pub value: String,
    pub display_name: String,
}

/// Freeform text block shown on the customer detail view.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetails {
    pub title: String,
    pub content: String,
}

/// A customer record as the webhook flows see it.
#[derive(Debug, Clone)]
pub struct Customer {
    /// Opaque stable identifier assigned by the CRM.
    pub id: String,
    pub display_name: String,
    pub channels: Vec<CustomerChannel>,
    pub links: Vec<CustomerLink>,
    pub details: CustomerDetails,
    /// Chat identity of the assigned operator, if any.
    pub worker: Option<String>,
    pub opt_out: OptOutStatus,
    pub avatar: Option<String>,
    /// Messaging address derived from the sms channel, already normalized.
    pub address: String,
}

/// Roster projection of a customer, for list views.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerView {
    pub display_name: String,
    pub customer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl From<&Customer> for CustomerView {
    fn from(customer: &Customer) -> Self {
        Self {
            display_name: customer.display_name.clone(),
            customer_id: customer.id.clone(),
            avatar: customer.avatar.clone(),
        }
    }
}

/// Fields accepted when creating a customer record.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub display_name: String,
    pub channels: Vec<CustomerChannel>,
    pub worker: Option<String>,
}

/// Partial update to an existing record. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct CustomerUpdate {
    pub display_name: Option<String>,
    pub worker: Option<String>,
    pub opt_out: Option<OptOutStatus>,
}

/// Record fields the store can filter on exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerField {
    Id,
    Sms,
}

impl CustomerField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Sms => "sms",
        }
    }
}

/// Roster query. `worker` narrows the list to that operator's customers.
#[derive(Debug, Clone, Default)]
pub struct CustomerQuery {
    pub worker: Option<String>,
}

/// Backend-agnostic CRM store consumed by the webhook flows.
#[async_trait]
pub trait CrmStore: Send + Sync {
    /// Look up a single customer by an exact field match.
    async fn find_customer(
        &self,
        field: CustomerField,
        value: &str,
    ) -> Result<Option<Customer>, CrmError>;

    /// List customers matching the query, in store order.
    async fn list_customers(&self, query: CustomerQuery) -> Result<Vec<Customer>, CrmError>;

    /// Create a customer record and return it as stored.
    async fn create_customer(&self, new: NewCustomer) -> Result<Customer, CrmError>;

    /// Apply a partial update to an existing record.
    async fn update_customer(&self, id: &str, update: CustomerUpdate) -> Result<(), CrmError>;

    /// Delete a record.
    async fn delete_customer(&self, id: &str) -> Result<(), CrmError>;

    /// Look up a customer by messaging address, normalizing it first.
    async fn find_by_address(&self, address: &str) -> Result<Option<Customer>, CrmError> {
        self.find_customer(CustomerField::Sms, &normalize_address(address))
            .await
    }
}

/// Strip the punctuation the CRM tolerates in phone columns (`-`, `(`, `)`)
/// so platform addresses and stored values compare exactly. Spaces and the
/// leading `+` are kept as-is on both sides.
pub fn normalize_address(raw: &str) -> String {
    static PUNCTUATION: OnceLock<Regex> = OnceLock::new();
    let punctuation = PUNCTUATION.get_or_init(|| Regex::new(r"[-()]").unwrap());
    punctuation.replace_all(raw, "").into_owned()
}
