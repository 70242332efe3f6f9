//! Airtable-backed CRM store.
//!
//! The roster is one table, one row per customer, with free-text columns.
//! This module is a thin client over the Airtable v0 REST API plus the
//! mapping between those columns and the core model.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::AirtableConfig;
use crate::crm::{
    ChannelType, CrmStore, Customer, CustomerChannel, CustomerDetails, CustomerField,
    CustomerLink, CustomerQuery, CustomerUpdate, NewCustomer, normalize_address,
};
use crate::error::CrmError;
use crate::optout::OptOutStatus;

const AIRTABLE_API_BASE: &str = "https://api.airtable.com/v0";
/// Every query reads through the shared grid view so store order is the
/// view order.
const CUSTOMERS_VIEW: &str = "Grid view";
/// Page size used when enumerating the roster.
const LIST_PAGE_SIZE: u32 = 100;

pub struct AirtableCrm {
    config: AirtableConfig,
    client: Client,
}

#[derive(Debug, serde::Deserialize)]
struct RecordPage {
    records: Vec<AirtableRecord>,
    offset: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct AirtableRecord {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Serialize)]
struct RecordBody {
    fields: Map<String, Value>,
}

impl AirtableCrm {
    pub fn new(config: AirtableConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn records_url(&self) -> String {
        format!(
            "{AIRTABLE_API_BASE}/{}/{}",
            self.config.base_id, self.config.table
        )
    }

    fn record_url(&self, id: &str) -> String {
        format!("{}/{}", self.records_url(), id)
    }

    async fn fetch_page(&self, params: &[(String, String)]) -> Result<RecordPage, CrmError> {
        let response = self
            .client
            .get(self.records_url())
            .bearer_auth(self.config.api_key.expose_secret())
            .query(params)
            .send()
            .await
            .map_err(|e| CrmError::Http(e.to_string()))?;
        Self::decode(response).await
    }

    /// Enumerate every record the filter matches, following offset cursors.
    async fn fetch_all(&self, filter: Option<String>) -> Result<Vec<AirtableRecord>, CrmError> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut params = vec![
                ("view".to_string(), CUSTOMERS_VIEW.to_string()),
                ("pageSize".to_string(), LIST_PAGE_SIZE.to_string()),
            ];
            if let Some(filter) = &filter {
                params.push(("filterByFormula".to_string(), filter.clone()));
            }
            if let Some(offset) = &offset {
                params.push(("offset".to_string(), offset.clone()));
            }

            let page = self.fetch_page(&params).await?;
            records.extend(page.records);
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(records)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CrmError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CrmError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CrmError::Decode(e.to_string()))
    }

    async fn expect_success(response: reqwest::Response) -> Result<(), CrmError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CrmError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CrmStore for AirtableCrm {
    async fn find_customer(
        &self,
        field: CustomerField,
        value: &str,
    ) -> Result<Option<Customer>, CrmError> {
        let params = vec![
            ("view".to_string(), CUSTOMERS_VIEW.to_string()),
            ("maxRecords".to_string(), "1".to_string()),
            ("filterByFormula".to_string(), field_formula(field, value)),
        ];
        let page = self.fetch_page(&params).await?;
        Ok(page.records.into_iter().next().map(to_customer))
    }

    async fn list_customers(&self, query: CustomerQuery) -> Result<Vec<Customer>, CrmError> {
        let filter = query.worker.as_deref().map(worker_formula);
        let records = self.fetch_all(filter).await?;
        Ok(records.into_iter().map(to_customer).collect())
    }

    async fn create_customer(&self, new: NewCustomer) -> Result<Customer, CrmError> {
        debug!(display_name = %new.display_name, "Creating a customer record");
        let response = self
            .client
            .post(self.records_url())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&RecordBody {
                fields: creation_fields(&new),
            })
            .send()
            .await
            .map_err(|e| CrmError::Http(e.to_string()))?;
        let record: AirtableRecord = Self::decode(response).await?;
        Ok(to_customer(record))
    }

    async fn update_customer(&self, id: &str, update: CustomerUpdate) -> Result<(), CrmError> {
        debug!(id, "Updating a customer record");
        let response = self
            .client
            .patch(self.record_url(id))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&RecordBody {
                fields: update_fields(&update),
            })
            .send()
            .await
            .map_err(|e| CrmError::Http(e.to_string()))?;
        Self::expect_success(response).await
    }

    async fn delete_customer(&self, id: &str) -> Result<(), CrmError> {
        debug!(id, "Deleting a customer record");
        let response = self
            .client
            .delete(self.record_url(id))
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| CrmError::Http(e.to_string()))?;
        Self::expect_success(response).await
    }
}

/// filterByFormula expression for an exact field match.
fn field_formula(field: CustomerField, value: &str) -> String {
    let safe = sanitize_literal(value);
    match field {
        CustomerField::Id => format!("RECORD_ID() = \"{safe}\""),
        CustomerField::Sms => format!("{{sms}} = \"{safe}\""),
    }
}

fn worker_formula(worker: &str) -> String {
    format!("{{owner}} = \"{}\"", sanitize_literal(worker))
}

/// Formula string literals have no escape sequence; drop the delimiter
/// from the value instead of letting it close the literal.
fn sanitize_literal(value: &str) -> String {
    value.replace('"', "")
}

/// Map a raw record onto the core model. Column access is total: missing
/// columns become empty channels, links, and an unset opt-out state.
fn to_customer(record: AirtableRecord) -> Customer {
    let fields = record.fields;
    let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);

    let sms = text("sms");
    let opt_out = OptOutStatus::from_raw(fields.get("opt_out").and_then(Value::as_str));

    let mut channels = Vec::new();
    if let Some(value) = sms.clone() {
        channels.push(CustomerChannel {
            channel_type: ChannelType::Sms,
            value,
        });
    }
    if let Some(value) = text("whatsapp") {
        channels.push(CustomerChannel {
            channel_type: ChannelType::Whatsapp,
            value,
        });
    }

    let mut links = Vec::new();
    if let Some(value) = text("linkedin") {
        links.push(CustomerLink {
            link_type: "LinkedIn".to_string(),
            value,
            display_name: "Social Media Profile".to_string(),
        });
    }
    if let Some(value) = text("email") {
        links.push(CustomerLink {
            link_type: "Email".to_string(),
            value: format!("mailto:{value}"),
            display_name: "Email Address".to_string(),
        });
    }

    let details = CustomerDetails {
        title: "Information".to_string(),
        content: format!(
            "Notes: {}\nOpt Out Status: {}",
            text("notes").unwrap_or_default(),
            opt_out.label()
        ),
    };

    // Records without an sms column still need a comparable address.
    let address = normalize_address(sms.as_deref().unwrap_or("none"));

    Customer {
        id: record.id,
        display_name: text("name").unwrap_or_default(),
        channels,
        links,
        details,
        worker: text("owner"),
        opt_out,
        avatar: text("avatar"),
        address,
    }
}

fn creation_fields(new: &NewCustomer) -> Map<String, Value> {
    let channel_value = |kind: ChannelType| {
        new.channels
            .iter()
            .find(|c| c.channel_type == kind)
            .map(|c| c.value.clone())
    };

    let mut fields = Map::new();
    fields.insert("name".to_string(), Value::String(new.display_name.clone()));
    if let Some(sms) = channel_value(ChannelType::Sms) {
        fields.insert("sms".to_string(), Value::String(sms));
    }
    if let Some(whatsapp) = channel_value(ChannelType::Whatsapp) {
        fields.insert("whatsapp".to_string(), Value::String(whatsapp));
    }
    if let Some(worker) = &new.worker {
        fields.insert("owner".to_string(), Value::String(worker.clone()));
    }
    fields
}

fn update_fields(update: &CustomerUpdate) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(name) = &update.display_name {
        fields.insert("name".to_string(), Value::String(name.clone()));
    }
    if let Some(worker) = &update.worker {
        fields.insert("owner".to_string(), Value::String(worker.clone()));
    }
    if let Some(opt_out) = update.opt_out {
        // NotSet clears the column.
        let value = opt_out
            .as_raw()
            .map_or(Value::Null, |raw| Value::String(raw.to_string()));
        fields.insert("opt_out".to_string(), value);
    }
    fields
}
