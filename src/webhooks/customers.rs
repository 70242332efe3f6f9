//! Customer directory callback.
//!
//! The agent desktop manages the customer roster through a single
//! callback dispatched on a `Location` field: create, delete, a detail
//! view, and a paged per-worker listing.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crm::{
    CrmStore, Customer, CustomerChannel, CustomerDetails, CustomerField, CustomerLink,
    CustomerQuery, CustomerView, NewCustomer,
};
use crate::error::{CrmError, Error, WebhookError};
use crate::paging;

/// Raw directory callback payload, dispatched on `Location`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerRequest {
    #[serde(rename = "Location")]
    pub location: Option<String>,
    #[serde(rename = "CustomerId")]
    pub customer_id: Option<String>,
    #[serde(rename = "DisplayName")]
    pub display_name: Option<String>,
    /// JSON-encoded channel list, e.g. `[{"type":"sms","value":"+1..."}]`.
    #[serde(rename = "Channels")]
    pub channels: Option<String>,
    #[serde(rename = "Worker")]
    pub worker: Option<String>,
    #[serde(rename = "PageSize")]
    pub page_size: Option<String>,
    #[serde(rename = "Anchor")]
    pub anchor: Option<String>,
}

/// Customer payload shape the directory UI renders.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetail {
    pub customer_id: String,
    pub display_name: String,
    pub channels: Vec<CustomerChannel>,
    pub links: Vec<CustomerLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub details: CustomerDetails,
}

impl From<Customer> for CustomerDetail {
    fn from(customer: Customer) -> Self {
        Self {
            customer_id: customer.id,
            display_name: customer.display_name,
            channels: customer.channels,
            links: customer.links,
            avatar: customer.avatar,
            details: customer.details,
        }
    }
}

/// Envelope the directory UI expects; deletes answer with an empty object.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CustomerResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objects: Option<CustomerObjects>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerObjects {
    Customer(CustomerDetail),
    Customers(Vec<CustomerView>),
}

impl CustomerResponse {
    fn customer(detail: CustomerDetail) -> Self {
        Self {
            objects: Some(CustomerObjects::Customer(detail)),
        }
    }

    fn customers(views: Vec<CustomerView>) -> Self {
        Self {
            objects: Some(CustomerObjects::Customers(views)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    CreateCustomer,
    DeleteCustomer,
    CustomerDetails,
    CustomersList,
}

fn parse_location(location: &str) -> Option<Operation> {
    match location {
        "CreateCustomer" => Some(Operation::CreateCustomer),
        "DeleteCustomer" => Some(Operation::DeleteCustomer),
        "GetCustomerDetailsByCustomerId" => Some(Operation::CustomerDetails),
        "GetCustomersList" => Some(Operation::CustomersList),
        _ => None,
    }
}

/// Handle one directory callback against the CRM store.
pub async fn handle_customer_request(
    crm: &dyn CrmStore,
    request: CustomerRequest,
) -> Result<CustomerResponse, Error> {
    let location = request.location.clone().unwrap_or_default();
    info!(%location, "Received a customer directory callback");

    let Some(operation) = parse_location(&location) else {
        return Err(WebhookError::UnrecognizedLocation { location }.into());
    };

    match operation {
        Operation::CreateCustomer => create(crm, request).await,
        Operation::DeleteCustomer => delete(crm, request).await,
        Operation::CustomerDetails => detail(crm, request).await,
        Operation::CustomersList => list(crm, request).await,
    }
}

async fn create(crm: &dyn CrmStore, request: CustomerRequest) -> Result<CustomerResponse, Error> {
    let display_name = request.display_name.ok_or(WebhookError::MalformedEvent {
        event_type: "CreateCustomer",
        field: "DisplayName",
    })?;
    let raw_channels = request.channels.ok_or(WebhookError::MalformedEvent {
        event_type: "CreateCustomer",
        field: "Channels",
    })?;
    let channels: Vec<CustomerChannel> =
        serde_json::from_str(&raw_channels).map_err(|e| WebhookError::InvalidField {
            event_type: "CreateCustomer",
            field: "Channels",
            message: e.to_string(),
        })?;

    let customer = crm
        .create_customer(NewCustomer {
            display_name,
            channels,
            worker: request.worker,
        })
        .await?;
    Ok(CustomerResponse::customer(customer.into()))
}

async fn delete(crm: &dyn CrmStore, request: CustomerRequest) -> Result<CustomerResponse, Error> {
    let id = require_customer_id("DeleteCustomer", request.customer_id)?;
    let customer = find_by_id(crm, &id).await?;
    crm.delete_customer(&customer.id).await?;
    Ok(CustomerResponse::default())
}

async fn detail(crm: &dyn CrmStore, request: CustomerRequest) -> Result<CustomerResponse, Error> {
    let id = require_customer_id("GetCustomerDetailsByCustomerId", request.customer_id)?;
    let customer = find_by_id(crm, &id).await?;
    Ok(CustomerResponse::customer(customer.into()))
}

async fn list(crm: &dyn CrmStore, request: CustomerRequest) -> Result<CustomerResponse, Error> {
    let worker = request.worker.ok_or(WebhookError::MalformedEvent {
        event_type: "GetCustomersList",
        field: "Worker",
    })?;
    let page_size = request.page_size.as_deref().and_then(|s| s.parse().ok());
    let anchor = request.anchor.as_deref().filter(|a| !a.is_empty());

    let customers = crm
        .list_customers(CustomerQuery {
            worker: Some(worker),
        })
        .await?;
    let views: Vec<CustomerView> = customers.iter().map(CustomerView::from).collect();
    Ok(CustomerResponse::customers(paging::page(
        views, anchor, page_size,
    )))
}

fn require_customer_id(
    event_type: &'static str,
    customer_id: Option<String>,
) -> Result<String, WebhookError> {
    customer_id.ok_or(WebhookError::MalformedEvent {
        event_type,
        field: "CustomerId",
    })
}

async fn find_by_id(crm: &dyn CrmStore, id: &str) -> Result<Customer, Error> {
    crm.find_customer(CustomerField::Id, id)
        .await?
        .ok_or_else(|| {
            CrmError::RecordNotFound {
                field: "id".to_string(),
                value: id.to_string(),
            }
            .into()
        })
}
