//! crm-bridge — keeps an external CRM and a conversations platform in step.

pub mod config;
pub mod conversations;
pub mod crm;
pub mod error;
pub mod optout;
pub mod paging;
pub mod server;
pub mod webhooks;
