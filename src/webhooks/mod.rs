//! Webhook decision flows.
//!
//! Transport posts land in [`crate::server`], get typed in [`events`], and
//! fan out from [`dispatch`] to the CRM store and the conversations
//! platform. [`routing`] and [`customers`] are the two standalone
//! callbacks next to the event dispatcher.

pub mod customers;
pub mod dispatch;
pub mod events;
pub mod routing;
pub mod sync;
