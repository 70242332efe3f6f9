//! Participant attribute enrichment.
//!
//! When a customer joins a conversation, the bridge copies identity fields
//! from their CRM record into the participant's attribute bag so the agent
//! UI shows a name and picture instead of a bare phone number.

use crate::conversations::ParticipantAttributes;
use crate::crm::Customer;

/// Keep a non-empty existing value, otherwise take the fill.
fn keep_or_fill(existing: &Option<String>, fill: Option<&str>) -> Option<String> {
    match existing.as_deref().filter(|v| !v.is_empty()) {
        Some(v) => Some(v.to_string()),
        None => fill.map(str::to_string),
    }
}

/// Plan the attribute update for a customer participant.
///
/// Fills `avatar`, `customer_id`, and `display_name` from the CRM record
/// wherever the bag has no non-empty value, never overwriting one that
/// does. Foreign keys in the bag pass through untouched. Returns `None`
/// when the merge changes nothing, so the caller can skip the platform
/// call entirely.
pub fn plan_attribute_sync(
    existing: &ParticipantAttributes,
    customer: Option<&Customer>,
) -> Option<ParticipantAttributes> {
    let mut merged = existing.clone();
    merged.avatar = keep_or_fill(&existing.avatar, customer.and_then(|c| c.avatar.as_deref()));
    merged.customer_id = keep_or_fill(&existing.customer_id, customer.map(|c| c.id.as_str()));
    merged.display_name = keep_or_fill(
        &existing.display_name,
        customer.map(|c| c.display_name.as_str()),
    );
    (merged != *existing).then_some(merged)
}
